//! Error types for library loading and symbol resolution.

use crate::registry::DllId;

/// Result type used throughout the engine
pub type DllResult<T> = Result<T, DllError>;

/// Errors raised by the dynamic linker
#[derive(Debug, thiserror::Error)]
pub enum DllError {
    /// The loader could not open the library
    #[error("unable to load shared object '{path}': {reason}")]
    Load {
        /// Path as given by the caller
        path: String,
        /// Diagnostic reported by the platform loader
        reason: String,
    },

    /// The loader reported a nonzero status when closing the library
    #[error("unable to unload shared object '{path}'")]
    Unload {
        /// Path as given by the caller
        path: String,
    },

    /// No loaded library matches the path
    #[error("shared object '{path}' was not loaded")]
    NotLoaded {
        /// Path as given by the caller
        path: String,
    },

    /// Symbol missing, or owned by a different library than requested
    #[error("symbol '{symbol}' not found in {library}")]
    SymbolNotFound {
        /// Symbol name that was looked up
        symbol: String,
        /// Library the lookup was restricted to
        library: String,
    },

    /// The interpreter rejected a module's IR
    #[error("failed to compile module '{module}' of {library}: {reason}")]
    Compilation {
        /// Owning library
        library: String,
        /// Module that failed
        module: String,
        /// Diagnostic from the interpreter
        reason: String,
    },

    /// Textual IR cannot be compiled at all
    #[error("textual IR is not supported (module '{module}' of {library})")]
    UnsupportedTextIr {
        /// Owning library
        library: String,
        /// Module carrying the textual payload
        module: String,
    },

    /// No library is registered under this id
    #[error("no library with id {0}")]
    UnknownLibrary(DllId),

    /// The IR bundle embedded in a library file is malformed
    #[error("malformed IR bundle in '{path}': {reason}")]
    Bundle {
        /// Library file
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DllError {
    /// Whether this error came out of module compilation
    pub fn is_compilation(&self) -> bool {
        matches!(
            self,
            DllError::Compilation { .. } | DllError::UnsupportedTextIr { .. }
        )
    }
}
