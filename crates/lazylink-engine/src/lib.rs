//! Lazylink Dynamic Linker
//!
//! This crate loads shared libraries that may carry their own IR and defers
//! compiling that IR until a symbol is actually needed:
//! - **Registry**: Loaded libraries, ids, registered routines (`registry` module)
//! - **IR**: Module descriptors and the embedded bundle format (`ir` module)
//! - **Resolution**: Per-context symbol to parse-status map (`resolution` module)
//! - **Linker**: Lazy parsing and context propagation (`linker` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use lazylink_engine::{DryRunEngine, DynamicLinker, LinkerConfig};
//!
//! let mut linker = DynamicLinker::new(LinkerConfig::default().apply_env());
//! let mut ctx = linker.create_initial_context(Box::new(DryRunEngine::default()));
//!
//! let id = linker.open(&mut ctx, "libfoo.so", true, true)?.id();
//! // Nothing compiled yet; this compiles the module defining `foo`
//! let call = linker.call_info(&mut ctx, id, "foo")?;
//! linker.ensure_parsed_for_call(&mut ctx, &call)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Linker configuration
pub mod config;

/// Execution contexts
pub mod context;

/// Interpreter collaborator interface
pub mod engine;

/// Error types
pub mod error;

/// IR module descriptors and the embedded bundle format
pub mod ir;

/// The dynamic linker service
pub mod linker;

/// Native loading
pub mod native;

/// Library registry
pub mod registry;

/// Per-context resolution map
pub mod resolution;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigError, LinkerConfig, PARSE_TIME_ENV};
pub use context::{ContextId, ContextKind, ExecutionContext};
pub use engine::{CallableValue, CompileRequest, DryRunEngine, InvocableUnit, IrEngine};
pub use error::{DllError, DllResult};
pub use ir::{
    embed_ir, extract_ir, EmbeddedIr, IrExtractor, IrPayload, ModuleArena, ModuleId,
    ModuleRepresentation,
};
pub use linker::{DynamicLinker, SharedLinker};
pub use native::{NativeHandle, NativeLoader, SystemLoader};
pub use registry::{
    DlHandle, DllId, DllRegistry, DotSymbol, IrLibrary, LibraryHandle, NativeCallInfo,
    NativeSymbolType, SymbolHandle, SymbolInfo,
};
pub use resolution::{ContextState, EntryId, ParseEntry};
