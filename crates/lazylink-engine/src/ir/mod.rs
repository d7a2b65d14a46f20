//! IR modules carried by libraries
//!
//! This module provides:
//! - Module descriptors and the arena they live in (`module`)
//! - The embedded IR bundle format and the extractor trait (`embed`)

pub mod embed;
pub mod module;

use std::path::Path;

pub use embed::{embed_ir, extract_ir, BundleManifest, ManifestModule, ManifestPayload};
pub use module::{IrPayload, ModuleArena, ModuleId, ModuleRepresentation, BITCODE_MIME_TYPE};

use crate::error::DllResult;

/// Source of the IR modules of a library file.
///
/// Returning `Ok(None)` sends the library down the native fallback path.
pub trait IrExtractor: Send {
    /// Extract the modules of the library at `path`
    fn extract(&self, path: &Path) -> DllResult<Option<Vec<ModuleRepresentation>>>;
}

/// Reads the bundle appended to the library file (see [`embed`]).
#[derive(Debug, Default)]
pub struct EmbeddedIr;

impl IrExtractor for EmbeddedIr {
    fn extract(&self, path: &Path) -> DllResult<Option<Vec<ModuleRepresentation>>> {
        extract_ir(path)
    }
}
