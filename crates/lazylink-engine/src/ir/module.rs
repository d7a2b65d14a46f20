//! Module descriptors and the module arena
//!
//! A library carrying IR is split into modules, the unit at which lazy
//! parsing happens. Descriptors are created once per library open and are
//! referenced by [`ModuleId`] from every parse entry and every context.

use std::fmt;
use std::ops::Index;

/// MIME type passed to the interpreter when compiling a binary payload
pub const BITCODE_MIME_TYPE: &str = "application/x-llvm-ir-bitcode";

/// The IR carried by a module
#[derive(Clone, PartialEq, Eq)]
pub enum IrPayload {
    /// Binary-encoded IR, ready to compile
    Binary(Vec<u8>),
    /// Textual IR (not supported for compilation)
    Text(String),
}

impl IrPayload {
    /// Size of the payload in bytes
    pub fn len(&self) -> usize {
        match self {
            IrPayload::Binary(bytes) => bytes.len(),
            IrPayload::Text(text) => text.len(),
        }
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for IrPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrPayload::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
            IrPayload::Text(text) => write!(f, "Text({} bytes)", text.len()),
        }
    }
}

/// One compilation unit inside a library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRepresentation {
    name: String,
    exports: Vec<String>,
    imports: Vec<String>,
    payload: IrPayload,
}

impl ModuleRepresentation {
    /// Create a module descriptor
    pub fn new(
        name: impl Into<String>,
        exports: Vec<String>,
        imports: Vec<String>,
        payload: IrPayload,
    ) -> Self {
        Self {
            name: name.into(),
            exports,
            imports,
            payload,
        }
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Symbols defined by this module
    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    /// Symbols this module references but does not define
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    /// The raw IR
    pub fn payload(&self) -> &IrPayload {
        &self.payload
    }
}

/// Index of a module in the [`ModuleArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u32);

impl ModuleId {
    /// Get the raw index
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Append-only storage for every module produced by a library open
#[derive(Debug, Default)]
pub struct ModuleArena {
    modules: Vec<ModuleRepresentation>,
}

impl ModuleArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a module and return its id
    pub fn alloc(&mut self, module: ModuleRepresentation) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(module);
        id
    }

    /// Get a module by id
    pub fn get(&self, id: ModuleId) -> Option<&ModuleRepresentation> {
        self.modules.get(id.0 as usize)
    }

    /// Number of modules stored
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the arena is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Index<ModuleId> for ModuleArena {
    type Output = ModuleRepresentation;

    fn index(&self, id: ModuleId) -> &ModuleRepresentation {
        &self.modules[id.0 as usize]
    }
}
