//! Interpreter collaborator interface
//!
//! The linker never executes IR itself. Each execution context carries an
//! [`IrEngine`] that turns a module payload into an invocable unit and later
//! hands out the callable value of a compiled symbol.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::ModuleRepresentation;

/// A compiled module, as returned by the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvocableUnit(u64);

impl InvocableUnit {
    /// Wrap an interpreter-defined unit id
    pub fn new(id: u64) -> Self {
        InvocableUnit(id)
    }

    /// Get the unit id
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// The interpreter's value for a compiled function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallableValue(u64);

impl CallableValue {
    /// Wrap an interpreter-defined value
    pub fn new(raw: u64) -> Self {
        CallableValue(raw)
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Everything the interpreter gets to see when asked to compile a module
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    /// Library owning the module
    pub library: &'a str,
    /// The module descriptor
    pub module: &'a ModuleRepresentation,
    /// Binary IR
    pub payload: &'a [u8],
    /// MIME type tag for the payload
    pub mime_type: &'a str,
}

/// The interpreter collaborator
pub trait IrEngine: Send {
    /// Compile a module into an invocable unit.
    ///
    /// The error string is surfaced as the reason of a compilation error.
    fn compile(&mut self, request: CompileRequest<'_>) -> Result<InvocableUnit, String>;

    /// Look up the callable value of a compiled symbol by its mangled name
    fn lookup_compiled_symbol(&self, mangled: &str) -> Option<CallableValue>;
}

#[derive(Debug, Default)]
struct DryRunState {
    compiled: Vec<String>,
    symbols: FxHashMap<String, CallableValue>,
    failing: FxHashSet<String>,
    next_unit: u64,
}

/// An [`IrEngine`] that records compilations instead of executing anything.
///
/// Compiling a module binds every export under its mangled name. Clones share
/// the same record, so a handle kept outside the context can observe what the
/// context compiled.
#[derive(Debug, Clone)]
pub struct DryRunEngine {
    prefix: String,
    state: Arc<Mutex<DryRunState>>,
}

impl DryRunEngine {
    /// Create an engine that mangles symbols with `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: Arc::new(Mutex::new(DryRunState::default())),
        }
    }

    /// Make compilation of the named module fail
    pub fn fail_on(&self, module_name: &str) {
        self.state.lock().failing.insert(module_name.to_string());
    }

    /// Names of compiled modules, in compilation order
    pub fn compiled(&self) -> Vec<String> {
        self.state.lock().compiled.clone()
    }

    /// Number of times the named module was compiled
    pub fn compile_count(&self, module_name: &str) -> usize {
        self.state
            .lock()
            .compiled
            .iter()
            .filter(|name| name.as_str() == module_name)
            .count()
    }
}

impl Default for DryRunEngine {
    fn default() -> Self {
        Self::new("@")
    }
}

impl IrEngine for DryRunEngine {
    fn compile(&mut self, request: CompileRequest<'_>) -> Result<InvocableUnit, String> {
        let mut state = self.state.lock();
        let name = request.module.name();
        if state.failing.contains(name) {
            return Err(format!("rejected module '{}'", name));
        }

        state.next_unit += 1;
        let unit = state.next_unit;
        for (i, export) in request.module.exports().iter().enumerate() {
            let mangled = format!("{}{}", self.prefix, export);
            state
                .symbols
                .insert(mangled, CallableValue::new((unit << 32) | i as u64));
        }
        state.compiled.push(name.to_string());
        Ok(InvocableUnit::new(unit))
    }

    fn lookup_compiled_symbol(&self, mangled: &str) -> Option<CallableValue> {
        self.state.lock().symbols.get(mangled).copied()
    }
}
