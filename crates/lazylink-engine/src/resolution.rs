//! Per-context symbol resolution map
//!
//! Maps an exported symbol name to the [`ParseEntry`] of the module that
//! defines it. Parsing is module-granular, so all exports of one module
//! share a single entry: parsing through any of them marks them all.

use rustc_hash::FxHashMap;

use crate::ir::{ModuleId, ModuleRepresentation};

/// Index of a [`ParseEntry`] within one [`ContextState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(usize);

/// Parse status of one module (or opaque routine) in one context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEntry {
    library: String,
    module: Option<ModuleId>,
    parsed: bool,
}

impl ParseEntry {
    /// Name of the owning library
    pub fn library(&self) -> &str {
        &self.library
    }

    /// The module behind this entry; `None` for opaque routines
    pub fn module(&self) -> Option<ModuleId> {
        self.module
    }

    /// Whether the module has been compiled in this context
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }
}

/// Resolution state owned by one execution context
#[derive(Debug, Default)]
pub struct ContextState {
    symbols: FxHashMap<String, EntryId>,
    entries: Vec<ParseEntry>,
}

impl ContextState {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the exports of `module`.
    ///
    /// Nothing is registered unless `predicate(module.name())` holds. A symbol
    /// already claimed in this context keeps its first owner. Returns the
    /// number of symbols added.
    pub fn register_module_exports(
        &mut self,
        library: &str,
        module_id: ModuleId,
        module: &ModuleRepresentation,
        predicate: impl Fn(&str) -> bool,
    ) -> usize {
        if !predicate(module.name()) {
            return 0;
        }

        let mut shared: Option<EntryId> = None;
        let mut added = 0;
        for export in module.exports() {
            if self.symbols.contains_key(export) {
                log::trace!(
                    "{}: export '{}' of module '{}' shadowed by {}",
                    library,
                    export,
                    module.name(),
                    self.entries[self.symbols[export].0].library
                );
                continue;
            }
            let id = *shared.get_or_insert_with(|| {
                self.entries.push(ParseEntry {
                    library: library.to_string(),
                    module: Some(module_id),
                    parsed: false,
                });
                EntryId(self.entries.len() - 1)
            });
            self.symbols.insert(export.clone(), id);
            added += 1;
        }
        added
    }

    /// Register routines that have no IR as already parsed.
    ///
    /// Lets later lookups short-circuit without compiling anything. Symbols
    /// already present are left alone. Returns the number added.
    pub fn register_opaque_symbols<'a>(
        &mut self,
        library: &str,
        symbols: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        let mut added = 0;
        for name in symbols {
            if self.symbols.contains_key(name) {
                continue;
            }
            self.entries.push(ParseEntry {
                library: library.to_string(),
                module: None,
                parsed: true,
            });
            self.symbols
                .insert(name.to_string(), EntryId(self.entries.len() - 1));
            added += 1;
        }
        added
    }

    /// Get the entry id for a symbol
    pub fn entry_id(&self, symbol: &str) -> Option<EntryId> {
        self.symbols.get(symbol).copied()
    }

    /// Get the entry for a symbol
    pub fn get(&self, symbol: &str) -> Option<&ParseEntry> {
        self.entry_id(symbol).map(|id| &self.entries[id.0])
    }

    /// Get an entry by id
    pub fn entry(&self, id: EntryId) -> &ParseEntry {
        &self.entries[id.0]
    }

    /// Mark an entry as parsed. There is no way back.
    pub fn mark_parsed(&mut self, id: EntryId) {
        self.entries[id.0].parsed = true;
    }

    /// Whether two symbols share one entry
    pub fn same_entry(&self, a: &str, b: &str) -> bool {
        match (self.entry_id(a), self.entry_id(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// All registered symbol names
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    /// Number of registered symbols
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Check if no symbol is registered
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.symbols.clear();
        self.entries.clear();
    }
}
