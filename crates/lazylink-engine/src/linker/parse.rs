//! Lazy parse engine
//!
//! Compiles a module the first time one of its symbols is needed, then walks
//! its imports so that everything the module can call is compiled too.
//! Parsing is module-granular; a module is marked parsed before its imports
//! are visited, which makes self-imports and import cycles terminate.

use std::time::Instant;

use crate::config::LinkerConfig;
use crate::context::ExecutionContext;
use crate::engine::CompileRequest;
use crate::error::{DllError, DllResult};
use crate::ir::{IrPayload, ModuleArena, ModuleId, ModuleRepresentation, BITCODE_MIME_TYPE};
use crate::registry::SymbolHandle;

/// Borrowed view of the linker state needed to parse
pub(crate) struct LazyParser<'a> {
    pub(crate) modules: &'a ModuleArena,
    pub(crate) config: &'a LinkerConfig,
}

impl LazyParser<'_> {
    /// Make sure the module defining `symbol` is compiled in `ctx`, along
    /// with the modules it imports from.
    ///
    /// Same-library imports of an initialization entry point are left for
    /// later unless allow-listed; eagerly following them would compile the
    /// whole library during initialization.
    ///
    /// # Panics
    ///
    /// If `fatal_if_missing` is set and `symbol` has no entry, which means the
    /// registry and the resolution map disagree.
    pub(crate) fn ensure_parsed(
        &self,
        ctx: &mut ExecutionContext,
        library: &str,
        symbol: &str,
        fatal_if_missing: bool,
    ) -> DllResult<()> {
        let Some(entry_id) = ctx.state().entry_id(symbol) else {
            assert!(
                !fatal_if_missing,
                "no parse entry for '{}' of {} in {}: resolution map out of sync with loaded libraries",
                symbol,
                library,
                ctx.id()
            );
            return Ok(());
        };

        let entry = ctx.state().entry(entry_id);
        if entry.is_parsed() {
            return Ok(());
        }
        let Some(module_id) = entry.module() else {
            ctx.state_mut().mark_parsed(entry_id);
            return Ok(());
        };
        let module = &self.modules[module_id];

        self.compile(ctx, library, module)?;
        ctx.state_mut().mark_parsed(entry_id);

        let is_init = symbol.starts_with(&self.config.init_prefix);
        for importee in module.imports() {
            let Some(import) = ctx.state().get(importee) else {
                log::trace!("{}: import '{}' of '{}' is unresolved", library, importee, module.name());
                continue;
            };
            let import_library = import.library().to_string();

            if is_init && import_library == library && !self.eager_import(library, import.module(), importee) {
                log::trace!(
                    "{}: deferring '{}' imported by init function '{}'",
                    library,
                    importee,
                    symbol
                );
                continue;
            }
            self.ensure_parsed(ctx, &import_library, importee, false)?;
        }
        Ok(())
    }

    /// Resolve `symbol` in `library` to a callable value, compiling it first
    /// if necessary.
    pub(crate) fn resolve_for_call(
        &self,
        ctx: &mut ExecutionContext,
        library: &str,
        symbol: &str,
    ) -> DllResult<SymbolHandle> {
        let parsed = match ctx.state().get(symbol) {
            Some(entry) if entry.library() == library => entry.is_parsed(),
            found => {
                if let Some(entry) = found {
                    log::warn!(
                        "'{}' requested from {} but registered by {}",
                        symbol,
                        library,
                        entry.library()
                    );
                }
                return Err(DllError::SymbolNotFound {
                    symbol: symbol.to_string(),
                    library: library.to_string(),
                });
            }
        };
        if !parsed {
            self.ensure_parsed(ctx, library, symbol, true)?;
        }

        let mangled = format!("{}{}", self.config.symbol_prefix, symbol);
        ctx.engine()
            .lookup_compiled_symbol(&mangled)
            .map(SymbolHandle::Callable)
            .ok_or_else(|| DllError::SymbolNotFound {
                symbol: symbol.to_string(),
                library: library.to_string(),
            })
    }

    fn eager_import(
        &self,
        library: &str,
        module: Option<ModuleId>,
        importee: &str,
    ) -> bool {
        let module_match = module
            .map(|id| self.config.must_eagerly_parse(library, self.modules[id].name()))
            .unwrap_or(false);
        module_match || self.config.must_eagerly_parse(library, importee)
    }

    fn compile(
        &self,
        ctx: &mut ExecutionContext,
        library: &str,
        module: &ModuleRepresentation,
    ) -> DllResult<()> {
        let payload = match module.payload() {
            IrPayload::Binary(bytes) => bytes,
            IrPayload::Text(_) => {
                return Err(DllError::UnsupportedTextIr {
                    library: library.to_string(),
                    module: module.name().to_string(),
                })
            }
        };

        let start = Instant::now();
        let unit = ctx
            .engine_mut()
            .compile(CompileRequest {
                library,
                module,
                payload,
                mime_type: BITCODE_MIME_TYPE,
            })
            .map_err(|reason| DllError::Compilation {
                library: library.to_string(),
                module: module.name().to_string(),
                reason,
            })?;
        let secs = start.elapsed().as_secs_f64();

        log::debug!(
            "{}: compiled module '{}' as unit {} in {}",
            library,
            module.name(),
            unit.id(),
            ctx.id()
        );
        if self.config.parse_timing {
            eprintln!("parsed {}:{} in {:.6} secs", library, module.name(), secs);
        }
        Ok(())
    }
}
