//! The dynamic linker service
//!
//! [`DynamicLinker`] is the explicitly constructed, process-wide service
//! object. It owns the library registry, the module arena and the loaders,
//! and every operation takes the execution context it runs in as an explicit
//! parameter.
//!
//! There is one major difference between native and IR libraries. A native
//! library is loaded once and its symbols are visible from every context.
//! Compiled IR, however, belongs to the context that compiled it, so each
//! context keeps its own resolution map and the base library's modules have
//! to be re-registered (and later re-compiled) in every new context.

mod parse;
mod propagate;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::LinkerConfig;
use crate::context::ExecutionContext;
use crate::error::{DllError, DllResult};
use crate::ir::{EmbeddedIr, IrExtractor, ModuleArena, ModuleId, ModuleRepresentation};
use crate::native::{NativeLoader, SystemLoader};
use crate::registry::{
    absolute_path, library_name, DlHandle, DllId, DllRegistry, DotSymbol, IrLibrary, LibraryHandle,
    NativeCallInfo, NativeSymbolType, SymbolHandle, SymbolInfo,
};

use parse::LazyParser;

/// A linker shared between threads.
///
/// The registry itself is not synchronized; sharing it means serializing
/// every call through this lock.
pub type SharedLinker = Arc<Mutex<DynamicLinker>>;

/// Library registry, module store and lazy parser in one service object
pub struct DynamicLinker {
    config: LinkerConfig,
    registry: DllRegistry,
    modules: ModuleArena,
    native: Box<dyn NativeLoader>,
    extractor: Box<dyn IrExtractor>,
    /// Modules of the base library, re-registered in every new context
    base_modules: Vec<ModuleId>,
}

impl DynamicLinker {
    /// Create a linker using the platform loader and embedded IR bundles
    pub fn new(config: LinkerConfig) -> Self {
        Self::with_loaders(config, Box::new(SystemLoader::new()), Box::new(EmbeddedIr))
    }

    /// Create a linker with custom collaborators
    pub fn with_loaders(
        config: LinkerConfig,
        native: Box<dyn NativeLoader>,
        extractor: Box<dyn IrExtractor>,
    ) -> Self {
        Self {
            config,
            registry: DllRegistry::new(),
            modules: ModuleArena::new(),
            native,
            extractor,
            base_modules: Vec::new(),
        }
    }

    /// Wrap the linker for use from several threads
    pub fn into_shared(self) -> SharedLinker {
        Arc::new(Mutex::new(self))
    }

    /// The active configuration
    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    /// The library registry
    pub fn registry(&self) -> &DllRegistry {
        &self.registry
    }

    /// Get a module descriptor
    pub fn module(&self, id: ModuleId) -> Option<&ModuleRepresentation> {
        self.modules.get(id)
    }

    /// Modules remembered for the base library
    pub fn base_modules(&self) -> &[ModuleId] {
        &self.base_modules
    }

    /// Get a library by id
    pub fn library(&self, id: DllId) -> Option<&LibraryHandle> {
        self.registry.get(id)
    }

    /// Libraries that are currently loaded
    pub fn loaded_libraries(&self) -> impl Iterator<Item = &LibraryHandle> {
        self.registry.live()
    }

    fn parser(&self) -> LazyParser<'_> {
        LazyParser {
            modules: &self.modules,
            config: &self.config,
        }
    }

    /// Open a library.
    ///
    /// If the file carries embedded IR its modules are stored and their
    /// exports registered, unparsed, in `ctx`; nothing is compiled yet.
    /// Otherwise the platform loader opens it as a native library.
    ///
    /// A library whose IR trailer is present but malformed fails with
    /// [`DllError::Bundle`]; every other failure is a [`DllError::Load`].
    pub fn open(
        &mut self,
        ctx: &mut ExecutionContext,
        path: impl AsRef<Path>,
        local: bool,
        now: bool,
    ) -> DllResult<&LibraryHandle> {
        let Self {
            config,
            registry,
            modules,
            native,
            extractor,
            base_modules,
        } = self;

        let path = path.as_ref();
        let extracted = match extractor.extract(&absolute_path(path)?) {
            Err(e @ DllError::Bundle { .. }) => return Err(e),
            other => other.map_err(|e| e.to_string()),
        };

        registry.load(path, |abs_path| {
            let irs = extracted?;
            let Some(irs) = irs else {
                let path_str = abs_path.to_string_lossy();
                return native
                    .open(&path_str, local, now)
                    .map(DlHandle::Native)
                    .map_err(|reason| {
                        if reason.is_empty() {
                            native.last_error().unwrap_or_default()
                        } else {
                            reason
                        }
                    });
            };

            let lib_name = library_name(abs_path);
            let is_base = lib_name == config.base_library;
            let ids: Vec<ModuleId> = irs.into_iter().map(|ir| modules.alloc(ir)).collect();
            if is_base {
                // Remembered so that later contexts can re-register them
                *base_modules = ids.clone();
            }

            let suffix = config.base_export_suffix.as_str();
            let mut registered = 0;
            for &id in &ids {
                registered += ctx.state_mut().register_module_exports(
                    &lib_name,
                    id,
                    &modules[id],
                    |name| !is_base || name.ends_with(suffix),
                );
            }
            log::debug!(
                "{}: {} IR modules, {} exports registered in {}",
                lib_name,
                ids.len(),
                registered,
                ctx.id()
            );
            Ok(DlHandle::Ir(IrLibrary::new(lib_name, ids)))
        })
    }

    /// Unload the library loaded from `path`
    pub fn unload(&mut self, path: impl AsRef<Path>) -> DllResult<()> {
        let native = &mut self.native;
        self.registry.unload(path.as_ref(), |handle| match handle {
            DlHandle::Native(h) => native.close(*h),
            DlHandle::Ir(_) => 0,
        })
    }

    /// Close a library by id.
    ///
    /// Closing an IR library is a no-op that reports success; the library
    /// stays loaded. Native ones return the loader status.
    pub fn close(&mut self, id: DllId) -> DllResult<i32> {
        let native = &mut self.native;
        self.registry.close(id, |handle| match handle {
            DlHandle::Native(h) => native.close(*h),
            DlHandle::Ir(_) => 0,
        })
    }

    /// Look a symbol up in one library.
    ///
    /// For an IR library the owning module is compiled first if needed.
    pub fn lookup(
        &self,
        ctx: &mut ExecutionContext,
        id: DllId,
        symbol: &str,
    ) -> DllResult<SymbolHandle> {
        let info = self.registry.get(id).ok_or(DllError::UnknownLibrary(id))?;
        let not_found = || DllError::SymbolNotFound {
            symbol: symbol.to_string(),
            library: info.name().to_string(),
        };
        if info.is_unloaded() {
            return Err(not_found());
        }

        match info.handle() {
            DlHandle::Native(h) => self
                .native
                .symbol(*h, symbol)
                .map(SymbolHandle::Address)
                .map_err(|_| not_found()),
            DlHandle::Ir(ir) => self.parser().resolve_for_call(ctx, ir.name(), symbol),
        }
    }

    /// Search loaded libraries for a symbol.
    ///
    /// Libraries are searched in load order; `library` restricts the search
    /// to one library name. A native symbol with value zero counts as found.
    pub fn find_symbol(
        &self,
        ctx: &mut ExecutionContext,
        symbol: &str,
        library: Option<&str>,
    ) -> DllResult<Option<SymbolInfo>> {
        let parser = self.parser();
        let native = &self.native;
        self.registry.find_symbol(symbol, library, |info| match info.handle() {
            DlHandle::Native(h) => Ok(native.symbol(*h, symbol).ok().map(SymbolHandle::Address)),
            DlHandle::Ir(ir) => {
                let owned = ctx
                    .state()
                    .get(symbol)
                    .is_some_and(|entry| entry.library() == ir.name());
                if !owned {
                    return Ok(None);
                }
                match parser.resolve_for_call(ctx, ir.name(), symbol) {
                    Ok(handle) => Ok(Some(handle)),
                    Err(DllError::SymbolNotFound { .. }) => Ok(None),
                    Err(e) => Err(e),
                }
            }
        })
    }

    /// Find the first loaded library defining `symbol`
    pub fn find_library_containing_symbol(
        &self,
        ctx: &mut ExecutionContext,
        symbol: &str,
    ) -> DllResult<Option<&LibraryHandle>> {
        Ok(self
            .find_symbol(ctx, symbol, None)?
            .and_then(|found| self.registry.get(found.library)))
    }

    /// Ensure the module defining `symbol` (and its import closure) is
    /// compiled in `ctx`.
    ///
    /// # Panics
    ///
    /// If `fatal_if_missing` is set and no entry exists for `symbol`.
    pub fn ensure_parsed(
        &self,
        ctx: &mut ExecutionContext,
        library: &str,
        symbol: &str,
        fatal_if_missing: bool,
    ) -> DllResult<()> {
        self.parser()
            .ensure_parsed(ctx, library, symbol, fatal_if_missing)
    }

    /// Resolve `symbol` in library `id` into the data needed to call it
    pub fn call_info(
        &self,
        ctx: &mut ExecutionContext,
        id: DllId,
        symbol: &str,
    ) -> DllResult<NativeCallInfo> {
        let handle = self.lookup(ctx, id, symbol)?;
        let info = self.registry.get(id).ok_or(DllError::UnknownLibrary(id))?;
        Ok(NativeCallInfo {
            name: symbol.to_string(),
            symbol: handle,
            dll_id: id,
            dll_name: info.name().to_string(),
        })
    }

    /// Called immediately before dispatching a resolved call.
    ///
    /// The callee and every module it depends on must be compiled. Native
    /// callees need nothing.
    pub fn ensure_parsed_for_call(
        &self,
        ctx: &mut ExecutionContext,
        call: &NativeCallInfo,
    ) -> DllResult<()> {
        let info = self
            .registry
            .get(call.dll_id)
            .ok_or(DllError::UnknownLibrary(call.dll_id))?;
        if !info.is_ir() {
            return Ok(());
        }
        self.ensure_parsed(ctx, &call.dll_name, &call.name, true)
    }

    /// Record the routines a library registered during initialization.
    ///
    /// Routines of an IR library that have no entry yet (internal, non
    /// exported functions) become parsed opaque entries in `ctx`.
    pub fn register_routines(
        &mut self,
        ctx: &mut ExecutionContext,
        id: DllId,
        nst: NativeSymbolType,
        routines: Vec<DotSymbol>,
    ) -> DllResult<()> {
        let info = self.registry.set_routines(id, nst, routines)?;
        if info.is_ir() {
            let added = ctx.state_mut().register_opaque_symbols(
                info.name(),
                info.routines(nst).iter().map(|ds| ds.name.as_str()),
            );
            log::trace!("{}: {} opaque routines registered", info.name(), added);
        }
        Ok(())
    }

    /// Find a routine registered by library `id`
    pub fn find_registered_routine(
        &self,
        id: DllId,
        nst: Option<NativeSymbolType>,
        name: &str,
    ) -> Option<&DotSymbol> {
        self.registry.get(id)?.find_routine(nst, name)
    }

    /// Set the dynamic-lookup flag of a library, returning the previous value
    pub fn use_dynamic_symbols(&mut self, id: DllId, value: bool) -> DllResult<bool> {
        self.registry.use_dynamic_symbols(id, value)
    }

    /// Set the force-symbols flag of a library, returning the previous value
    pub fn force_symbols(&mut self, id: DllId, value: bool) -> DllResult<bool> {
        self.registry.force_symbols(id, value)
    }
}

impl Default for DynamicLinker {
    fn default() -> Self {
        Self::new(LinkerConfig::default())
    }
}
