//! Library registry
//!
//! Process-wide, append-only list of loaded libraries. The registry assigns
//! ids, derives library names and performs the path-based bookkeeping of
//! load/unload/find. Opening, closing and symbol resolution are delegated to
//! callbacks supplied by the [`DynamicLinker`](crate::DynamicLinker), which
//! knows whether a library goes down the IR path or the native one.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::engine::CallableValue;
use crate::error::{DllError, DllResult};
use crate::ir::ModuleId;
use crate::native::NativeHandle;

/// Unique identifier of a loaded library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DllId(u32);

impl DllId {
    /// Get the raw id
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DllId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Calling convention a routine was registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeSymbolType {
    /// `.C` routines
    C,
    /// `.Call` routines
    Call,
    /// `.Fortran` routines
    Fortran,
    /// `.External` routines
    External,
}

impl NativeSymbolType {
    /// All symbol types, in table order
    pub const ALL: [NativeSymbolType; 4] = [
        NativeSymbolType::C,
        NativeSymbolType::Call,
        NativeSymbolType::Fortran,
        NativeSymbolType::External,
    ];

    fn index(self) -> usize {
        match self {
            NativeSymbolType::C => 0,
            NativeSymbolType::Call => 1,
            NativeSymbolType::Fortran => 2,
            NativeSymbolType::External => 3,
        }
    }
}

/// A routine registered by a library's initialization function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotSymbol {
    /// Routine name
    pub name: String,
    /// Address of the routine
    pub address: usize,
    /// Declared argument count (-1 if unspecified)
    pub num_args: i32,
}

impl DotSymbol {
    /// Create a registered routine
    pub fn new(name: impl Into<String>, address: usize, num_args: i32) -> Self {
        Self {
            name: name.into(),
            address,
            num_args,
        }
    }
}

/// Handle of a library opened down the IR path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrLibrary {
    name: String,
    modules: Vec<ModuleId>,
}

impl IrLibrary {
    pub(crate) fn new(name: String, modules: Vec<ModuleId>) -> Self {
        Self { name, modules }
    }

    /// Library name the modules were registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modules of the library, in file order
    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }
}

/// The opaque handle behind a [`LibraryHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DlHandle {
    /// Opened by the platform loader
    Native(NativeHandle),
    /// Opened from embedded IR
    Ir(IrLibrary),
}

/// A resolved symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolHandle {
    /// Address in a native library (may be zero)
    Address(usize),
    /// Compiled IR function
    Callable(CallableValue),
}

/// One loaded library
#[derive(Debug, Clone)]
pub struct LibraryHandle {
    id: DllId,
    name: String,
    path: PathBuf,
    handle: DlHandle,
    dynamic_lookup: bool,
    force_symbols: bool,
    routines: [Vec<DotSymbol>; 4],
    unloaded: bool,
}

impl LibraryHandle {
    /// Library id
    pub fn id(&self) -> DllId {
        self.id
    }

    /// Library name (file name without its final extension)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying handle
    pub fn handle(&self) -> &DlHandle {
        &self.handle
    }

    /// Whether the library was opened down the IR path
    pub fn is_ir(&self) -> bool {
        matches!(self.handle, DlHandle::Ir(_))
    }

    /// Whether dynamic symbol lookup is enabled
    pub fn dynamic_lookup(&self) -> bool {
        self.dynamic_lookup
    }

    /// Whether only registered symbols may be used
    pub fn force_symbols(&self) -> bool {
        self.force_symbols
    }

    /// Whether the library has been unloaded
    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }

    /// Routines registered under a symbol type
    pub fn routines(&self, nst: NativeSymbolType) -> &[DotSymbol] {
        &self.routines[nst.index()]
    }

    /// Find a registered routine, optionally restricted to one symbol type
    pub fn find_routine(&self, nst: Option<NativeSymbolType>, name: &str) -> Option<&DotSymbol> {
        let types: &[NativeSymbolType] = match nst {
            Some(ref t) => std::slice::from_ref(t),
            None => &NativeSymbolType::ALL,
        };
        types
            .iter()
            .flat_map(|t| self.routines(*t))
            .find(|ds| ds.name == name)
    }
}

/// Result of a successful symbol search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Library the symbol was found in
    pub library: DllId,
    /// Name of that library
    pub library_name: String,
    /// Symbol name
    pub symbol: String,
    /// Resolved handle
    pub handle: SymbolHandle,
}

/// Everything needed to dispatch a resolved call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCallInfo {
    /// Symbol name
    pub name: String,
    /// Resolved handle
    pub symbol: SymbolHandle,
    /// Library id
    pub dll_id: DllId,
    /// Library name
    pub dll_name: String,
}

/// Derive a library name from a path: the file name with its final
/// extension stripped (`libfoo.so` → `libfoo`, `.hidden` stays `.hidden`).
pub fn library_name(path: &Path) -> String {
    match path.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => path.display().to_string(),
    }
}

/// Expand a leading `~` and make the path absolute
pub fn absolute_path(path: &Path) -> DllResult<PathBuf> {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };
    Ok(std::path::absolute(expanded)?)
}

/// The list of loaded libraries
#[derive(Debug, Default)]
pub struct DllRegistry {
    list: Vec<LibraryHandle>,
}

impl DllRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a library.
    ///
    /// `opener` receives the absolute path and either returns the handle or
    /// the loader's diagnostic.
    pub fn load(
        &mut self,
        path: &Path,
        opener: impl FnOnce(&Path) -> Result<DlHandle, String>,
    ) -> DllResult<&LibraryHandle> {
        let abs_path = absolute_path(path)?;
        let handle = opener(&abs_path).map_err(|reason| DllError::Load {
            path: path.display().to_string(),
            reason,
        })?;

        let id = DllId(self.list.len() as u32 + 1);
        let name = library_name(&abs_path);
        log::debug!("loaded {} as #{} from {}", name, id, abs_path.display());

        self.list.push(LibraryHandle {
            id,
            name,
            path: abs_path,
            handle,
            dynamic_lookup: true,
            force_symbols: false,
            routines: Default::default(),
            unloaded: false,
        });
        Ok(&self.list[self.list.len() - 1])
    }

    /// Unload the first live library loaded from `path`.
    ///
    /// `closer` returns the loader's status code. The entry stays in the list
    /// (ids are never reused) but no longer takes part in lookups.
    pub fn unload(
        &mut self,
        path: &Path,
        closer: impl FnOnce(&DlHandle) -> i32,
    ) -> DllResult<()> {
        let abs_path = absolute_path(path)?;
        let Some(info) = self
            .list
            .iter_mut()
            .find(|info| !info.unloaded && info.path == abs_path)
        else {
            return Err(DllError::NotLoaded {
                path: path.display().to_string(),
            });
        };

        if closer(&info.handle) != 0 {
            return Err(DllError::Unload {
                path: path.display().to_string(),
            });
        }
        info.unloaded = true;
        log::debug!("unloaded {} (#{})", info.name, info.id);
        Ok(())
    }

    /// Close a library by id, returning the loader status.
    ///
    /// Closing an IR library always succeeds and changes nothing. For a
    /// native library, a zero status marks it unloaded.
    pub fn close(&mut self, id: DllId, closer: impl FnOnce(&DlHandle) -> i32) -> DllResult<i32> {
        let info = self.get_mut(id).ok_or(DllError::UnknownLibrary(id))?;
        if info.unloaded || info.is_ir() {
            return Ok(0);
        }
        let status = closer(&info.handle);
        if status == 0 {
            info.unloaded = true;
        }
        Ok(status)
    }

    /// Search live libraries in registration order.
    ///
    /// `library` restricts the search to libraries of that name; `None` or an
    /// empty name searches everything. `resolver` looks the symbol up in one
    /// library and returns `Ok(None)` on a miss.
    pub fn find_symbol(
        &self,
        symbol: &str,
        library: Option<&str>,
        mut resolver: impl FnMut(&LibraryHandle) -> DllResult<Option<SymbolHandle>>,
    ) -> DllResult<Option<SymbolInfo>> {
        let restrict = library.filter(|name| !name.is_empty());
        for info in self.live() {
            if restrict.is_some_and(|name| name != info.name) {
                continue;
            }
            if let Some(handle) = resolver(info)? {
                return Ok(Some(SymbolInfo {
                    library: info.id,
                    library_name: info.name.clone(),
                    symbol: symbol.to_string(),
                    handle,
                }));
            }
        }
        Ok(None)
    }

    /// Get a library by id
    pub fn get(&self, id: DllId) -> Option<&LibraryHandle> {
        self.list.iter().find(|info| info.id == id)
    }

    /// Get a library by id, mutably
    pub fn get_mut(&mut self, id: DllId) -> Option<&mut LibraryHandle> {
        self.list.iter_mut().find(|info| info.id == id)
    }

    /// Every library ever loaded, including unloaded ones
    pub fn iter(&self) -> impl Iterator<Item = &LibraryHandle> {
        self.list.iter()
    }

    /// Libraries that have not been unloaded
    pub fn live(&self) -> impl Iterator<Item = &LibraryHandle> {
        self.list.iter().filter(|info| !info.unloaded)
    }

    /// Set the dynamic-lookup flag, returning the previous value
    pub fn use_dynamic_symbols(&mut self, id: DllId, value: bool) -> DllResult<bool> {
        let info = self.get_mut(id).ok_or(DllError::UnknownLibrary(id))?;
        Ok(std::mem::replace(&mut info.dynamic_lookup, value))
    }

    /// Set the force-symbols flag, returning the previous value
    pub fn force_symbols(&mut self, id: DllId, value: bool) -> DllResult<bool> {
        let info = self.get_mut(id).ok_or(DllError::UnknownLibrary(id))?;
        Ok(std::mem::replace(&mut info.force_symbols, value))
    }

    /// Replace the routines registered under `nst`
    pub fn set_routines(
        &mut self,
        id: DllId,
        nst: NativeSymbolType,
        routines: Vec<DotSymbol>,
    ) -> DllResult<&LibraryHandle> {
        let info = self.get_mut(id).ok_or(DllError::UnknownLibrary(id))?;
        info.routines[nst.index()] = routines;
        Ok(info)
    }

    /// Number of entries, including unloaded ones
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Check if nothing was ever loaded
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}
