//! Dynamic library loading for native libraries
//!
//! Cross-platform support for loading shared libraries (.so, .dylib, .dll).
//! This is the fallback path for libraries that carry no embedded IR.

use std::ffi::CString;

/// Opaque handle to a natively loaded library.
///
/// Wraps the raw loader handle as an integer so that it can be stored in the
/// registry and compared without touching the platform loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(usize);

impl NativeHandle {
    /// Wrap a raw loader handle
    pub fn from_raw(raw: usize) -> Self {
        NativeHandle(raw)
    }

    /// Get the raw loader handle
    pub fn as_raw(&self) -> usize {
        self.0
    }
}

/// The native-loading collaborator.
///
/// Implementations mirror the `dlopen` family: `symbol` returns `Ok(0)` when
/// the library defines the symbol with a zero value, and `Err` only when the
/// loader reports an error.
pub trait NativeLoader: Send {
    /// Open a library. `local` keeps its symbols out of the global namespace,
    /// `now` resolves all relocations immediately.
    fn open(&mut self, path: &str, local: bool, now: bool) -> Result<NativeHandle, String>;

    /// Resolve a symbol to its address
    fn symbol(&self, handle: NativeHandle, name: &str) -> Result<usize, String>;

    /// Close a library, returning the loader's status code (0 on success)
    fn close(&mut self, handle: NativeHandle) -> i32;

    /// The most recent loader diagnostic, if any
    fn last_error(&self) -> Option<String>;
}

/// [`NativeLoader`] backed by the platform dynamic loader.
#[derive(Debug, Default)]
pub struct SystemLoader;

impl SystemLoader {
    /// Create a new system loader
    pub fn new() -> Self {
        SystemLoader
    }
}

// ============================================================================
// Unix Implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
impl NativeLoader for SystemLoader {
    fn open(&mut self, path: &str, local: bool, now: bool) -> Result<NativeHandle, String> {
        let c_path = CString::new(path).map_err(|e| format!("Invalid path: {}", e))?;

        let mut flags = if now { libc::RTLD_NOW } else { libc::RTLD_LAZY };
        flags |= if local { libc::RTLD_LOCAL } else { libc::RTLD_GLOBAL };

        let handle = unsafe { libc::dlopen(c_path.as_ptr(), flags) };

        if handle.is_null() {
            return Err(self
                .last_error()
                .unwrap_or_else(|| "Unknown error".to_string()));
        }

        Ok(NativeHandle(handle as usize))
    }

    fn symbol(&self, handle: NativeHandle, name: &str) -> Result<usize, String> {
        let c_name = CString::new(name).map_err(|e| format!("Invalid symbol name: {}", e))?;

        unsafe {
            // Clear any previous errors
            libc::dlerror();

            let symbol = libc::dlsym(handle.0 as *mut libc::c_void, c_name.as_ptr());
            if !symbol.is_null() {
                return Ok(symbol as usize);
            }
        }

        // A null result is only a miss if dlerror says so; the symbol's value
        // may legitimately be zero.
        match self.last_error() {
            Some(error) => Err(error),
            None => Ok(0),
        }
    }

    fn close(&mut self, handle: NativeHandle) -> i32 {
        unsafe { libc::dlclose(handle.0 as *mut libc::c_void) }
    }

    fn last_error(&self) -> Option<String> {
        unsafe {
            let err_ptr = libc::dlerror();
            if err_ptr.is_null() {
                None
            } else {
                Some(
                    std::ffi::CStr::from_ptr(err_ptr)
                        .to_string_lossy()
                        .into_owned(),
                )
            }
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
impl NativeLoader for SystemLoader {
    fn open(&mut self, path: &str, _local: bool, _now: bool) -> Result<NativeHandle, String> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        let wide: Vec<u16> = OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };

        if handle.is_null() {
            return Err(self
                .last_error()
                .unwrap_or_else(|| "Unknown error".to_string()));
        }

        Ok(NativeHandle(handle as usize))
    }

    fn symbol(&self, handle: NativeHandle, name: &str) -> Result<usize, String> {
        let c_name = CString::new(name).map_err(|e| format!("Invalid symbol name: {}", e))?;

        let symbol = unsafe { GetProcAddress(handle.0 as *mut std::ffi::c_void, c_name.as_ptr()) };

        if symbol.is_null() {
            return Err(self
                .last_error()
                .unwrap_or_else(|| format!("{} not found", name)));
        }

        Ok(symbol as usize)
    }

    fn close(&mut self, handle: NativeHandle) -> i32 {
        // FreeLibrary returns nonzero on success
        let ok = unsafe { FreeLibrary(handle.0 as *mut std::ffi::c_void) };
        if ok != 0 {
            0
        } else {
            1
        }
    }

    fn last_error(&self) -> Option<String> {
        match unsafe { GetLastError() } {
            0 => None,
            code => Some(format!("error code: {}", code)),
        }
    }
}

// Windows FFI declarations
#[cfg(windows)]
extern "system" {
    fn LoadLibraryW(filename: *const u16) -> *mut std::ffi::c_void;
    fn GetProcAddress(
        module: *mut std::ffi::c_void,
        procname: *const i8,
    ) -> *mut std::ffi::c_void;
    fn FreeLibrary(module: *mut std::ffi::c_void) -> i32;
    fn GetLastError() -> u32;
}
