//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use lazylink_engine::{
    embed_ir, DryRunEngine, DynamicLinker, EmbeddedIr, ExecutionContext, IrPayload, LinkerConfig,
    ModuleRepresentation, NativeHandle, NativeLoader,
};

/// Build a module descriptor with a small bitcode payload
pub fn module(name: &str, exports: &[&str], imports: &[&str]) -> ModuleRepresentation {
    ModuleRepresentation::new(
        name,
        exports.iter().map(|s| s.to_string()).collect(),
        imports.iter().map(|s| s.to_string()).collect(),
        IrPayload::Binary(vec![0x42, 0x43, 0xc0, 0xde]),
    )
}

/// Build a module descriptor carrying textual IR
pub fn text_module(name: &str, exports: &[&str]) -> ModuleRepresentation {
    ModuleRepresentation::new(
        name,
        exports.iter().map(|s| s.to_string()).collect(),
        vec![],
        IrPayload::Text("define void @f() { ret void }".to_string()),
    )
}

/// Write a fake shared object carrying `modules` as its embedded IR
pub fn write_ir_library(dir: &Path, file_name: &str, modules: &[ModuleRepresentation]) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, b"\x7fELF fake shared object").unwrap();
    embed_ir(&path, modules).unwrap();
    path
}

/// Write a fake shared object with no embedded IR
pub fn write_native_library(dir: &Path, file_name: &str) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, b"\x7fELF fake shared object").unwrap();
    path
}

/// What the fake native loader has been asked to do
#[derive(Debug, Default)]
pub struct FakeLoaderLog {
    pub opened: Vec<String>,
    pub closed: Vec<usize>,
}

/// A native loader that never touches the platform loader.
///
/// Every library it opens exports the symbols in `symbols`; `close_status`
/// is returned from every close.
#[derive(Debug, Clone, Default)]
pub struct FakeLoader {
    pub symbols: FxHashMap<String, usize>,
    pub close_status: i32,
    pub fail_open: Option<String>,
    pub log: Arc<Mutex<FakeLoaderLog>>,
}

impl FakeLoader {
    pub fn with_symbols(symbols: &[(&str, usize)]) -> Self {
        Self {
            symbols: symbols.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..Self::default()
        }
    }
}

impl NativeLoader for FakeLoader {
    fn open(&mut self, path: &str, _local: bool, _now: bool) -> Result<NativeHandle, String> {
        if let Some(reason) = &self.fail_open {
            return Err(reason.clone());
        }
        let mut log = self.log.lock();
        log.opened.push(path.to_string());
        Ok(NativeHandle::from_raw(0x1000 + log.opened.len()))
    }

    fn symbol(&self, _handle: NativeHandle, name: &str) -> Result<usize, String> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| format!("undefined symbol: {}", name))
    }

    fn close(&mut self, handle: NativeHandle) -> i32 {
        self.log.lock().closed.push(handle.as_raw());
        self.close_status
    }

    fn last_error(&self) -> Option<String> {
        None
    }
}

/// Route linker logging through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Linker wired to a fake native loader and the embedded IR reader
pub fn linker_with(config: LinkerConfig, loader: FakeLoader) -> DynamicLinker {
    init_logging();
    DynamicLinker::with_loaders(config, Box::new(loader), Box::new(EmbeddedIr))
}

/// Default linker plus its initial context and a handle on that context's engine
pub fn setup() -> (DynamicLinker, ExecutionContext, DryRunEngine) {
    let linker = linker_with(LinkerConfig::default(), FakeLoader::default());
    let engine = DryRunEngine::default();
    let ctx = linker.create_initial_context(Box::new(engine.clone()));
    (linker, ctx, engine)
}
