//! Lazy parsing of IR libraries
//!
//! Tests cover:
//! - Opening registers exports without compiling
//! - Module-granular parsing (one compile per module)
//! - Import closure, self-imports and cycles
//! - Initialization entry points and the eager-parse allow-list
//! - Compilation failures and textual IR

mod common;

use common::{module, setup, text_module, write_ir_library};
use lazylink_engine::{DllError, LinkerConfig, SymbolHandle};

// =============================================================================
// OPEN AND FIRST CALL
// =============================================================================

#[test]
fn test_open_compiles_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(dir.path(), "libA.so", &[module("m1", &["f", "g"], &[])]);
    let (mut linker, mut ctx, engine) = setup();

    let info = linker.open(&mut ctx, &path, true, true).unwrap();
    assert!(info.is_ir());
    assert_eq!(info.name(), "libA");

    assert!(engine.compiled().is_empty());
    let entry = ctx.state().get("f").unwrap();
    assert_eq!(entry.library(), "libA");
    assert!(!entry.is_parsed());
    assert!(ctx.state().same_entry("f", "g"));
}

#[test]
fn test_module_compiled_once_for_all_exports() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(dir.path(), "libA.so", &[module("m1", &["f", "g"], &[])]);
    let (mut linker, mut ctx, engine) = setup();
    let id = linker.open(&mut ctx, &path, true, true).unwrap().id();

    let f = linker.lookup(&mut ctx, id, "f").unwrap();
    assert!(matches!(f, SymbolHandle::Callable(_)));
    assert_eq!(engine.compile_count("m1"), 1);
    assert!(ctx.state().get("g").unwrap().is_parsed());

    let g = linker.lookup(&mut ctx, id, "g").unwrap();
    assert!(matches!(g, SymbolHandle::Callable(_)));
    assert_ne!(f, g);
    assert_eq!(engine.compile_count("m1"), 1);
}

#[test]
fn test_call_info_and_ensure_parsed_for_call() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(dir.path(), "libA.so", &[module("m1", &["f"], &[])]);
    let (mut linker, mut ctx, engine) = setup();
    let id = linker.open(&mut ctx, &path, true, true).unwrap().id();

    let call = linker.call_info(&mut ctx, id, "f").unwrap();
    assert_eq!(call.name, "f");
    assert_eq!(call.dll_id, id);
    assert_eq!(call.dll_name, "libA");

    linker.ensure_parsed_for_call(&mut ctx, &call).unwrap();
    assert_eq!(engine.compile_count("m1"), 1);
}

#[test]
fn test_lookup_unknown_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(dir.path(), "libA.so", &[module("m1", &["f"], &[])]);
    let (mut linker, mut ctx, engine) = setup();
    let id = linker.open(&mut ctx, &path, true, true).unwrap().id();

    let err = linker.lookup(&mut ctx, id, "nope").unwrap_err();
    assert!(matches!(err, DllError::SymbolNotFound { .. }));
    assert!(engine.compiled().is_empty());
}

#[test]
fn test_lookup_symbol_owned_by_other_library() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_ir_library(dir.path(), "libA.so", &[module("a1", &["f"], &[])]);
    let b = write_ir_library(dir.path(), "libB.so", &[module("b1", &["f", "h"], &[])]);
    let (mut linker, mut ctx, engine) = setup();
    linker.open(&mut ctx, &a, true, true).unwrap();
    let b_id = linker.open(&mut ctx, &b, true, true).unwrap().id();

    // `f` was claimed by libA first
    let err = linker.lookup(&mut ctx, b_id, "f").unwrap_err();
    assert!(matches!(err, DllError::SymbolNotFound { ref library, .. } if library == "libB"));

    linker.lookup(&mut ctx, b_id, "h").unwrap();
    assert_eq!(engine.compiled(), vec!["b1".to_string()]);
}

// =============================================================================
// IMPORT CLOSURE
// =============================================================================

#[test]
fn test_imports_are_compiled_transitively() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(
        dir.path(),
        "libA.so",
        &[
            module("top", &["entry"], &["mid"]),
            module("middle", &["mid"], &["leaf", "printf"]),
            module("bottom", &["leaf"], &[]),
            module("unused", &["other"], &[]),
        ],
    );
    let (mut linker, mut ctx, engine) = setup();
    linker.open(&mut ctx, &path, true, true).unwrap();

    linker.ensure_parsed(&mut ctx, "libA", "entry", true).unwrap();

    assert_eq!(
        engine.compiled(),
        vec!["top".to_string(), "middle".to_string(), "bottom".to_string()]
    );
    assert!(!ctx.state().get("other").unwrap().is_parsed());
}

#[test]
fn test_self_import_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(dir.path(), "libA.so", &[module("rec", &["f"], &["f"])]);
    let (mut linker, mut ctx, engine) = setup();
    linker.open(&mut ctx, &path, true, true).unwrap();

    linker.ensure_parsed(&mut ctx, "libA", "f", true).unwrap();
    assert_eq!(engine.compile_count("rec"), 1);
}

#[test]
fn test_import_cycle_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(
        dir.path(),
        "libA.so",
        &[module("ping", &["ping"], &["pong"]), module("pong", &["pong"], &["ping"])],
    );
    let (mut linker, mut ctx, engine) = setup();
    linker.open(&mut ctx, &path, true, true).unwrap();

    linker.ensure_parsed(&mut ctx, "libA", "ping", true).unwrap();
    assert_eq!(engine.compile_count("ping"), 1);
    assert_eq!(engine.compile_count("pong"), 1);
}

#[test]
fn test_imports_cross_library() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_ir_library(dir.path(), "libA.so", &[module("a1", &["f"], &["util"])]);
    let b = write_ir_library(dir.path(), "libB.so", &[module("b1", &["util"], &[])]);
    let (mut linker, mut ctx, engine) = setup();
    linker.open(&mut ctx, &a, true, true).unwrap();
    linker.open(&mut ctx, &b, true, true).unwrap();

    linker.ensure_parsed(&mut ctx, "libA", "f", true).unwrap();
    assert_eq!(engine.compiled(), vec!["a1".to_string(), "b1".to_string()]);
}

#[test]
fn test_missing_entry_is_ignored_when_not_fatal() {
    let (linker, mut ctx, engine) = setup();
    linker.ensure_parsed(&mut ctx, "libA", "ghost", false).unwrap();
    assert!(engine.compiled().is_empty());
}

#[test]
#[should_panic(expected = "no parse entry")]
fn test_missing_entry_is_fatal() {
    let (linker, mut ctx, _engine) = setup();
    let _ = linker.ensure_parsed(&mut ctx, "libA", "ghost", true);
}

// =============================================================================
// INITIALIZATION ENTRY POINTS
// =============================================================================

fn init_library(dir: &std::path::Path) -> std::path::PathBuf {
    write_ir_library(
        dir,
        "foo.so",
        &[
            module("init", &["R_init_foo"], &["helper", "ext"]),
            module("helpers", &["helper"], &[]),
        ],
    )
}

#[test]
fn test_init_defers_same_library_imports() {
    let dir = tempfile::tempdir().unwrap();
    let foo = init_library(dir.path());
    let ext = write_ir_library(dir.path(), "libExt.so", &[module("ext", &["ext"], &[])]);
    let (mut linker, mut ctx, engine) = setup();
    linker.open(&mut ctx, &ext, true, true).unwrap();
    let id = linker.open(&mut ctx, &foo, true, true).unwrap().id();

    linker.ensure_parsed(&mut ctx, "foo", "R_init_foo", true).unwrap();

    // Other-library imports are still followed
    assert_eq!(engine.compiled(), vec!["init".to_string(), "ext".to_string()]);
    assert!(!ctx.state().get("helper").unwrap().is_parsed());

    // The deferred module compiles on first use
    linker.lookup(&mut ctx, id, "helper").unwrap();
    assert_eq!(engine.compile_count("helpers"), 1);
}

#[test]
fn test_allow_listed_init_import_is_eager() {
    let dir = tempfile::tempdir().unwrap();
    let foo = init_library(dir.path());

    let mut config = LinkerConfig::default();
    config.allow_eager_parse("foo", "helpers");
    let mut linker = common::linker_with(config, common::FakeLoader::default());
    let engine = lazylink_engine::DryRunEngine::default();
    let mut ctx = linker.create_initial_context(Box::new(engine.clone()));
    linker.open(&mut ctx, &foo, true, true).unwrap();

    linker.ensure_parsed(&mut ctx, "foo", "R_init_foo", true).unwrap();
    assert_eq!(engine.compile_count("helpers"), 1);
}

#[test]
fn test_base_library_init_defers_helper() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(
        dir.path(),
        "libR.so",
        &[
            module("init_llvm", &["R_init_foo"], &["helper"]),
            module("helpers_llvm", &["helper"], &[]),
        ],
    );
    let (mut linker, mut ctx, engine) = setup();
    linker.open(&mut ctx, &path, false, true).unwrap();

    linker.ensure_parsed(&mut ctx, "libR", "R_init_foo", true).unwrap();
    assert_eq!(engine.compiled(), vec!["init_llvm".to_string()]);
    assert!(!ctx.state().get("helper").unwrap().is_parsed());
}

#[test]
fn test_non_init_symbol_follows_same_library_imports() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(
        dir.path(),
        "foo.so",
        &[module("setup", &["setup_foo"], &["helper"]), module("helpers", &["helper"], &[])],
    );
    let (mut linker, mut ctx, engine) = setup();
    linker.open(&mut ctx, &path, true, true).unwrap();

    linker.ensure_parsed(&mut ctx, "foo", "setup_foo", true).unwrap();
    assert_eq!(engine.compile_count("helpers"), 1);
}

// =============================================================================
// FAILURES
// =============================================================================

#[test]
fn test_compilation_failure_leaves_entry_unparsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(dir.path(), "libA.so", &[module("bad", &["f"], &[])]);
    let (mut linker, mut ctx, engine) = setup();
    let id = linker.open(&mut ctx, &path, true, true).unwrap().id();

    engine.fail_on("bad");
    let err = linker.lookup(&mut ctx, id, "f").unwrap_err();
    assert!(err.is_compilation());
    assert!(!ctx.state().get("f").unwrap().is_parsed());
}

#[test]
fn test_text_ir_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(dir.path(), "libT.so", &[text_module("textual", &["t"])]);
    let (mut linker, mut ctx, engine) = setup();
    let id = linker.open(&mut ctx, &path, true, true).unwrap().id();

    let err = linker.lookup(&mut ctx, id, "t").unwrap_err();
    assert!(matches!(err, DllError::UnsupportedTextIr { ref module, .. } if module == "textual"));
    assert!(engine.compiled().is_empty());
}

// =============================================================================
// PARSE TIMING
// =============================================================================

#[test]
fn test_parse_timing_does_not_change_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir_library(
        dir.path(),
        "libA.so",
        &[module("m1", &["f"], &["g"]), module("m2", &["g"], &[])],
    );
    let config = LinkerConfig {
        parse_timing: true,
        ..LinkerConfig::default()
    };
    let mut linker = common::linker_with(config, common::FakeLoader::default());
    let engine = lazylink_engine::DryRunEngine::default();
    let mut ctx = linker.create_initial_context(Box::new(engine.clone()));
    let id = linker.open(&mut ctx, &path, true, true).unwrap().id();

    assert!(linker.config().parse_timing);
    let handle = linker.lookup(&mut ctx, id, "f").unwrap();
    assert!(matches!(handle, SymbolHandle::Callable(_)));
    assert_eq!(engine.compiled(), vec!["m1".to_string(), "m2".to_string()]);
}
