//! `lazylink resolve`: Load libraries and trace a lazy symbol lookup.
//!
//! Compilation goes to a dry-run engine, so nothing is executed; the output
//! shows which modules a real interpreter would have compiled.

use std::path::{Path, PathBuf};

use lazylink_engine::{ContextKind, DryRunEngine, DynamicLinker, SymbolHandle};

use super::load_config;

pub fn execute(
    symbol: &str,
    libraries: &[PathBuf],
    kind: Option<ContextKind>,
    library: Option<&str>,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let engine = DryRunEngine::new(config.symbol_prefix.clone());
    let mut linker = DynamicLinker::new(config);
    let mut root = linker.create_initial_context(Box::new(engine.clone()));

    for path in libraries {
        let info = linker.open(&mut root, path, true, false)?;
        println!(
            "Loaded #{} {} ({})",
            info.id(),
            info.name(),
            if info.is_ir() { "IR" } else { "native" }
        );
    }

    let child_engine = DryRunEngine::new(linker.config().symbol_prefix.clone());
    let mut child = kind.map(|kind| {
        println!("Resolving in a {:?} child context", kind);
        linker.create_context(&root, kind, Box::new(child_engine.clone()))
    });
    let (ctx, active) = match child.as_mut() {
        Some(child) => (child, &child_engine),
        None => (&mut root, &engine),
    };

    let found = linker.find_symbol(ctx, symbol, library)?;
    let compiled = active.compiled();
    if let Some(ctx) = child.as_mut() {
        linker.destroy_context(ctx);
    }

    let Some(found) = found else {
        println!("{}: not found", symbol);
        return Ok(());
    };

    match found.handle {
        SymbolHandle::Address(addr) => {
            println!("{} -> {} (native, {:#x})", symbol, found.library_name, addr)
        }
        SymbolHandle::Callable(value) => println!(
            "{} -> {} (IR, callable {:#x})",
            symbol,
            found.library_name,
            value.as_u64()
        ),
    }
    if compiled.is_empty() {
        println!("No modules compiled");
    } else {
        println!("Compiled {} module(s): {}", compiled.len(), compiled.join(", "));
    }
    Ok(())
}
