//! `lazylink inspect`: List the IR modules embedded in a library.

use std::path::Path;

use lazylink_engine::ir::BundleManifest;
use lazylink_engine::{extract_ir, IrPayload};

pub fn execute(library: &Path, json: bool) -> anyhow::Result<()> {
    let Some(modules) = extract_ir(library)? else {
        println!("{}: no embedded IR (native library)", library.display());
        return Ok(());
    };

    if json {
        let manifest = BundleManifest::from_modules(&modules);
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!("{}: {} module(s)", library.display(), modules.len());
    for module in &modules {
        let format = match module.payload() {
            IrPayload::Binary(_) => "bitcode",
            IrPayload::Text(_) => "text",
        };
        println!();
        println!("  {} ({}, {} bytes)", module.name(), format, module.payload().len());
        println!("    exports: {}", module.exports().join(", "));
        if !module.imports().is_empty() {
            println!("    imports: {}", module.imports().join(", "));
        }
    }
    Ok(())
}
