//! `lazylink embed`: Append IR modules to a library.

use std::path::Path;

use anyhow::{anyhow, Context};
use lazylink_engine::embed_ir;
use lazylink_engine::ir::BundleManifest;

pub fn execute(library: &Path, manifest: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(manifest)
        .with_context(|| format!("reading manifest {}", manifest.display()))?;
    let parsed: BundleManifest = serde_json::from_str(&text)
        .with_context(|| format!("parsing manifest {}", manifest.display()))?;
    let modules = parsed.into_modules().map_err(|e| anyhow!(e))?;

    embed_ir(library, &modules)?;

    let exports: usize = modules.iter().map(|m| m.exports().len()).sum();
    println!(
        "Embedded {} module(s), {} export(s) into {}",
        modules.len(),
        exports,
        library.display()
    );
    Ok(())
}
