//! `lazylink info`: Display version, platform and effective configuration.

use std::path::Path;

use lazylink_engine::PARSE_TIME_ENV;

use super::load_config;

pub fn execute(config: Option<&Path>) -> anyhow::Result<()> {
    println!("Lazylink v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Platform:     {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    if let Some(path) = config {
        println!("Config:       {}", path.display());
    }

    let config = load_config(config)?;
    println!();
    println!("Linker:");
    println!("  base library:       {}", config.base_library);
    println!("  base export suffix: {}", config.base_export_suffix);
    println!("  init prefix:        {}", config.init_prefix);
    println!("  symbol prefix:      {}", config.symbol_prefix);
    println!("  parse timing:       {}", config.parse_timing);
    if !config.eager_parse.is_empty() {
        println!("  eager parse:        {}", config.eager_parse.join(", "));
    }

    println!();
    println!("Environment:");
    print_env(PARSE_TIME_ENV);
    print_env("RUST_LOG");

    Ok(())
}

fn print_env(var: &str) {
    match std::env::var(var) {
        Ok(value) => println!("  {} = {}", var, value),
        Err(_) => println!("  {} (not set)", var),
    }
}
