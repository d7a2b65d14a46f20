//! Subcommand implementations

pub mod embed;
pub mod info;
pub mod inspect;
pub mod resolve;

use std::path::Path;

use anyhow::Context;
use lazylink_engine::LinkerConfig;

/// Load the configuration file if given, then apply the environment.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<LinkerConfig> {
    let config = match path {
        Some(path) => LinkerConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LinkerConfig::default(),
    };
    Ok(config.apply_env())
}
