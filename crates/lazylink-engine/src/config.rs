//! Linker configuration, loaded from a `lazylink.toml` file and the environment.

use std::path::Path;

use serde::Deserialize;

/// Environment variable that turns on per-module parse timing
pub const PARSE_TIME_ENV: &str = "LAZYLINK_PARSE_TIME";

/// Errors that can occur while loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax or type error
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An `eager_parse` entry is not of the form `library:name`
    #[error("invalid eager_parse entry '{0}', expected 'library:name'")]
    InvalidEagerEntry(String),
}

/// Tunables for the linker.
///
/// Every field has a default, so an empty file is a valid configuration:
///
/// ```toml
/// base_library = "libR"
/// base_export_suffix = "_llvm"
/// eager_parse = ["grDevices:colors", "graphics:registerBase"]
/// parse_timing = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkerConfig {
    /// Name of the always-present base runtime library
    pub base_library: String,

    /// Only base-library modules whose name ends with this are registered
    pub base_export_suffix: String,

    /// Prefix marking a library initialization entry point
    pub init_prefix: String,

    /// Prefix prepended to a symbol name when asking the interpreter for its compiled value
    pub symbol_prefix: String,

    /// `library:name` pairs whose initialization must resolve same-library imports eagerly
    pub eager_parse: Vec<String>,

    /// Print per-module parse timing on stderr
    pub parse_timing: bool,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            base_library: "libR".to_string(),
            base_export_suffix: "_llvm".to_string(),
            init_prefix: "R_init_".to_string(),
            symbol_prefix: "@".to_string(),
            eager_parse: vec![
                "grDevices:colors".to_string(),
                "graphics:registerBase".to_string(),
            ],
            parse_timing: false,
        }
    }
}

impl LinkerConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: LinkerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply environment overrides (currently only [`PARSE_TIME_ENV`]).
    pub fn apply_env(mut self) -> Self {
        if std::env::var_os(PARSE_TIME_ENV).is_some() {
            self.parse_timing = true;
        }
        self
    }

    /// Add an entry to the eager-parse allow-list.
    pub fn allow_eager_parse(&mut self, library: &str, name: &str) {
        self.eager_parse.push(format!("{}:{}", library, name));
    }

    /// Check whether `(library, name)` is on the eager-parse allow-list.
    pub fn must_eagerly_parse(&self, library: &str, name: &str) -> bool {
        self.eager_parse.iter().any(|entry| {
            entry
                .split_once(':')
                .is_some_and(|(lib, n)| lib == library && n == name)
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for entry in &self.eager_parse {
            match entry.split_once(':') {
                Some((lib, name)) if !lib.is_empty() && !name.is_empty() => {}
                _ => return Err(ConfigError::InvalidEagerEntry(entry.clone())),
            }
        }
        Ok(())
    }
}
