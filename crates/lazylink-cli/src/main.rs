//! Lazylink CLI tool
//!
//! Inspect the IR embedded in shared libraries, embed new IR, and trace how
//! a symbol lookup is lazily resolved.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use lazylink_engine::ContextKind;

#[derive(Parser)]
#[command(name = "lazylink")]
#[command(about = "Dynamic library loader with lazily parsed IR", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the IR modules embedded in a library
    Inspect {
        /// Library file
        library: PathBuf,
        /// Print the manifest as JSON
        #[arg(long)]
        json: bool,
    },

    /// Embed IR modules into a library, replacing existing IR
    Embed {
        /// Library file to modify
        library: PathBuf,
        /// JSON manifest describing the modules
        manifest: PathBuf,
    },

    /// Load libraries and resolve a symbol, reporting what was compiled
    Resolve {
        /// Symbol to resolve
        symbol: String,
        /// Libraries to load, in order
        #[arg(required = true)]
        libraries: Vec<PathBuf>,
        /// Resolve in a child context of this kind instead of the initial one
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,
        /// Restrict the search to one library name
        #[arg(short, long)]
        library: Option<String>,
        /// Linker configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show version, platform and effective configuration
    Info {
        /// Linker configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Context kinds accepted on the command line
#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    ShareNothing,
    ShareParentRo,
    ShareParentRw,
    ShareAll,
}

impl From<KindArg> for ContextKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::ShareNothing => ContextKind::ShareNothing,
            KindArg::ShareParentRo => ContextKind::ShareParentRo,
            KindArg::ShareParentRw => ContextKind::ShareParentRw,
            KindArg::ShareAll => ContextKind::ShareAll,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { library, json } => commands::inspect::execute(&library, json),
        Commands::Embed { library, manifest } => commands::embed::execute(&library, &manifest),
        Commands::Resolve {
            symbol,
            libraries,
            kind,
            library,
            config,
        } => commands::resolve::execute(
            &symbol,
            &libraries,
            kind.map(ContextKind::from),
            library.as_deref(),
            config.as_deref(),
        ),
        Commands::Info { config } => commands::info::execute(config.as_deref()),
    }
}
