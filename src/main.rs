use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "bundle-loader")]
#[command(about = "Discover, cache and prepare extension bundles", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.bundle-loader/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every configured extension and print a summary
    Load {
        /// Extra extension root folders, scanned instead of the configured ones
        #[arg(short, long)]
        root: Vec<PathBuf>,
        /// List every synthesized command
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the component tree of one extension folder
    Tree {
        /// Path to a *.extension folder
        path: PathBuf,
    },
    /// Print the content hash of an extension folder
    Hash {
        path: PathBuf,
        /// Hash file contents instead of size and mtime
        #[arg(long)]
        content: bool,
    },
    /// Remove cache files
    ClearCache {
        /// Only remove the cache of this extension
        #[arg(short, long)]
        extension: Option<String>,
    },
    /// Show version information
    Version,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Some(Commands::Version) | None => {
            println!("bundle-loader {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Load { root, verbose }) => {
            cli::load::cmd_load(cli.config.as_deref(), root, verbose)?;
        }
        Some(Commands::Tree { path }) => {
            cli::inspect::cmd_tree(cli.config.as_deref(), &path)?;
        }
        Some(Commands::Hash { path, content }) => {
            cli::inspect::cmd_hash(&path, content)?;
        }
        Some(Commands::ClearCache { extension }) => {
            cli::load::cmd_clear_cache(cli.config.as_deref(), extension.as_deref())?;
        }
    }

    Ok(())
}
