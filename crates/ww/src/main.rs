//! WeWrite CLI - renders Obsidian notes to WeChat article HTML.
//!
//! Provides commands for:
//! - `render`: Render one note to HTML
//! - `check`: Compare borrowed-fragment demand with a host snapshot
//! - `watch`: Re-render a note whenever the vault changes

mod commands;
mod debouncer;
mod error;
mod output;
mod session;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CheckArgs, RenderArgs, WatchArgs};
use output::Output;

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WW - Markdown to WeChat article renderer.
#[derive(Parser)]
#[command(name = "ww", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a note to HTML.
    Render(RenderArgs),
    /// Check a host snapshot against the fragments a note needs.
    Check(CheckArgs),
    /// Render a note, then re-render it on every vault change.
    Watch(WatchArgs),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Self::Render(args) => args.common.verbose,
            Self::Check(args) => args.common.verbose,
            Self::Watch(args) => args.common.verbose,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.command.verbose() {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    let result = rt.block_on(async {
        match cli.command {
            Commands::Render(args) => args.execute().await,
            Commands::Check(args) => args.execute().await,
            Commands::Watch(args) => args.execute().await,
        }
    });

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
