//! sizediff CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use sizediff_cli::cmd;
use sizediff_cli::config::{Overrides, ReportConfig};
use std::io::IsTerminal;
use std::path::PathBuf;

/// sizediff - Compare build artifact sizes between builds
#[derive(Parser)]
#[command(name = "sizediff")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ./sizereport.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Rename pattern pairing hash-busted artifacts, e.g. "js/[name]-[hash].js"
    #[arg(long, global = true)]
    find_renamed: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report added, removed and changed artifacts
    Diff {
        /// Previous build (JSON array or build log)
        previous: PathBuf,
        /// Current build (JSON array or build log)
        current: PathBuf,
        /// Also print the size marker line for the current build
        #[arg(long)]
        emit_marker: bool,
    },
    /// Show the size tree of a build, or of the diff against a previous build
    Tree {
        /// Current build (JSON array or build log)
        current: PathBuf,
        /// Previous build; switches to diff mode
        #[arg(long)]
        previous: Option<PathBuf>,
        /// Filter query, e.g. "min_size=1024&include=^src"
        #[arg(long)]
        filter: Option<String>,
        /// Levels shown below the root
        #[arg(long)]
        depth: Option<usize>,
        /// Also show the subtree at this id path (repeatable)
        #[arg(long)]
        open: Vec<String>,
        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout carries the report
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = ReportConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Diff { previous, current, emit_marker } => {
            let config = config.merge(Overrides {
                find_renamed: cli.find_renamed,
                ..Overrides::default()
            })?;
            cmd::diff::run(&previous, &current, &config, emit_marker).await
        }
        Commands::Tree { current, previous, filter, depth, open, json } => {
            let config = config.merge(Overrides {
                find_renamed: cli.find_renamed,
                filters: filter,
                depth,
            })?;
            let args = cmd::tree::TreeArgs {
                current: &current,
                previous: previous.as_deref(),
                open: &open,
                json,
                show_progress: !json && std::io::stderr().is_terminal(),
            };
            cmd::tree::run(args, &config).await
        }
    }
}
