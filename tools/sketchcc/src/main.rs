//! # sketchcc CLI
//!
//! Computes connected components of an edge-stream file using graph
//! sketches, and writes or restores graph snapshots.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use sketchcc_core::Graph;

#[derive(Parser)]
#[command(name = "sketchcc")]
#[command(about = "Connected components of streamed graphs from linear sketches", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a stream file and print its connected components
    Components {
        /// Stream file: `num_nodes num_updates` then `type u v` lines
        stream: PathBuf,

        /// Sample all components of a round in parallel
        #[arg(long)]
        parallel: bool,

        /// TOML file with graph settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write a snapshot of the sketches before computing
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },
    /// Restore a snapshot and print its connected components
    Restore {
        /// Snapshot written by `components --snapshot`
        snapshot: PathBuf,

        /// Sample all components of a round in parallel
        #[arg(long)]
        parallel: bool,

        /// TOML file with graph settings
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = run(cli) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let (graph, parallel) = match cli.command {
        Commands::Components {
            stream,
            parallel,
            config,
            snapshot,
        } => {
            let config = sketchcc::load_config(config.as_deref())?;
            let graph = sketchcc::ingest(&stream, config)?;
            if let Some(path) = snapshot {
                graph
                    .write_binary(&path)
                    .with_context(|| format!("cannot write snapshot {}", path.display()))?;
                info!("snapshot written to {}", path.display());
            }
            (graph, parallel)
        }
        Commands::Restore {
            snapshot,
            parallel,
            config,
        } => {
            let config = sketchcc::load_config(config.as_deref())?;
            let graph = Graph::restore(&snapshot, config)
                .with_context(|| format!("cannot restore {}", snapshot.display()))?;
            (graph, parallel)
        }
    };

    let groups = sketchcc::components(&graph, parallel)?;
    let mut out = BufWriter::new(io::stdout().lock());
    sketchcc::write_components(&mut out, &groups)?;
    out.flush()?;
    Ok(())
}
