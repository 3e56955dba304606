//! Front end for the sketchcc engine: stream files in, components out

pub mod stream;

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use log::info;
use sketchcc_common::NodeId;
use sketchcc_core::{CcOptions, Graph, GraphConfig};

pub use stream::EdgeStream;

/// Load a config file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<GraphConfig> {
    match path {
        Some(path) => GraphConfig::from_toml_file(path)
            .with_context(|| format!("cannot load config {}", path.display())),
        None => Ok(GraphConfig::default()),
    }
}

/// Build a graph from the stream file at `path`.
pub fn ingest(path: &Path, config: GraphConfig) -> Result<Graph> {
    let start = Instant::now();
    let stream = EdgeStream::open(path)?;
    let expected = stream.num_updates();
    let graph = Graph::new(stream.num_nodes(), config)?;
    let config = graph.config();
    info!(
        "{} workers, gutters of {} updates, bucket factor {}",
        config.num_workers,
        config.gutter_size_for(graph.num_nodes()),
        config.bucket_factor
    );
    for update in stream {
        graph.update(update?)?;
    }
    info!(
        "ingested {} updates from {} in {:.2?}",
        expected,
        path.display(),
        start.elapsed()
    );
    Ok(graph)
}

pub fn components(graph: &Graph, parallel: bool) -> Result<Vec<Vec<NodeId>>> {
    let options = CcOptions {
        parallel,
        keep_alive: false,
    };
    graph
        .connected_components_with(options)
        .context("connected components computation failed")
}

/// Print a summary line and one component per line.
pub fn write_components<W: Write>(out: &mut W, groups: &[Vec<NodeId>]) -> std::io::Result<()> {
    writeln!(out, "{} connected components", groups.len())?;
    for group in groups {
        let members: Vec<String> = group.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", members.join(" "))?;
    }
    Ok(())
}
