//! Connected components of a streamed graph from linear sketches
//!
//! Every vertex keeps a [`Supernode`]: a stack of L0-sampling [`Sketch`]es
//! of its incidence vector over the pairing-encoded edge domain. Inserting
//! and deleting an edge are the same XOR toggle, so the graph never stores
//! its edge list. A components query runs Borůvka over the supernodes,
//! merging the sketches of contracted components.
//!
//! ```no_run
//! use sketchcc_core::{Graph, GraphConfig};
//! use sketchcc_common::UpdateKind;
//!
//! let graph = Graph::new(4, GraphConfig::default())?;
//! graph.update_edge(0, 1, UpdateKind::Insert)?;
//! graph.update_edge(2, 3, UpdateKind::Insert)?;
//! let components = graph.connected_components()?;
//! # Ok::<(), sketchcc_common::Error>(())
//! ```

pub mod bucket;
pub mod config;
pub mod crc;
pub mod dsu;
pub mod graph;
pub mod ingest;
pub mod pairing;
pub mod sketch;
pub mod snapshot;
pub mod supernode;
pub mod worker;

pub use config::GraphConfig;
pub use dsu::DisjointSet;
pub use graph::{CcOptions, Graph};
pub use ingest::{Batch, BatchSource, StandaloneGutters};
pub use sketch::{Sketch, SketchSample, SketchShape};
pub use supernode::{NodeSample, Supernode};
pub use worker::{DeltaScratch, WorkerPool};
