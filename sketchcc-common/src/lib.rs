//! Common types for the sketchcc toolkit

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Edge, GraphUpdate, NodeId, UpdateKind};
