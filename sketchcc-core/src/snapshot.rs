//! Graph snapshot file
//!
//! # Layout
//!
//! ```text
//! seed           u64 LE
//! num_nodes      u64 LE
//! bucket_factor  f64 LE
//! supernode[0..num_nodes]   each level's a-array then c-array, u64 LE
//! crc64          u64 LE over everything above
//! ```
//!
//! Every supernode has the same size for a given `num_nodes` and factor, so
//! the file length is known from the header alone.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::Deref;
use std::path::Path;

use sketchcc_common::{Error, Result};

use crate::crc::{ChecksumReader, ChecksumWriter};
use crate::sketch::SketchShape;
use crate::supernode::Supernode;

pub const HEADER_LEN: u64 = 24;
pub const TRAILER_LEN: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotHeader {
    pub seed: u64,
    pub num_nodes: u64,
    pub bucket_factor: f64,
}

impl SnapshotHeader {
    pub fn shape(&self) -> Result<SketchShape> {
        SketchShape::for_graph(self.num_nodes, self.bucket_factor)
    }

    /// Total file length, header and trailer included.
    pub fn file_len(&self) -> Result<u64> {
        let per_node = Supernode::serialized_size(self.num_nodes, &self.shape()?) as u64;
        per_node
            .checked_mul(self.num_nodes)
            .and_then(|body| body.checked_add(HEADER_LEN + TRAILER_LEN))
            .ok_or_else(|| Error::Snapshot(format!("{} nodes overflow the file size", self.num_nodes)))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.seed.to_le_bytes())?;
        writer.write_all(&self.num_nodes.to_le_bytes())?;
        writer.write_all(&self.bucket_factor.to_le_bytes())
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_LEN as usize];
        reader
            .read_exact(&mut buf)
            .map_err(|e| Error::Snapshot(format!("truncated header: {e}")))?;
        let word = |i: usize| {
            let mut w = [0u8; 8];
            w.copy_from_slice(&buf[i * 8..(i + 1) * 8]);
            w
        };
        let header = Self {
            seed: u64::from_le_bytes(word(0)),
            num_nodes: u64::from_le_bytes(word(1)),
            bucket_factor: f64::from_le_bytes(word(2)),
        };
        if header.num_nodes == 0 {
            return Err(Error::Snapshot("graph has no nodes".into()));
        }
        if !(header.bucket_factor.is_finite() && header.bucket_factor > 0.0) {
            return Err(Error::Snapshot(format!(
                "invalid bucket factor {}",
                header.bucket_factor
            )));
        }
        Ok(header)
    }
}

/// Write `header` and `supernodes` (in vertex order) to `path`.
pub fn write<P, I, S>(path: P, header: &SnapshotHeader, supernodes: I) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: Deref<Target = Supernode>,
{
    let mut writer = ChecksumWriter::new(BufWriter::new(File::create(path)?));
    header.write_to(&mut writer)?;
    let mut written = 0u64;
    for node in supernodes {
        node.write_binary(&mut writer)?;
        written += 1;
    }
    if written != header.num_nodes {
        return Err(Error::Snapshot(format!(
            "wrote {} supernodes for a graph of {} nodes",
            written, header.num_nodes
        )));
    }
    writer.finish()?;
    Ok(())
}

/// Read a snapshot, checking its length and checksum.
pub fn read<P: AsRef<Path>>(path: P) -> Result<(SnapshotHeader, Vec<Supernode>)> {
    let file = File::open(path)?;
    let actual_len = file.metadata()?.len();
    let mut reader = ChecksumReader::new(BufReader::new(file));

    let header = SnapshotHeader::read_from(&mut reader)?;
    let expected_len = header.file_len()?;
    if actual_len != expected_len {
        return Err(Error::Snapshot(format!(
            "file is {actual_len} bytes, expected {expected_len} for {} nodes",
            header.num_nodes
        )));
    }

    let shape = header.shape()?;
    let supernodes = (0..header.num_nodes)
        .map(|_| Supernode::read_from(header.num_nodes, header.seed, shape, &mut reader))
        .collect::<Result<Vec<_>>>()?;

    let (expected, actual) = reader.finish()?;
    if expected != actual {
        return Err(Error::Snapshot(format!(
            "checksum mismatch: stored {expected:016x}, computed {actual:016x}"
        )));
    }
    Ok((header, supernodes))
}
