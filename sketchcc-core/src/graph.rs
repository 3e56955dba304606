//! Streaming graph with sketch-based connected components
//!
//! Updates are split into two half-edges and pushed through the gutters;
//! workers turn full gutters into delta supernodes and XOR them into the
//! live supernodes. A components query flushes and pauses the workers,
//! then runs Borůvka over the supernodes, spending one sketch level per
//! vertex per round.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rayon::ThreadPool;
use sketchcc_common::{Edge, Error, GraphUpdate, NodeId, Result, UpdateKind};

use crate::config::GraphConfig;
use crate::dsu::DisjointSet;
use crate::ingest::{Batch, BatchSource, StandaloneGutters};
use crate::sketch::SketchShape;
use crate::snapshot::{self, SnapshotHeader};
use crate::supernode::{NodeSample, Supernode};
use crate::worker::{DeltaScratch, WorkerPool};

/// How to run a components query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CcOptions {
    /// Sample all representatives of a round in parallel and union by size
    pub parallel: bool,
    /// Restore the sketches afterwards and accept updates again
    pub keep_alive: bool,
}

#[derive(Debug, Default)]
struct GateState {
    locked: bool,
    /// Sketch levels were spent without a backup
    consumed: bool,
}

/// State shared with the worker threads.
struct Shared {
    num_nodes: u64,
    seed: u64,
    shape: SketchShape,
    supernodes: Vec<Mutex<Supernode>>,
    delta_pool: Option<ThreadPool>,
    num_updates: AtomicU64,
    failed_batches: AtomicU64,
}

impl Shared {
    fn apply_batch(&self, src: NodeId, dests: &[NodeId], scratch: &mut DeltaScratch) -> Result<()> {
        let delta = scratch.build(self.seed, src, dests, self.delta_pool.as_ref())?;
        self.supernodes[src as usize].lock().apply_delta(delta)?;
        self.num_updates.fetch_add(dests.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Error for batches the workers dropped, if any
    fn ingest_error(&self) -> Option<Error> {
        match self.failed_batches.load(Ordering::Acquire) {
            0 => None,
            batches => Some(Error::IngestFailed { batches }),
        }
    }

    fn sample(&self, vertex: NodeId) -> Result<NodeSample> {
        self.supernodes[vertex as usize].lock().sample().map_err(|e| {
            warn!("sampling vertex {vertex} failed: {e}");
            e
        })
    }

    fn merge_into(&self, survivor: NodeId, absorbed: NodeId) -> Result<()> {
        let other = self.supernodes[absorbed as usize].lock();
        self.supernodes[survivor as usize].lock().merge(&other)
    }

    fn backup(&self) -> Vec<Supernode> {
        self.supernodes.iter().map(|node| node.lock().clone()).collect()
    }

    fn restore(&self, backup: Vec<Supernode>) {
        for (node, saved) in self.supernodes.iter().zip(backup) {
            *node.lock() = saved;
        }
    }
}

/// A dynamic graph summarised by one supernode per vertex.
pub struct Graph {
    shared: Arc<Shared>,
    source: Arc<StandaloneGutters>,
    workers: WorkerPool,
    gate: RwLock<GateState>,
    config: GraphConfig,
}

impl Graph {
    /// Empty graph on `num_nodes` vertices.
    pub fn new(num_nodes: u64, config: GraphConfig) -> Result<Self> {
        config.validate()?;
        if num_nodes == 0 {
            return Err(Error::InvalidConfig("a graph needs at least one node".into()));
        }
        let seed = config.resolve_seed();
        let shape = SketchShape::for_graph(num_nodes, config.bucket_factor)?;
        let supernodes = (0..num_nodes)
            .map(|_| Supernode::new(num_nodes, seed, shape))
            .collect();
        info!(
            "created graph: {} nodes, seed {:#x}, {} levels of {}x{} buckets",
            num_nodes,
            seed,
            Supernode::level_count(num_nodes),
            shape.num_buckets(),
            shape.num_guesses()
        );
        Self::from_parts(num_nodes, seed, shape, supernodes, config)
    }

    /// Graph restored from a file written by [`Graph::write_binary`].
    ///
    /// The seed and bucket factor come from the file; `config` supplies the
    /// ingestion settings.
    pub fn restore(path: impl AsRef<Path>, config: GraphConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();
        let (header, supernodes) = snapshot::read(path)?;
        if let Some(seed) = config.seed.filter(|&s| s != header.seed) {
            warn!("ignoring configured seed {seed:#x}, snapshot uses {:#x}", header.seed);
        }
        if header.bucket_factor != config.bucket_factor {
            debug!(
                "snapshot bucket factor {} overrides configured {}",
                header.bucket_factor, config.bucket_factor
            );
        }
        let shape = header.shape()?;
        info!(
            "restored graph of {} nodes from {}",
            header.num_nodes,
            path.display()
        );
        let config = GraphConfig {
            bucket_factor: header.bucket_factor,
            seed: Some(header.seed),
            ..config
        };
        Self::from_parts(header.num_nodes, header.seed, shape, supernodes, config)
    }

    fn from_parts(
        num_nodes: u64,
        seed: u64,
        shape: SketchShape,
        supernodes: Vec<Supernode>,
        config: GraphConfig,
    ) -> Result<Self> {
        let delta_pool = if config.group_size > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.group_size)
                .thread_name(|i| format!("sketchcc-delta-{i}"))
                .build()
                .map_err(|e| Error::InvalidConfig(format!("cannot build delta pool: {e}")))?;
            Some(pool)
        } else {
            None
        };

        let shared = Arc::new(Shared {
            num_nodes,
            seed,
            shape,
            supernodes: supernodes.into_iter().map(Mutex::new).collect(),
            delta_pool,
            num_updates: AtomicU64::new(0),
            failed_batches: AtomicU64::new(0),
        });
        let source = Arc::new(StandaloneGutters::new(
            num_nodes,
            config.gutter_size_for(num_nodes),
            config.effective_queue_depth(),
        ));
        let workers = WorkerPool::start(config.num_workers, source.clone(), |_| {
            let shared = Arc::clone(&shared);
            let mut scratch = DeltaScratch::new(num_nodes, shape);
            move |batch: Batch| {
                if let Err(e) = shared.apply_batch(batch.node, &batch.dests, &mut scratch) {
                    error!("dropping batch for vertex {}: {}", batch.node, e);
                    shared.failed_batches.fetch_add(1, Ordering::Release);
                }
            }
        })?;

        Ok(Self {
            shared,
            source,
            workers,
            gate: RwLock::new(GateState::default()),
            config,
        })
    }

    pub fn num_nodes(&self) -> u64 {
        self.shared.num_nodes
    }

    pub fn seed(&self) -> u64 {
        self.shared.seed
    }

    pub fn shape(&self) -> &SketchShape {
        &self.shared.shape
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Half-edge updates applied to supernodes so far
    pub fn num_updates(&self) -> u64 {
        self.shared.num_updates.load(Ordering::Relaxed)
    }

    pub fn is_locked(&self) -> bool {
        self.gate.read().locked
    }

    /// True once a query without `keep_alive` has spent the sketches
    pub fn is_consumed(&self) -> bool {
        self.gate.read().consumed
    }

    /// Scratch space sized for this graph, for [`Graph::batch_update`].
    pub fn delta_scratch(&self) -> DeltaScratch {
        DeltaScratch::new(self.shared.num_nodes, self.shared.shape)
    }

    /// Insert or delete one edge.
    ///
    /// Both are the same toggle of the sketches; `kind` only matters to the
    /// caller's bookkeeping.
    pub fn update(&self, update: GraphUpdate) -> Result<()> {
        let gate = self.gate.read();
        if gate.locked {
            return Err(Error::UpdateLocked);
        }
        let Edge { src, dst } = update.edge;
        self.check_edge(src, dst)?;
        self.source.insert(src, dst);
        self.source.insert(dst, src);
        Ok(())
    }

    pub fn update_edge(&self, u: NodeId, v: NodeId, kind: UpdateKind) -> Result<()> {
        self.update(GraphUpdate {
            edge: Edge::new(u, v),
            kind,
        })
    }

    /// Apply the edges `src -- d` for all `dests` to `src`'s supernode only.
    ///
    /// Bypasses the gutters: the delta is built in `scratch` and merged
    /// under the vertex lock. Callers apply the mirrored half-edges
    /// themselves.
    pub fn batch_update(&self, src: NodeId, dests: &[NodeId], scratch: &mut DeltaScratch) -> Result<()> {
        let gate = self.gate.read();
        if gate.locked {
            return Err(Error::UpdateLocked);
        }
        self.check_node(src)?;
        for &dst in dests {
            self.check_edge(src, dst)?;
        }
        self.shared.apply_batch(src, dests, scratch)
    }

    /// Components of the graph. Spends the sketches: the graph stays locked.
    pub fn connected_components(&self) -> Result<Vec<Vec<NodeId>>> {
        self.connected_components_with(CcOptions::default())
    }

    /// [`Graph::connected_components`] with parallel sampling and union by size.
    pub fn parallel_connected_components(&self) -> Result<Vec<Vec<NodeId>>> {
        self.connected_components_with(CcOptions {
            parallel: true,
            keep_alive: false,
        })
    }

    /// Components as sorted groups ordered by their smallest member.
    ///
    /// Fails with [`Error::UpdateLocked`] if another query holds the graph or
    /// an earlier query spent the sketches.
    pub fn connected_components_with(&self, options: CcOptions) -> Result<Vec<Vec<NodeId>>> {
        {
            let mut gate = self.gate.write();
            if gate.locked {
                return Err(Error::UpdateLocked);
            }
            gate.locked = true;
        }
        let start = Instant::now();
        self.source.force_flush();
        self.workers.pause();
        debug!("flushed {} half-edge updates", self.num_updates());

        let backup = options.keep_alive.then(|| self.shared.backup());
        let result = match self.shared.ingest_error() {
            Some(e) => Err(e),
            None if options.parallel => self.boruvka_parallel(),
            None => self.boruvka(),
        };

        match backup {
            Some(saved) => {
                self.shared.restore(saved);
                self.workers.resume();
                self.gate.write().locked = false;
            }
            None => self.gate.write().consumed = true,
        }

        let (groups, rounds) = result?;
        info!(
            "found {} components in {} rounds ({:.2?})",
            groups.len(),
            rounds,
            start.elapsed()
        );
        Ok(groups)
    }

    /// Write the graph to `path`. Refused once the sketches are spent.
    pub fn write_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        // Held throughout so no update lands between the flush and the write
        let gate = self.gate.write();
        if gate.locked {
            return Err(Error::UpdateLocked);
        }
        self.source.force_flush();
        self.workers.pause();

        if let Some(e) = self.shared.ingest_error() {
            self.workers.resume();
            return Err(e);
        }

        let header = SnapshotHeader {
            seed: self.shared.seed,
            num_nodes: self.shared.num_nodes,
            bucket_factor: self.shared.shape.factor(),
        };
        let result = snapshot::write(path, &header, self.shared.supernodes.iter().map(|n| n.lock()));

        self.workers.resume();
        drop(gate);
        if result.is_ok() {
            info!("wrote snapshot of {} nodes to {}", header.num_nodes, path.display());
        }
        result
    }

    /// Sequential Borůvka: the sampling root absorbs the other endpoint's root.
    fn boruvka(&self) -> Result<(Vec<Vec<NodeId>>, usize)> {
        let n = self.shared.num_nodes;
        let mut dsu = DisjointSet::new(n);
        let mut finished = vec![false; n as usize];
        let mut reps: Vec<NodeId> = (0..n).collect();
        let mut rounds = 0;

        while !reps.is_empty() {
            rounds += 1;
            let mut merges = 0;
            for &i in &reps {
                if !dsu.is_root(i) {
                    continue;
                }
                let edge = match self.shared.sample(i)? {
                    NodeSample::Isolated => {
                        finished[i as usize] = true;
                        continue;
                    }
                    NodeSample::Failed => return Err(self.sample_failed(i)),
                    NodeSample::Edge(edge) => edge,
                };
                let other = self.other_root(&mut dsu, i, edge)?;
                dsu.link(other, i);
                self.shared.merge_into(i, other)?;
                merges += 1;
            }
            reps.retain(|&r| dsu.is_root(r) && !finished[r as usize]);
            debug!("round {rounds}: {merges} merges, {} active", reps.len());
            if merges == 0 {
                break;
            }
        }
        Ok((dsu.groups(), rounds))
    }

    /// Parallel Borůvka: every representative samples at once, then the
    /// proposed unions are resolved with union by size.
    fn boruvka_parallel(&self) -> Result<(Vec<Vec<NodeId>>, usize)> {
        let n = self.shared.num_nodes;
        let mut dsu = DisjointSet::new(n);
        let mut reps: Vec<NodeId> = (0..n).collect();
        let mut rounds = 0;

        while !reps.is_empty() {
            rounds += 1;
            let samples: Vec<(NodeId, Result<NodeSample>)> = reps
                .par_iter()
                .map(|&r| (r, self.shared.sample(r)))
                .collect();

            // Check every edge against the roots from before this round's unions
            let mut proposals = Vec::with_capacity(samples.len());
            let mut finished = Vec::new();
            for (r, sample) in samples {
                match sample? {
                    NodeSample::Isolated => finished.push(r),
                    NodeSample::Failed => return Err(self.sample_failed(r)),
                    NodeSample::Edge(edge) => {
                        self.other_root(&mut dsu, r, edge)?;
                        proposals.push(edge);
                    }
                }
            }

            let mut absorbed = Vec::new();
            for edge in proposals {
                let (a, b) = (dsu.find(edge.src), dsu.find(edge.dst));
                if a == b {
                    continue;
                }
                let (survivor, gone) = dsu.union_by_size(a, b);
                self.shared.merge_into(survivor, gone)?;
                absorbed.push(gone);
            }

            debug!(
                "round {rounds}: {} merges, {} finished",
                absorbed.len(),
                finished.len()
            );
            if absorbed.is_empty() {
                break;
            }
            absorbed.extend(finished);
            absorbed.sort_unstable();
            reps = sorted_difference(&reps, &absorbed);
        }
        Ok((dsu.groups(), rounds))
    }

    /// Root of the endpoint of `edge` outside `root`'s component.
    fn other_root(&self, dsu: &mut DisjointSet, root: NodeId, edge: Edge) -> Result<NodeId> {
        let n = self.shared.num_nodes;
        if edge.dst >= n {
            return Err(self.invalid_sample(root, edge));
        }
        let (a, b) = (dsu.find(edge.src), dsu.find(edge.dst));
        match (a == root, b == root) {
            (true, false) => Ok(b),
            (false, true) => Ok(a),
            _ => Err(self.invalid_sample(root, edge)),
        }
    }

    fn invalid_sample(&self, vertex: NodeId, edge: Edge) -> Error {
        warn!("vertex {vertex} sampled {edge}, which is not in its cut");
        Error::InvalidSample { vertex, edge }
    }

    fn sample_failed(&self, vertex: NodeId) -> Error {
        warn!("no good bucket when sampling vertex {vertex}");
        Error::SampleFailed { vertex }
    }

    fn check_node(&self, node: NodeId) -> Result<()> {
        if node >= self.shared.num_nodes {
            return Err(Error::NodeOutOfRange {
                node,
                num_nodes: self.shared.num_nodes,
            });
        }
        Ok(())
    }

    fn check_edge(&self, u: NodeId, v: NodeId) -> Result<()> {
        self.check_node(u)?;
        self.check_node(v)?;
        if u == v {
            return Err(Error::SelfLoop { node: u });
        }
        Ok(())
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.source.force_flush();
        self.workers.stop();
    }
}

/// Elements of sorted `from` not in sorted `remove`.
fn sorted_difference(from: &[NodeId], remove: &[NodeId]) -> Vec<NodeId> {
    let mut out = Vec::with_capacity(from.len().saturating_sub(remove.len()));
    let mut j = 0;
    for &x in from {
        while j < remove.len() && remove[j] < x {
            j += 1;
        }
        if j < remove.len() && remove[j] == x {
            continue;
        }
        out.push(x);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GraphConfig {
        GraphConfig {
            num_workers: 2,
            bucket_factor: 4.0,
            gutter_size: Some(2),
            seed: Some(0x5eed),
            ..GraphConfig::default()
        }
    }

    #[test]
    fn sorted_difference_removes_members() {
        assert_eq!(sorted_difference(&[0, 2, 4, 6, 8], &[2, 3, 8]), vec![0, 4, 6]);
        assert_eq!(sorted_difference(&[1, 2], &[]), vec![1, 2]);
    }

    #[test]
    fn rejects_bad_edges() {
        let graph = Graph::new(4, config()).unwrap();
        assert!(matches!(
            graph.update_edge(1, 1, UpdateKind::Insert),
            Err(Error::SelfLoop { node: 1 })
        ));
        assert!(matches!(
            graph.update_edge(0, 4, UpdateKind::Insert),
            Err(Error::NodeOutOfRange { node: 4, num_nodes: 4 })
        ));
    }

    #[test]
    fn zero_nodes_is_invalid() {
        assert!(matches!(Graph::new(0, config()), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn single_node_graph() {
        let graph = Graph::new(1, config()).unwrap();
        assert_eq!(graph.connected_components().unwrap(), vec![vec![0]]);
    }

    #[test]
    fn batch_update_applies_directly() {
        let graph = Graph::new(4, config()).unwrap();
        let mut scratch = graph.delta_scratch();
        graph.batch_update(0, &[1, 2], &mut scratch).unwrap();
        graph.batch_update(1, &[0], &mut scratch).unwrap();
        graph.batch_update(2, &[0], &mut scratch).unwrap();
        assert_eq!(graph.num_updates(), 4);
        assert_eq!(
            graph.connected_components().unwrap(),
            vec![vec![0, 1, 2], vec![3]]
        );
    }

    #[test]
    fn dropped_batches_fail_the_next_query() {
        let graph = Graph::new(4, config()).unwrap();
        graph.update_edge(0, 1, UpdateKind::Insert).unwrap();
        // Bypasses validation; the worker cannot pair a self loop
        graph.source.insert(2, 2);

        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            graph.write_binary(file.path()),
            Err(Error::IngestFailed { batches: 1 })
        ));
        assert!(!graph.is_locked());

        let keep = CcOptions {
            parallel: false,
            keep_alive: true,
        };
        assert!(matches!(
            graph.connected_components_with(keep),
            Err(Error::IngestFailed { batches: 1 })
        ));
        assert!(!graph.is_locked());
    }

    #[test]
    fn other_root_rejects_internal_edge() {
        let graph = Graph::new(4, config()).unwrap();
        let mut dsu = DisjointSet::new(4);
        dsu.link(1, 0);
        assert_eq!(graph.other_root(&mut dsu, 0, Edge::new(1, 3)).unwrap(), 3);
        assert!(matches!(
            graph.other_root(&mut dsu, 0, Edge::new(0, 1)),
            Err(Error::InvalidSample { vertex: 0, .. })
        ));
        assert!(matches!(
            graph.other_root(&mut dsu, 0, Edge::new(0, 9)),
            Err(Error::InvalidSample { .. })
        ));
    }
}
