//! Graph workers: pull batches, build deltas, apply them
//!
//! A [`WorkerPool`] is owned by one graph. Workers loop on the batch
//! source until stopped; `pause` parks all of them once the ready queue is
//! empty so the graph can read its supernodes without racing a delta.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use rayon::ThreadPool;
use sketchcc_common::{NodeId, Result};

use crate::ingest::{Batch, BatchSource};
use crate::pairing;
use crate::sketch::SketchShape;
use crate::supernode::Supernode;

/// Reusable memory for building one delta supernode.
///
/// Owned by a worker (or a caller of `Graph::batch_update`) so the hot path
/// rebuilds deltas in place without allocating.
pub struct DeltaScratch {
    delta: Supernode,
    indices: Vec<u64>,
}

impl DeltaScratch {
    pub fn new(num_nodes: u64, shape: SketchShape) -> Self {
        Self {
            delta: Supernode::new(num_nodes, 0, shape),
            indices: Vec::new(),
        }
    }

    /// Rebuild the delta for the edges `src -- d` for every `d` in `dests`.
    pub fn build(
        &mut self,
        seed: u64,
        src: NodeId,
        dests: &[NodeId],
        pool: Option<&ThreadPool>,
    ) -> Result<&Supernode> {
        self.indices.clear();
        for &dst in dests {
            self.indices.push(pairing::pair(src, dst)?);
        }
        Supernode::delta_build(&mut self.delta, seed, &self.indices, pool);
        Ok(&self.delta)
    }
}

#[derive(Default)]
struct PoolState {
    paused: bool,
    shutdown: bool,
    parked: usize,
}

#[derive(Default)]
struct Control {
    state: Mutex<PoolState>,
    changed: Condvar,
}

/// Fixed set of worker threads draining a [`BatchSource`].
pub struct WorkerPool {
    control: Arc<Control>,
    source: Arc<dyn BatchSource>,
    num_workers: usize,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `num_workers` threads. `make_handler(id)` builds the batch
    /// handler owned by worker `id`.
    pub fn start<F, H>(
        num_workers: usize,
        source: Arc<dyn BatchSource>,
        mut make_handler: F,
    ) -> Result<Self>
    where
        F: FnMut(usize) -> H,
        H: FnMut(Batch) + Send + 'static,
    {
        let control = Arc::new(Control::default());
        let mut handles = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let control = Arc::clone(&control);
            let source = Arc::clone(&source);
            let handler = make_handler(id);
            let handle = thread::Builder::new()
                .name(format!("sketchcc-worker-{id}"))
                .spawn(move || run_worker(id, &control, source.as_ref(), handler))?;
            handles.push(handle);
        }
        debug!("started {} graph workers", num_workers);
        Ok(Self {
            control,
            source,
            num_workers,
            handles,
        })
    }

    pub fn is_paused(&self) -> bool {
        self.control.state.lock().paused
    }

    /// Block until every worker has drained the ready queue and parked.
    pub fn pause(&self) {
        self.control.state.lock().paused = true;
        self.source.set_non_block(true);

        let mut state = self.control.state.lock();
        while state.parked < self.handles.len() {
            self.control.changed.wait(&mut state);
        }
        drop(state);
        self.source.set_non_block(false);
    }

    /// Release parked workers; returns once all of them are running again.
    pub fn resume(&self) {
        let mut state = self.control.state.lock();
        state.paused = false;
        self.control.changed.notify_all();
        while state.parked > 0 {
            self.control.changed.wait(&mut state);
        }
    }

    /// Drain the ready queue and join every worker.
    pub fn stop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        {
            let mut state = self.control.state.lock();
            state.shutdown = true;
            self.control.changed.notify_all();
        }
        self.source.set_non_block(true);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("graph worker panicked");
            }
        }
        debug!("stopped {} graph workers", self.num_workers);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<H: FnMut(Batch)>(id: usize, control: &Control, source: &dyn BatchSource, mut handler: H) {
    loop {
        let paused = {
            let state = control.state.lock();
            if state.shutdown {
                break;
            }
            state.paused
        };
        if !paused {
            // `None` only in non-blocking mode: go back and look at the flags
            if let Some(batch) = source.get_batch() {
                handler(batch);
            }
            continue;
        }

        // Apply every queued batch before parking; `pause` has switched the
        // source to non-blocking, so this ends once the queue is empty
        while let Some(batch) = source.get_batch() {
            handler(batch);
        }
        let mut state = control.state.lock();
        if !state.paused || state.shutdown {
            continue;
        }
        state.parked += 1;
        control.changed.notify_all();
        while state.paused && !state.shutdown {
            control.changed.wait(&mut state);
        }
        state.parked -= 1;
        control.changed.notify_all();
    }

    while let Some(batch) = source.get_batch() {
        handler(batch);
    }
    debug!("worker {id} exiting");
}
