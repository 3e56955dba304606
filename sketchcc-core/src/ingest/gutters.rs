//! In-process gutters: a buffer per vertex feeding a bounded ready queue

use std::collections::VecDeque;

use log::trace;
use parking_lot::{Condvar, Mutex};
use sketchcc_common::NodeId;

use super::{Batch, BatchSource};

struct ReadyQueue {
    batches: VecDeque<Batch>,
    non_block: bool,
}

/// [`BatchSource`] that keeps every vertex's pending updates in memory.
///
/// A gutter that reaches `gutter_size` updates is moved whole onto the
/// ready queue. The queue holds at most `queue_depth` batches; producers
/// block on a full queue until a worker takes one.
pub struct StandaloneGutters {
    gutters: Vec<Mutex<Vec<NodeId>>>,
    gutter_size: usize,
    queue_depth: usize,
    ready: Mutex<ReadyQueue>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl StandaloneGutters {
    pub fn new(num_nodes: u64, gutter_size: usize, queue_depth: usize) -> Self {
        let gutter_size = gutter_size.max(1);
        Self {
            gutters: (0..num_nodes)
                .map(|_| Mutex::new(Vec::with_capacity(gutter_size)))
                .collect(),
            gutter_size,
            queue_depth: queue_depth.max(1),
            ready: Mutex::new(ReadyQueue {
                batches: VecDeque::new(),
                non_block: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Batches currently waiting for a worker
    pub fn ready_len(&self) -> usize {
        self.ready.lock().batches.len()
    }

    /// Updates buffered in gutters and not yet released
    pub fn pending_updates(&self) -> usize {
        self.gutters.iter().map(|g| g.lock().len()).sum()
    }

    fn push_ready(&self, batch: Batch) {
        let mut ready = self.ready.lock();
        while ready.batches.len() >= self.queue_depth && !ready.non_block {
            self.not_full.wait(&mut ready);
        }
        trace!("batch of {} updates ready for vertex {}", batch.dests.len(), batch.node);
        ready.batches.push_back(batch);
        self.not_empty.notify_one();
    }
}

impl BatchSource for StandaloneGutters {
    fn insert(&self, src: NodeId, dst: NodeId) {
        let full = {
            let mut gutter = self.gutters[src as usize].lock();
            gutter.push(dst);
            if gutter.len() >= self.gutter_size {
                Some(std::mem::replace(
                    &mut *gutter,
                    Vec::with_capacity(self.gutter_size),
                ))
            } else {
                None
            }
        };
        if let Some(dests) = full {
            self.push_ready(Batch { node: src, dests });
        }
    }

    fn force_flush(&self) {
        for (node, gutter) in self.gutters.iter().enumerate() {
            let dests = {
                let mut gutter = gutter.lock();
                if gutter.is_empty() {
                    continue;
                }
                std::mem::take(&mut *gutter)
            };
            self.push_ready(Batch {
                node: node as NodeId,
                dests,
            });
        }
    }

    fn get_batch(&self) -> Option<Batch> {
        let mut ready = self.ready.lock();
        loop {
            if let Some(batch) = ready.batches.pop_front() {
                self.not_full.notify_one();
                return Some(batch);
            }
            if ready.non_block {
                return None;
            }
            self.not_empty.wait(&mut ready);
        }
    }

    fn set_non_block(&self, non_block: bool) {
        let mut ready = self.ready.lock();
        ready.non_block = non_block;
        if non_block {
            self.not_empty.notify_all();
            self.not_full.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn full_gutter_becomes_a_batch() {
        let gutters = StandaloneGutters::new(4, 3, 8);
        gutters.insert(1, 0);
        gutters.insert(1, 2);
        assert_eq!(gutters.ready_len(), 0);
        gutters.insert(1, 3);
        assert_eq!(gutters.ready_len(), 1);
        assert_eq!(
            gutters.get_batch(),
            Some(Batch {
                node: 1,
                dests: vec![0, 2, 3]
            })
        );
        assert_eq!(gutters.pending_updates(), 0);
    }

    #[test]
    fn force_flush_releases_partial_gutters_in_vertex_order() {
        let gutters = StandaloneGutters::new(4, 100, 8);
        gutters.insert(2, 0);
        gutters.insert(0, 3);
        gutters.insert(0, 1);
        gutters.force_flush();
        gutters.set_non_block(true);

        let first = gutters.get_batch().unwrap();
        assert_eq!((first.node, first.dests), (0, vec![3, 1]));
        let second = gutters.get_batch().unwrap();
        assert_eq!((second.node, second.dests), (2, vec![0]));
        assert_eq!(gutters.get_batch(), None);
    }

    #[test]
    fn non_block_wakes_waiting_consumer() {
        let gutters = Arc::new(StandaloneGutters::new(2, 1, 1));
        let consumer = {
            let gutters = Arc::clone(&gutters);
            thread::spawn(move || gutters.get_batch())
        };
        thread::sleep(std::time::Duration::from_millis(20));
        gutters.set_non_block(true);
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn bounded_queue_applies_back_pressure() {
        let gutters = Arc::new(StandaloneGutters::new(2, 1, 1));
        let producer = {
            let gutters = Arc::clone(&gutters);
            thread::spawn(move || {
                for dst in 0..50 {
                    gutters.insert(0, dst);
                }
            })
        };
        let mut received = Vec::new();
        while received.len() < 50 {
            let batch = gutters.get_batch().unwrap();
            assert!(gutters.ready_len() <= 1);
            received.extend(batch.dests);
        }
        producer.join().unwrap();
        assert_eq!(received, (0..50).collect::<Vec<_>>());
    }
}
