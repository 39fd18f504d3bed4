// Distributed Training — coordinator abstraction and gradient reduction
//
// COMPONENTS:
//
//   Coordinator           — What the training loop needs from a multi-worker
//                           launcher: rank/size queries, a broadcast, and an
//                           in-place all-reduce average.
//
//   ProcessGroup          — Single-process Coordinator. Broadcast and average
//                           are identities; lets the same code path run with
//                           and without a launcher.
//
//   reduce_gradients()    — Merges per-replica gradient buffers (the core
//                           AllReduce primitive). Usable standalone.
//
//   DistributedOptimizer  — Wraps `Sgd`; averages gradients across workers
//                           through the Coordinator before each step.

use std::sync::Arc;

use dctflow_data::{Error, Result};

use crate::optim::Sgd;

// AllReduce strategy

/// Strategy for combining gradients from multiple replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllReduceOp {
    /// Sum all gradients (caller divides by N if needed).
    Sum,
    /// Average gradients across replicas (most common).
    Average,
}

/// Merge one gradient buffer per replica into a single buffer.
///
/// All replicas must supply buffers of the same length.
pub fn reduce_gradients(replicas: &[Vec<f32>], strategy: AllReduceOp) -> Result<Vec<f32>> {
    let n = replicas.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let len = replicas[0].len();
    for (i, r) in replicas.iter().enumerate() {
        if r.len() != len {
            return Err(Error::msg(format!(
                "replica {i} gradient has {} elements, expected {len}",
                r.len()
            )));
        }
    }

    let mut merged = replicas[0].clone();
    for r in &replicas[1..] {
        for (m, &g) in merged.iter_mut().zip(r) {
            *m += g;
        }
    }
    if strategy == AllReduceOp::Average && n > 1 {
        let scale = 1.0 / n as f32;
        for m in &mut merged {
            *m *= scale;
        }
    }
    Ok(merged)
}

// Coordinator

/// The contract a multi-worker launcher fulfils.
///
/// Implementations own the transport; the training loop only ever sees these
/// four operations.
pub trait Coordinator: Send + Sync {
    /// This worker's id, in `0..size()`.
    fn rank(&self) -> usize;

    /// Total number of workers.
    fn size(&self) -> usize;

    /// Overwrite `values` on every worker with the root's copy.
    fn broadcast_from(&self, root: usize, values: &mut [f32]) -> Result<()>;

    /// Replace `values` with the element-wise mean across all workers.
    fn average(&self, values: &mut [f32]) -> Result<()>;
}

/// Single-process process group.
///
/// `rank` and `size` are fixed at construction; broadcast and average are
/// identities since there are no peers. A `size` above one models the
/// degenerate transport used in tests of the scaling arithmetic.
#[derive(Debug, Clone)]
pub struct ProcessGroup {
    rank: usize,
    size: usize,
}

impl ProcessGroup {
    pub fn new(rank: usize, size: usize) -> Result<Self> {
        if size == 0 || rank >= size {
            return Err(Error::msg(format!(
                "invalid process group: rank {rank} of {size}"
            )));
        }
        Ok(Self { rank, size })
    }

    /// The trivial group: one worker, rank zero.
    pub fn solo() -> Self {
        Self { rank: 0, size: 1 }
    }
}

impl Coordinator for ProcessGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast_from(&self, _root: usize, _values: &mut [f32]) -> Result<()> {
        Ok(())
    }

    fn average(&self, _values: &mut [f32]) -> Result<()> {
        Ok(())
    }
}

// DistributedOptimizer

/// Wraps `Sgd` so every step first averages gradients across workers.
pub struct DistributedOptimizer {
    inner: Sgd,
    coordinator: Arc<dyn Coordinator>,
    strategy: AllReduceOp,
}

impl DistributedOptimizer {
    pub fn new(inner: Sgd, coordinator: Arc<dyn Coordinator>) -> Self {
        Self {
            inner,
            coordinator,
            strategy: AllReduceOp::Average,
        }
    }

    pub fn with_strategy(mut self, strategy: AllReduceOp) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn inner(&self) -> &Sgd {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Sgd {
        &mut self.inner
    }

    pub fn lr(&self) -> f64 {
        self.inner.lr()
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.inner.set_lr(lr);
    }

    /// All-reduce the local gradients, then apply the wrapped update.
    pub fn step(&mut self, params: &mut [Vec<f32>], grads: &[Vec<f32>]) -> Result<()> {
        let mut reduced = grads.to_vec();
        for buffer in &mut reduced {
            self.coordinator.average(buffer)?;
            if self.strategy == AllReduceOp::Sum {
                let size = self.coordinator.size() as f32;
                for g in buffer.iter_mut() {
                    *g *= size;
                }
            }
        }
        self.inner.step(params, &reduced)
    }
}
