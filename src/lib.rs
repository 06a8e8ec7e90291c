//! Mercator: parallel series approximation of ln(x)
//!
//! This crate approximates the natural logarithm of `x` in (0, 2] by summing
//! the Mercator series across a fixed set of worker threads. The series index
//! space is partitioned deterministically (strided by default), each worker
//! sums its share locally, and the partial sums are merged into one
//! mutex-guarded total exactly once per worker.

pub mod reducer;
pub mod report;
pub mod series;
pub mod shards;
pub mod shared;

// Re-export main types at crate root
pub use reducer::{approximate_ln, reduce, ParallelReducer, ReduceError};
pub use report::{ReductionReport, ReportSummary, WorkerReport};
pub use series::{term, SeriesError, SeriesInput};
pub use shards::{
    partition, Shard, ShardDescriptor, ShardError, ShardStrategy, WorkerAssignment,
};
pub use shared::{AccumulatorError, AccumulatorSnapshot, SharedAccumulator};
