//! Parallel reduction of the Mercator series
//!
//! [`ParallelReducer`] spawns one OS thread per worker inside a
//! [`std::thread::scope`]. Each worker owns a [`WorkerAssignment`] moved into
//! its closure, sums its shard of the series without any locking, then merges
//! the result into a [`SharedAccumulator`] exactly once.
//!
//! The scope joins every spawned worker before the accumulator can be
//! consumed, so a total is never observed while a merge is still pending.
//!
//! # Failure handling
//!
//! - A worker that cannot be spawned fails the whole call. Workers spawned
//!   before it are still joined first.
//! - A poisoned accumulator lock fails the whole call.
//! - A worker that panics is reported by index.
//!
//! Workers never print; their outcomes are returned and inspected after
//! join-all.

use std::io;
use std::thread;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::report::{ReductionReport, WorkerReport};
use crate::series::{term, SeriesError, SeriesInput};
use crate::shards::{partition, ShardError, ShardStrategy, WorkerAssignment};
use crate::shared::{AccumulatorError, SharedAccumulator};

/// Errors that can occur during a reduction
#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] SeriesError),

    #[error("cannot partition series: {0}")]
    Partition(#[from] ShardError),

    #[error("failed to spawn worker {worker}")]
    SpawnFailure {
        worker: usize,
        #[source]
        source: io::Error,
    },

    #[error("lock failure: {0}")]
    LockFailure(#[from] AccumulatorError),

    #[error("worker {worker} panicked before merging its partial sum")]
    WorkerPanicked { worker: usize },
}

/// Configuration for a parallel reduction
#[derive(Debug, Clone, Default)]
pub struct ParallelReducer {
    strategy: ShardStrategy,
    stack_size: Option<usize>,
}

impl ParallelReducer {
    /// Reducer with strided partitioning and the platform's default stack size
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the partition strategy
    pub fn with_strategy(mut self, strategy: ShardStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the stack size of each worker thread in bytes
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Partition strategy used by this reducer
    pub fn strategy(&self) -> ShardStrategy {
        self.strategy
    }

    /// Sum `worker_count * iterations_per_worker` series terms in parallel
    pub fn reduce(&self, input: &SeriesInput) -> Result<f64, ReduceError> {
        self.reduce_with_report(input).map(|report| report.total())
    }

    /// Like [`reduce`](Self::reduce), also returning what each worker did
    #[instrument(
        skip_all,
        fields(
            x = input.x(),
            workers = input.worker_count(),
            iterations = input.iterations_per_worker(),
            strategy = %self.strategy,
        )
    )]
    pub fn reduce_with_report(&self, input: &SeriesInput) -> Result<ReductionReport, ReduceError> {
        let assignments = partition(
            input.worker_count(),
            input.iterations_per_worker(),
            self.strategy,
        )?
        .into_assignments();

        let x = input.x();
        let accumulator = SharedAccumulator::new();

        let (spawn_error, outcomes) = thread::scope(|s| {
            // Grows with the workers actually spawned
            let mut handles = Vec::new();
            let mut spawn_error = None;

            for assignment in assignments {
                let worker = assignment.worker_index;
                let accumulator = &accumulator;

                let mut builder = thread::Builder::new().name(format!("mercator-worker-{}", worker));
                if let Some(bytes) = self.stack_size {
                    builder = builder.stack_size(bytes);
                }

                match builder.spawn_scoped(s, move || run_worker(x, assignment, accumulator)) {
                    Ok(handle) => handles.push((worker, handle)),
                    Err(source) => {
                        spawn_error = Some(ReduceError::SpawnFailure { worker, source });
                        break;
                    }
                }
            }

            // Join everything that started, even after a spawn failure
            let outcomes: Vec<Result<WorkerReport, ReduceError>> = handles
                .into_iter()
                .map(|(worker, handle)| match handle.join() {
                    Ok(outcome) => outcome.map_err(ReduceError::from),
                    Err(_) => Err(ReduceError::WorkerPanicked { worker }),
                })
                .collect();

            (spawn_error, outcomes)
        });

        if let Some(err) = spawn_error {
            return Err(err);
        }
        let workers = outcomes.into_iter().collect::<Result<Vec<_>, _>>()?;

        let snapshot = accumulator.finish()?;
        debug!(
            total = snapshot.total,
            merges = snapshot.merge_count,
            "all workers joined"
        );

        Ok(ReductionReport::new(
            x,
            self.strategy,
            workers,
            snapshot.total,
            snapshot.merge_count,
        ))
    }
}

/// Sum one shard locally, then merge it under the lock
fn run_worker(
    x: f64,
    assignment: WorkerAssignment,
    accumulator: &SharedAccumulator,
) -> Result<WorkerReport, AccumulatorError> {
    let WorkerAssignment {
        worker_index,
        shard,
    } = assignment;

    let partial_sum: f64 = shard.indices().map(|k| term(x, k)).sum();
    let merge_order = accumulator.merge(worker_index, partial_sum)?;

    debug!(
        worker = worker_index,
        terms = shard.len(),
        partial_sum,
        merge_order,
        "merged partial sum"
    );

    Ok(WorkerReport {
        worker_index,
        terms: shard.len(),
        first_index: shard.first(),
        partial_sum,
        merge_order,
    })
}

/// Reduce with the default (strided) reducer
pub fn reduce(input: &SeriesInput) -> Result<f64, ReduceError> {
    ParallelReducer::new().reduce(input)
}

/// Validate the arguments, then reduce with the default reducer
///
/// Invalid input is rejected before any worker is spawned.
///
/// ```
/// let ln2 = mercator::approximate_ln(2.0, 4, 1000).unwrap();
/// assert!((ln2 - std::f64::consts::LN_2).abs() < 1e-3);
///
/// assert!(mercator::approximate_ln(2.5, 4, 1000).is_err());
/// ```
pub fn approximate_ln(
    x: f64,
    worker_count: usize,
    iterations_per_worker: usize,
) -> Result<f64, ReduceError> {
    let input = SeriesInput::new(x, worker_count, iterations_per_worker)?;
    reduce(&input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::sequential_sum;

    // Merge order varies between runs, so totals agree only up to rounding
    const TOLERANCE: f64 = 1e-9;

    fn input(x: f64, workers: usize, iterations: usize) -> SeriesInput {
        SeriesInput::new(x, workers, iterations).unwrap()
    }

    #[test]
    fn test_zero_iterations_is_zero() {
        for workers in [1, 2, 5, 32] {
            assert_eq!(reduce(&input(1.7, workers, 0)).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_x_one_is_zero() {
        for (workers, iterations) in [(1, 1), (3, 100), (8, 1000)] {
            assert_eq!(reduce(&input(1.0, workers, iterations)).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_single_worker_matches_sequential_sum() {
        for x in [0.25, 0.5, 1.5, 2.0] {
            let total = reduce(&input(x, 1, 500)).unwrap();
            assert_eq!(total, sequential_sum(x, 500));
        }
    }

    #[test]
    fn test_many_workers_match_sequential_sum() {
        for workers in [2, 3, 4, 7, 16] {
            let total = reduce(&input(1.8, workers, 250)).unwrap();
            let expected = sequential_sum(1.8, workers * 250);
            assert!(
                (total - expected).abs() < TOLERANCE,
                "workers={}: {} vs {}",
                workers,
                total,
                expected
            );
        }
    }

    #[test]
    fn test_strided_and_contiguous_agree() {
        let series = input(2.0, 6, 400);
        let strided = ParallelReducer::new().reduce(&series).unwrap();
        let contiguous = ParallelReducer::new()
            .with_strategy(ShardStrategy::Contiguous)
            .reduce(&series)
            .unwrap();
        assert!((strided - contiguous).abs() < TOLERANCE);
    }

    #[test]
    fn test_repeated_runs_are_deterministic() {
        let series = input(0.3, 8, 300);
        let first = reduce(&series).unwrap();
        for _ in 0..20 {
            assert!((reduce(&series).unwrap() - first).abs() < TOLERANCE);
        }
    }

    #[test]
    fn test_partial_sums_are_per_shard() {
        let series = input(1.9, 4, 10);
        let report = ParallelReducer::new().reduce_with_report(&series).unwrap();

        for row in report.workers() {
            let expected: f64 = (0..10).map(|i| term(1.9, row.worker_index + 1 + i * 4)).sum();
            assert_eq!(row.partial_sum, expected);
            assert_eq!(row.terms, 10);
            assert_eq!(row.first_index, Some(row.worker_index + 1));
        }
    }

    #[test]
    fn test_report_merge_orders_form_permutation() {
        let workers = 12;
        let report = ParallelReducer::new()
            .reduce_with_report(&input(1.2, workers, 1000))
            .unwrap();

        let mut orders: Vec<_> = report.workers().iter().map(|w| w.merge_order).collect();
        orders.sort_unstable();
        assert_eq!(orders, (0..workers).collect::<Vec<_>>());

        let summary = report.summary();
        assert_eq!(summary.merge_count, workers);
        assert_eq!(summary.worker_count, workers);
        assert_eq!(summary.total_terms, workers * 1000);

        let merged: f64 = report.workers().iter().map(|w| w.partial_sum).sum();
        assert!((merged - report.total()).abs() < TOLERANCE);
    }

    #[test]
    fn test_contiguous_report_first_indices() {
        let report = ParallelReducer::new()
            .with_strategy(ShardStrategy::Contiguous)
            .reduce_with_report(&input(1.5, 3, 5))
            .unwrap();
        let firsts: Vec<_> = report.workers().iter().map(|w| w.first_index).collect();
        assert_eq!(firsts, vec![Some(1), Some(6), Some(11)]);
        assert_eq!(report.strategy(), ShardStrategy::Contiguous);
    }

    #[test]
    fn test_concurrent_reductions_are_independent() {
        let results: Vec<(f64, f64)> = thread::scope(|s| {
            let handles: Vec<_> = [0.5, 1.0, 1.5, 2.0]
                .into_iter()
                .map(|x| s.spawn(move || (x, reduce(&input(x, 4, 2000)).unwrap())))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (x, total) in results {
            let expected = sequential_sum(x, 8000);
            assert!((total - expected).abs() < TOLERANCE, "x={}", x);
        }
    }

    #[test]
    fn test_custom_stack_size() {
        let total = ParallelReducer::new()
            .with_stack_size(256 * 1024)
            .reduce(&input(1.5, 4, 100))
            .unwrap();
        assert!((total - sequential_sum(1.5, 400)).abs() < TOLERANCE);
    }

    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    #[test]
    fn test_spawn_failure_is_fatal() {
        // No 64-bit Linux address space can map a 1 EiB stack
        let result = ParallelReducer::new()
            .with_stack_size(1 << 60)
            .reduce(&input(1.5, 4, 100));
        assert!(matches!(result, Err(ReduceError::SpawnFailure { worker: 0, .. })));
    }

    #[test]
    fn test_builder_settings() {
        assert_eq!(ParallelReducer::new().strategy(), ShardStrategy::Strided);
        let reducer = ParallelReducer::new().with_strategy(ShardStrategy::Contiguous);
        assert_eq!(reducer.strategy(), ShardStrategy::Contiguous);
    }

    #[test]
    fn test_huge_worker_count_is_an_error() {
        let result = reduce(&input(1.5, usize::MAX / 2, 0));
        assert!(matches!(
            result,
            Err(ReduceError::Partition(ShardError::TooManyWorkers(_)))
        ));
    }

    #[test]
    fn test_partition_overflow_spawns_nothing() {
        let result = reduce(&input(1.5, usize::MAX, 2));
        assert!(matches!(
            result,
            Err(ReduceError::Partition(ShardError::TooManyTerms { .. }))
        ));
    }

    #[test]
    fn test_approximate_ln_validates_first() {
        assert!(matches!(
            approximate_ln(0.0, 4, 10),
            Err(ReduceError::InvalidInput(SeriesError::OutOfDomain(_)))
        ));
        assert!(matches!(
            approximate_ln(1.5, 0, 10),
            Err(ReduceError::InvalidInput(SeriesError::NoWorkers))
        ));
        assert!((approximate_ln(2.0, 4, 1000).unwrap() - std::f64::consts::LN_2).abs() < 1e-3);
    }

    #[test]
    fn test_error_messages() {
        let err = ReduceError::WorkerPanicked { worker: 3 };
        assert_eq!(err.to_string(), "worker 3 panicked before merging its partial sum");

        let err = ReduceError::from(AccumulatorError::MergePoisoned { worker: 1 });
        assert!(err.to_string().starts_with("lock failure:"));
    }
}
