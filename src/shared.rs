//! Shared accumulator for merging worker partial sums
//!
//! [`SharedAccumulator`] is the only mutable state shared between workers. It
//! exposes exactly two operations:
//!
//! - **`merge()`** - Adds one partial sum under the exclusive lock and returns
//!   the merge sequence number. Callable through `&self` from any worker.
//! - **`finish()`** / **`into_total()`** - Consume the accumulator and return the
//!   final value. Consuming `self` means the compiler rejects any read while a
//!   worker still borrows the accumulator.
//!
//! A poisoned lock is reported as an [`AccumulatorError`] from both
//! operations. A merge is never skipped.
//!
//! # Example
//!
//! ```
//! use mercator::shared::SharedAccumulator;
//!
//! let acc = SharedAccumulator::new();
//! std::thread::scope(|s| {
//!     s.spawn(|| acc.merge(0, 1.5).unwrap());
//!     s.spawn(|| acc.merge(1, 2.5).unwrap());
//! });
//! assert_eq!(acc.into_total().unwrap(), 4.0);
//! ```

use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur while using the accumulator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulatorError {
    #[error("accumulator lock is poisoned; cannot merge partial sum of worker {worker}")]
    MergePoisoned { worker: usize },

    #[error("accumulator lock is poisoned; final total cannot be trusted")]
    FinishPoisoned,
}

#[derive(Debug, Default)]
struct AccumulatorState {
    total: f64,
    merge_count: usize,
}

/// A single `f64` total guarded by one mutex
#[derive(Debug, Default)]
pub struct SharedAccumulator {
    state: Mutex<AccumulatorState>,
}

/// Final state of an accumulator after every worker has merged
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccumulatorSnapshot {
    /// Sum of all merged partial sums
    pub total: f64,

    /// Number of merge() calls that succeeded
    pub merge_count: usize,
}

impl SharedAccumulator {
    /// Create an accumulator holding 0.0
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker's partial sum to the total
    ///
    /// The lock is held only for the addition. Returns the zero-based order
    /// in which this merge happened relative to the others.
    pub fn merge(&self, worker: usize, partial: f64) -> Result<usize, AccumulatorError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AccumulatorError::MergePoisoned { worker })?;
        state.total += partial;
        let order = state.merge_count;
        state.merge_count += 1;
        Ok(order)
    }

    /// Consume the accumulator and return its total and merge count
    pub fn finish(self) -> Result<AccumulatorSnapshot, AccumulatorError> {
        let state = self
            .state
            .into_inner()
            .map_err(|_| AccumulatorError::FinishPoisoned)?;
        Ok(AccumulatorSnapshot {
            total: state.total,
            merge_count: state.merge_count,
        })
    }

    /// Consume the accumulator and return its total
    pub fn into_total(self) -> Result<f64, AccumulatorError> {
        self.finish().map(|snapshot| snapshot.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poison(acc: &SharedAccumulator) {
        std::thread::scope(|s| {
            let handle = s.spawn(|| {
                let _guard = acc.state.lock().unwrap();
                panic!("worker died holding the accumulator lock");
            });
            assert!(handle.join().is_err());
        });
    }

    #[test]
    fn test_new_is_zero() {
        let acc = SharedAccumulator::new();
        let snapshot = acc.finish().unwrap();
        assert_eq!(snapshot.total, 0.0);
        assert_eq!(snapshot.merge_count, 0);
    }

    #[test]
    fn test_merge_sequence_numbers() {
        let acc = SharedAccumulator::new();
        assert_eq!(acc.merge(2, 0.25).unwrap(), 0);
        assert_eq!(acc.merge(0, 0.5).unwrap(), 1);
        assert_eq!(acc.merge(1, -1.0).unwrap(), 2);

        let snapshot = acc.finish().unwrap();
        assert_eq!(snapshot.total, -0.25);
        assert_eq!(snapshot.merge_count, 3);
    }

    #[test]
    fn test_concurrent_merges_are_all_counted() {
        let acc = SharedAccumulator::new();
        let workers = 16;

        let mut orders = std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|w| {
                    let acc = &acc;
                    s.spawn(move || acc.merge(w, 1.0).unwrap())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        orders.sort_unstable();
        assert_eq!(orders, (0..workers).collect::<Vec<_>>());
        assert_eq!(acc.into_total().unwrap(), workers as f64);
    }

    #[test]
    fn test_merge_on_poisoned_lock_fails() {
        let acc = SharedAccumulator::new();
        poison(&acc);

        assert_eq!(
            acc.merge(3, 1.0),
            Err(AccumulatorError::MergePoisoned { worker: 3 })
        );
    }

    #[test]
    fn test_finish_on_poisoned_lock_fails() {
        let acc = SharedAccumulator::new();
        acc.merge(0, 1.0).unwrap();
        poison(&acc);

        assert_eq!(acc.into_total(), Err(AccumulatorError::FinishPoisoned));
    }
}
