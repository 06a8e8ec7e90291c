//! Mercator series terms and validated series input
//!
//! The Mercator series expands the natural logarithm about `x = 1`:
//!
//! ```text
//! ln(x) = sum_{k >= 1} (-1)^(k+1) * (x - 1)^k / k      for 0 < x <= 2
//! ```
//!
//! [`term`] evaluates one addend. [`SeriesInput`] carries the parameters of a
//! reduction and can only be built from values that satisfy the convergence
//! domain, so everything downstream of it may assume a valid input.
//!
//! # Example
//!
//! ```
//! use mercator::series::{term, SeriesInput};
//!
//! assert_eq!(term(2.0, 1), 1.0);
//! assert_eq!(term(2.0, 2), -0.5);
//!
//! let input = SeriesInput::new(0.5, 4, 100).unwrap();
//! assert_eq!(input.total_terms(), Some(400));
//! ```

use thiserror::Error;

/// Errors raised while building a [`SeriesInput`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("Please enter a correct x value for ln(x) between 0 - 2 (got {0})")]
    OutOfDomain(f64),

    #[error("worker_count must be greater than 0")]
    NoWorkers,
}

/// Evaluate the k-th signed term of the Mercator series for ln(x)
///
/// Returns `(-1)^(k+1) * (x - 1)^k / k`. The index is 1-based; `k == 0` is
/// outside the series and yields a non-finite value rather than a term.
#[inline]
pub fn term(x: f64, k: usize) -> f64 {
    let n = k as f64;
    let magnitude = (x - 1.0).powf(n) / n;
    if k % 2 == 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Sum the first `n` terms in index order on the calling thread
pub fn sequential_sum(x: f64, n: usize) -> f64 {
    (1..=n).map(|k| term(x, k)).sum()
}

/// Parameters of one reduction
///
/// Fields are private and the value is never mutated after construction, so
/// it can be shared by reference with every worker without a lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesInput {
    x: f64,
    worker_count: usize,
    iterations_per_worker: usize,
}

impl SeriesInput {
    /// Validate and build a series input
    ///
    /// Rejects `x` outside `(0, 2]` (NaN included) and a zero worker count.
    pub fn new(
        x: f64,
        worker_count: usize,
        iterations_per_worker: usize,
    ) -> Result<Self, SeriesError> {
        if !(x > 0.0 && x <= 2.0) {
            return Err(SeriesError::OutOfDomain(x));
        }
        if worker_count == 0 {
            return Err(SeriesError::NoWorkers);
        }
        Ok(Self {
            x,
            worker_count,
            iterations_per_worker,
        })
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn iterations_per_worker(&self) -> usize {
        self.iterations_per_worker
    }

    /// Number of series terms summed across all workers, if it fits in `usize`
    pub fn total_terms(&self) -> Option<usize> {
        self.worker_count.checked_mul(self.iterations_per_worker)
    }

    /// The reference value `ln(x)` used for comparison output
    pub fn reference(&self) -> f64 {
        self.x.ln()
    }
}
