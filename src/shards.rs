//! Work partitioning for series reduction
//!
//! Produces one shard per worker over the 1-based series index space
//! `1..=worker_count * iterations_per_worker`. Supports both strided and
//! contiguous strategies; strided is the default and is what the reducer
//! uses unless told otherwise.
//!
//! Index 0 is never assigned: the series starts at k = 1.

use thiserror::Error;

/// Errors that can occur during partitioning
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShardError {
    #[error("worker_count must be greater than 0")]
    NoWorkers,

    #[error("{worker_count} workers x {iterations_per_worker} iterations overflows the series index space")]
    TooManyTerms {
        worker_count: usize,
        iterations_per_worker: usize,
    },

    #[error("cannot allocate shards for {0} workers")]
    TooManyWorkers(usize),
}

/// Strategy for assigning series indices to workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardStrategy {
    /// Interleaved indices across workers (e.g., [1,5,9,...], [2,6,10,...], ...)
    /// Spreads small and large terms evenly over the workers
    #[default]
    Strided,

    /// Consecutive indices per worker (e.g., [1-100], [101-200], ...)
    Contiguous,
}

impl std::fmt::Display for ShardStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShardStrategy::Strided => write!(f, "strided"),
            ShardStrategy::Contiguous => write!(f, "contiguous"),
        }
    }
}

/// A single worker's share of the series
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shard {
    /// Contiguous range [start, end)
    Range { start: usize, end: usize },

    /// Strided indices: start, start+stride, start+2*stride, ... (count of them)
    Strided {
        start: usize,
        stride: usize,
        count: usize,
    },
}

impl Shard {
    /// Returns the number of indices in this shard
    pub fn len(&self) -> usize {
        match self {
            Shard::Range { start, end } => end.saturating_sub(*start),
            Shard::Strided { count, .. } => *count,
        }
    }

    /// Returns true if this shard has no indices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First series index of the shard, if any
    pub fn first(&self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        match self {
            Shard::Range { start, .. } | Shard::Strided { start, .. } => Some(*start),
        }
    }

    /// Returns an iterator over the indices in this shard, in summation order
    pub fn indices(&self) -> ShardIndices {
        match self {
            Shard::Range { start, end } => ShardIndices::Range(*start..*end),
            Shard::Strided {
                start,
                stride,
                count,
            } => ShardIndices::Strided {
                current: *start,
                stride: *stride,
                remaining: *count,
            },
        }
    }

    /// Returns the indices as a vector
    pub fn to_vec(&self) -> Vec<usize> {
        self.indices().collect()
    }
}

/// Iterator over shard indices
pub enum ShardIndices {
    Range(std::ops::Range<usize>),
    Strided {
        current: usize,
        stride: usize,
        remaining: usize,
    },
}

impl Iterator for ShardIndices {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ShardIndices::Range(r) => r.next(),
            ShardIndices::Strided {
                current,
                stride,
                remaining,
            } => {
                if *remaining == 0 {
                    None
                } else {
                    let val = *current;
                    *remaining -= 1;
                    // The last step would run past the checked bound
                    if *remaining > 0 {
                        *current += *stride;
                    }
                    Some(val)
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = match self {
            ShardIndices::Range(r) => r.len(),
            ShardIndices::Strided { remaining, .. } => *remaining,
        };
        (len, Some(len))
    }
}

impl ExactSizeIterator for ShardIndices {}

/// A worker's identity and its shard, moved into the worker on spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerAssignment {
    /// Worker index in [0, worker_count)
    pub worker_index: usize,

    /// Series indices this worker sums
    pub shard: Shard,
}

/// Partition of the series index space over a fixed set of workers
#[derive(Debug, Clone)]
pub struct ShardDescriptor {
    /// Total number of series terms being partitioned
    pub n: usize,

    /// Strategy used for partitioning
    pub strategy: ShardStrategy,

    /// One shard per worker, indexed by worker
    pub shards: Vec<Shard>,
}

impl ShardDescriptor {
    /// Returns the number of shards (equal to the worker count)
    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Returns an iterator over the shards
    pub fn iter(&self) -> ShardIterator<'_> {
        ShardIterator {
            inner: self.shards.iter(),
        }
    }

    /// Consume the descriptor into per-worker assignments, in worker order
    pub fn into_assignments(self) -> impl ExactSizeIterator<Item = WorkerAssignment> {
        self.shards
            .into_iter()
            .enumerate()
            .map(|(worker_index, shard)| WorkerAssignment {
                worker_index,
                shard,
            })
    }

    /// Verify that every index in 1..=n is covered exactly once
    pub fn covers_exactly(&self) -> bool {
        let mut seen = vec![false; self.n];
        for shard in &self.shards {
            for idx in shard.indices() {
                if idx == 0 || idx > self.n || seen[idx - 1] {
                    return false;
                }
                seen[idx - 1] = true;
            }
        }
        seen.iter().all(|&b| b)
    }
}

impl<'a> IntoIterator for &'a ShardDescriptor {
    type Item = &'a Shard;
    type IntoIter = ShardIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over shards in a descriptor
pub struct ShardIterator<'a> {
    inner: std::slice::Iter<'a, Shard>,
}

impl<'a> Iterator for ShardIterator<'a> {
    type Item = &'a Shard;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a> ExactSizeIterator for ShardIterator<'a> {}

/// Worker w gets w+1, w+1+W, w+1+2W, ...
fn strided_shard(w: usize, worker_count: usize, iterations_per_worker: usize) -> Shard {
    Shard::Strided {
        start: w + 1,
        stride: worker_count,
        count: iterations_per_worker,
    }
}

/// Worker w gets w*I+1 ..= (w+1)*I
fn contiguous_shard(w: usize, iterations_per_worker: usize) -> Shard {
    Shard::Range {
        start: w * iterations_per_worker + 1,
        end: (w + 1) * iterations_per_worker + 1,
    }
}

/// Partition `1..=worker_count * iterations_per_worker` into one shard per worker
///
/// # Arguments
///
/// * `worker_count` - Number of workers (must be > 0)
/// * `iterations_per_worker` - Terms each worker sums (may be 0)
/// * `strategy` - How to assign indices to workers
///
/// # Example
///
/// ```
/// use mercator::shards::{partition, ShardStrategy};
///
/// let desc = partition(4, 3, ShardStrategy::Strided).unwrap();
/// assert_eq!(desc.shards[1].to_vec(), vec![2, 6, 10]);
/// assert!(desc.covers_exactly());
/// ```
pub fn partition(
    worker_count: usize,
    iterations_per_worker: usize,
    strategy: ShardStrategy,
) -> Result<ShardDescriptor, ShardError> {
    if worker_count == 0 {
        return Err(ShardError::NoWorkers);
    }

    // The exclusive end of the last range is n + 1, so that must fit as well
    let n = worker_count
        .checked_mul(iterations_per_worker)
        .filter(|n| n.checked_add(1).is_some())
        .ok_or(ShardError::TooManyTerms {
            worker_count,
            iterations_per_worker,
        })?;

    // With zero iterations the term check passes for any worker count
    let mut shards = Vec::new();
    shards
        .try_reserve_exact(worker_count)
        .map_err(|_| ShardError::TooManyWorkers(worker_count))?;
    shards.extend((0..worker_count).map(|w| match strategy {
        ShardStrategy::Strided => strided_shard(w, worker_count, iterations_per_worker),
        ShardStrategy::Contiguous => contiguous_shard(w, iterations_per_worker),
    }));

    Ok(ShardDescriptor {
        n,
        strategy,
        shards,
    })
}
