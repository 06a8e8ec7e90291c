//! Per-worker breakdown of a reduction
//!
//! [`ReductionReport`] records what each worker summed and when it merged,
//! together with the final total and its distance from the reference `ln(x)`.
//! The reducer builds it after join-all, so every row is final.
//!
//! # Example
//!
//! ```
//! use mercator::reducer::ParallelReducer;
//! use mercator::series::SeriesInput;
//!
//! let input = SeriesInput::new(1.5, 4, 50).unwrap();
//! let report = ParallelReducer::new().reduce_with_report(&input).unwrap();
//!
//! assert_eq!(report.workers().len(), 4);
//! assert!(report.summary().abs_error < 1e-12);
//! println!("{}", report);
//! ```

use std::fmt;

use crate::shards::ShardStrategy;

/// What a single worker contributed
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    /// Worker index in [0, worker_count)
    pub worker_index: usize,
    /// Number of series terms summed
    pub terms: usize,
    /// First series index summed (None when the worker had no terms)
    pub first_index: Option<usize>,
    /// Worker-local sum before merging
    pub partial_sum: f64,
    /// Position of this worker's merge among all merges
    pub merge_order: usize,
}

/// Summary of a reduction
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    /// Number of workers spawned
    pub worker_count: usize,
    /// Series terms summed across all workers
    pub total_terms: usize,
    /// Final merged total
    pub total: f64,
    /// Reference value ln(x)
    pub reference: f64,
    /// |total - reference|
    pub abs_error: f64,
    /// Number of merges the accumulator recorded
    pub merge_count: usize,
}

/// A complete reduction report
#[derive(Debug, Clone)]
pub struct ReductionReport {
    x: f64,
    strategy: ShardStrategy,
    workers: Vec<WorkerReport>,
    summary: ReportSummary,
}

impl ReductionReport {
    pub(crate) fn new(
        x: f64,
        strategy: ShardStrategy,
        mut workers: Vec<WorkerReport>,
        total: f64,
        merge_count: usize,
    ) -> Self {
        workers.sort_by_key(|w| w.worker_index);
        let reference = x.ln();
        let summary = ReportSummary {
            worker_count: workers.len(),
            total_terms: workers.iter().map(|w| w.terms).sum(),
            total,
            reference,
            abs_error: (total - reference).abs(),
            merge_count,
        };
        Self {
            x,
            strategy,
            workers,
            summary,
        }
    }

    /// The series argument
    pub fn x(&self) -> f64 {
        self.x
    }

    /// Strategy the index space was partitioned with
    pub fn strategy(&self) -> ShardStrategy {
        self.strategy
    }

    /// Per-worker rows, ordered by worker index
    pub fn workers(&self) -> &[WorkerReport] {
        &self.workers
    }

    /// Get the summary
    pub fn summary(&self) -> &ReportSummary {
        &self.summary
    }

    /// Final merged total
    pub fn total(&self) -> f64 {
        self.summary.total
    }

    /// Worker indices in the order their merges happened
    pub fn merge_sequence(&self) -> Vec<usize> {
        let mut rows: Vec<&WorkerReport> = self.workers.iter().collect();
        rows.sort_by_key(|w| w.merge_order);
        rows.into_iter().map(|w| w.worker_index).collect()
    }
}

impl fmt::Display for ReductionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reduction Report")?;
        writeln!(f, "================")?;
        writeln!(f)?;

        writeln!(f, "Summary:")?;
        writeln!(f, "  x:         {}", self.x)?;
        writeln!(f, "  Strategy:  {}", self.strategy)?;
        writeln!(f, "  Workers:   {} ({} merges)", self.summary.worker_count, self.summary.merge_count)?;
        writeln!(f, "  Terms:     {}", self.summary.total_terms)?;
        writeln!(f, "  Total:     {:.14}", self.summary.total)?;
        writeln!(f, "  ln(x):     {:.14}", self.summary.reference)?;
        writeln!(f, "  Abs error: {:.3e}", self.summary.abs_error)?;
        writeln!(f)?;

        writeln!(f, "Workers:")?;
        writeln!(f, "{:<8} {:<10} {:<10} {:<8} Partial sum",
                 "Worker", "Terms", "First k", "Merge")?;
        writeln!(f, "{:-<60}", "")?;

        for row in &self.workers {
            let first = row
                .first_index
                .map_or_else(|| "-".to_string(), |k| k.to_string());
            writeln!(f, "{:<8} {:<10} {:<10} {:<8} {:.14}",
                     row.worker_index,
                     row.terms,
                     first,
                     row.merge_order,
                     row.partial_sum)?;
        }

        Ok(())
    }
}
