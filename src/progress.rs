//! Human-readable progress for a run.
//!
//! Observers only receive values; nothing they do feeds back into scheduling.

use std::time::Duration;

use tracing::{info, warn};

use crate::scheduler::RunStats;

/// What the scheduler reports once a batch has drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// 1-based batch number.
    pub number: u64,
    /// Tasks attempted in this batch.
    pub attempted: u64,
    /// Tasks that produced a written record.
    pub successful: u64,
    /// Wall-clock time from first dispatch to last completion.
    pub duration: Duration,
    /// Tasks attempted so far in the run.
    pub completed: u64,
    /// Run target.
    pub total: u64,
}

impl BatchSummary {
    /// Average seconds spent per attempted task.
    #[must_use]
    pub fn seconds_per_code(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let attempted = self.attempted as f64;
        self.duration.as_secs_f64() / attempted
    }
}

/// Receives progress events from the scheduler.
pub trait ProgressObserver: Send + Sync {
    /// The run is about to dispatch its first batch.
    fn run_started(&self, total: u64, workers: usize, batch_size: u64);
    /// A batch of `size` tasks is being dispatched.
    fn batch_started(&self, number: u64, size: u64);
    /// A task finished; `attempted` counts every finished task in the run.
    fn task_finished(&self, attempted: u64);
    /// A batch has fully drained.
    fn batch_finished(&self, summary: &BatchSummary);
    /// Cancellation was observed after a batch drained; no further batches
    /// will start.
    fn interrupted(&self);
    /// Finalization is complete.
    fn run_finished(&self, stats: &RunStats);
}

/// Logs progress lines through `tracing`.
pub struct ConsoleReporter {
    milestone_every: u64,
}

impl ConsoleReporter {
    /// Creates a reporter that logs a milestone every `milestone_every` tasks.
    #[must_use]
    pub fn new(milestone_every: u64) -> Self {
        Self { milestone_every }
    }

    /// Whether `attempted` lands on a milestone.
    #[must_use]
    pub fn is_milestone(&self, attempted: u64) -> bool {
        self.milestone_every > 0 && attempted > 0 && attempted % self.milestone_every == 0
    }
}

impl ProgressObserver for ConsoleReporter {
    fn run_started(&self, total: u64, workers: usize, batch_size: u64) {
        info!("Starting generation of {total} promotion codes with {workers} workers");
        info!("Fixed batch size: {batch_size}");
    }

    fn batch_started(&self, number: u64, size: u64) {
        info!("Starting batch {number} of {size} codes");
    }

    fn task_finished(&self, attempted: u64) {
        if self.is_milestone(attempted) {
            info!("{attempted} codes attempted...");
        }
    }

    fn batch_finished(&self, summary: &BatchSummary) {
        info!(
            "Batch complete: {}/{} codes | {:.2}s/code | {}/{} total",
            summary.successful,
            summary.attempted,
            summary.seconds_per_code(),
            summary.completed,
            summary.total,
        );
    }

    fn interrupted(&self) {
        warn!("Interrupted. Saving progress...");
    }

    fn run_finished(&self, stats: &RunStats) {
        info!(
            "Finished. {} promotion codes generated ({} attempted) in {} seconds.",
            stats.successful,
            stats.attempted,
            stats.elapsed.as_secs(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestones_every_interval() {
        let reporter = ConsoleReporter::new(200);
        assert!(!reporter.is_milestone(0));
        assert!(!reporter.is_milestone(199));
        assert!(reporter.is_milestone(200));
        assert!(reporter.is_milestone(400));
        assert!(!reporter.is_milestone(401));
    }

    #[test]
    fn zero_interval_disables_milestones() {
        let reporter = ConsoleReporter::new(0);
        assert!(!reporter.is_milestone(200));
    }

    #[test]
    fn seconds_per_code_divides_duration_by_attempts() {
        let summary = BatchSummary {
            number: 1,
            attempted: 400,
            successful: 398,
            duration: Duration::from_secs(100),
            completed: 400,
            total: 10_000,
        };
        assert!((summary.seconds_per_code() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_batch_has_zero_rate() {
        let summary = BatchSummary {
            number: 1,
            attempted: 0,
            successful: 0,
            duration: Duration::from_secs(3),
            completed: 0,
            total: 10,
        };
        assert!(summary.seconds_per_code().abs() < f64::EPSILON);
    }
}
