//! Batch scheduler: bounded fan-out per batch, full drain, then cooldown.
//!
//! ```text
//! Idle -> BatchRunning -> Cooldown -> BatchRunning -> ... -> Finalizing -> Done
//!              |              |
//!              +--------------+--> Interrupted -> Finalizing -> Done
//! ```
//!
//! Each batch spawns tasks only as worker permits free up, so at most
//! `workers` provider calls are in flight. No task of batch `n + 1` starts
//! before every task of batch `n` has been joined.
//!
//! Cancellation takes effect between batches. A batch that has started is
//! dispatched and drained in full, so statistics only ever cover whole batches
//! and agree with the rows written. A pending cooldown ends at once.
//! Finalization closes the sink and reports once, on every path out of
//! [`BatchScheduler::run`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::campaign::Campaign;
use crate::issuer::{IssueFailure, Issuer};
use crate::ports::{Clock, RecordSink};
use crate::progress::{BatchSummary, ProgressObserver};

/// Sizes and pacing of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Total tasks to attempt.
    pub total: u64,
    /// Maximum tasks in flight.
    pub workers: usize,
    /// Tasks per batch.
    pub batch_size: u64,
    /// Pause between batches.
    pub cooldown: Duration,
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Nothing dispatched yet.
    Idle,
    /// Batch `batch` (1-based) is dispatching or draining.
    BatchRunning {
        /// Batch number.
        batch: u64,
    },
    /// Waiting between batches.
    Cooldown,
    /// Cancellation observed.
    Interrupted,
    /// Closing the sink and reporting.
    Finalizing,
    /// Finished.
    Done,
}

/// Why tasks produced no written record, by cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCounts {
    /// Every attempt was rate limited.
    pub rate_limited: u64,
    /// The provider refused the request.
    pub rejected: u64,
    /// A code was issued but could not be written.
    pub unwritten: u64,
    /// The task panicked.
    pub panicked: u64,
}

impl FailureCounts {
    /// Sum over all causes.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.rate_limited + self.rejected + self.unwritten + self.panicked
    }

    fn absorb(&mut self, other: Self) {
        self.rate_limited += other.rate_limited;
        self.rejected += other.rejected;
        self.unwritten += other.unwritten;
        self.panicked += other.panicked;
    }
}

/// Final accounting of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// Tasks attempted; never exceeds the target.
    pub attempted: u64,
    /// Tasks whose record was written.
    pub successful: u64,
    /// Failed tasks by cause.
    pub failures: FailureCounts,
    /// Batches started.
    pub batches: u64,
    /// Whether the run stopped on cancellation.
    pub interrupted: bool,
    /// Rows the sink reports as written.
    pub written: u64,
    /// Output files in sequence order.
    pub files: Vec<PathBuf>,
    /// Wall-clock time from start to finalization.
    pub elapsed: Duration,
    /// Set when the sink failed to close cleanly.
    pub finalize_error: Option<String>,
    /// Every state the scheduler passed through.
    pub history: Vec<RunState>,
}

enum TaskOutcome {
    Written,
    Failed(IssueFailure),
    Unwritten,
}

#[derive(Debug, Default)]
struct BatchResult {
    attempted: u64,
    successful: u64,
    failures: FailureCounts,
    cut_short: bool,
}

enum Step {
    Joined(Result<TaskOutcome, JoinError>),
    Permit(Result<OwnedSemaphorePermit, AcquireError>),
}

/// Drives a whole run from the first batch to finalization.
pub struct BatchScheduler {
    config: ScheduleConfig,
    issuer: Arc<Issuer>,
    sink: Arc<dyn RecordSink>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn ProgressObserver>,
    permits: Arc<Semaphore>,
    history: Vec<RunState>,
}

impl BatchScheduler {
    /// Creates a scheduler with a worker pool of `config.workers` permits.
    #[must_use]
    pub fn new(
        config: ScheduleConfig,
        issuer: Arc<Issuer>,
        sink: Arc<dyn RecordSink>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.workers.max(1)));
        Self { config, issuer, sink, clock, observer, permits, history: vec![RunState::Idle] }
    }

    fn enter(&mut self, next: RunState) {
        let from = self.history.last().copied().unwrap_or(RunState::Idle);
        debug!(?from, to = ?next, "scheduler state");
        self.history.push(next);
    }

    /// Runs batches until the target is reached or `cancel` fires, then
    /// finalizes. Never fails: per-task errors are counted and a sink close
    /// error is reported in [`RunStats::finalize_error`].
    pub async fn run(mut self, campaign: Arc<Campaign>, cancel: &CancellationToken) -> RunStats {
        let started = self.clock.now();
        let total = self.config.total;
        let mut tally = BatchResult::default();
        let mut batches = 0;

        self.observer.run_started(total, self.config.workers, self.config.batch_size);

        while tally.attempted < total {
            if cancel.is_cancelled() {
                tally.cut_short = true;
                break;
            }

            let size = self.config.batch_size.min(total - tally.attempted);
            batches += 1;
            self.enter(RunState::BatchRunning { batch: batches });
            self.observer.batch_started(batches, size);

            let batch_started = self.clock.now();
            let batch = self.run_batch(size, tally.attempted, &campaign).await;
            if cancel.is_cancelled() {
                debug!(batch = batches, "cancellation observed; batch drained before stopping");
            }
            tally.attempted += batch.attempted;
            tally.successful += batch.successful;
            tally.failures.absorb(batch.failures);

            self.observer.batch_finished(&BatchSummary {
                number: batches,
                attempted: batch.attempted,
                successful: batch.successful,
                duration: elapsed_since(self.clock.as_ref(), batch_started),
                completed: tally.attempted,
                total,
            });

            if batch.cut_short {
                tally.cut_short = true;
                break;
            }
            if tally.attempted >= total {
                break;
            }

            self.enter(RunState::Cooldown);
            let cooled = tokio::select! {
                biased;
                () = cancel.cancelled() => false,
                () = self.clock.sleep(self.config.cooldown) => true,
            };
            if !cooled {
                tally.cut_short = true;
                break;
            }
        }

        if tally.cut_short {
            self.enter(RunState::Interrupted);
            self.observer.interrupted();
        }
        self.finalize(started, batches, tally)
    }

    async fn run_batch(&self, size: u64, offset: u64, campaign: &Arc<Campaign>) -> BatchResult {
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        let mut result = BatchResult::default();
        let mut dispatched = 0;

        loop {
            let dispatching = dispatched < size && !result.cut_short;
            if !dispatching && tasks.is_empty() {
                break;
            }

            let step = tokio::select! {
                biased;
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => Step::Joined(joined),
                permit = Arc::clone(&self.permits).acquire_owned(), if dispatching => Step::Permit(permit),
                else => break,
            };

            match step {
                Step::Permit(Ok(permit)) => {
                    let index = offset + dispatched;
                    dispatched += 1;
                    let issuer = Arc::clone(&self.issuer);
                    let sink = Arc::clone(&self.sink);
                    let campaign = Arc::clone(campaign);
                    tasks.spawn(async move {
                        let _permit = permit;
                        execute(&issuer, sink.as_ref(), &campaign, index).await
                    });
                }
                Step::Permit(Err(err)) => {
                    error!(error = %err, "worker pool closed");
                    result.cut_short = true;
                }
                Step::Joined(joined) => {
                    result.attempted += 1;
                    match joined {
                        Ok(TaskOutcome::Written) => result.successful += 1,
                        Ok(TaskOutcome::Failed(IssueFailure::RetriesExhausted { .. })) => {
                            result.failures.rate_limited += 1;
                        }
                        Ok(TaskOutcome::Failed(IssueFailure::Rejected { .. })) => {
                            result.failures.rejected += 1;
                        }
                        Ok(TaskOutcome::Unwritten) => result.failures.unwritten += 1,
                        Err(err) => {
                            warn!(error = %err, "task panicked");
                            result.failures.panicked += 1;
                        }
                    }
                    self.observer.task_finished(offset + result.attempted);
                }
            }
        }

        result
    }

    fn finalize(mut self, started: DateTime<Utc>, batches: u64, tally: BatchResult) -> RunStats {
        self.enter(RunState::Finalizing);

        let (files, written, finalize_error) = match self.sink.close() {
            Ok(summary) => (summary.files, summary.rows, None),
            Err(err) => {
                error!(error = %err, "failed to close output");
                (Vec::new(), 0, Some(err.to_string()))
            }
        };

        let mut stats = RunStats {
            attempted: tally.attempted,
            successful: tally.successful,
            failures: tally.failures,
            batches,
            interrupted: tally.cut_short,
            written,
            files,
            elapsed: elapsed_since(self.clock.as_ref(), started),
            finalize_error,
            history: Vec::new(),
        };
        self.observer.run_finished(&stats);

        self.enter(RunState::Done);
        stats.history = std::mem::take(&mut self.history);
        stats
    }
}

async fn execute(
    issuer: &Issuer,
    sink: &dyn RecordSink,
    campaign: &Campaign,
    index: u64,
) -> TaskOutcome {
    let mut task = issuer.prepare(index);
    match issuer.issue(campaign, &mut task).await {
        Ok(record) => match sink.write(&record) {
            Ok(()) => TaskOutcome::Written,
            Err(err) => {
                // The code exists on the provider; keep it visible in the log.
                error!(task = index, code = %record.code, error = %err, "issued code could not be written");
                TaskOutcome::Unwritten
            }
        },
        Err(failure) => TaskOutcome::Failed(failure),
    }
}

fn elapsed_since(clock: &dyn Clock, start: DateTime<Utc>) -> Duration {
    (clock.now() - start).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::TimeZone;

    use crate::adapters::simulated::{ManualClock, SimulatedPayments};
    use crate::campaign::{CampaignSpec, Discount, DurationPolicy, TargetRestriction};
    use crate::error::{ApiError, SinkError};
    use crate::issuer::{CodeRecord, RetryPolicy};
    use crate::ports::payments::{
        CouponRequest, CreatedCoupon, IssuedCode, PaymentsApi, PaymentsFuture,
        PromotionCodeRequest,
    };
    use crate::ports::SinkSummary;

    /// Sink that keeps rows in memory.
    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<CodeRecord>>,
        closes: AtomicUsize,
    }

    impl RecordSink for MemorySink {
        fn write(&self, record: &CodeRecord) -> Result<(), SinkError> {
            if self.closes.load(Ordering::SeqCst) > 0 {
                return Err(SinkError::Closed);
            }
            self.rows.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn close(&self) -> Result<SinkSummary, SinkError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.lock().unwrap().len() as u64;
            Ok(SinkSummary { files: vec![PathBuf::from("memory.csv")], rows })
        }
    }

    /// Observer that can play the part of an external interrupt.
    #[derive(Default)]
    struct Interrupter {
        token: CancellationToken,
        after_task: Option<u64>,
        after_batch: Option<u64>,
        milestones: Mutex<Vec<u64>>,
        summaries: Mutex<Vec<BatchSummary>>,
        finished: AtomicUsize,
    }

    impl ProgressObserver for Interrupter {
        fn run_started(&self, _total: u64, _workers: usize, _batch_size: u64) {}

        fn batch_started(&self, _number: u64, _size: u64) {}

        fn task_finished(&self, attempted: u64) {
            self.milestones.lock().unwrap().push(attempted);
            if self.after_task == Some(attempted) {
                self.token.cancel();
            }
        }

        fn batch_finished(&self, summary: &BatchSummary) {
            self.summaries.lock().unwrap().push(summary.clone());
            if self.after_batch == Some(summary.number) {
                self.token.cancel();
            }
        }

        fn interrupted(&self) {}

        fn run_finished(&self, _stats: &RunStats) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Provider that yields mid-call and tracks peak concurrency.
    #[derive(Default)]
    struct SlowPayments {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl PaymentsApi for SlowPayments {
        fn create_coupon(&self, _request: &CouponRequest) -> PaymentsFuture<'_, CreatedCoupon> {
            Box::pin(async { Ok(CreatedCoupon { id: "co_slow".into() }) })
        }

        fn create_promotion_code(
            &self,
            _request: &PromotionCodeRequest,
        ) -> PaymentsFuture<'_, IssuedCode> {
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                for _ in 0..5 {
                    tokio::task::yield_now().await;
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(IssuedCode { id: "promo".into(), code: "SLOW".into() })
            })
        }
    }

    fn campaign() -> Arc<Campaign> {
        Arc::new(Campaign::existing(
            "co_test",
            CampaignSpec {
                name: "Test".into(),
                discount: Discount::PercentOff(25),
                duration: DurationPolicy::Once,
                expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 23, 59, 59).unwrap(),
                target: TargetRestriction::default(),
            },
        ))
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::starting_at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()))
    }

    fn schedule(total: u64, workers: usize, batch_size: u64) -> ScheduleConfig {
        ScheduleConfig { total, workers, batch_size, cooldown: Duration::from_secs(1) }
    }

    fn scheduler(
        config: ScheduleConfig,
        api: Arc<dyn PaymentsApi>,
        clock: Arc<ManualClock>,
        sink: Arc<MemorySink>,
        observer: Arc<Interrupter>,
    ) -> BatchScheduler {
        let issuer = Arc::new(Issuer::new(api, clock.clone(), None, RetryPolicy::default()));
        BatchScheduler::new(config, issuer, sink, clock, observer)
    }

    #[tokio::test]
    async fn partitions_target_into_batches_with_cooldowns_between() {
        let clock = clock();
        let sink = Arc::new(MemorySink::default());
        let observer = Arc::new(Interrupter::default());
        let token = observer.token.clone();
        let scheduler = scheduler(
            schedule(25, 3, 10),
            Arc::new(SimulatedPayments::new()),
            Arc::clone(&clock),
            Arc::clone(&sink),
            Arc::clone(&observer),
        );

        let stats = scheduler.run(campaign(), &token).await;

        assert_eq!(stats.attempted, 25);
        assert_eq!(stats.successful, 25);
        assert_eq!(stats.written, 25);
        assert_eq!(stats.batches, 3);
        assert!(!stats.interrupted);
        assert_eq!(clock.slept(), vec![Duration::from_secs(1); 2]);
        assert_eq!(
            stats.history,
            vec![
                RunState::Idle,
                RunState::BatchRunning { batch: 1 },
                RunState::Cooldown,
                RunState::BatchRunning { batch: 2 },
                RunState::Cooldown,
                RunState::BatchRunning { batch: 3 },
                RunState::Finalizing,
                RunState::Done,
            ]
        );
        let sizes: Vec<u64> =
            observer.summaries.lock().unwrap().iter().map(|s| s.attempted).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(*observer.milestones.lock().unwrap(), (1..=25).collect::<Vec<u64>>());
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
        assert_eq!(observer.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_tasks_still_consume_their_slot() {
        let sink = Arc::new(MemorySink::default());
        let observer = Arc::new(Interrupter::default());
        let token = observer.token.clone();
        let scheduler = scheduler(
            schedule(20, 4, 8),
            Arc::new(SimulatedPayments::rejecting_every(4)),
            clock(),
            Arc::clone(&sink),
            observer,
        );

        let stats = scheduler.run(campaign(), &token).await;

        assert_eq!(stats.attempted, 20);
        assert_eq!(stats.successful, 15);
        assert_eq!(stats.failures.rejected, 5);
        assert_eq!(stats.failures.total(), 5);
        assert_eq!(sink.rows.lock().unwrap().len(), 15);
    }

    #[tokio::test]
    async fn exhausted_rate_limits_are_counted_separately() {
        let rate_limited = || ApiError::RateLimited("busy".into());
        let sink = Arc::new(MemorySink::default());
        let observer = Arc::new(Interrupter::default());
        let token = observer.token.clone();
        let scheduler = scheduler(
            schedule(3, 1, 3),
            Arc::new(SimulatedPayments::with_script([rate_limited(), rate_limited(), rate_limited()])),
            clock(),
            sink,
            observer,
        );

        let stats = scheduler.run(campaign(), &token).await;

        assert_eq!(stats.attempted, 3);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failures.rate_limited, 1);
    }

    #[tokio::test]
    async fn small_target_runs_single_batch_without_cooldown() {
        let clock = clock();
        let observer = Arc::new(Interrupter::default());
        let token = observer.token.clone();
        let scheduler = scheduler(
            schedule(7, 10, 400),
            Arc::new(SimulatedPayments::new()),
            Arc::clone(&clock),
            Arc::new(MemorySink::default()),
            observer,
        );

        let stats = scheduler.run(campaign(), &token).await;

        assert_eq!(stats.attempted, 7);
        assert_eq!(stats.batches, 1);
        assert!(clock.slept().is_empty());
    }

    #[tokio::test]
    async fn never_exceeds_worker_pool_size() {
        let api = Arc::new(SlowPayments::default());
        let observer = Arc::new(Interrupter::default());
        let token = observer.token.clone();
        let scheduler = scheduler(
            schedule(40, 3, 20),
            api.clone(),
            clock(),
            Arc::new(MemorySink::default()),
            observer,
        );

        let stats = scheduler.run(campaign(), &token).await;

        assert_eq!(stats.successful, 40);
        let peak = api.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak} exceeded pool");
        assert!(peak > 1, "tasks never overlapped");
    }

    #[tokio::test]
    async fn cancelled_before_start_still_finalizes() {
        let sink = Arc::new(MemorySink::default());
        let observer = Arc::new(Interrupter::default());
        let token = observer.token.clone();
        token.cancel();
        let scheduler = scheduler(
            schedule(100, 10, 10),
            Arc::new(SimulatedPayments::new()),
            clock(),
            Arc::clone(&sink),
            Arc::clone(&observer),
        );

        let stats = scheduler.run(campaign(), &token).await;

        assert_eq!(stats.attempted, 0);
        assert_eq!(stats.batches, 0);
        assert!(stats.interrupted);
        assert_eq!(
            stats.history,
            vec![RunState::Idle, RunState::Interrupted, RunState::Finalizing, RunState::Done]
        );
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
        assert_eq!(observer.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_during_cooldown_stops_further_batches() {
        let sink = Arc::new(MemorySink::default());
        let observer =
            Arc::new(Interrupter { after_batch: Some(1), ..Interrupter::default() });
        let token = observer.token.clone();
        let scheduler = scheduler(
            schedule(50, 5, 10),
            Arc::new(SimulatedPayments::new()),
            clock(),
            Arc::clone(&sink),
            observer,
        );

        let stats = scheduler.run(campaign(), &token).await;

        assert_eq!(stats.attempted, 10);
        assert_eq!(stats.successful, 10);
        assert_eq!(stats.batches, 1);
        assert!(stats.interrupted);
        assert_eq!(
            &stats.history[1..],
            &[
                RunState::BatchRunning { batch: 1 },
                RunState::Cooldown,
                RunState::Interrupted,
                RunState::Finalizing,
                RunState::Done,
            ]
        );
        assert_eq!(sink.rows.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn cancellation_mid_batch_drains_the_batch_then_stops() {
        let sink = Arc::new(MemorySink::default());
        let observer = Arc::new(Interrupter { after_task: Some(3), ..Interrupter::default() });
        let token = observer.token.clone();
        let scheduler = scheduler(
            schedule(30, 1, 10),
            Arc::new(SimulatedPayments::new()),
            clock(),
            Arc::clone(&sink),
            observer,
        );

        let stats = scheduler.run(campaign(), &token).await;

        assert!(stats.interrupted);
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.attempted, 10);
        assert_eq!(stats.attempted % 10, 0);
        assert_eq!(stats.successful, 10);
        assert_eq!(stats.written, 10);
        assert_eq!(sink.rows.lock().unwrap().len(), 10);
        assert_eq!(
            &stats.history[1..],
            &[
                RunState::BatchRunning { batch: 1 },
                RunState::Cooldown,
                RunState::Interrupted,
                RunState::Finalizing,
                RunState::Done,
            ]
        );
    }
}
