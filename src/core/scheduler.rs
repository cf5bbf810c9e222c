//! Batch scheduler
//!
//! Pulls work out of the transfer repository and feeds it through the
//! process service. Three sweeps:
//!
//! - **pending**: PENDING transfers, oldest first
//! - **retry**: FAILED transfers with budget left, oldest retry first, and
//!   only once their backoff window has elapsed
//! - **reconciliation**: PROCESSING transfers abandoned past the stuck
//!   timeout, plus FAILED transfers whose budget is already used up
//!
//! Within a sweep transfers run concurrently, bounded by `max_concurrent`.
//! A failure on one transfer is logged and counted; it never aborts the
//! batch. Timing lives in [`BatchScheduler::run`]; each sweep is a plain
//! function of the store's contents and the clock.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::bounded::bounded;
use super::clock::Clock;
use super::process_service::{ProcessOutcome, ProcessTransferService};
use super::traits::{Ports, TransferRepository};
use crate::config::SchedulerConfig;
use crate::types::{Transfer, TransferError, TransferStatus};

/// Counts for one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Transfers returned by the repository query
    pub fetched: usize,
    pub completed: usize,
    pub failed: usize,
    pub rejected: usize,
    /// Taken by another worker, or nothing to do
    pub skipped: usize,
    /// Still inside their backoff window
    pub deferred: usize,
    /// Attempts that ended in an error
    pub errored: usize,
}

impl SweepReport {
    fn record(&mut self, result: &Result<ProcessOutcome, TransferError>) {
        match result {
            Ok(ProcessOutcome::Settled(view)) => match view.status {
                TransferStatus::Completed => self.completed += 1,
                TransferStatus::Failed => self.failed += 1,
                TransferStatus::Rejected => self.rejected += 1,
                TransferStatus::Pending | TransferStatus::Processing => self.skipped += 1,
            },
            Ok(ProcessOutcome::Skipped { .. }) => self.skipped += 1,
            Err(_) => self.errored += 1,
        }
    }

    /// Transfers that reached an outcome, including skips and errors
    pub fn total_handled(&self) -> usize {
        self.completed + self.failed + self.rejected + self.skipped + self.errored
    }

    /// Add another report's counts to this one
    pub fn merge(&mut self, other: &SweepReport) {
        self.fetched += other.fetched;
        self.completed += other.completed;
        self.failed += other.failed;
        self.rejected += other.rejected;
        self.skipped += other.skipped;
        self.deferred += other.deferred;
        self.errored += other.errored;
    }
}

/// Result of [`BatchScheduler::run_until_settled`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettleSummary {
    pub rounds: usize,
    pub totals: SweepReport,
    /// False when `max_rounds` ran out with work still outstanding
    pub settled: bool,
    /// Transfers not yet COMPLETED or REJECTED when the run stopped
    pub outstanding: usize,
}

pub struct BatchScheduler {
    transfers: Arc<dyn TransferRepository>,
    service: Arc<ProcessTransferService>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    storage_timeout: Duration,
}

impl BatchScheduler {
    pub fn new(
        ports: &Ports,
        service: Arc<ProcessTransferService>,
        config: SchedulerConfig,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            transfers: Arc::clone(&ports.transfers),
            service,
            clock: Arc::clone(&ports.clock),
            config,
            storage_timeout,
        }
    }

    /// Process the oldest PENDING transfers
    pub async fn run_pending_sweep(&self) -> Result<SweepReport, TransferError> {
        let batch = bounded(
            "find_pending_transfers",
            self.storage_timeout,
            self.transfers
                .find_pending_transfers(self.config.pending_batch_size),
        )
        .await?;

        let report = self
            .process_batch(batch, |service, transfer| async move { service.process(transfer).await })
            .await;
        log_sweep("pending", &report);
        Ok(report)
    }

    /// Retry FAILED transfers whose backoff has elapsed
    pub async fn run_retry_sweep(&self) -> Result<SweepReport, TransferError> {
        let policy = *self.service.policy();
        let candidates = bounded(
            "find_retryable_transfers",
            self.storage_timeout,
            self.transfers
                .find_retryable_transfers(policy.max_retries(), self.config.retry_batch_size),
        )
        .await?;

        let now = self.clock.now();
        let fetched = candidates.len();
        let (due, waiting): (Vec<Transfer>, Vec<Transfer>) =
            candidates.into_iter().partition(|t| policy.is_due(t, now));

        let mut report = self
            .process_batch(due, |service, transfer| async move { service.process(transfer).await })
            .await;
        report.fetched = fetched;
        report.deferred = waiting.len();
        log_sweep("retry", &report);
        Ok(report)
    }

    /// Time out abandoned PROCESSING transfers and reject exhausted ones
    pub async fn run_reconciliation_sweep(&self) -> Result<SweepReport, TransferError> {
        let stuck_timeout = chrono::Duration::from_std(self.config.stuck_processing_timeout())
            .unwrap_or(chrono::Duration::MAX);
        let started_before = self
            .clock
            .now()
            .checked_sub_signed(stuck_timeout)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

        let stuck = bounded(
            "find_stuck_processing",
            self.storage_timeout,
            self.transfers
                .find_stuck_processing(started_before, self.config.retry_batch_size),
        )
        .await?;
        let mut report = self
            .process_batch(stuck, |service, transfer| async move {
                service.reconcile_stuck(transfer).await
            })
            .await;

        let exhausted = bounded(
            "find_exhausted_transfers",
            self.storage_timeout,
            self.transfers.find_exhausted_transfers(
                self.service.policy().max_retries(),
                self.config.retry_batch_size,
            ),
        )
        .await?;
        let exhausted_report = self
            .process_batch(exhausted, |service, transfer| async move { service.process(transfer).await })
            .await;

        report.merge(&exhausted_report);
        log_sweep("reconciliation", &report);
        Ok(report)
    }

    /// Drive all three sweeps on their intervals until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let mut pending = tokio::time::interval(self.config.pending_interval());
        let mut retry = tokio::time::interval(self.config.retry_interval());
        let mut reconcile = tokio::time::interval(self.config.reconciliation_interval());
        for interval in [&mut pending, &mut retry, &mut reconcile] {
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        info!(
            pending_interval_ms = self.config.pending_interval_ms,
            retry_interval_ms = self.config.retry_interval_ms,
            reconciliation_interval_ms = self.config.reconciliation_interval_ms,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = pending.tick() => log_sweep_error("pending", self.run_pending_sweep().await),
                _ = retry.tick() => log_sweep_error("retry", self.run_retry_sweep().await),
                _ = reconcile.tick() => log_sweep_error("reconciliation", self.run_reconciliation_sweep().await),
            }
        }

        info!("Scheduler stopped");
    }

    /// Run rounds of all three sweeps until every transfer is COMPLETED or
    /// REJECTED
    ///
    /// A round that only found transfers still inside their backoff window
    /// sleeps for the retry interval before the next one. So does a round
    /// that found nothing while transfers remain in PROCESSING: those are
    /// only picked up again once the stuck timeout has passed.
    ///
    /// # Arguments
    ///
    /// * `max_rounds` - Upper bound on rounds; `settled` is false if reached
    pub async fn run_until_settled(&self, max_rounds: usize) -> Result<SettleSummary, TransferError> {
        let mut summary = SettleSummary::default();

        while summary.rounds < max_rounds {
            summary.rounds += 1;

            let mut round = self.run_pending_sweep().await?;
            round.merge(&self.run_retry_sweep().await?);
            round.merge(&self.run_reconciliation_sweep().await?);
            summary.totals.merge(&round);

            if round.fetched == 0 {
                summary.outstanding = self.count_outstanding().await?;
                if summary.outstanding == 0 {
                    summary.settled = true;
                    break;
                }
                debug!(
                    outstanding = summary.outstanding,
                    "Transfers still in PROCESSING, waiting for reconciliation"
                );
                tokio::time::sleep(self.config.retry_interval()).await;
            } else if round.total_handled() == 0 && round.deferred > 0 {
                debug!(deferred = round.deferred, "Waiting for backoff windows");
                tokio::time::sleep(self.config.retry_interval()).await;
            }
        }

        if !summary.settled {
            summary.outstanding = self.count_outstanding().await?;
            warn!(
                rounds = summary.rounds,
                outstanding = summary.outstanding,
                "Stopped before all transfers settled"
            );
        }
        Ok(summary)
    }

    /// Transfers not yet in a terminal status
    async fn count_outstanding(&self) -> Result<usize, TransferError> {
        let transfers = bounded(
            "find_all_transfers",
            self.storage_timeout,
            self.transfers.find_all(),
        )
        .await?;
        Ok(transfers
            .iter()
            .filter(|t| !t.status().is_terminal())
            .count())
    }

    /// Run `f` over `batch` with bounded concurrency
    async fn process_batch<F, Fut>(&self, batch: Vec<Transfer>, f: F) -> SweepReport
    where
        F: Fn(Arc<ProcessTransferService>, Transfer) -> Fut,
        Fut: Future<Output = Result<ProcessOutcome, TransferError>>,
    {
        let mut report = SweepReport {
            fetched: batch.len(),
            ..SweepReport::default()
        };

        let results: Vec<(String, Result<ProcessOutcome, TransferError>)> = stream::iter(batch)
            .map(|transfer| {
                let id = transfer.id().to_string();
                let attempt = f(Arc::clone(&self.service), transfer);
                async move { (id, attempt.await) }
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        for (transfer_id, result) in &results {
            match result {
                Err(e) if e.is_contract_violation() => {
                    error!(transfer_id = %transfer_id, error = %e, code = e.code(), "Refused transition in sweep")
                }
                Err(e) => {
                    warn!(transfer_id = %transfer_id, error = %e, code = e.code(), "Transfer failed in sweep")
                }
                Ok(_) => {}
            }
            report.record(result);
        }
        report
    }
}

fn log_sweep(sweep: &str, report: &SweepReport) {
    if report.fetched == 0 {
        debug!(sweep, "Sweep found no work");
        return;
    }
    info!(
        sweep,
        fetched = report.fetched,
        completed = report.completed,
        failed = report.failed,
        rejected = report.rejected,
        skipped = report.skipped,
        deferred = report.deferred,
        errored = report.errored,
        "Sweep finished"
    );
}

fn log_sweep_error(sweep: &str, result: Result<SweepReport, TransferError>) {
    if let Err(e) = result {
        warn!(sweep, error = %e, "Sweep could not run");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transfer::fixtures::pending_transfer;
    use crate::types::TransferId;

    fn settled(status: TransferStatus) -> Result<ProcessOutcome, TransferError> {
        let mut transfer = pending_transfer("K1", "origin", 2, 100);
        transfer.status = status;
        Ok(ProcessOutcome::Settled(transfer.view()))
    }

    #[test]
    fn test_report_counts_each_outcome() {
        let mut report = SweepReport::default();
        report.record(&settled(TransferStatus::Completed));
        report.record(&settled(TransferStatus::Failed));
        report.record(&settled(TransferStatus::Rejected));
        report.record(&Ok(ProcessOutcome::Skipped {
            transfer_id: TransferId::new(),
            status: TransferStatus::Processing,
        }));
        report.record(&Err(TransferError::transfer_not_found("x")));

        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errored, 1);
        assert_eq!(report.total_handled(), 5);
    }

    #[test]
    fn test_merge_adds_counts() {
        let mut total = SweepReport {
            fetched: 2,
            completed: 1,
            deferred: 1,
            ..SweepReport::default()
        };
        total.merge(&SweepReport {
            fetched: 3,
            rejected: 2,
            errored: 1,
            ..SweepReport::default()
        });

        assert_eq!(total.fetched, 5);
        assert_eq!(total.completed, 1);
        assert_eq!(total.rejected, 2);
        assert_eq!(total.deferred, 1);
        assert_eq!(total.errored, 1);
    }
}
