//! Retry policy
//!
//! Pure computation over a transfer's `retry_count` and `last_retry_at`.
//! Nothing here is stored; the answer is re-derived on every sweep.
//!
//! # Counting
//!
//! `retry_count` is the number of retries already started. A transfer gets
//! one initial attempt plus `max_retries` retries, so with the default of 3
//! the processor is called at most four times.
//!
//! # Backoff
//!
//! The delay before retry number `n` (1-based) is `base * 2^(n-1)`, capped at
//! `max_backoff`. A zero base leaves pacing to the sweep cadence alone.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::types::{Transfer, TransferStatus};

/// Default retry budget
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_base: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
            max_backoff,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether a transfer with `retry_count` retries has used its budget
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// Whether the transfer may be taken back into processing
    pub fn can_retry(&self, transfer: &Transfer) -> bool {
        transfer.status() == TransferStatus::Failed && !self.is_exhausted(transfer.retry_count())
    }

    /// Retries left before the transfer is rejected
    pub fn remaining_attempts(&self, transfer: &Transfer) -> u32 {
        self.max_retries.saturating_sub(transfer.retry_count())
    }

    /// Delay to wait after the failure that left `retry_count` retries started
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        if self.backoff_base.is_zero() {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Earliest instant the next retry may start
    ///
    /// `None` when the transfer has never failed.
    pub fn next_attempt_at(&self, transfer: &Transfer) -> Option<DateTime<Utc>> {
        let last = transfer.last_retry_at()?;
        let delay = chrono::Duration::from_std(self.backoff_delay(transfer.retry_count()))
            .unwrap_or(chrono::Duration::MAX);
        Some(last.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Whether the backoff window has elapsed at `now`
    pub fn is_due(&self, transfer: &Transfer, now: DateTime<Utc>) -> bool {
        match self.next_attempt_at(transfer) {
            Some(at) => at <= now,
            None => true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::ZERO,
            max_backoff: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transfer::fixtures::pending_transfer;
    use crate::types::FailureReason;
    use rstest::rstest;

    fn failed(retry_count: u32, last_retry_at: DateTime<Utc>) -> Transfer {
        let mut transfer = pending_transfer("K1", "origin", 2, 1000);
        transfer.status = TransferStatus::Failed;
        transfer.retry_count = retry_count;
        transfer.last_retry_at = Some(last_retry_at);
        transfer.failure_reason = Some(FailureReason::ProcessorDeclined);
        transfer
    }

    fn exponential() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(5))
    }

    #[rstest]
    #[case::fresh(0, true, 3)]
    #[case::one_retry(1, true, 2)]
    #[case::two_retries(2, true, 1)]
    #[case::exhausted(3, false, 0)]
    fn test_can_retry_and_remaining(
        #[case] retry_count: u32,
        #[case] retryable: bool,
        #[case] remaining: u32,
    ) {
        let policy = RetryPolicy::default();
        let transfer = failed(retry_count, Utc::now());
        assert_eq!(policy.can_retry(&transfer), retryable);
        assert_eq!(policy.remaining_attempts(&transfer), remaining);
    }

    #[test]
    fn test_only_failed_transfers_retry() {
        let policy = RetryPolicy::default();
        let transfer = pending_transfer("K1", "origin", 2, 1000);
        assert!(!policy.can_retry(&transfer));
    }

    #[rstest]
    #[case::first_retry(0, 1)]
    #[case::second_retry(1, 2)]
    #[case::third_retry(2, 4)]
    #[case::capped(3, 5)]
    #[case::huge_count(40, 5)]
    fn test_backoff_doubles_until_cap(#[case] retry_count: u32, #[case] secs: u64) {
        assert_eq!(exponential().backoff_delay(retry_count), Duration::from_secs(secs));
    }

    #[test]
    fn test_zero_base_disables_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(2), Duration::ZERO);
        assert!(policy.is_due(&failed(2, Utc::now()), Utc::now()));
    }

    #[test]
    fn test_is_due_after_backoff_window() {
        let policy = exponential();
        let failed_at = Utc::now();
        let transfer = failed(1, failed_at);

        assert!(!policy.is_due(&transfer, failed_at + chrono::Duration::milliseconds(1999)));
        assert!(policy.is_due(&transfer, failed_at + chrono::Duration::seconds(2)));
    }

    #[test]
    fn test_never_failed_is_due() {
        let policy = exponential();
        let transfer = pending_transfer("K1", "origin", 2, 1000);
        assert_eq!(policy.next_attempt_at(&transfer), None);
        assert!(policy.is_due(&transfer, Utc::now()));
    }
}
