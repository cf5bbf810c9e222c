//! Transfer state machine
//!
//! Defines the lifecycle events and the single transition function that
//! applies them. The transition set is closed: every `(status, event)` pair
//! is handled by one `match`, and every pair outside the table is refused
//! with [`TransferError::InvalidTransferState`].
//!
//! ```text
//! PENDING ──take──▶ PROCESSING ──success──▶ COMPLETED
//!    │                 │  ▲  │
//!    │ (no dest)       │  │  └──permanent──▶ REJECTED
//!    ▼                 │  │
//! REJECTED  recoverable│  │retry (budget left)
//!                      ▼  │
//!                     FAILED ──retry (exhausted)──▶ REJECTED
//! ```
//!
//! The function is pure over the transfer: it mutates status and bookkeeping
//! fields and returns the balance effect the caller must commit atomically
//! with the new status. Persistence and external calls live in the services.

use chrono::{DateTime, Utc};
use tracing::error;

use super::retry_policy::RetryPolicy;
use crate::types::{FailureReason, Transfer, TransferError, TransferStatus};

/// Inputs that drive a transfer through its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Scheduler or event trigger picked up a PENDING transfer
    TakeForProcessing { destination_exists: bool },
    /// Retry sweep picked up a FAILED transfer
    ScheduledRetry { destination_exists: bool },
    /// Processor accepted the transfer
    ExternalSuccess,
    /// Processor declined, raised a recoverable error or timed out
    RecoverableFailure { reason: FailureReason },
    /// Processor raised a permanent error
    PermanentFailure { reason: FailureReason },
    /// Transfer sat in PROCESSING past the reconciliation window
    ProcessingTimedOut,
}

impl TransferEvent {
    /// Status this event tries to reach, used when refusing it
    fn attempted(&self) -> TransferStatus {
        match self {
            TransferEvent::TakeForProcessing { .. } | TransferEvent::ScheduledRetry { .. } => {
                TransferStatus::Processing
            }
            TransferEvent::ExternalSuccess => TransferStatus::Completed,
            TransferEvent::RecoverableFailure { .. } | TransferEvent::ProcessingTimedOut => {
                TransferStatus::Failed
            }
            TransferEvent::PermanentFailure { .. } => TransferStatus::Rejected,
        }
    }
}

/// Balance change required by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    None,
    /// Credit the destination account with the transfer amount
    CreditDestination,
    /// Give the amount debited at creation back to the origin account
    RefundOrigin,
}

/// Apply `event` to `transfer`
///
/// # Arguments
///
/// * `transfer` - Transfer to move; left untouched on error
/// * `event` - The lifecycle event
/// * `policy` - Retry budget used by the failure and retry guards
/// * `now` - Timestamp written onto the transfer
///
/// # Returns
///
/// * `Ok(TransitionEffect)` - The balance change to commit with the new status
/// * `Err(TransferError::InvalidTransferState)` - The pair is outside the table
pub fn apply(
    transfer: &mut Transfer,
    event: TransferEvent,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> Result<TransitionEffect, TransferError> {
    use TransferEvent::*;
    use TransferStatus::*;

    let exhausted = policy.is_exhausted(transfer.retry_count);

    match (transfer.status, event) {
        (Pending, TakeForProcessing { destination_exists: true }) => {
            enter_processing(transfer, now);
            Ok(TransitionEffect::None)
        }
        (Pending, TakeForProcessing { destination_exists: false }) => {
            Ok(reject(transfer, FailureReason::AccountNotFound, now))
        }

        (Processing, ExternalSuccess) => {
            transfer.status = Completed;
            transfer.executed_at = Some(now);
            transfer.failure_reason = None;
            transfer.processing_started_at = None;
            Ok(TransitionEffect::CreditDestination)
        }
        (Processing, RecoverableFailure { .. }) | (Processing, ProcessingTimedOut) if exhausted => {
            Ok(reject(transfer, FailureReason::RetriesExhausted, now))
        }
        (Processing, RecoverableFailure { reason }) => {
            fail(transfer, reason, now);
            Ok(TransitionEffect::None)
        }
        (Processing, ProcessingTimedOut) => {
            fail(transfer, FailureReason::ProcessingTimedOut, now);
            Ok(TransitionEffect::None)
        }
        (Processing, PermanentFailure { reason }) => Ok(reject(transfer, reason, now)),

        (Failed, ScheduledRetry { .. }) if exhausted => {
            Ok(reject(transfer, FailureReason::RetriesExhausted, now))
        }
        (Failed, ScheduledRetry { destination_exists: true }) => {
            transfer.retry_count += 1;
            enter_processing(transfer, now);
            Ok(TransitionEffect::None)
        }
        (Failed, ScheduledRetry { destination_exists: false }) => {
            Ok(reject(transfer, FailureReason::AccountNotFound, now))
        }

        (current, event) => {
            let err = TransferError::invalid_state(
                &transfer.id.to_string(),
                current.as_str(),
                event.attempted().as_str(),
            );
            error!(
                transfer_id = %transfer.id,
                status = %current,
                ?event,
                "Refused transition outside the state table"
            );
            Err(err)
        }
    }
}

fn enter_processing(transfer: &mut Transfer, now: DateTime<Utc>) {
    transfer.status = TransferStatus::Processing;
    transfer.processing_started_at = Some(now);
}

fn fail(transfer: &mut Transfer, reason: FailureReason, now: DateTime<Utc>) {
    transfer.status = TransferStatus::Failed;
    transfer.last_retry_at = Some(now);
    transfer.failure_reason = Some(reason);
    transfer.processing_started_at = None;
}

fn reject(transfer: &mut Transfer, reason: FailureReason, now: DateTime<Utc>) -> TransitionEffect {
    transfer.status = TransferStatus::Rejected;
    transfer.failed_at = Some(now);
    transfer.failure_reason = Some(reason);
    transfer.processing_started_at = None;
    TransitionEffect::RefundOrigin
}
