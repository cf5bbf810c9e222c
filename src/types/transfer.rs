//! Transfer-related types for the transfer engine
//!
//! This module defines the Transfer record, its status, failure reasons and
//! the two projections handed to collaborators: [`TransferView`] for callers
//! and [`TransferData`] for the external processor and notification ports.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::account::{AccountId, AccountNumber};
use super::error::TransferError;

/// Transfer identifier
///
/// ULID based: unique without coordination and sortable by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    /// Generate a new unique TransferId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Client-supplied idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Parse a key, rejecting blank input
    pub fn parse(value: &str) -> Result<Self, TransferError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(TransferError::BlankIdempotencyKey);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transfer lifecycle status
///
/// `Completed` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Rejected,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Processing => "PROCESSING",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Failed => "FAILED",
            TransferStatus::Rejected => "REJECTED",
        }
    }

    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Rejected)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transfer failed or was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Destination account number does not resolve
    AccountNotFound,
    /// Processor answered "not accepted" without raising
    ProcessorDeclined,
    /// Processor raised a recoverable error
    ProcessorUnavailable { message: String },
    /// Processor call exceeded its time bound
    ProcessorTimeout,
    /// Processor raised a permanent error
    ProcessorRejected { code: String, message: String },
    /// Retry budget used up
    RetriesExhausted,
    /// Transfer stayed in PROCESSING past the reconciliation window
    ProcessingTimedOut,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::AccountNotFound => f.write_str("account not found"),
            FailureReason::ProcessorDeclined => f.write_str("declined by processor"),
            FailureReason::ProcessorUnavailable { message } => {
                write!(f, "processor unavailable: {}", message)
            }
            FailureReason::ProcessorTimeout => f.write_str("processor timeout"),
            FailureReason::ProcessorRejected { code, message } => {
                write!(f, "rejected by processor [{}]: {}", code, message)
            }
            FailureReason::RetriesExhausted => f.write_str("retries exhausted"),
            FailureReason::ProcessingTimedOut => f.write_str("processing timed out"),
        }
    }
}

/// Transfer record
///
/// Built with [`Transfer::create`] in PENDING or rehydrated with
/// [`Transfer::reconstruct`]. Status and retry bookkeeping change only through
/// the state machine in `core::state_machine`; the amount never changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub(crate) id: TransferId,
    pub(crate) idempotency_key: IdempotencyKey,
    pub(crate) origin_account_id: AccountId,
    pub(crate) target_account_number: AccountNumber,
    pub(crate) amount: Decimal,
    pub(crate) description: String,
    pub(crate) status: TransferStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) executed_at: Option<DateTime<Utc>>,
    pub(crate) failed_at: Option<DateTime<Utc>>,
    pub(crate) failure_reason: Option<FailureReason>,
    pub(crate) retry_count: u32,
    pub(crate) last_retry_at: Option<DateTime<Utc>>,
    pub(crate) processing_started_at: Option<DateTime<Utc>>,
    pub(crate) version: u64,
}

/// Stored shape of a transfer, used to rehydrate one
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSnapshot {
    pub id: TransferId,
    pub idempotency_key: IdempotencyKey,
    pub origin_account_id: AccountId,
    pub target_account_number: AccountNumber,
    pub amount: Decimal,
    pub description: String,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<FailureReason>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Transfer {
    /// Create a new transfer in PENDING
    ///
    /// Input validation (bounds, blank description) happens in the create
    /// service before this is called.
    pub fn create(
        idempotency_key: IdempotencyKey,
        origin_account_id: AccountId,
        target_account_number: AccountNumber,
        amount: Decimal,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransferId::new(),
            idempotency_key,
            origin_account_id,
            target_account_number,
            amount,
            description: description.into(),
            status: TransferStatus::Pending,
            created_at,
            executed_at: None,
            failed_at: None,
            failure_reason: None,
            retry_count: 0,
            last_retry_at: None,
            processing_started_at: None,
            version: 0,
        }
    }

    /// Rehydrate a transfer from storage
    pub fn reconstruct(snapshot: TransferSnapshot) -> Self {
        Self {
            id: snapshot.id,
            idempotency_key: snapshot.idempotency_key,
            origin_account_id: snapshot.origin_account_id,
            target_account_number: snapshot.target_account_number,
            amount: snapshot.amount,
            description: snapshot.description,
            status: snapshot.status,
            created_at: snapshot.created_at,
            executed_at: snapshot.executed_at,
            failed_at: snapshot.failed_at,
            failure_reason: snapshot.failure_reason,
            retry_count: snapshot.retry_count,
            last_retry_at: snapshot.last_retry_at,
            processing_started_at: snapshot.processing_started_at,
            version: snapshot.version,
        }
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    pub fn origin_account_id(&self) -> &AccountId {
        &self.origin_account_id
    }

    pub fn target_account_number(&self) -> &AccountNumber {
        &self.target_account_number
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn executed_at(&self) -> Option<DateTime<Utc>> {
        self.executed_at
    }

    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        self.failed_at
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        self.failure_reason.as_ref()
    }

    /// Retries started so far
    ///
    /// Counts FAILED → PROCESSING moves, not failures: after the first
    /// recoverable failure it is still 0.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_retry_at(&self) -> Option<DateTime<Utc>> {
        self.last_retry_at
    }

    pub fn processing_started_at(&self) -> Option<DateTime<Utc>> {
        self.processing_started_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Caller-facing projection
    pub fn view(&self) -> TransferView {
        TransferView {
            id: self.id,
            idempotency_key: self.idempotency_key.to_string(),
            origin_account_id: self.origin_account_id.to_string(),
            target_account_number: self.target_account_number.to_string(),
            amount: self.amount,
            description: self.description.clone(),
            status: self.status,
            created_at: self.created_at,
            executed_at: self.executed_at,
            failed_at: self.failed_at,
            failure_reason: self.failure_reason.as_ref().map(|r| r.to_string()),
            retry_count: self.retry_count,
        }
    }

    /// Immutable data sent to the processor and notification ports
    pub fn data(&self) -> TransferData {
        TransferData {
            transfer_id: self.id,
            origin_account_id: self.origin_account_id.clone(),
            target_account_number: self.target_account_number.clone(),
            amount: self.amount,
            description: self.description.clone(),
            idempotency_key: self.idempotency_key.clone(),
        }
    }

    /// Copy of this transfer at a new stored version
    pub(crate) fn with_version(&self, version: u64) -> Self {
        let mut transfer = self.clone();
        transfer.version = version;
        transfer
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer[{}] {} -> {} amount={} status={} retries={}",
            self.id,
            self.origin_account_id,
            self.target_account_number,
            self.amount,
            self.status,
            self.retry_count
        )
    }
}

/// Caller-facing view of a transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferView {
    pub id: TransferId,
    pub idempotency_key: String,
    pub origin_account_id: String,
    pub target_account_number: String,
    pub amount: Decimal,
    pub description: String,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    /// Retries started, not failures seen; see [`Transfer::retry_count`]
    pub retry_count: u32,
}

/// Transfer payload for the external processor and notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferData {
    pub transfer_id: TransferId,
    pub origin_account_id: AccountId,
    pub target_account_number: AccountNumber,
    pub amount: Decimal,
    pub description: String,
    pub idempotency_key: IdempotencyKey,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::types::account::fixtures::account_number;

    pub fn pending_transfer(key: &str, origin: &str, target_suffix: u32, cents: i64) -> Transfer {
        Transfer::create(
            IdempotencyKey::parse(key).unwrap(),
            AccountId::new(origin),
            account_number(target_suffix),
            Decimal::new(cents, 2),
            "rent",
            Utc::now(),
        )
    }
}
