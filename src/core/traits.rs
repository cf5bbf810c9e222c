//! Port traits for storage and external collaborators
//!
//! The lifecycle services depend only on these traits. Storage is expected to
//! provide strong read-after-write consistency, a unique constraint on the
//! idempotency key and compare-and-swap writes on the entity `version`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::clock::Clock;
use crate::types::{
    Account, AccountId, AccountNumber, DeliveryError, IdempotencyKey, ProcessorError,
    StorageResult, Transfer, TransferData, TransferId,
};

/// Durable storage for transfers
///
/// `save` is a compare-and-swap on `version`: a new transfer (version 0)
/// must not exist yet and its idempotency key must be unused; an existing
/// one must still be stored at the version it was loaded with. The stored
/// copy, with its version bumped, is returned.
#[async_trait]
pub trait TransferRepository: Send + Sync {
    async fn save(&self, transfer: &Transfer) -> StorageResult<Transfer>;

    async fn find_by_id(&self, id: TransferId) -> StorageResult<Option<Transfer>>;

    async fn find_by_idempotency_key(&self, key: &IdempotencyKey)
        -> StorageResult<Option<Transfer>>;

    /// PENDING transfers, oldest `created_at` first
    async fn find_pending_transfers(&self, limit: usize) -> StorageResult<Vec<Transfer>>;

    /// FAILED transfers with `retry_count < max_retries`, oldest `last_retry_at` first
    async fn find_retryable_transfers(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> StorageResult<Vec<Transfer>>;

    /// FAILED transfers with `retry_count >= max_retries`
    async fn find_exhausted_transfers(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> StorageResult<Vec<Transfer>>;

    /// PROCESSING transfers that entered processing before `started_before`
    async fn find_stuck_processing(
        &self,
        started_before: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Transfer>>;

    /// All transfers, for reporting
    async fn find_all(&self) -> StorageResult<Vec<Transfer>>;
}

/// Durable storage for accounts
///
/// `save` follows the same compare-and-swap contract as transfers, plus
/// unique account number and alias.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn save(&self, account: &Account) -> StorageResult<Account>;

    async fn find_by_id(&self, id: &AccountId) -> StorageResult<Option<Account>>;

    async fn find_by_account_number(
        &self,
        account_number: &AccountNumber,
    ) -> StorageResult<Option<Account>>;

    async fn exists_by_account_number(&self, account_number: &AccountNumber) -> StorageResult<bool>;

    /// All accounts, for reporting
    async fn find_all(&self) -> StorageResult<Vec<Account>>;
}

/// Entities to persist together
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub transfers: Vec<Transfer>,
    pub accounts: Vec<Account>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transfer(mut self, transfer: Transfer) -> Self {
        self.transfers.push(transfer);
        self
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.accounts.push(account);
        self
    }
}

/// Stored copies returned from a successful commit, in ChangeSet order
#[derive(Debug, Clone, Default)]
pub struct CommittedChanges {
    pub transfers: Vec<Transfer>,
    pub accounts: Vec<Account>,
}

/// Atomic multi-entity write
///
/// Either every entity in the change set is written or none is visible.
/// The same compare-and-swap and unique rules as the repositories apply.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn commit(&self, changes: ChangeSet) -> StorageResult<CommittedChanges>;
}

/// External settlement processor
///
/// `Ok(true)` means accepted, `Ok(false)` declined but retryable. The call
/// may be repeated for the same transfer, so implementations must be
/// idempotent on `data.idempotency_key`.
#[async_trait]
pub trait ExternalProcessor: Send + Sync {
    async fn process_transfer(&self, data: &TransferData) -> Result<bool, ProcessorError>;
}

/// Best-effort outcome notifications
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn notify_completed(&self, data: &TransferData) -> Result<(), DeliveryError>;

    async fn notify_failed(&self, data: &TransferData, reason: &str) -> Result<(), DeliveryError>;
}

/// "Transfer created" signal, decoupled from the create transaction
pub trait TransferEventPublisher: Send + Sync {
    fn publish_created(&self, data: TransferData) -> Result<(), DeliveryError>;
}

/// Publisher that drops every signal, for scheduler-only deployments
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventPublisher;

impl TransferEventPublisher for NoopEventPublisher {
    fn publish_created(&self, _data: TransferData) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Collaborators shared by the lifecycle services
#[derive(Clone)]
pub struct Ports {
    pub transfers: Arc<dyn TransferRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub unit_of_work: Arc<dyn UnitOfWork>,
    pub processor: Arc<dyn ExternalProcessor>,
    pub notifier: Arc<dyn NotificationPort>,
    pub events: Arc<dyn TransferEventPublisher>,
    pub clock: Arc<dyn Clock>,
}

impl Ports {
    /// Wire every storage port to one store
    pub fn with_store<S>(
        store: Arc<S>,
        processor: Arc<dyn ExternalProcessor>,
        notifier: Arc<dyn NotificationPort>,
        events: Arc<dyn TransferEventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: TransferRepository + AccountRepository + UnitOfWork + 'static,
    {
        Self {
            transfers: store.clone(),
            accounts: store.clone(),
            unit_of_work: store,
            processor,
            notifier,
            events,
            clock,
        }
    }
}
