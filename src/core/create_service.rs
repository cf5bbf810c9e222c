//! Idempotent transfer creation
//!
//! The create path validates a request, debits the origin account and
//! persists the debited account together with the new PENDING transfer in a
//! single unit of work. A debit never exists without its transfer and vice
//! versa.
//!
//! # Idempotency
//!
//! A request whose idempotency key is already stored returns the stored
//! transfer's view as-is: no validation, no debit and no event. A concurrent
//! request that loses the race for the same key hits the unique constraint
//! at commit time and also returns the winner's view.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bounded::bounded;
use super::clock::Clock;
use super::traits::{AccountRepository, ChangeSet, Ports, TransferEventPublisher, TransferRepository, UnitOfWork};
use crate::config::{CreateConfig, LimitsConfig};
use crate::types::{
    AccountId, AccountNumber, IdempotencyKey, StorageError, Transfer, TransferError, TransferView,
};

/// Client request to move `amount` from an account to an account number
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTransferRequest {
    pub origin_account_id: String,
    pub target_account_number: String,
    pub amount: Decimal,
    pub description: String,
    pub idempotency_key: String,
}

pub struct CreateTransferService {
    transfers: Arc<dyn TransferRepository>,
    accounts: Arc<dyn AccountRepository>,
    unit_of_work: Arc<dyn UnitOfWork>,
    events: Arc<dyn TransferEventPublisher>,
    clock: Arc<dyn Clock>,
    limits: LimitsConfig,
    conflict_retries: u32,
    storage_timeout: Duration,
}

/// Outcome of one create attempt against a snapshot of the origin account
enum Attempt {
    Created(TransferView),
    /// The origin account changed under us; load it again
    Conflict,
}

impl CreateTransferService {
    pub fn new(
        ports: &Ports,
        limits: LimitsConfig,
        create: &CreateConfig,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            transfers: Arc::clone(&ports.transfers),
            accounts: Arc::clone(&ports.accounts),
            unit_of_work: Arc::clone(&ports.unit_of_work),
            events: Arc::clone(&ports.events),
            clock: Arc::clone(&ports.clock),
            limits,
            conflict_retries: create.conflict_retries,
            storage_timeout,
        }
    }

    /// Create a transfer, or return the one already stored under its key
    ///
    /// # Returns
    ///
    /// * `Ok(TransferView)` - The new PENDING transfer, or the stored transfer
    ///   for a replayed idempotency key (in whatever status it has reached)
    /// * `Err(TransferError)` - Validation, not-found or funds errors; nothing
    ///   was persisted
    pub async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<TransferView, TransferError> {
        let key = IdempotencyKey::parse(&request.idempotency_key)?;

        if let Some(existing) = bounded(
            "find_by_idempotency_key",
            self.storage_timeout,
            self.transfers.find_by_idempotency_key(&key),
        )
        .await?
        {
            info!(
                idempotency_key = %key,
                transfer_id = %existing.id(),
                status = %existing.status(),
                "Idempotent replay, returning stored transfer"
            );
            return Ok(existing.view());
        }

        self.validate_input(&request)?;
        let target = AccountNumber::parse(&request.target_account_number)?;
        let origin_id = AccountId::new(request.origin_account_id.trim());

        for attempt in 0..=self.conflict_retries {
            match self.try_create(&key, &origin_id, &target, &request).await? {
                Attempt::Created(view) => return Ok(view),
                Attempt::Conflict => {
                    debug!(
                        account_id = %origin_id,
                        attempt,
                        "Origin account modified concurrently, retrying create"
                    );
                }
            }
        }

        warn!(
            account_id = %origin_id,
            idempotency_key = %key,
            "Giving up create after repeated account conflicts"
        );
        Err(TransferError::concurrent_modification("account", origin_id.as_str()))
    }

    fn validate_input(&self, request: &CreateTransferRequest) -> Result<(), TransferError> {
        let min_amount = self.limits.min_amount;
        let max_amount = self.limits.max_amount;
        if request.amount < min_amount || request.amount > max_amount {
            return Err(TransferError::invalid_amount(request.amount, min_amount, max_amount));
        }
        if request.description.trim().is_empty() {
            return Err(TransferError::BlankDescription);
        }
        Ok(())
    }

    async fn try_create(
        &self,
        key: &IdempotencyKey,
        origin_id: &AccountId,
        target: &AccountNumber,
        request: &CreateTransferRequest,
    ) -> Result<Attempt, TransferError> {
        let mut origin = bounded(
            "find_account_by_id",
            self.storage_timeout,
            self.accounts.find_by_id(origin_id),
        )
        .await?
        .ok_or_else(|| TransferError::account_not_found(origin_id.as_str()))?;

        if origin.account_number() == target {
            return Err(TransferError::same_account_transfer(origin.account_number().as_str()));
        }

        let destination_exists = bounded(
            "exists_by_account_number",
            self.storage_timeout,
            self.accounts.exists_by_account_number(target),
        )
        .await?;
        if !destination_exists {
            return Err(TransferError::destination_not_found(target.as_str()));
        }

        if !origin.has_sufficient_funds(request.amount) {
            return Err(TransferError::insufficient_funds(
                origin_id.as_str(),
                request.amount,
                origin.balance(),
            ));
        }

        let transfer = Transfer::create(
            key.clone(),
            origin_id.clone(),
            target.clone(),
            request.amount,
            request.description.trim(),
            self.clock.now(),
        );
        origin.debit(request.amount)?;

        let changes = ChangeSet::new().with_transfer(transfer).with_account(origin);
        let committed = match bounded("commit", self.storage_timeout, self.unit_of_work.commit(changes)).await {
            Ok(committed) => committed,
            Err(StorageError::DuplicateIdempotencyKey { .. }) => {
                return self.lost_key_race(key).await.map(Attempt::Created);
            }
            Err(StorageError::VersionConflict { ref entity, .. }) if entity == "account" => {
                return Ok(Attempt::Conflict);
            }
            Err(e) => return Err(e.into()),
        };

        let stored = committed
            .transfers
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::unavailable("commit returned no transfer"))?;

        info!(
            transfer_id = %stored.id(),
            idempotency_key = %key,
            origin = %stored.origin_account_id(),
            target = %stored.target_account_number(),
            amount = %stored.amount(),
            "Transfer created"
        );

        if let Err(e) = self.events.publish_created(stored.data()) {
            warn!(transfer_id = %stored.id(), error = %e, "Failed to publish transfer created event");
        }

        Ok(Attempt::Created(stored.view()))
    }

    /// Another request committed the same key between our lookup and commit
    async fn lost_key_race(&self, key: &IdempotencyKey) -> Result<TransferView, TransferError> {
        let winner = bounded(
            "find_by_idempotency_key",
            self.storage_timeout,
            self.transfers.find_by_idempotency_key(key),
        )
        .await?
        .ok_or_else(|| TransferError::concurrent_modification("transfer", key.as_str()))?;

        info!(
            idempotency_key = %key,
            transfer_id = %winner.id(),
            "Lost idempotency race, returning winning transfer"
        );
        Ok(winner.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SystemClock;
    use crate::core::store::InMemoryStore;
    use crate::core::traits::NoopEventPublisher;
    use crate::types::account::fixtures::{account, account_number};
    use crate::types::{DeliveryError, TransferData, TransferStatus};
    use crate::adapters::{LoggingNotifier, SimulatedProcessor};
    use rstest::rstest;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<TransferData>>,
    }

    impl TransferEventPublisher for RecordingPublisher {
        fn publish_created(&self, data: TransferData) -> Result<(), DeliveryError> {
            self.published.lock().unwrap().push(data);
            Ok(())
        }
    }

    struct FailingPublisher;

    impl TransferEventPublisher for FailingPublisher {
        fn publish_created(&self, _data: TransferData) -> Result<(), DeliveryError> {
            Err(DeliveryError::new("events", "closed"))
        }
    }

    async fn setup(events: Arc<dyn TransferEventPublisher>) -> (Arc<InMemoryStore>, CreateTransferService) {
        setup_funded(events, 50000).await
    }

    async fn setup_funded(
        events: Arc<dyn TransferEventPublisher>,
        origin_cents: i64,
    ) -> (Arc<InMemoryStore>, CreateTransferService) {
        let store = Arc::new(InMemoryStore::new());
        AccountRepository::save(store.as_ref(), &account("origin", 1, Decimal::new(origin_cents, 2)))
            .await
            .unwrap();
        AccountRepository::save(store.as_ref(), &account("dest", 2, Decimal::ZERO))
            .await
            .unwrap();

        let ports = Ports {
            transfers: store.clone(),
            accounts: store.clone(),
            unit_of_work: store.clone(),
            processor: Arc::new(SimulatedProcessor::new()),
            notifier: Arc::new(LoggingNotifier),
            events,
            clock: Arc::new(SystemClock),
        };
        let service = CreateTransferService::new(
            &ports,
            LimitsConfig::default(),
            &CreateConfig::default(),
            Duration::from_secs(1),
        );
        (store, service)
    }

    fn request(key: &str, cents: i64) -> CreateTransferRequest {
        CreateTransferRequest {
            origin_account_id: "origin".to_string(),
            target_account_number: account_number(2).to_string(),
            amount: Decimal::new(cents, 2),
            description: "rent".to_string(),
            idempotency_key: key.to_string(),
        }
    }

    async fn balance(store: &InMemoryStore, id: &str) -> Decimal {
        AccountRepository::find_by_id(store, &AccountId::new(id))
            .await
            .unwrap()
            .unwrap()
            .balance()
    }

    #[tokio::test]
    async fn test_create_debits_origin_and_persists_pending() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (store, service) = setup(publisher.clone()).await;

        let view = service.create_transfer(request("K1", 10050)).await.unwrap();

        assert_eq!(view.status, TransferStatus::Pending);
        assert_eq!(balance(&store, "origin").await, Decimal::new(39950, 2));
        let stored = store
            .find_by_idempotency_key(&IdempotencyKey::parse("K1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id(), view.id);
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_returns_same_transfer_without_second_debit() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (store, service) = setup(publisher.clone()).await;

        let first = service.create_transfer(request("K1", 10000)).await.unwrap();
        let second = service.create_transfer(request("K1", 10000)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(balance(&store, "origin").await, Decimal::new(40000, 2));
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_skips_validation() {
        let (_store, service) = setup(Arc::new(NoopEventPublisher)).await;
        let first = service.create_transfer(request("K1", 10000)).await.unwrap();

        // Same key with an amount that would now fail the funds check
        let replay = service.create_transfer(request("K1", 4_000_000)).await.unwrap();
        assert_eq!(replay.id, first.id);
        assert_eq!(replay.amount, Decimal::new(10000, 2));
    }

    #[tokio::test]
    async fn test_insufficient_funds_persists_nothing() {
        let (store, service) = setup(Arc::new(NoopEventPublisher)).await;

        let err = service.create_transfer(request("K1", 60000)).await.unwrap_err();

        assert_eq!(
            err,
            TransferError::insufficient_funds("origin", Decimal::new(60000, 2), Decimal::new(50000, 2))
        );
        assert_eq!(balance(&store, "origin").await, Decimal::new(50000, 2));
        assert!(TransferRepository::find_all(store.as_ref()).await.unwrap().is_empty());
    }

    #[rstest]
    #[case::below_min(request("K1", 0), "INVALID_AMOUNT")]
    #[case::above_max(request("K1", 100_000_001), "INVALID_AMOUNT")]
    #[case::blank_description(CreateTransferRequest { description: "  ".to_string(), ..request("K1", 100) }, "BLANK_DESCRIPTION")]
    #[case::blank_key(request(" ", 100), "BLANK_IDEMPOTENCY_KEY")]
    #[case::malformed_target(CreateTransferRequest { target_account_number: "123".to_string(), ..request("K1", 100) }, "INVALID_ACCOUNT_NUMBER")]
    #[case::unknown_origin(CreateTransferRequest { origin_account_id: "ghost".to_string(), ..request("K1", 100) }, "ACCOUNT_NOT_FOUND")]
    #[case::same_account(CreateTransferRequest { target_account_number: account_number(1).to_string(), ..request("K1", 100) }, "SAME_ACCOUNT_TRANSFER")]
    #[case::unknown_destination(CreateTransferRequest { target_account_number: account_number(9).to_string(), ..request("K1", 100) }, "DESTINATION_ACCOUNT_NOT_FOUND")]
    #[tokio::test]
    async fn test_rejected_requests_leave_no_trace(
        #[case] request: CreateTransferRequest,
        #[case] code: &str,
    ) {
        let (store, service) = setup(Arc::new(NoopEventPublisher)).await;

        let err = service.create_transfer(request).await.unwrap_err();

        assert_eq!(err.code(), code);
        assert_eq!(balance(&store, "origin").await, Decimal::new(50000, 2));
        assert!(TransferRepository::find_all(store.as_ref()).await.unwrap().is_empty());
    }

    #[rstest]
    #[case::min_inclusive(1, 50000)]
    #[case::max_inclusive(100_000_000, 150_000_000)]
    #[tokio::test]
    async fn test_amount_bounds_are_inclusive(#[case] amount_cents: i64, #[case] origin_cents: i64) {
        let (store, service) = setup_funded(Arc::new(NoopEventPublisher), origin_cents).await;

        let view = service.create_transfer(request("K1", amount_cents)).await.unwrap();

        assert_eq!(view.status, TransferStatus::Pending);
        assert_eq!(view.amount, Decimal::new(amount_cents, 2));
        assert_eq!(
            balance(&store, "origin").await,
            Decimal::new(origin_cents - amount_cents, 2)
        );
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_create() {
        let (store, service) = setup(Arc::new(FailingPublisher)).await;

        let view = service.create_transfer(request("K1", 100)).await.unwrap();

        assert_eq!(view.status, TransferStatus::Pending);
        assert_eq!(balance(&store, "origin").await, Decimal::new(49900, 2));
    }

    #[tokio::test]
    async fn test_exact_balance_can_be_transferred() {
        let (store, service) = setup(Arc::new(NoopEventPublisher)).await;

        service.create_transfer(request("K1", 50000)).await.unwrap();

        assert_eq!(balance(&store, "origin").await, Decimal::ZERO);
    }
}
