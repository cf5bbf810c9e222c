//! Process-transfer orchestration
//!
//! Drives one transfer through a processing attempt:
//!
//! 1. Take it into PROCESSING (or reject it if its destination is gone) and
//!    commit that before anything leaves the process.
//! 2. Call the external processor, bounded by a timeout.
//! 3. Turn the outcome into a state machine event and commit the new status
//!    together with its balance effect (destination credit on success,
//!    origin refund on rejection).
//! 4. Notify on COMPLETED and REJECTED, best effort.
//!
//! Processing-path failures never escape as errors: they become state
//! transitions. Errors returned from here are storage failures, lost races
//! after the processor call and contract violations.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::bounded::bounded;
use super::clock::Clock;
use super::retry_policy::RetryPolicy;
use super::state_machine::{self, TransferEvent, TransitionEffect};
use super::traits::{
    AccountRepository, ChangeSet, ExternalProcessor, NotificationPort, Ports, TransferRepository,
    UnitOfWork,
};
use crate::types::{
    Account, FailureReason, ProcessorError, StorageError, Transfer, TransferError, TransferId,
    TransferStatus, TransferView,
};

/// Result of handing one transfer to the service
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The transfer reached a new resting status
    Settled(TransferView),
    /// Nothing was done: another worker owns the transfer, or its status
    /// does not call for processing
    Skipped {
        transfer_id: TransferId,
        status: TransferStatus,
    },
}

/// Timeouts and budgets for processing
#[derive(Debug, Clone, Copy)]
pub struct ProcessSettings {
    pub policy: RetryPolicy,
    pub processor_timeout: Duration,
    pub storage_timeout: Duration,
    /// Times a finalizing commit is re-run after an account version conflict
    pub conflict_retries: u32,
}

pub struct ProcessTransferService {
    transfers: Arc<dyn TransferRepository>,
    accounts: Arc<dyn AccountRepository>,
    unit_of_work: Arc<dyn UnitOfWork>,
    processor: Arc<dyn ExternalProcessor>,
    notifier: Arc<dyn NotificationPort>,
    clock: Arc<dyn Clock>,
    settings: ProcessSettings,
}

impl ProcessTransferService {
    pub fn new(ports: &Ports, settings: ProcessSettings) -> Self {
        Self {
            transfers: Arc::clone(&ports.transfers),
            accounts: Arc::clone(&ports.accounts),
            unit_of_work: Arc::clone(&ports.unit_of_work),
            processor: Arc::clone(&ports.processor),
            notifier: Arc::clone(&ports.notifier),
            clock: Arc::clone(&ports.clock),
            settings,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.settings.policy
    }

    /// Load a transfer by id and run one processing attempt on it
    ///
    /// # Returns
    ///
    /// The transfer's view after the attempt. When the attempt was skipped
    /// this is the current stored view.
    ///
    /// # Errors
    ///
    /// * `TransferNotFound` if no transfer has this id
    /// * `InvalidTransferState` if the transfer is already COMPLETED or
    ///   REJECTED
    /// * Storage errors, and `ConcurrentModification` if the finalizing
    ///   commit lost to another writer
    pub async fn process_transfer(&self, id: TransferId) -> Result<TransferView, TransferError> {
        let transfer = self.load(id).await?;
        if transfer.status().is_terminal() {
            error!(
                transfer_id = %id,
                status = %transfer.status(),
                "Refused to process a settled transfer"
            );
            return Err(TransferError::invalid_state(
                &id.to_string(),
                transfer.status().as_str(),
                TransferStatus::Processing.as_str(),
            ));
        }
        match self.process(transfer).await? {
            ProcessOutcome::Settled(view) => Ok(view),
            ProcessOutcome::Skipped { .. } => Ok(self.load(id).await?.view()),
        }
    }

    /// Load a transfer by id and hand it to [`Self::process`]
    ///
    /// Event triggers race the scheduler, so a transfer that already
    /// settled comes back as `Skipped` instead of being refused.
    pub async fn process_by_id(&self, id: TransferId) -> Result<ProcessOutcome, TransferError> {
        let transfer = self.load(id).await?;
        self.process(transfer).await
    }

    /// Run one processing attempt on an already loaded transfer
    ///
    /// PENDING transfers are taken for processing, FAILED ones retried. Any
    /// other status is skipped. If the transfer changed since it was loaded,
    /// the take fails its version check and the transfer is skipped.
    pub async fn process(&self, transfer: Transfer) -> Result<ProcessOutcome, TransferError> {
        let event = match transfer.status() {
            TransferStatus::Pending => TransferEvent::TakeForProcessing {
                destination_exists: self.destination_exists(&transfer).await?,
            },
            TransferStatus::Failed => TransferEvent::ScheduledRetry {
                destination_exists: self.destination_exists(&transfer).await?,
            },
            status => {
                debug!(transfer_id = %transfer.id(), %status, "Nothing to process");
                return Ok(skipped(&transfer));
            }
        };

        let Some(taken) = self.finalize(&transfer, event).await? else {
            return Ok(skipped(&transfer));
        };

        if taken.status() != TransferStatus::Processing {
            // Rejected at take time: missing destination or exhausted budget
            self.notify(&taken).await;
            return Ok(ProcessOutcome::Settled(taken.view()));
        }

        let event = self.call_processor(&taken).await;

        match self.finalize(&taken, event).await? {
            Some(done) => {
                self.notify(&done).await;
                Ok(ProcessOutcome::Settled(done.view()))
            }
            None => {
                warn!(
                    transfer_id = %taken.id(),
                    "Transfer changed while the processor call was in flight, leaving it for reconciliation"
                );
                Err(TransferError::concurrent_modification("transfer", &taken.id().to_string()))
            }
        }
    }

    /// Time out a transfer abandoned in PROCESSING
    ///
    /// Moves it to FAILED for another attempt, or to REJECTED with the origin
    /// refunded when its retries are used up.
    pub async fn reconcile_stuck(&self, transfer: Transfer) -> Result<ProcessOutcome, TransferError> {
        if transfer.status() != TransferStatus::Processing {
            return Ok(skipped(&transfer));
        }

        warn!(
            transfer_id = %transfer.id(),
            started_at = ?transfer.processing_started_at(),
            retry_count = transfer.retry_count(),
            "Reconciling transfer stuck in PROCESSING"
        );

        match self.finalize(&transfer, TransferEvent::ProcessingTimedOut).await? {
            Some(done) => {
                self.notify(&done).await;
                Ok(ProcessOutcome::Settled(done.view()))
            }
            None => Ok(skipped(&transfer)),
        }
    }

    async fn load(&self, id: TransferId) -> Result<Transfer, TransferError> {
        bounded(
            "find_transfer_by_id",
            self.settings.storage_timeout,
            self.transfers.find_by_id(id),
        )
        .await?
        .ok_or_else(|| TransferError::transfer_not_found(&id.to_string()))
    }

    async fn destination_exists(&self, transfer: &Transfer) -> Result<bool, TransferError> {
        Ok(bounded(
            "exists_by_account_number",
            self.settings.storage_timeout,
            self.accounts
                .exists_by_account_number(transfer.target_account_number()),
        )
        .await?)
    }

    /// Call the processor and classify its answer
    async fn call_processor(&self, transfer: &Transfer) -> TransferEvent {
        let data = transfer.data();
        let outcome = tokio::time::timeout(
            self.settings.processor_timeout,
            self.processor.process_transfer(&data),
        )
        .await;

        let event = match outcome {
            Ok(Ok(true)) => TransferEvent::ExternalSuccess,
            Ok(Ok(false)) => TransferEvent::RecoverableFailure {
                reason: FailureReason::ProcessorDeclined,
            },
            Ok(Err(ProcessorError::Recoverable { message })) => TransferEvent::RecoverableFailure {
                reason: FailureReason::ProcessorUnavailable { message },
            },
            Ok(Err(ProcessorError::Permanent { code, message })) => TransferEvent::PermanentFailure {
                reason: FailureReason::ProcessorRejected { code, message },
            },
            Err(_) => TransferEvent::RecoverableFailure {
                reason: FailureReason::ProcessorTimeout,
            },
        };

        debug!(transfer_id = %transfer.id(), ?event, "Processor answered");
        event
    }

    /// Apply `event` to `current` and commit it with its balance effect
    ///
    /// # Returns
    ///
    /// * `Ok(Some(transfer))` - The stored transfer after the transition
    /// * `Ok(None)` - The transfer no longer matches `current`'s version
    async fn finalize(
        &self,
        current: &Transfer,
        event: TransferEvent,
    ) -> Result<Option<Transfer>, TransferError> {
        for attempt in 0..=self.settings.conflict_retries {
            let mut next = current.clone();
            let effect = state_machine::apply(&mut next, event.clone(), &self.settings.policy, self.clock.now())?;

            let mut changes = ChangeSet::new();
            match effect {
                TransitionEffect::None => {}
                TransitionEffect::CreditDestination => {
                    let mut destination = self.load_destination(&next).await?;
                    destination.credit(next.amount())?;
                    changes = changes.with_account(destination);
                }
                TransitionEffect::RefundOrigin => {
                    let mut origin = self.load_origin(&next).await?;
                    origin.credit(next.amount())?;
                    changes = changes.with_account(origin);
                }
            }
            changes = changes.with_transfer(next);

            let result = bounded(
                "commit",
                self.settings.storage_timeout,
                self.unit_of_work.commit(changes),
            )
            .await;

            match result {
                Ok(committed) => {
                    let stored = committed
                        .transfers
                        .into_iter()
                        .next()
                        .ok_or_else(|| StorageError::unavailable("commit returned no transfer"))?;
                    info!(
                        transfer_id = %stored.id(),
                        from = %current.status(),
                        to = %stored.status(),
                        retry_count = stored.retry_count(),
                        reason = ?stored.failure_reason().map(|r| r.to_string()),
                        "Transfer transitioned"
                    );
                    return Ok(Some(stored));
                }
                Err(StorageError::VersionConflict { ref entity, .. }) if entity == "account" => {
                    debug!(transfer_id = %current.id(), attempt, "Account modified concurrently, retrying commit");
                }
                Err(StorageError::VersionConflict { .. }) => {
                    debug!(transfer_id = %current.id(), "Transfer modified by another worker");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(TransferError::concurrent_modification("account", &current.id().to_string()))
    }

    async fn load_destination(&self, transfer: &Transfer) -> Result<Account, TransferError> {
        bounded(
            "find_account_by_number",
            self.settings.storage_timeout,
            self.accounts
                .find_by_account_number(transfer.target_account_number()),
        )
        .await?
        .ok_or_else(|| TransferError::destination_not_found(transfer.target_account_number().as_str()))
    }

    async fn load_origin(&self, transfer: &Transfer) -> Result<Account, TransferError> {
        bounded(
            "find_account_by_id",
            self.settings.storage_timeout,
            self.accounts.find_by_id(transfer.origin_account_id()),
        )
        .await?
        .ok_or_else(|| TransferError::account_not_found(transfer.origin_account_id().as_str()))
    }

    /// Tell the notification port about a terminal outcome
    async fn notify(&self, transfer: &Transfer) {
        let data = transfer.data();
        let result = match transfer.status() {
            TransferStatus::Completed => self.notifier.notify_completed(&data).await,
            TransferStatus::Rejected => {
                let reason = transfer
                    .failure_reason()
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                self.notifier.notify_failed(&data, &reason).await
            }
            _ => return,
        };

        if let Err(e) = result {
            warn!(transfer_id = %transfer.id(), error = %e, "Notification failed");
        }
    }
}

fn skipped(transfer: &Transfer) -> ProcessOutcome {
    ProcessOutcome::Skipped {
        transfer_id: transfer.id(),
        status: transfer.status(),
    }
}
