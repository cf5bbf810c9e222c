//! Transfer engine
//!
//! This module provides the TransferEngine, the single entry point that wires
//! the create service, the process service and the batch scheduler to one set
//! of ports and one configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::core::bounded::bounded;
use crate::core::create_service::{CreateTransferRequest, CreateTransferService};
use crate::core::process_service::{ProcessSettings, ProcessTransferService};
use crate::core::scheduler::BatchScheduler;
use crate::core::traits::Ports;
use crate::types::{Account, Transfer, TransferError, TransferId, TransferView};

/// Transfer lifecycle engine
///
/// Cheap to share: the process service and scheduler are reference counted
/// so they can be handed to the event listener and background tasks.
pub struct TransferEngine {
    ports: Ports,
    create: CreateTransferService,
    process: Arc<ProcessTransferService>,
    scheduler: Arc<BatchScheduler>,
    storage_timeout: Duration,
}

impl TransferEngine {
    /// Build an engine over `ports`
    ///
    /// # Arguments
    ///
    /// * `ports` - Storage and external collaborators
    /// * `config` - Engine configuration, expected to be normalized
    pub fn new(ports: Ports, config: &EngineConfig) -> Self {
        let storage_timeout = config.timeouts.storage_timeout();

        let create = CreateTransferService::new(
            &ports,
            config.limits.clone(),
            &config.create,
            storage_timeout,
        );
        let process = Arc::new(ProcessTransferService::new(
            &ports,
            ProcessSettings {
                policy: config.retry.policy(),
                processor_timeout: config.timeouts.processor_timeout(),
                storage_timeout,
                conflict_retries: config.create.conflict_retries,
            },
        ));
        let scheduler = Arc::new(BatchScheduler::new(
            &ports,
            Arc::clone(&process),
            config.scheduler.clone(),
            storage_timeout,
        ));

        Self {
            ports,
            create,
            process,
            scheduler,
            storage_timeout,
        }
    }

    /// See [`CreateTransferService::create_transfer`]
    pub async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<TransferView, TransferError> {
        self.create.create_transfer(request).await
    }

    /// See [`ProcessTransferService::process_transfer`]
    pub async fn process_transfer(&self, id: TransferId) -> Result<TransferView, TransferError> {
        self.process.process_transfer(id).await
    }

    /// Current view of a transfer, for status polling
    pub async fn get_transfer(&self, id: TransferId) -> Result<TransferView, TransferError> {
        bounded(
            "find_transfer_by_id",
            self.storage_timeout,
            self.ports.transfers.find_by_id(id),
        )
        .await?
        .map(|t| t.view())
        .ok_or_else(|| TransferError::transfer_not_found(&id.to_string()))
    }

    /// Persist a new account
    pub async fn register_account(&self, account: Account) -> Result<Account, TransferError> {
        Ok(bounded(
            "save_account",
            self.storage_timeout,
            self.ports.accounts.save(&account),
        )
        .await?)
    }

    pub async fn accounts(&self) -> Result<Vec<Account>, TransferError> {
        Ok(bounded("find_all_accounts", self.storage_timeout, self.ports.accounts.find_all()).await?)
    }

    pub async fn transfers(&self) -> Result<Vec<Transfer>, TransferError> {
        Ok(bounded("find_all_transfers", self.storage_timeout, self.ports.transfers.find_all()).await?)
    }

    pub fn process_service(&self) -> Arc<ProcessTransferService> {
        Arc::clone(&self.process)
    }

    pub fn scheduler(&self) -> Arc<BatchScheduler> {
        Arc::clone(&self.scheduler)
    }
}
