//! Shared helpers for the integration tests
#![allow(dead_code)]

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use transfer_engine::adapters::{LoggingNotifier, SimulatedProcessor};
use transfer_engine::config::EngineConfig;
use transfer_engine::core::clock::ManualClock;
use transfer_engine::core::traits::{
    AccountRepository, ExternalProcessor, NoopEventPublisher, Ports, TransferRepository, UnitOfWork,
};
use transfer_engine::core::{CreateTransferRequest, TransferEngine};
use transfer_engine::types::{Account, AccountId, AccountNumber, Alias};

pub const ORIGIN: &str = "origin";
pub const DEST: &str = "dest";

/// Account number ending in `suffix`, zero padded to 22 digits
pub fn account_number(suffix: u32) -> AccountNumber {
    AccountNumber::parse(&format!("{:022}", suffix)).unwrap()
}

pub fn account(id: &str, suffix: u32, balance: Decimal) -> Account {
    Account::reconstruct(
        AccountId::new(id),
        format!("owner-{}", id),
        account_number(suffix),
        Alias::parse(&format!("alias.{}", id)).unwrap(),
        balance,
        Utc::now(),
        0,
    )
}

pub fn request(key: &str, amount: Decimal) -> CreateTransferRequest {
    CreateTransferRequest {
        origin_account_id: ORIGIN.to_string(),
        target_account_number: account_number(2).to_string(),
        amount,
        description: "rent".to_string(),
        idempotency_key: key.to_string(),
    }
}

/// Engine over one store, with a manual clock
pub struct TestBed<S> {
    pub store: Arc<S>,
    pub clock: ManualClock,
    pub engine: TransferEngine,
}

impl<S> TestBed<S>
where
    S: TransferRepository + AccountRepository + UnitOfWork + 'static,
{
    pub fn new(store: Arc<S>, processor: Arc<dyn ExternalProcessor>, config: &EngineConfig) -> Self {
        let clock = ManualClock::default();
        let ports = Ports::with_store(
            Arc::clone(&store),
            processor,
            Arc::new(LoggingNotifier),
            Arc::new(NoopEventPublisher),
            Arc::new(clock.clone()),
        );
        Self {
            store,
            clock,
            engine: TransferEngine::new(ports, config),
        }
    }

    /// Register `origin` (suffix 1) and `dest` (suffix 2)
    pub async fn with_accounts(self, origin_balance: Decimal, dest_balance: Decimal) -> Self {
        self.engine
            .register_account(account(ORIGIN, 1, origin_balance))
            .await
            .unwrap();
        self.engine
            .register_account(account(DEST, 2, dest_balance))
            .await
            .unwrap();
        self
    }

    pub async fn balance(&self, id: &str) -> Decimal {
        AccountRepository::find_by_id(self.store.as_ref(), &AccountId::new(id))
            .await
            .unwrap()
            .unwrap()
            .balance()
    }
}

pub fn simulated(processor: SimulatedProcessor) -> (Arc<SimulatedProcessor>, Arc<dyn ExternalProcessor>) {
    let processor = Arc::new(processor);
    let port: Arc<dyn ExternalProcessor> = processor.clone();
    (processor, port)
}

pub fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}
