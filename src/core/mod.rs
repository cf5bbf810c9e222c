//! Core business logic module
//!
//! This module contains the transfer lifecycle components:
//! - `traits` - Repository, unit-of-work and collaborator ports
//! - `state_machine` - Transfer status transitions and their effects
//! - `retry_policy` - Retry budget and backoff
//! - `create_service` - Idempotent transfer creation
//! - `process_service` - Processor call orchestration and settlement
//! - `scheduler` - Pending, retry and reconciliation sweeps
//! - `engine` - Facade wiring the services together
//! - `store` - In-memory storage with optimistic concurrency
//! - `clock` - Injectable time source
//! - `bounded` - Time bound for storage calls

pub mod bounded;
pub mod clock;
pub mod create_service;
pub mod engine;
pub mod process_service;
pub mod retry_policy;
pub mod scheduler;
pub mod state_machine;
pub mod store;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use create_service::{CreateTransferRequest, CreateTransferService};
pub use engine::TransferEngine;
pub use process_service::{ProcessOutcome, ProcessSettings, ProcessTransferService};
pub use retry_policy::RetryPolicy;
pub use scheduler::{BatchScheduler, SettleSummary, SweepReport};
pub use state_machine::{TransferEvent, TransitionEffect};
pub use store::InMemoryStore;
pub use traits::{
    AccountRepository, ChangeSet, CommittedChanges, ExternalProcessor, NoopEventPublisher,
    NotificationPort, Ports, TransferEventPublisher, TransferRepository, UnitOfWork,
};
