//! Transfer Engine Library
//! # Overview
//!
//! This library moves money between ledger accounts. A transfer is created
//! exactly once per client-supplied idempotency key, balances stay
//! consistent under concurrent requests, and execution against an
//! unreliable settlement processor is retried without double-crediting or
//! double-debiting.
//!
//! # Architecture
//!
//! - [`types`] - Accounts, transfers, value objects and errors
//! - [`core`] - Business logic components:
//!   - [`core::create_service`] - Idempotent creation with atomic debit
//!   - [`core::state_machine`] - Status transitions and their balance effects
//!   - [`core::process_service`] - Processor call orchestration
//!   - [`core::scheduler`] - Pending, retry and reconciliation sweeps
//!   - [`core::retry_policy`] - Retry budget and backoff
//!   - [`core::store`] - In-memory storage with optimistic concurrency
//! - [`adapters`] - Simulated processor, logging notifier, event channel
//! - [`config`] - YAML configuration
//! - [`io`] - CSV input and report output
//! - [`pipeline`] - File-driven end-to-end run
//! - [`cli`] - CLI arguments parsing
//!
//! # Transfer States
//!
//! ```text
//! PENDING -> PROCESSING -> COMPLETED
//!                       -> FAILED -> PROCESSING (retry)
//!                                 -> REJECTED
//!                       -> REJECTED
//! ```
//!
//! COMPLETED credits the destination. REJECTED refunds the origin, which
//! was debited when the transfer was created.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod types;

pub use config::EngineConfig;
pub use core::{
    BatchScheduler, CreateTransferRequest, InMemoryStore, Ports, ProcessTransferService,
    RetryPolicy, TransferEngine,
};
pub use pipeline::{run_file_pipeline, PipelineOptions, PipelineSummary};
pub use types::{
    Account, AccountId, AccountNumber, FailureReason, Transfer, TransferError, TransferId,
    TransferStatus, TransferView,
};
