//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account entity and its identifiers
//! - `transfer`: Transfer record, status and projections
//! - `error`: Error types for the transfer engine

pub mod account;
pub mod error;
pub mod transfer;

pub use account::{Account, AccountId, AccountNumber, Alias};
pub use error::{ConfigError, DeliveryError, ProcessorError, StorageError, StorageResult, TransferError};
pub use transfer::{
    FailureReason, IdempotencyKey, Transfer, TransferData, TransferId, TransferSnapshot,
    TransferStatus, TransferView,
};
