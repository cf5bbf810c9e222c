//! Error types for the transfer engine
//!
//! This module defines the error taxonomy of the transfer lifecycle.
//!
//! # Error Categories
//!
//! - **Validation errors**: bad amount, blank description, malformed account
//!   number, same-account transfer. Rejected at creation, never persisted.
//! - **Not-found errors**: account, destination, transfer.
//! - **Business conflicts**: insufficient funds.
//! - **Contract violations**: an invalid state transition was attempted.
//! - **Storage errors**: optimistic concurrency conflicts, unique constraint
//!   violations and timeouts at the repository boundary.
//! - **Processor errors**: failures of the external settlement processor,
//!   split by recoverability.

use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the transfer engine
///
/// Creation-path variants propagate synchronously to the caller and map to
/// stable error codes through [`TransferError::code`]. Processing-path
/// failures are converted into state transitions instead of being returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransferError {
    /// Amount outside the configured transfer bounds
    #[error("Invalid amount {amount}: must be between {min} and {max}")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
        /// Lower bound (inclusive)
        min: Decimal,
        /// Upper bound (inclusive)
        max: Decimal,
    },

    /// Debit or credit with a zero or negative amount
    #[error("Amount must be strictly positive, got {amount}")]
    NonPositiveAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// Description is empty or whitespace only
    #[error("Transfer description must not be blank")]
    BlankDescription,

    /// Idempotency key is empty or whitespace only
    #[error("Idempotency key must not be blank")]
    BlankIdempotencyKey,

    /// Account number is not a 22-digit CBU
    #[error("Invalid account number '{value}'")]
    InvalidAccountNumber {
        /// The malformed account number
        value: String,
    },

    /// Alias does not satisfy the alias format
    #[error("Invalid alias '{value}'")]
    InvalidAlias {
        /// The malformed alias
        value: String,
    },

    /// Destination is the origin account itself
    #[error("Cannot transfer to the origin account {account_number}")]
    SameAccountTransfer {
        /// The origin's own account number
        account_number: String,
    },

    /// Origin account does not exist
    #[error("Account {account_id} not found")]
    AccountNotFound {
        /// Requested account id
        account_id: String,
    },

    /// Destination account number does not resolve to an account
    #[error("Destination account {account_number} not found")]
    DestinationAccountNotFound {
        /// Requested destination account number
        account_number: String,
    },

    /// Transfer does not exist
    #[error("Transfer {transfer_id} not found")]
    TransferNotFound {
        /// Requested transfer id
        transfer_id: String,
    },

    /// Balance is lower than the requested amount
    #[error("Insufficient funds in account {account_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Account that would be overdrawn
        account_id: String,
        /// Requested amount
        requested: Decimal,
        /// Balance at the time of the request
        available: Decimal,
    },

    /// Balance arithmetic would overflow
    #[error("Arithmetic overflow in {operation} for account {account_id}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Account id
        account_id: String,
    },

    /// A state transition was attempted outside its guard
    ///
    /// This is a programming-contract violation. The transition is refused
    /// and the persisted state is left untouched.
    #[error("Invalid transfer state for {transfer_id}: cannot move from {current} to {attempted}")]
    InvalidTransferState {
        /// Transfer id
        transfer_id: String,
        /// Status the transfer is currently in
        current: String,
        /// Status the transition tried to reach
        attempted: String,
    },

    /// Another writer changed the entity first
    #[error("Concurrent modification of {entity} {id}")]
    ConcurrentModification {
        /// Entity kind ("transfer" or "account")
        entity: String,
        /// Entity id
        id: String,
    },

    /// Repository failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl TransferError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidAmount { .. } => "INVALID_AMOUNT",
            TransferError::NonPositiveAmount { .. } => "NON_POSITIVE_AMOUNT",
            TransferError::BlankDescription => "BLANK_DESCRIPTION",
            TransferError::BlankIdempotencyKey => "BLANK_IDEMPOTENCY_KEY",
            TransferError::InvalidAccountNumber { .. } => "INVALID_ACCOUNT_NUMBER",
            TransferError::InvalidAlias { .. } => "INVALID_ALIAS",
            TransferError::SameAccountTransfer { .. } => "SAME_ACCOUNT_TRANSFER",
            TransferError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            TransferError::DestinationAccountNotFound { .. } => "DESTINATION_ACCOUNT_NOT_FOUND",
            TransferError::TransferNotFound { .. } => "TRANSFER_NOT_FOUND",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::ArithmeticOverflow { .. } => "ARITHMETIC_OVERFLOW",
            TransferError::InvalidTransferState { .. } => "INVALID_TRANSFER_STATE",
            TransferError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            TransferError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Whether the error is a defect rather than a business outcome
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, TransferError::InvalidTransferState { .. })
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: Decimal, min: Decimal, max: Decimal) -> Self {
        TransferError::InvalidAmount { amount, min, max }
    }

    /// Create an InvalidAccountNumber error
    pub fn invalid_account_number(value: &str) -> Self {
        TransferError::InvalidAccountNumber {
            value: value.to_string(),
        }
    }

    /// Create an InvalidAlias error
    pub fn invalid_alias(value: &str) -> Self {
        TransferError::InvalidAlias {
            value: value.to_string(),
        }
    }

    /// Create a SameAccountTransfer error
    pub fn same_account_transfer(account_number: &str) -> Self {
        TransferError::SameAccountTransfer {
            account_number: account_number.to_string(),
        }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(account_id: &str) -> Self {
        TransferError::AccountNotFound {
            account_id: account_id.to_string(),
        }
    }

    /// Create a DestinationAccountNotFound error
    pub fn destination_not_found(account_number: &str) -> Self {
        TransferError::DestinationAccountNotFound {
            account_number: account_number.to_string(),
        }
    }

    /// Create a TransferNotFound error
    pub fn transfer_not_found(transfer_id: &str) -> Self {
        TransferError::TransferNotFound {
            transfer_id: transfer_id.to_string(),
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account_id: &str, requested: Decimal, available: Decimal) -> Self {
        TransferError::InsufficientFunds {
            account_id: account_id.to_string(),
            requested,
            available,
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account_id: &str) -> Self {
        TransferError::ArithmeticOverflow {
            operation: operation.to_string(),
            account_id: account_id.to_string(),
        }
    }

    /// Create an InvalidTransferState error
    pub fn invalid_state(transfer_id: &str, current: &str, attempted: &str) -> Self {
        TransferError::InvalidTransferState {
            transfer_id: transfer_id.to_string(),
            current: current.to_string(),
            attempted: attempted.to_string(),
        }
    }

    /// Create a ConcurrentModification error
    pub fn concurrent_modification(entity: &str, id: &str) -> Self {
        TransferError::ConcurrentModification {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

/// Repository boundary errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    /// Optimistic concurrency check failed
    #[error("Version conflict on {entity} {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        /// Entity kind ("transfer" or "account")
        entity: String,
        /// Entity id
        id: String,
        /// Version the writer loaded
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// Unique constraint on the idempotency key
    #[error("Idempotency key '{key}' already used")]
    DuplicateIdempotencyKey {
        /// The duplicated key
        key: String,
    },

    /// Unique constraint on the account number
    #[error("Account number {account_number} already registered")]
    DuplicateAccountNumber {
        /// The duplicated account number
        account_number: String,
    },

    /// Unique constraint on the alias
    #[error("Alias '{alias}' already registered")]
    DuplicateAlias {
        /// The duplicated alias
        alias: String,
    },

    /// Operation exceeded its time bound
    #[error("Storage operation '{operation}' timed out")]
    Timeout {
        /// Name of the bounded operation
        operation: String,
    },

    /// Store cannot serve requests
    #[error("Storage unavailable: {message}")]
    Unavailable {
        /// Description of the failure
        message: String,
    },
}

impl StorageError {
    /// Create a VersionConflict error
    pub fn version_conflict(entity: &str, id: &str, expected: u64, actual: u64) -> Self {
        StorageError::VersionConflict {
            entity: entity.to_string(),
            id: id.to_string(),
            expected,
            actual,
        }
    }

    /// Create an Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        StorageError::Unavailable {
            message: message.into(),
        }
    }

    /// Whether this is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::VersionConflict { .. })
    }
}

/// Errors raised by the external settlement processor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// Transient failure, expected to succeed on retry
    #[error("Recoverable processor failure: {message}")]
    Recoverable {
        /// Description of the failure
        message: String,
    },

    /// Rejected data, will not succeed on retry
    #[error("Processor rejected transfer [{code}]: {message}")]
    Permanent {
        /// External error code
        code: String,
        /// Description of the rejection
        message: String,
    },
}

impl ProcessorError {
    /// Create a Recoverable error
    pub fn recoverable(message: impl Into<String>) -> Self {
        ProcessorError::Recoverable {
            message: message.into(),
        }
    }

    /// Create a Permanent error
    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        ProcessorError::Permanent {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether a retry may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProcessorError::Recoverable { .. })
    }
}

/// Best-effort delivery failure (notifications, created-transfer signals)
///
/// Never rolls back transfer state; callers log it and move on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Delivery to {channel} failed: {message}")]
pub struct DeliveryError {
    /// Name of the channel that failed
    pub channel: String,
    /// Description of the failure
    pub message: String,
}

impl DeliveryError {
    pub fn new(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            message: message.into(),
        }
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file '{path}': {message}")]
    Io {
        /// Path of the config file
        path: String,
        /// Underlying I/O error
        message: String,
    },

    /// Config file is not valid YAML for the expected shape
    #[error("Failed to parse config: {message}")]
    Parse {
        /// Parser error
        message: String,
    },

    /// A value is out of range
    #[error("Invalid config value for {field}: {message}")]
    Invalid {
        /// Dotted path of the offending field
        field: String,
        /// What is wrong with it
        message: String,
    },
}

impl ConfigError {
    /// Create an Invalid error
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for repository operations
pub type StorageResult<T> = Result<T, StorageError>;
