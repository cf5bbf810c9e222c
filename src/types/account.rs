//! Account-related types for the transfer engine
//!
//! This module defines the Account entity and its identifying value objects.
//! Accounts are built either with [`Account::create`] (a freshly registered
//! account with zero balance) or [`Account::reconstruct`] (rehydrated from
//! storage).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::TransferError;

/// Length of a CBU account number
pub const ACCOUNT_NUMBER_LEN: usize = 22;

/// Opaque, owner-assigned account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CBU account number: exactly 22 ASCII digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Parse and validate an account number
    ///
    /// Surrounding whitespace is ignored.
    pub fn parse(value: &str) -> Result<Self, TransferError> {
        let trimmed = value.trim();
        if trimmed.len() != ACCOUNT_NUMBER_LEN || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TransferError::invalid_account_number(value));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-friendly unique account alias
///
/// 6 to 20 characters from letters, digits, dots and hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alias(String);

impl Alias {
    pub fn parse(value: &str) -> Result<Self, TransferError> {
        let trimmed = value.trim();
        let valid_len = (6..=20).contains(&trimmed.len());
        let valid_chars = trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        if !valid_len || !valid_chars {
            return Err(TransferError::invalid_alias(value));
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger account
///
/// Holds a non-negative balance. The balance is mutated only through
/// [`Account::debit`] and [`Account::credit`], both of which require a
/// strictly positive amount.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    id: AccountId,
    owner_id: String,
    account_number: AccountNumber,
    alias: Alias,
    balance: Decimal,
    created_at: DateTime<Utc>,

    /// Row version for optimistic concurrency
    ///
    /// Zero for an account that has never been persisted.
    version: u64,
}

impl Account {
    /// Create a newly registered account with zero balance
    pub fn create(
        id: AccountId,
        owner_id: impl Into<String>,
        account_number: AccountNumber,
        alias: Alias,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
            account_number,
            alias,
            balance: Decimal::ZERO,
            created_at,
            version: 0,
        }
    }

    /// Rehydrate an account from storage
    pub fn reconstruct(
        id: AccountId,
        owner_id: impl Into<String>,
        account_number: AccountNumber,
        alias: Alias,
        balance: Decimal,
        created_at: DateTime<Utc>,
        version: u64,
    ) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
            account_number,
            alias,
            balance,
            created_at,
            version,
        }
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn account_number(&self) -> &AccountNumber {
        &self.account_number
    }

    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the balance covers `amount`
    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Remove funds from the account
    ///
    /// # Errors
    ///
    /// - `NonPositiveAmount` if `amount <= 0`
    /// - `InsufficientFunds` if the balance is lower than `amount`
    ///
    /// The balance is left unchanged on error.
    pub fn debit(&mut self, amount: Decimal) -> Result<(), TransferError> {
        if amount <= Decimal::ZERO {
            return Err(TransferError::NonPositiveAmount { amount });
        }
        if !self.has_sufficient_funds(amount) {
            return Err(TransferError::insufficient_funds(
                self.id.as_str(),
                amount,
                self.balance,
            ));
        }
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or_else(|| TransferError::arithmetic_overflow("debit", self.id.as_str()))?;
        Ok(())
    }

    /// Add funds to the account
    ///
    /// # Errors
    ///
    /// - `NonPositiveAmount` if `amount <= 0`
    /// - `ArithmeticOverflow` if the balance would overflow
    pub fn credit(&mut self, amount: Decimal) -> Result<(), TransferError> {
        if amount <= Decimal::ZERO {
            return Err(TransferError::NonPositiveAmount { amount });
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| TransferError::arithmetic_overflow("credit", self.id.as_str()))?;
        Ok(())
    }

    /// Copy of this account at a new stored version
    pub(crate) fn with_version(&self, version: u64) -> Self {
        let mut account = self.clone();
        account.version = version;
        account
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

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
}
