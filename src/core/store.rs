//! In-memory reference store
//!
//! This module provides [`InMemoryStore`], which implements the transfer and
//! account repositories and the unit of work on top of `DashMap` tables.
//!
//! # Design
//!
//! Rows live in `DashMap`s keyed by id, with secondary `DashMap` indexes for
//! the unique columns (idempotency key, account number, alias). Every write
//! goes through a compare-and-swap on the row `version`.
//!
//! # Atomicity
//!
//! A `RwLock<()>` gate makes multi-row commits indivisible: writers hold it
//! exclusively while they validate and then apply a whole change set, readers
//! hold it shared while they clone rows out. A reader therefore observes
//! either none or all of a commit. No guard is ever held across an `.await`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::traits::{AccountRepository, ChangeSet, CommittedChanges, TransferRepository, UnitOfWork};
use crate::types::{
    Account, AccountId, AccountNumber, Alias, IdempotencyKey, StorageError, StorageResult,
    Transfer, TransferId, TransferStatus,
};

/// DashMap-backed transfer and account store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Commit gate, see module docs
    gate: RwLock<()>,

    transfers: DashMap<TransferId, Transfer>,
    transfers_by_key: DashMap<IdempotencyKey, TransferId>,

    accounts: DashMap<AccountId, Account>,
    accounts_by_number: DashMap<AccountNumber, AccountId>,
    accounts_by_alias: DashMap<Alias, AccountId>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_gate(&self) -> StorageResult<RwLockReadGuard<'_, ()>> {
        self.gate
            .read()
            .map_err(|_| StorageError::unavailable("store gate poisoned"))
    }

    fn write_gate(&self) -> StorageResult<RwLockWriteGuard<'_, ()>> {
        self.gate
            .write()
            .map_err(|_| StorageError::unavailable("store gate poisoned"))
    }

    /// Check a transfer write against the stored row and unique key
    fn check_transfer(&self, transfer: &Transfer) -> StorageResult<()> {
        let stored_version = self.transfers.get(&transfer.id()).map(|t| t.version());

        if transfer.version() == 0 {
            if let Some(actual) = stored_version {
                return Err(StorageError::version_conflict(
                    "transfer",
                    &transfer.id().to_string(),
                    0,
                    actual,
                ));
            }
            if self.transfers_by_key.contains_key(transfer.idempotency_key()) {
                return Err(StorageError::DuplicateIdempotencyKey {
                    key: transfer.idempotency_key().to_string(),
                });
            }
            return Ok(());
        }

        match stored_version {
            Some(actual) if actual == transfer.version() => Ok(()),
            actual => Err(StorageError::version_conflict(
                "transfer",
                &transfer.id().to_string(),
                transfer.version(),
                actual.unwrap_or(0),
            )),
        }
    }

    fn check_account(&self, account: &Account) -> StorageResult<()> {
        let stored_version = self.accounts.get(account.id()).map(|a| a.version());

        if account.version() == 0 {
            if let Some(actual) = stored_version {
                return Err(StorageError::version_conflict(
                    "account",
                    account.id().as_str(),
                    0,
                    actual,
                ));
            }
            if self.accounts_by_number.contains_key(account.account_number()) {
                return Err(StorageError::DuplicateAccountNumber {
                    account_number: account.account_number().to_string(),
                });
            }
            if self.accounts_by_alias.contains_key(account.alias()) {
                return Err(StorageError::DuplicateAlias {
                    alias: account.alias().to_string(),
                });
            }
            return Ok(());
        }

        match stored_version {
            Some(actual) if actual == account.version() => Ok(()),
            actual => Err(StorageError::version_conflict(
                "account",
                account.id().as_str(),
                account.version(),
                actual.unwrap_or(0),
            )),
        }
    }

    /// Write a checked transfer and return the stored copy
    fn apply_transfer(&self, transfer: &Transfer) -> Transfer {
        let stored = transfer.with_version(transfer.version() + 1);
        if transfer.version() == 0 {
            self.transfers_by_key
                .insert(stored.idempotency_key().clone(), stored.id());
        }
        self.transfers.insert(stored.id(), stored.clone());
        stored
    }

    fn apply_account(&self, account: &Account) -> Account {
        let stored = account.with_version(account.version() + 1);
        if account.version() == 0 {
            self.accounts_by_number
                .insert(stored.account_number().clone(), stored.id().clone());
            self.accounts_by_alias
                .insert(stored.alias().clone(), stored.id().clone());
        }
        self.accounts.insert(stored.id().clone(), stored.clone());
        stored
    }

    /// Clone out every transfer matching `filter`
    fn scan_transfers<F>(&self, filter: F) -> StorageResult<Vec<Transfer>>
    where
        F: Fn(&Transfer) -> bool,
    {
        let _gate = self.read_gate()?;
        Ok(self
            .transfers
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[async_trait]
impl TransferRepository for InMemoryStore {
    async fn save(&self, transfer: &Transfer) -> StorageResult<Transfer> {
        let _gate = self.write_gate()?;
        self.check_transfer(transfer)?;
        Ok(self.apply_transfer(transfer))
    }

    async fn find_by_id(&self, id: TransferId) -> StorageResult<Option<Transfer>> {
        let _gate = self.read_gate()?;
        Ok(self.transfers.get(&id).map(|t| t.clone()))
    }

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> StorageResult<Option<Transfer>> {
        let _gate = self.read_gate()?;
        let Some(id) = self.transfers_by_key.get(key).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.transfers.get(&id).map(|t| t.clone()))
    }

    async fn find_pending_transfers(&self, limit: usize) -> StorageResult<Vec<Transfer>> {
        let mut pending = self.scan_transfers(|t| t.status() == TransferStatus::Pending)?;
        pending.sort_by_key(|t| (t.created_at(), t.id()));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn find_retryable_transfers(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> StorageResult<Vec<Transfer>> {
        let mut retryable = self.scan_transfers(|t| {
            t.status() == TransferStatus::Failed && t.retry_count() < max_retries
        })?;
        retryable.sort_by_key(|t| (t.last_retry_at(), t.created_at(), t.id()));
        retryable.truncate(limit);
        Ok(retryable)
    }

    async fn find_exhausted_transfers(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> StorageResult<Vec<Transfer>> {
        let mut exhausted = self.scan_transfers(|t| {
            t.status() == TransferStatus::Failed && t.retry_count() >= max_retries
        })?;
        exhausted.sort_by_key(|t| (t.last_retry_at(), t.id()));
        exhausted.truncate(limit);
        Ok(exhausted)
    }

    async fn find_stuck_processing(
        &self,
        started_before: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Transfer>> {
        let mut stuck = self.scan_transfers(|t| {
            t.status() == TransferStatus::Processing
                && t.processing_started_at().map_or(true, |at| at < started_before)
        })?;
        stuck.sort_by_key(|t| (t.processing_started_at(), t.id()));
        stuck.truncate(limit);
        Ok(stuck)
    }

    async fn find_all(&self) -> StorageResult<Vec<Transfer>> {
        self.scan_transfers(|_| true)
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn save(&self, account: &Account) -> StorageResult<Account> {
        let _gate = self.write_gate()?;
        self.check_account(account)?;
        Ok(self.apply_account(account))
    }

    async fn find_by_id(&self, id: &AccountId) -> StorageResult<Option<Account>> {
        let _gate = self.read_gate()?;
        Ok(self.accounts.get(id).map(|a| a.clone()))
    }

    async fn find_by_account_number(
        &self,
        account_number: &AccountNumber,
    ) -> StorageResult<Option<Account>> {
        let _gate = self.read_gate()?;
        let Some(id) = self.accounts_by_number.get(account_number).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.accounts.get(&id).map(|a| a.clone()))
    }

    async fn exists_by_account_number(&self, account_number: &AccountNumber) -> StorageResult<bool> {
        let _gate = self.read_gate()?;
        Ok(self.accounts_by_number.contains_key(account_number))
    }

    async fn find_all(&self) -> StorageResult<Vec<Account>> {
        let _gate = self.read_gate()?;
        Ok(self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    async fn commit(&self, changes: ChangeSet) -> StorageResult<CommittedChanges> {
        let _gate = self.write_gate()?;

        for transfer in &changes.transfers {
            self.check_transfer(transfer)?;
        }
        for account in &changes.accounts {
            self.check_account(account)?;
        }

        Ok(CommittedChanges {
            transfers: changes
                .transfers
                .iter()
                .map(|t| self.apply_transfer(t))
                .collect(),
            accounts: changes
                .accounts
                .iter()
                .map(|a| self.apply_account(a))
                .collect(),
        })
    }
}
