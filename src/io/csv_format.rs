//! CSV format handling for account seeds, transfer requests and reports
//!
//! This module centralizes all CSV format concerns, providing:
//! - Record structures for deserialization (`AccountSeedRecord`, `TransferRequestRecord`)
//! - Conversion from CSV records to domain types
//! - Account and transfer report serialization
//!
//! Conversions are pure; the writers only touch the `Write` they are given.

use crate::core::create_service::CreateTransferRequest;
use crate::types::{Account, AccountId, AccountNumber, Alias, Transfer};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// Account seed row: `id,owner,account_number,alias,balance`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccountSeedRecord {
    pub id: String,
    pub owner: String,
    pub account_number: String,
    pub alias: String,
    pub balance: String,
}

/// Transfer request row: `origin,target,amount,description,idempotency_key`
///
/// Description and key may be empty; the create service rejects them with
/// the proper error code.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TransferRequestRecord {
    pub origin: String,
    pub target: String,
    pub amount: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub idempotency_key: String,
}

fn parse_amount(value: &str, context: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|_| format!("Invalid amount '{}' for {}", value, context))
}

/// Convert an AccountSeedRecord to an Account
///
/// Seeded accounts are new rows: version 0 with the given opening balance.
///
/// # Arguments
///
/// * `record` - The deserialized CSV record
/// * `created_at` - Creation timestamp for the account
///
/// # Returns
///
/// * `Ok(Account)` - Successfully converted record
/// * `Err(String)` - Error message describing the conversion failure
pub fn convert_account_record(
    record: AccountSeedRecord,
    created_at: DateTime<Utc>,
) -> Result<Account, String> {
    let context = format!("account {}", record.id);
    if record.id.trim().is_empty() {
        return Err("Account id must not be blank".to_string());
    }
    let account_number = AccountNumber::parse(&record.account_number)
        .map_err(|e| format!("{} for {}", e, context))?;
    let alias = Alias::parse(&record.alias).map_err(|e| format!("{} for {}", e, context))?;
    let balance = parse_amount(&record.balance, &context)?;
    if balance < Decimal::ZERO {
        return Err(format!("Negative opening balance {} for {}", balance, context));
    }

    Ok(Account::reconstruct(
        AccountId::new(record.id.trim()),
        record.owner.trim(),
        account_number,
        alias,
        balance,
        created_at,
        0,
    ))
}

/// Convert a TransferRequestRecord to a CreateTransferRequest
///
/// Only the amount is parsed here; every business rule is left to the
/// create service.
pub fn convert_request_record(record: TransferRequestRecord) -> Result<CreateTransferRequest, String> {
    let context = format!("request '{}'", record.idempotency_key);
    let amount = parse_amount(&record.amount, &context)?;

    Ok(CreateTransferRequest {
        origin_account_id: record.origin,
        target_account_number: record.target,
        amount,
        description: record.description,
        idempotency_key: record.idempotency_key,
    })
}

/// Write account balances to CSV format
///
/// Columns: id, account_number, alias, balance. Sorted by id, balances with
/// two decimals.
///
/// # Arguments
///
/// * `accounts` - Slice of accounts to write
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["id", "account_number", "alias", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted: Vec<&Account> = accounts.iter().collect();
    sorted.sort_by(|a, b| a.id().cmp(b.id()));

    for account in sorted {
        writer
            .write_record(&[
                account.id().to_string(),
                account.account_number().to_string(),
                account.alias().to_string(),
                format!("{:.2}", account.balance()),
            ])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))
}

/// Write the transfer report to CSV format
///
/// Columns: idempotency_key, origin, target, amount, status, retries,
/// failure_reason. Sorted by idempotency key.
pub fn write_transfers_csv(transfers: &[Transfer], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record([
            "idempotency_key",
            "origin",
            "target",
            "amount",
            "status",
            "retries",
            "failure_reason",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted: Vec<&Transfer> = transfers.iter().collect();
    sorted.sort_by(|a, b| a.idempotency_key().cmp(b.idempotency_key()));

    for transfer in sorted {
        writer
            .write_record(&[
                transfer.idempotency_key().to_string(),
                transfer.origin_account_id().to_string(),
                transfer.target_account_number().to_string(),
                format!("{:.2}", transfer.amount()),
                transfer.status().to_string(),
                transfer.retry_count().to_string(),
                transfer
                    .failure_reason()
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
            ])
            .map_err(|e| format!("Failed to write transfer record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::account::fixtures::account;
    use crate::types::transfer::fixtures::pending_transfer;
    use crate::types::{FailureReason, TransferStatus};
    use rstest::rstest;

    fn seed(balance: &str, number: &str, alias: &str) -> AccountSeedRecord {
        AccountSeedRecord {
            id: "acc-1".to_string(),
            owner: "owner-1".to_string(),
            account_number: number.to_string(),
            alias: alias.to_string(),
            balance: balance.to_string(),
        }
    }

    #[test]
    fn test_convert_account_record_valid() {
        let account = convert_account_record(
            seed("500.00", "0000000000000000000001", "casa.perro"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(account.id().as_str(), "acc-1");
        assert_eq!(account.balance(), Decimal::new(50000, 2));
        assert_eq!(account.version(), 0);
    }

    #[rstest]
    #[case::bad_number("10.00", "123", "casa.perro", "Invalid account number")]
    #[case::bad_alias("10.00", "0000000000000000000001", "ab", "Invalid alias")]
    #[case::bad_balance("ten", "0000000000000000000001", "casa.perro", "Invalid amount")]
    #[case::negative_balance("-1.00", "0000000000000000000001", "casa.perro", "Negative opening balance")]
    fn test_convert_account_record_errors(
        #[case] balance: &str,
        #[case] number: &str,
        #[case] alias: &str,
        #[case] expected_error: &str,
    ) {
        let result = convert_account_record(seed(balance, number, alias), Utc::now());
        assert!(result.unwrap_err().contains(expected_error));
    }

    #[rstest]
    #[case("  100.5  ", Decimal::new(1005, 1))]
    #[case("0.01", Decimal::new(1, 2))]
    fn test_convert_request_record_amount_parsing(#[case] amount: &str, #[case] expected: Decimal) {
        let request = convert_request_record(TransferRequestRecord {
            origin: "acc-1".to_string(),
            target: "0000000000000000000002".to_string(),
            amount: amount.to_string(),
            description: "rent".to_string(),
            idempotency_key: "K1".to_string(),
        })
        .unwrap();

        assert_eq!(request.amount, expected);
        assert_eq!(request.idempotency_key, "K1");
    }

    #[test]
    fn test_convert_request_record_invalid_amount() {
        let result = convert_request_record(TransferRequestRecord {
            origin: "acc-1".to_string(),
            target: "0000000000000000000002".to_string(),
            amount: "abc".to_string(),
            description: String::new(),
            idempotency_key: "K9".to_string(),
        });
        assert!(result.unwrap_err().contains("request 'K9'"));
    }

    #[test]
    fn test_write_accounts_csv_sorted_two_decimals() {
        let accounts = vec![
            account("bravo", 2, Decimal::new(5, 0)),
            account("alpha", 1, Decimal::new(1234, 2)),
        ];
        let mut output = Vec::new();

        write_accounts_csv(&accounts, &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,account_number,alias,balance");
        assert_eq!(lines[1], "alpha,0000000000000000000001,alias.alpha,12.34");
        assert_eq!(lines[2], "bravo,0000000000000000000002,alias.bravo,5.00");
    }

    #[test]
    fn test_write_transfers_csv_includes_failure_reason() {
        let done = pending_transfer("K2", "alpha", 2, 1000);
        let mut rejected = pending_transfer("K1", "alpha", 3, 250);
        rejected.status = TransferStatus::Rejected;
        rejected.retry_count = 3;
        rejected.failure_reason = Some(FailureReason::RetriesExhausted);
        let mut output = Vec::new();

        write_transfers_csv(&[done, rejected], &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "K1,alpha,0000000000000000000003,2.50,REJECTED,3,retries exhausted"
        );
        assert_eq!(lines[2], "K2,alpha,0000000000000000000002,10.00,PENDING,0,");
    }
}
