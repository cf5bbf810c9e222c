//! I/O module
//!
//! Handles CSV parsing and output.
//!
//! # Components
//!
//! - `csv_format` - Record conversion and report serialization
//! - `sync_reader` - Streaming CSV reader with iterator interface

pub mod csv_format;
pub mod sync_reader;

pub use csv_format::{
    convert_account_record, convert_request_record, write_accounts_csv, write_transfers_csv,
    AccountSeedRecord, TransferRequestRecord,
};
pub use sync_reader::CsvFileReader;
