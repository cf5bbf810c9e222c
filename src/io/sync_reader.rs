//! Streaming CSV reader with iterator interface
//!
//! Provides a streaming iterator over typed records from a CSV file. The
//! reader only deserializes rows; conversion into domain types is done by
//! the `csv_format` module.
//!
//! ```no_run
//! use transfer_engine::io::csv_format::TransferRequestRecord;
//! use transfer_engine::io::sync_reader::CsvFileReader;
//! use std::path::Path;
//!
//! let reader = CsvFileReader::<TransferRequestRecord>::open(Path::new("requests.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(record) => println!("Request: {:?}", record),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found) are returned from `open()`
//! - Row-level parse errors are yielded as Err variants, with line numbers
//! - Memory usage is O(1) per record, not O(file_size)

use csv::{DeserializeRecordsIntoIter, ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::Path;

/// Iterator over the rows of a CSV file, deserialized as `T`
pub struct CsvFileReader<T> {
    records: DeserializeRecordsIntoIter<File, T>,
    line_num: usize,
}

impl<T: DeserializeOwned> CsvFileReader<T> {
    /// Open a CSV file with a header row
    ///
    /// The CSV reader is configured to:
    /// - Trim whitespace from all fields
    /// - Allow flexible field counts (trailing optional columns)
    /// - Use an 8KB buffer for efficient I/O
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the CSV file
    ///
    /// # Returns
    ///
    /// * `Ok(CsvFileReader)` if file opened successfully
    /// * `Err(String)` if file could not be opened
    pub fn open(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            records: reader.into_deserialize(),
            line_num: 1,
        })
    }
}

impl<T: DeserializeOwned> Iterator for CsvFileReader<T> {
    type Item = Result<T, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.records.next()?;
        self.line_num += 1;
        Some(next.map_err(|e| format!("Line {}: CSV parse error: {}", self.line_num, e)))
    }
}
