//! Time-bounded storage calls
//!
//! Storage commits are one of the two suspension points of the lifecycle;
//! every repository call made by the services goes through [`bounded`] so a
//! stalled store surfaces as [`StorageError::Timeout`] instead of hanging a
//! sweep.

use std::future::Future;
use std::time::Duration;

use crate::types::{StorageError, StorageResult};

/// Await `future`, failing with `StorageError::Timeout` after `limit`
pub async fn bounded<T, F>(operation: &str, limit: Duration, future: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout {
            operation: operation.to_string(),
        }),
    }
}
