//! Simulated settlement processor
//!
//! Stands in for the settlement network in the file pipeline, benches and
//! tests. Behaviour is configured up front:
//!
//! - amounts above `decline_above` are rejected permanently (`LIMIT_EXCEEDED`)
//! - the first `flaky_attempts` calls for each idempotency key fail
//!   recoverably
//! - an accepted key stays accepted: repeated calls answer `true` again
//!   without settling twice

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::core::traits::ExternalProcessor;
use crate::types::{IdempotencyKey, ProcessorError, TransferData};

/// Error code used for amounts above the configured limit
pub const LIMIT_EXCEEDED: &str = "LIMIT_EXCEEDED";

#[derive(Debug, Default)]
pub struct SimulatedProcessor {
    decline_above: Option<Decimal>,
    flaky_attempts: u32,
    latency: Option<Duration>,

    /// Calls seen per idempotency key
    attempts: DashMap<IdempotencyKey, u32>,
    /// Keys already accepted
    settled: DashMap<IdempotencyKey, Decimal>,
    total_calls: AtomicUsize,
}

impl SimulatedProcessor {
    /// Processor that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decline_above(mut self, limit: Decimal) -> Self {
        self.decline_above = Some(limit);
        self
    }

    pub fn with_flaky_attempts(mut self, attempts: u32) -> Self {
        self.flaky_attempts = attempts;
        self
    }

    /// Sleep this long before answering each call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Calls received for `key`
    pub fn calls_for(&self, key: &IdempotencyKey) -> u32 {
        self.attempts.get(key).map(|n| *n).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Number of distinct keys settled
    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }
}

#[async_trait]
impl ExternalProcessor for SimulatedProcessor {
    async fn process_transfer(&self, data: &TransferData) -> Result<bool, ProcessorError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut count = self.attempts.entry(data.idempotency_key.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if self.settled.contains_key(&data.idempotency_key) {
            debug!(transfer_id = %data.transfer_id, "Key already settled, acknowledging again");
            return Ok(true);
        }

        if let Some(limit) = self.decline_above {
            if data.amount > limit {
                return Err(ProcessorError::permanent(
                    LIMIT_EXCEEDED,
                    format!("amount {} exceeds limit {}", data.amount, limit),
                ));
            }
        }

        if attempt <= self.flaky_attempts {
            return Err(ProcessorError::recoverable(format!(
                "settlement network unavailable (attempt {})",
                attempt
            )));
        }

        self.settled.insert(data.idempotency_key.clone(), data.amount);
        Ok(true)
    }
}
