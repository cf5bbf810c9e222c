//! File-driven pipeline
//!
//! Seeds accounts from a CSV file, submits every transfer request from a
//! second CSV file through the create service, drains the scheduler until
//! every transfer has reached a resting state and writes the final account
//! balances (plus, optionally, a per-transfer report).
//!
//! Row-level problems (malformed rows, rejected requests) are logged and
//! counted; only I/O and runtime failures abort the run.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{spawn_event_listener, ChannelEventPublisher, LoggingNotifier, SimulatedProcessor};
use crate::config::EngineConfig;
use crate::core::clock::{Clock, SystemClock};
use crate::core::engine::TransferEngine;
use crate::core::scheduler::SettleSummary;
use crate::core::store::InMemoryStore;
use crate::core::traits::{NoopEventPublisher, Ports, TransferEventPublisher};
use crate::io::csv_format::{
    convert_account_record, convert_request_record, write_accounts_csv, write_transfers_csv,
    AccountSeedRecord, TransferRequestRecord,
};
use crate::io::sync_reader::CsvFileReader;

/// Error code counted for request rows that do not parse
pub const MALFORMED_ROW: &str = "MALFORMED_ROW";

/// Inputs and simulation knobs for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub accounts_path: PathBuf,
    pub requests_path: PathBuf,
    pub transfers_out: Option<PathBuf>,
    pub max_rounds: usize,
    pub decline_above: Option<Decimal>,
    pub flaky_attempts: u32,
    /// Process each transfer as soon as it is created, on a listener task
    pub event_driven: bool,
}

impl PipelineOptions {
    pub fn new(accounts_path: impl Into<PathBuf>, requests_path: impl Into<PathBuf>) -> Self {
        Self {
            accounts_path: accounts_path.into(),
            requests_path: requests_path.into(),
            transfers_out: None,
            max_rounds: 100,
            decline_above: None,
            flaky_attempts: 0,
            event_driven: false,
        }
    }
}

/// Counts for one pipeline run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PipelineSummary {
    pub accounts_loaded: usize,
    pub accounts_skipped: usize,
    pub requests_read: usize,
    pub transfers_created: usize,
    /// Rejected requests by error code
    pub create_errors: BTreeMap<String, usize>,
    pub settle: SettleSummary,
}

impl PipelineSummary {
    fn count_error(&mut self, code: &str) {
        *self.create_errors.entry(code.to_string()).or_insert(0) += 1;
    }
}

/// Run the whole pipeline and write account balances to `output`
///
/// This method:
/// 1. Creates a tokio multi-threaded runtime sized by `scheduler.max_concurrent`
/// 2. Wires an engine over an in-memory store and a simulated processor
/// 3. Seeds accounts, skipping rows that do not convert or register
/// 4. Creates a transfer per request row, in file order
/// 5. Stops the event listener, if any, once its in-flight transfer is done
/// 6. Runs scheduler rounds until nothing is left to do or `max_rounds` is hit
/// 7. Writes the accounts CSV to `output` and the transfer report if asked
///
/// # Arguments
///
/// * `config` - Normalized engine configuration
/// * `options` - Input paths and simulation knobs
/// * `output` - Destination for the accounts CSV
///
/// # Returns
///
/// * `Ok(PipelineSummary)` if the run completed
/// * `Err(String)` if a fatal error occurred
pub fn run_file_pipeline(
    config: &EngineConfig,
    options: &PipelineOptions,
    output: &mut dyn Write,
) -> Result<PipelineSummary, String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.scheduler.max_concurrent.max(1))
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

    runtime.block_on(async {
        let mut processor = SimulatedProcessor::new().with_flaky_attempts(options.flaky_attempts);
        if let Some(limit) = options.decline_above {
            processor = processor.with_decline_above(limit);
        }

        let cancel = CancellationToken::new();
        let mut receiver = None;
        let events: Arc<dyn TransferEventPublisher> = if options.event_driven {
            let (publisher, rx) = ChannelEventPublisher::channel(config.scheduler.pending_batch_size);
            receiver = Some(rx);
            Arc::new(publisher)
        } else {
            Arc::new(NoopEventPublisher)
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ports = Ports::with_store(
            Arc::new(InMemoryStore::new()),
            Arc::new(processor),
            Arc::new(LoggingNotifier),
            events,
            Arc::clone(&clock),
        );
        let engine = TransferEngine::new(ports, config);

        let listener = receiver
            .map(|rx| spawn_event_listener(rx, engine.process_service(), cancel.clone()));

        let mut summary = PipelineSummary::default();
        seed_accounts(&engine, &options.accounts_path, clock.as_ref(), &mut summary).await?;
        submit_requests(&engine, &options.requests_path, &mut summary).await?;

        // In-flight listener work finishes; anything it left behind is
        // drained by the scheduler below
        cancel.cancel();
        if let Some(handle) = listener {
            handle
                .await
                .map_err(|e| format!("Event listener task failed: {}", e))?;
        }

        summary.settle = engine
            .scheduler()
            .run_until_settled(options.max_rounds)
            .await
            .map_err(|e| format!("Scheduler failed: {}", e))?;

        let accounts = engine
            .accounts()
            .await
            .map_err(|e| format!("Failed to read accounts: {}", e))?;
        write_accounts_csv(&accounts, output)?;

        if let Some(path) = &options.transfers_out {
            let transfers = engine
                .transfers()
                .await
                .map_err(|e| format!("Failed to read transfers: {}", e))?;
            let mut file = File::create(path)
                .map_err(|e| format!("Failed to create '{}': {}", path.display(), e))?;
            write_transfers_csv(&transfers, &mut file)?;
        }

        info!(
            accounts = summary.accounts_loaded,
            requests = summary.requests_read,
            created = summary.transfers_created,
            rounds = summary.settle.rounds,
            completed = summary.settle.totals.completed,
            rejected = summary.settle.totals.rejected,
            settled = summary.settle.settled,
            outstanding = summary.settle.outstanding,
            "Pipeline finished"
        );
        Ok(summary)
    })
}

async fn seed_accounts(
    engine: &TransferEngine,
    path: &Path,
    clock: &dyn Clock,
    summary: &mut PipelineSummary,
) -> Result<(), String> {
    for row in CsvFileReader::<AccountSeedRecord>::open(path)? {
        let account = match row.and_then(|record| convert_account_record(record, clock.now())) {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "Skipping account row");
                summary.accounts_skipped += 1;
                continue;
            }
        };

        match engine.register_account(account).await {
            Ok(_) => summary.accounts_loaded += 1,
            Err(e) => {
                warn!(error = %e, code = e.code(), "Account not registered");
                summary.accounts_skipped += 1;
            }
        }
    }
    Ok(())
}

async fn submit_requests(
    engine: &TransferEngine,
    path: &Path,
    summary: &mut PipelineSummary,
) -> Result<(), String> {
    for row in CsvFileReader::<TransferRequestRecord>::open(path)? {
        summary.requests_read += 1;

        let request = match row.and_then(convert_request_record) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Skipping request row");
                summary.count_error(MALFORMED_ROW);
                continue;
            }
        };

        let key = request.idempotency_key.clone();
        match engine.create_transfer(request).await {
            Ok(_) => summary.transfers_created += 1,
            Err(e) => {
                warn!(idempotency_key = %key, error = %e, code = e.code(), "Transfer request rejected");
                summary.count_error(e.code());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    const ACCOUNTS: &str = "id,owner,account_number,alias,balance\n\
        alice,o1,0000000000000000000001,alice.acct,500.00\n\
        bob,o2,0000000000000000000002,bob.acct,0.00\n";

    fn run(requests: &str, options: impl FnOnce(&mut PipelineOptions)) -> (PipelineSummary, String) {
        let accounts = create_temp_csv(ACCOUNTS);
        let requests = create_temp_csv(requests);
        let mut opts = PipelineOptions::new(accounts.path(), requests.path());
        options(&mut opts);

        let mut output = Vec::new();
        let summary = run_file_pipeline(&EngineConfig::default(), &opts, &mut output).unwrap();
        (summary, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_pipeline_settles_and_writes_balances() {
        let (summary, output) = run(
            "origin,target,amount,description,idempotency_key\n\
             alice,0000000000000000000002,100.00,rent,K1\n",
            |_| {},
        );

        assert_eq!(summary.transfers_created, 1);
        assert!(summary.settle.settled);
        assert_eq!(
            output,
            "id,account_number,alias,balance\n\
             alice,0000000000000000000001,alice.acct,400.00\n\
             bob,0000000000000000000002,bob.acct,100.00\n"
        );
    }

    #[test]
    fn test_pipeline_counts_rejected_requests_by_code() {
        let (summary, _) = run(
            "origin,target,amount,description,idempotency_key\n\
             alice,0000000000000000000002,900.00,too much,K1\n\
             alice,0000000000000000000001,1.00,self,K2\n\
             alice,0000000000000000000002,abc,bad,K3\n\
             alice,0000000000000000000002,5.00,fine,K4\n",
            |_| {},
        );

        assert_eq!(summary.requests_read, 4);
        assert_eq!(summary.transfers_created, 1);
        assert_eq!(summary.create_errors.get("INSUFFICIENT_FUNDS"), Some(&1));
        assert_eq!(summary.create_errors.get("SAME_ACCOUNT_TRANSFER"), Some(&1));
        assert_eq!(summary.create_errors.get(MALFORMED_ROW), Some(&1));
    }

    #[test]
    fn test_pipeline_event_driven_reaches_same_balances() {
        let (summary, output) = run(
            "origin,target,amount,description,idempotency_key\n\
             alice,0000000000000000000002,100.00,rent,K1\n\
             alice,0000000000000000000002,50.00,food,K2\n",
            |opts| opts.event_driven = true,
        );

        assert_eq!(summary.transfers_created, 2);
        assert!(output.contains("alice,0000000000000000000001,alice.acct,350.00"));
        assert!(output.contains("bob,0000000000000000000002,bob.acct,150.00"));
    }

    #[test]
    fn test_pipeline_writes_transfer_report() {
        let report = NamedTempFile::new().unwrap();
        let report_path = report.path().to_path_buf();
        run(
            "origin,target,amount,description,idempotency_key\n\
             alice,0000000000000000000002,300.00,big,K1\n",
            |opts| {
                opts.decline_above = Some(Decimal::new(20000, 2));
                opts.transfers_out = Some(report_path.clone());
            },
        );

        let text = std::fs::read_to_string(&report_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("K1,alice,0000000000000000000002,300.00,REJECTED,0,"));
        assert!(lines[1].contains("LIMIT_EXCEEDED"));
    }

    #[test]
    fn test_pipeline_missing_accounts_file_is_fatal() {
        let requests = create_temp_csv("origin,target,amount,description,idempotency_key\n");
        let opts = PipelineOptions::new("missing-accounts.csv", requests.path());
        let mut output = Vec::new();

        let result = run_file_pipeline(&EngineConfig::default(), &opts, &mut output);

        assert!(result.unwrap_err().contains("Failed to open file"));
    }
}
