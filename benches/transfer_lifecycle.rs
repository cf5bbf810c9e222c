//! Benchmark suite for the transfer lifecycle
//!
//! Measures the file pipeline end to end (seed, create, settle, write) and
//! the create-then-process path of the engine on its own, using the divan
//! benchmarking framework.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//! ```
//!
//! Inputs are generated per run: `ACCOUNTS` accounts with a large opening
//! balance and `n` transfer requests between neighbouring accounts, so
//! every request is accepted.

use rust_decimal::Decimal;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use transfer_engine::adapters::{LoggingNotifier, SimulatedProcessor};
use transfer_engine::config::EngineConfig;
use transfer_engine::core::clock::SystemClock;
use transfer_engine::core::store::InMemoryStore;
use transfer_engine::core::traits::{NoopEventPublisher, Ports};
use transfer_engine::core::{CreateTransferRequest, TransferEngine};
use transfer_engine::pipeline::{run_file_pipeline, PipelineOptions};
use transfer_engine::types::{Account, AccountId, AccountNumber, Alias};

const ACCOUNTS: u32 = 50;

fn main() {
    divan::main();
}

fn account_number(index: u32) -> String {
    format!("{:022}", index + 1)
}

fn accounts_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(file, "id,owner,account_number,alias,balance").expect("write header");
    for i in 0..ACCOUNTS {
        writeln!(
            file,
            "acct{},owner-{},{},alias.acct{},1000000.00",
            i,
            i,
            account_number(i),
            i
        )
        .expect("write account");
    }
    file.flush().expect("flush accounts");
    file
}

fn requests_csv(count: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(file, "origin,target,amount,description,idempotency_key").expect("write header");
    for n in 0..count {
        let origin = n as u32 % ACCOUNTS;
        let target = (origin + 1) % ACCOUNTS;
        writeln!(file, "acct{},{},12.50,bench,K{}", origin, account_number(target), n)
            .expect("write request");
    }
    file.flush().expect("flush requests");
    file
}

fn pipeline_inputs(count: usize, event_driven: bool) -> (NamedTempFile, NamedTempFile, PipelineOptions) {
    let accounts = accounts_csv();
    let requests = requests_csv(count);
    let mut options = PipelineOptions::new(accounts.path(), requests.path());
    options.event_driven = event_driven;
    (accounts, requests, options)
}

/// Whole pipeline, scheduler-driven
#[divan::bench(args = [100, 1_000])]
fn pipeline_scheduler(bencher: divan::Bencher, count: usize) {
    let config = EngineConfig::default();
    bencher
        .with_inputs(|| pipeline_inputs(count, false))
        .bench_values(|(_accounts, _requests, options)| {
            let mut output = Vec::new();
            run_file_pipeline(&config, &options, &mut output).expect("Pipeline failed");
        });
}

/// Whole pipeline with the event listener running during creation
#[divan::bench(args = [100, 1_000])]
fn pipeline_event_driven(bencher: divan::Bencher, count: usize) {
    let config = EngineConfig::default();
    bencher
        .with_inputs(|| pipeline_inputs(count, true))
        .bench_values(|(_accounts, _requests, options)| {
            let mut output = Vec::new();
            run_file_pipeline(&config, &options, &mut output).expect("Pipeline failed");
        });
}

/// Create and synchronously process transfers on a single engine
#[divan::bench(args = [100, 1_000])]
fn engine_create_and_process(bencher: divan::Bencher, count: usize) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");
    let config = EngineConfig::default();

    bencher.bench_local(|| {
        runtime.block_on(async {
            let ports = Ports::with_store(
                Arc::new(InMemoryStore::new()),
                Arc::new(SimulatedProcessor::new()),
                Arc::new(LoggingNotifier),
                Arc::new(NoopEventPublisher),
                Arc::new(SystemClock),
            );
            let engine = TransferEngine::new(ports, &config);

            for i in 0..2 {
                let account = Account::reconstruct(
                    AccountId::new(format!("acct{}", i)),
                    format!("owner-{}", i),
                    AccountNumber::parse(&account_number(i)).expect("valid number"),
                    Alias::parse(&format!("alias.acct{}", i)).expect("valid alias"),
                    Decimal::new(100_000_000, 2),
                    chrono::Utc::now(),
                    0,
                );
                engine.register_account(account).await.expect("register");
            }

            for n in 0..count {
                let view = engine
                    .create_transfer(CreateTransferRequest {
                        origin_account_id: "acct0".to_string(),
                        target_account_number: account_number(1),
                        amount: Decimal::new(1250, 2),
                        description: "bench".to_string(),
                        idempotency_key: format!("K{}", n),
                    })
                    .await
                    .expect("create");
                engine.process_transfer(view.id).await.expect("process");
            }
        });
    });
}
