//! Transfer Engine CLI
//!
//! Seeds accounts and transfer requests from CSV files, drives every
//! transfer through the lifecycle and prints the final account balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- accounts.csv requests.csv > balances.csv
//! cargo run -- --config engine.yaml accounts.csv requests.csv > balances.csv
//! cargo run -- --flaky-attempts 2 --decline-above 5000 --transfers-out transfers.csv accounts.csv requests.csv
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides the configured level.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (invalid configuration, file not found, file not readable, etc.)
//!   or transfers still unsettled when the scheduler gave up

use std::process;
use transfer_engine::cli;
use transfer_engine::logging::init_logging;
use transfer_engine::pipeline::run_file_pipeline;

fn main() {
    let args = cli::parse_args();

    let config = match args.to_engine_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Warning: logging not initialized: {}", e);
    }

    let mut output = std::io::stdout();
    match run_file_pipeline(&config, &args.to_pipeline_options(), &mut output) {
        Ok(summary) if !summary.settle.settled => {
            eprintln!(
                "Error: {} transfers still unsettled after {} rounds",
                summary.settle.outstanding, summary.settle.rounds
            );
            process::exit(1);
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
