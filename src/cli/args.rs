use crate::config::EngineConfig;
use crate::pipeline::PipelineOptions;
use crate::types::ConfigError;
use clap::Parser;
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Create transfers from CSV requests and drive them to a final state
#[derive(Parser, Debug)]
#[command(name = "transfer-engine")]
#[command(about = "Create transfers from CSV requests and drive them to a final state", long_about = None)]
pub struct CliArgs {
    /// Account seed CSV: id,owner,account_number,alias,balance
    #[arg(value_name = "ACCOUNTS", help = "Path to the account seed CSV file")]
    pub accounts_file: PathBuf,

    /// Transfer request CSV: origin,target,amount,description,idempotency_key
    #[arg(value_name = "REQUESTS", help = "Path to the transfer request CSV file")]
    pub requests_file: PathBuf,

    /// YAML engine configuration
    #[arg(long = "config", value_name = "PATH", help = "YAML configuration file")]
    pub config: Option<PathBuf>,

    /// Where to write the per-transfer report
    #[arg(
        long = "transfers-out",
        value_name = "PATH",
        help = "Write the transfer report CSV to this file"
    )]
    pub transfers_out: Option<PathBuf>,

    /// Upper bound on scheduler rounds
    #[arg(
        long = "max-rounds",
        value_name = "COUNT",
        default_value_t = 100,
        help = "Maximum scheduler rounds before giving up on unsettled transfers"
    )]
    pub max_rounds: usize,

    /// Simulated processor declines amounts above this
    #[arg(
        long = "decline-above",
        value_name = "AMOUNT",
        help = "Simulated processor rejects amounts above this value"
    )]
    pub decline_above: Option<Decimal>,

    /// Simulated processor fails the first N attempts of each transfer
    #[arg(
        long = "flaky-attempts",
        value_name = "COUNT",
        default_value_t = 0,
        help = "Simulated processor fails this many attempts per transfer before succeeding"
    )]
    pub flaky_attempts: u32,

    /// Process transfers as soon as they are created
    #[arg(
        long = "event-driven",
        help = "Process each transfer right after creation instead of waiting for the scheduler"
    )]
    pub event_driven: bool,

    #[arg(long = "max-retries", value_name = "COUNT", help = "Override retry.max_retries")]
    pub max_retries: Option<u32>,

    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Override scheduler.max_concurrent (default: CPU cores)"
    )]
    pub max_concurrent: Option<usize>,

    #[arg(long = "log-level", value_name = "LEVEL", help = "Override logging.level")]
    pub log_level: Option<String>,

    #[arg(long = "json-logs", help = "Emit logs as JSON")]
    pub json_logs: bool,
}

impl CliArgs {
    /// Build the engine configuration
    ///
    /// Starts from the `--config` file when given, otherwise defaults, then
    /// applies the command-line overrides. A zero `--max-concurrent` falls
    /// back to the default with a warning.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_yaml_file(path)?,
            None => EngineConfig::default(),
        };

        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.scheduler.max_concurrent = max_concurrent;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }

        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    pub fn to_pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            accounts_path: self.accounts_file.clone(),
            requests_path: self.requests_file.clone(),
            transfers_out: self.transfers_out.clone(),
            max_rounds: self.max_rounds,
            decline_above: self.decline_above,
            flaky_attempts: self.flaky_attempts,
            event_driven: self.event_driven,
        }
    }
}
