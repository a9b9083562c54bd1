//! pollq - run a polling queue consumer against an in-memory queue.
//!
//! # Usage
//!
//! ```bash
//! # 20 items, every 3rd fails its first attempt, run for 30s
//! pollq --items 20 --fail-every 3 --run-secs 30 -v
//!
//! # settings from a JSON file (otherwise POLLQ_* env vars are used)
//! pollq --config consumer.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use pollq_core::impls::{InMemoryModule, InMemoryQueue, InMemoryTransactionManager, ItemHandler};
use pollq_core::{
    BoxError, ConsumerConfig, ConsumerError, QueueConsumer, QueueConsumerBuilder, QueueingState,
};

type DemoConsumer = QueueConsumer<InMemoryModule<u64, DemoHandler>, InMemoryTransactionManager<u64>>;

#[derive(Parser)]
#[command(name = "pollq", version, about = "Polling queue consumer demo")]
struct Cli {
    /// JSON consumer config. Defaults to POLLQ_* environment variables.
    #[arg(long, env = "POLLQ_CONFIG")]
    config: Option<PathBuf>,

    /// Number of items to enqueue at startup
    #[arg(long, default_value_t = 10)]
    items: u64,

    /// Every k-th item fails its first attempt (0 = never)
    #[arg(long, default_value_t = 3)]
    fail_every: u64,

    /// Stop after this many seconds (Ctrl-C stops earlier)
    #[arg(long, default_value_t = 20)]
    run_secs: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// 最初の試行だけ失敗させるデモ用 handler
struct DemoHandler {
    fail_every: u64,
}

#[async_trait]
impl ItemHandler<u64> for DemoHandler {
    async fn handle(&self, item_id: &u64, state: &QueueingState) -> Result<(), BoxError> {
        let first_attempt = state.attempt_count() == 0;
        if self.fail_every > 0 && item_id % self.fail_every == 0 && first_attempt {
            return Err(format!("intentional failure of item {item_id}").into());
        }
        println!("processed item {item_id} (attempt {})", state.attempt_count() + 1);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => return config_error(e),
    };
    info!(?config, "consumer config loaded");

    let queue = InMemoryQueue::<u64>::new();
    let now = Utc::now();
    for item_id in 1..=cli.items {
        queue.enqueue(item_id, now).await;
    }

    let mut consumer = match build_consumer(&queue, cli.fail_every, &config) {
        Ok(consumer) => consumer,
        Err(e) => return config_error(e.into()),
    };

    consumer.start();
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(cli.run_secs)) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
        }
    }
    consumer.stop().await;

    let counts = queue.counts().await;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(ExitCode::SUCCESS)
}

fn build_consumer(
    queue: &InMemoryQueue<u64>,
    fail_every: u64,
    config: &ConsumerConfig,
) -> Result<DemoConsumer, ConsumerError> {
    QueueConsumerBuilder::new()
        .module(InMemoryModule::new(queue.clone(), DemoHandler { fail_every }))
        .transactions(queue.transaction_manager())
        .config(config)?
        .build()
}

/// 設定ミスは exit code 2、それ以外はそのままエラーで返す
fn config_error(error: anyhow::Error) -> Result<ExitCode> {
    match error.downcast_ref::<ConsumerError>() {
        Some(e) if e.is_invalid_configuration() => {
            eprintln!("pollq: {e}");
            Ok(ExitCode::from(2))
        }
        _ => Err(error),
    }
}

fn load_config(cli: &Cli) -> Result<ConsumerConfig> {
    match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(ConsumerConfig::from_json_str(&json)?)
        }
        None => Ok(ConsumerConfig::from_env()?),
    }
}

fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["pollq"]);
        assert_eq!(cli.items, 10);
        assert_eq!(cli.fail_every, 3);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn invalid_config_is_reported_as_configuration_error() {
        let config = ConsumerConfig {
            polled_items_limit: 0,
            ..ConsumerConfig::default()
        };
        let queue = InMemoryQueue::<u64>::new();

        let error = match build_consumer(&queue, 3, &config) {
            Ok(_) => panic!("zero polled items limit must be rejected"),
            Err(e) => e,
        };
        assert!(error.is_invalid_configuration());
        assert!(config_error(error.into()).is_ok());
    }

    #[test]
    fn unreadable_config_file_is_not_a_configuration_error() {
        let error = anyhow::anyhow!("failed to read consumer.json");
        assert!(config_error(error).is_err());
    }

    #[tokio::test]
    async fn demo_handler_fails_only_first_attempt() {
        let handler = DemoHandler { fail_every: 2 };
        let fresh = QueueingState::enqueued(Utc::now());
        assert!(handler.handle(&1, &fresh).await.is_ok());
        assert!(handler.handle(&2, &fresh).await.is_err());

        let mut retried = fresh.clone();
        retried.register_attempt_failure(Utc::now(), &"first");
        assert!(handler.handle(&2, &retried).await.is_ok());
    }
}
