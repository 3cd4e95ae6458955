//! Transfer Monitor Service
//!
//! Warms the directories with a lookback fetch, applies the requested filters
//! and then prints one batch (`--once`) or polls until Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;
use transfer_monitor::{FilterUpdate, MonitorConfig, NormalizedRecord, StopOutcome, TransferMonitor};

#[derive(Parser, Debug)]
#[command(name = "transfer_monitor", about = "Monitor large on-chain transfers")]
struct Args {
    /// TOML config file (defaults to config/transfer_monitor.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Polling interval in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Transfers requested per fetch
    #[arg(long)]
    limit: Option<u32>,

    /// Minimum historical USD value
    #[arg(long)]
    min_usd: Option<f64>,

    /// Upstream time window, e.g. 1h, 24h, 7d
    #[arg(long)]
    lookback: Option<String>,

    /// Token symbol to include (repeatable)
    #[arg(long = "token")]
    tokens: Vec<String>,

    /// Sender display name to include (repeatable)
    #[arg(long = "from")]
    from_names: Vec<String>,

    /// Receiver display name to include (repeatable)
    #[arg(long = "to")]
    to_names: Vec<String>,

    /// Print a single batch and exit
    #[arg(long)]
    once: bool,

    /// Lookback window of the cache warm-up fetch
    #[arg(long, default_value = "1d")]
    warmup_lookback: String,

    /// Minimum USD value of the cache warm-up fetch
    #[arg(long, default_value_t = 100000.0)]
    warmup_min_usd: f64,
}

/// Filter used while loading config, before `log_level` is known
const STARTUP_LOG_FILTER: &str = "info";

/// Load config under a scoped subscriber so its own log lines are not lost
fn load_config<W>(path: Option<&Path>, filter: EnvFilter, make_writer: W) -> Result<MonitorConfig>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::with_default(subscriber, || MonitorConfig::load(path))
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let startup_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(STARTUP_LOG_FILTER));
    let mut config = load_config(args.config.as_deref(), startup_filter, std::io::stdout)?;
    if let Some(limit) = args.limit {
        config.default_limit = limit;
    }
    if let Some(interval) = args.interval {
        config.poll_interval_secs = interval;
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let limit = config.default_limit;
    let interval = config.poll_interval();
    let monitor = TransferMonitor::new(config).context("Failed to create transfer monitor")?;

    if let Err(e) = monitor
        .initialize_cache(&args.warmup_lookback, args.warmup_min_usd, limit)
        .await
    {
        warn!("Cache warm-up failed, filters by name may not resolve: {}", e);
    }

    monitor.set_filters(FilterUpdate {
        min_usd: args.min_usd,
        lookback: args.lookback,
        token_symbols: Some(args.tokens),
        from_names: Some(args.from_names),
        to_names: Some(args.to_names),
    });

    if args.once {
        let records = monitor.get_transactions(limit).await?;
        for record in &records {
            print_record(record);
        }
        info!("Printed {} transfers", records.len());
        return Ok(());
    }

    monitor.start_polling(interval, |record| {
        print_record(record);
        Ok(())
    });

    info!("Monitoring every {:?}. Press Ctrl+C to stop.", interval);
    signal::ctrl_c().await?;

    match monitor.stop_polling(Duration::from_secs(5)).await {
        StopOutcome::TimedOut => warn!("Poller did not stop in time"),
        outcome => info!("Poller stopped: {:?}", outcome),
    }
    Ok(())
}

fn print_record(record: &NormalizedRecord) {
    println!(
        "{} | {:<10} | {} -> {} | {} {} | {} | {}",
        record.timestamp,
        record.chain,
        record.from,
        record.to,
        record.quantity,
        record.symbol,
        record.usd,
        record.tx_id
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::{self, Write};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_config_load_is_logged() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "default_limit = 7").unwrap();

        let captured = Captured::default();
        let sink = captured.clone();
        let config = load_config(Some(file.path()), EnvFilter::new("debug"), move || sink.clone()).unwrap();
        assert_eq!(config.default_limit, 7);

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(output.contains("Loading monitor config from"), "{}", output);
        assert!(output.contains("Monitor config loaded"), "{}", output);
        assert!(output.contains("limit=7"), "{}", output);
    }
}
