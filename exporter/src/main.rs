// exporter/src/main.rs

//! Exporter binary.
//!
//! Polls a beacon node for the balance of every `--validator-index` and
//! serves them as `eth2_validator_balance_gwei` gauges on `/metrics`.
//! Runs until SIGINT/SIGTERM; exits non-zero on startup or listener errors.

mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use beacon_monitor::Supervisor;
use config::Cli;

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(&cli) {
        tracing::error!("fatal error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), beacon_monitor::ExporterError> {
    let cfg = cli.exporter_config();

    tracing::info!(listen_address = %cfg.metrics.listen_addr, "listen-address");
    tracing::info!(beacon_chain_address = %cfg.beacon.base_address, "beacon-chain-address");
    tracing::info!(refresh_interval = ?cfg.monitor.refresh_interval, "refresh-interval");
    tracing::info!(
        validator_indices = ?cfg.monitor.validator_indices,
        "validator-index"
    );

    // The supervisor owns a blocking HTTP client, so it is built here on the
    // main thread; the async runtime only exists inside `run`.
    let supervisor = Supervisor::from_config(&cfg)?;
    supervisor.run(cfg.metrics.listen_addr)
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);

    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}
