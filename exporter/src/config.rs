//! Command-line configuration of the exporter binary.
//!
//! Every flag has an environment fallback so the exporter can be configured
//! entirely from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use beacon_monitor::{
    BeaconClientConfig, ExporterConfig, MetricsConfig, MonitorConfig, ValidatorIndex,
    parse_listen_addr,
};
use clap::{ArgAction, Parser};

/// Exports beacon-chain validator balances as Prometheus gauges.
#[derive(Parser, Debug)]
#[command(name = "eth2-exporter", author, version, about)]
pub struct Cli {
    /// The address to listen on for HTTP requests.
    #[arg(
        long,
        env = "EXPORTER_LISTEN_ADDRESS",
        default_value = beacon_monitor::config::DEFAULT_LISTEN_ADDRESS,
        value_parser = parse_listen_address
    )]
    pub listen_address: SocketAddr,

    /// The address of the beacon chain HTTP API.
    #[arg(
        long,
        env = "EXPORTER_BEACON_CHAIN_ADDRESS",
        default_value = beacon_monitor::config::DEFAULT_BEACON_CHAIN_ADDRESS
    )]
    pub beacon_chain_address: String,

    /// The interval between polling the beacon chain for metrics.
    #[arg(
        long,
        env = "EXPORTER_REFRESH_INTERVAL",
        default_value = "5s",
        value_parser = parse_positive_duration
    )]
    pub refresh_interval: Duration,

    /// Validator index to gather metrics on. Repeat the flag for more validators.
    #[arg(
        long = "validator-index",
        env = "EXPORTER_VALIDATOR_INDICES",
        action = ArgAction::Append,
        value_delimiter = ','
    )]
    pub validator_indices: Vec<ValidatorIndex>,

    /// Timeout for establishing a connection to the beacon node.
    #[arg(
        long,
        env = "EXPORTER_CONNECT_TIMEOUT",
        default_value = "30s",
        value_parser = parse_positive_duration
    )]
    pub connect_timeout: Duration,

    /// Overall deadline for one beacon API request. Unset means no deadline.
    #[arg(long, env = "EXPORTER_REQUEST_TIMEOUT", value_parser = parse_positive_duration)]
    pub request_timeout: Option<Duration>,

    /// How long shutdown waits for in-flight beacon requests.
    #[arg(
        long,
        env = "EXPORTER_SHUTDOWN_GRACE",
        default_value = "5s",
        value_parser = parse_positive_duration
    )]
    pub shutdown_grace: Duration,

    /// Default log filter, used when `RUST_LOG` is not set.
    #[arg(long, env = "EXPORTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "EXPORTER_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Cli {
    /// Converts parsed flags into the library configuration.
    pub fn exporter_config(&self) -> ExporterConfig {
        ExporterConfig {
            beacon: BeaconClientConfig {
                base_address: self.beacon_chain_address.clone(),
                connect_timeout: self.connect_timeout,
                request_timeout: self.request_timeout,
                ..BeaconClientConfig::default()
            },
            monitor: MonitorConfig {
                refresh_interval: self.refresh_interval,
                validator_indices: self.validator_indices.clone(),
                shutdown_grace: self.shutdown_grace,
            },
            metrics: MetricsConfig {
                listen_addr: self.listen_address,
            },
        }
    }
}

fn parse_listen_address(s: &str) -> Result<SocketAddr, String> {
    parse_listen_addr(s).map_err(|e| e.to_string())
}

fn parse_positive_duration(s: &str) -> Result<Duration, String> {
    let d = humantime::parse_duration(s.trim()).map_err(|e| format!("invalid duration {s:?}: {e}"))?;
    if d.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(d)
}
