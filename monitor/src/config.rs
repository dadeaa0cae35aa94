//! Top-level configuration for the exporter.
//!
//! This module aggregates configuration for:
//!
//! - the beacon-chain HTTP client (base address, connection pool, timeouts),
//! - the balance monitors (refresh interval + validator indices),
//! - the metrics endpoint (listen address).
//!
//! Binaries build an [`ExporterConfig`] from defaults, flags or environment
//! variables and hand it to [`crate::Supervisor::from_config`].

use std::net::{Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::error::ExporterError;
use crate::types::ValidatorIndex;

/// Default listen address of the `/metrics` endpoint.
pub const DEFAULT_LISTEN_ADDRESS: &str = ":8080";
/// Default base address of the beacon-chain HTTP API.
pub const DEFAULT_BEACON_CHAIN_ADDRESS: &str = ":5052";
/// Default interval between two polls of the same validator.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
/// Default time shutdown waits for in-flight polls before giving up on them.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Configuration for the beacon-chain HTTP client.
#[derive(Clone, Debug)]
pub struct BeaconClientConfig {
    /// Base address of the beacon API, e.g. `"http://127.0.0.1:5052"`.
    ///
    /// A missing scheme defaults to `http://` and a host-less `":5052"`
    /// targets `localhost`.
    pub base_address: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// TCP keep-alive interval for pooled connections.
    pub tcp_keepalive: Duration,
    /// Maximum idle connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// How long an idle pooled connection is kept around.
    pub pool_idle_timeout: Duration,
    /// Overall deadline for one request. `None` leaves only the connect timeout.
    pub request_timeout: Option<Duration>,
}

impl Default for BeaconClientConfig {
    fn default() -> Self {
        Self {
            base_address: DEFAULT_BEACON_CHAIN_ADDRESS.to_string(),
            connect_timeout: Duration::from_secs(30),
            tcp_keepalive: Duration::from_secs(30),
            pool_max_idle_per_host: 64,
            pool_idle_timeout: Duration::from_secs(384),
            request_timeout: None,
        }
    }
}

/// Configuration shared by all balance monitors.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Interval between two polls of the same validator.
    pub refresh_interval: Duration,
    /// Validators to monitor, one monitor each.
    pub validator_indices: Vec<ValidatorIndex>,
    /// How long shutdown waits for monitors stuck in a request.
    pub shutdown_grace: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            validator_indices: Vec::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Configuration for the Prometheus pull endpoint.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv6Addr::UNSPECIFIED, 8080)),
        }
    }
}

/// Top-level configuration for the exporter process.
#[derive(Clone, Debug, Default)]
pub struct ExporterConfig {
    pub beacon: BeaconClientConfig,
    pub monitor: MonitorConfig,
    pub metrics: MetricsConfig,
}

impl ExporterConfig {
    /// Rejects settings the monitors cannot run with.
    pub fn validate(&self) -> Result<(), ExporterError> {
        if self.monitor.refresh_interval.is_zero() {
            return Err(ExporterError::Config(
                "refresh interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses a listen address.
///
/// Accepts everything [`ToSocketAddrs`] resolves (`127.0.0.1:8080`,
/// `localhost:8080`, `[::1]:8080`) plus the host-less `:8080` form, which
/// binds the IPv6 wildcard `[::]:8080`. On Linux that socket also accepts
/// IPv4 connections; hosts without IPv6 fall back to `0.0.0.0` at bind time.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ExporterError> {
    let addr = addr.trim();
    let candidate = match addr.strip_prefix(':') {
        Some(port) => format!("[::]:{port}"),
        None => addr.to_string(),
    };

    candidate
        .to_socket_addrs()
        .map_err(|e| ExporterError::Config(format!("invalid listen address {addr:?}: {e}")))?
        .next()
        .ok_or_else(|| {
            ExporterError::Config(format!("listen address {addr:?} resolved to nothing"))
        })
}

/// Turns a user-supplied beacon address into an absolute base URL string.
///
/// The result has an `http://` or `https://` scheme, a host and no
/// trailing slash. It is not validated here; see
/// [`crate::client::BeaconChainClient::new`].
pub fn normalize_base_address(addr: &str) -> String {
    let addr = addr.trim().trim_end_matches('/');
    let lower = addr.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return addr.to_string();
    }
    if addr.starts_with(':') {
        return format!("http://localhost{addr}");
    }
    format!("http://{addr}")
}
