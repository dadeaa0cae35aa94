//! Beacon-chain validator balance monitoring.
//!
//! This crate provides the building blocks of a Prometheus exporter that
//! tracks validator balances:
//!
//! - strongly-typed domain types and the beacon API wire format (`types`),
//! - the beacon-chain HTTP client behind the `BalanceSource` trait (`client`),
//! - balance gauges, exposition encoders and the `/metrics` endpoint (`metrics`),
//! - one polling monitor per validator (`monitor`),
//! - the supervisor wiring it all together (`supervisor`),
//! - and the top-level exporter configuration (`config`).
//!
//! Binaries build an [`ExporterConfig`], hand it to
//! [`Supervisor::from_config`] and call [`Supervisor::run`].

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod supervisor;
pub mod types;

// Re-export top-level configuration types.
pub use config::{
    BeaconClientConfig, ExporterConfig, MetricsConfig, MonitorConfig, normalize_base_address,
    parse_listen_addr,
};

pub use error::ExporterError;

// Re-export the beacon client and its seam.
pub use client::{BalanceSource, BeaconChainClient, ClientError};

// Re-export metrics registry and the HTTP exporter.
pub use metrics::{
    BalanceGauge, ExpositionFormat, MetricsRegistry, bind_metrics_listener, serve_metrics,
};

pub use monitor::{BalanceMonitor, MonitorHandle, MonitorState};
pub use supervisor::Supervisor;

// Re-export domain types at the crate root for convenience.
pub use types::*;
