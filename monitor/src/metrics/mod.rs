//! Metrics and the Prometheus pull endpoint.
//!
//! This module defines the per-validator balance gauges, the registry that
//! owns them, the exposition encoders, and a small HTTP exporter that serves
//! `/metrics`.
//!
//! Typical usage:
//!
//! ```ignore
//! use beacon_monitor::metrics::{MetricsRegistry, bind_metrics_listener, serve_metrics};
//! use beacon_monitor::ValidatorIndex;
//!
//! let registry = MetricsRegistry::new()?;
//! let gauge = registry.register_balance_gauge(ValidatorIndex(1))?;
//!
//! // Serve until Ctrl-C:
//! let listener = bind_metrics_listener("127.0.0.1:8080".parse()?).await?;
//! tokio::spawn(serve_metrics(registry.clone(), listener, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }));
//!
//! // Elsewhere, after a successful poll:
//! gauge.set(32_000_000_000);
//! ```

pub mod encoding;
pub mod exporter;
pub mod prometheus;

pub use self::encoding::{ExpositionFormat, encode_openmetrics};
pub use self::exporter::{METRICS_PATH, bind_metrics_listener, serve_metrics};
pub use self::prometheus::{BalanceGauge, MetricsRegistry};
