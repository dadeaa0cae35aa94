//! Prometheus-backed balance gauges and the registry that owns them.
//!
//! [`MetricsRegistry`] wraps a [`prometheus::Registry`] together with a map
//! from validator index to its [`BalanceGauge`]. It is cheap to clone and
//! every clone refers to the same underlying registry, so it is passed
//! explicitly to monitors and to the HTTP exporter instead of living in a
//! global.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{self, Encoder, Gauge, Opts, Registry, TextEncoder};

use crate::metrics::encoding::{ExpositionFormat, encode_openmetrics};
use crate::types::ValidatorIndex;

pub const BALANCE_NAMESPACE: &str = "eth2";
pub const BALANCE_SUBSYSTEM: &str = "validator";
pub const BALANCE_NAME: &str = "balance_gwei";
pub const BALANCE_HELP: &str = "The balance of a given validator.";
/// Constant label carrying the validator index on every balance gauge.
pub const VALIDATOR_INDEX_LABEL: &str = "validator_index";

/// Balance gauge of a single validator.
///
/// The gauge is registered up front but stays out of scrapes until the
/// first successful poll writes it, so an unreachable validator shows up as
/// a missing series rather than a bogus zero balance.
#[derive(Clone, Debug)]
pub struct BalanceGauge {
    index: ValidatorIndex,
    gauge: Gauge,
    written: Arc<AtomicBool>,
}

impl BalanceGauge {
    fn new(index: ValidatorIndex) -> Result<Self, prometheus::Error> {
        let opts = Opts::new(BALANCE_NAME, BALANCE_HELP)
            .namespace(BALANCE_NAMESPACE)
            .subsystem(BALANCE_SUBSYSTEM)
            .const_label(VALIDATOR_INDEX_LABEL, index.to_string());

        Ok(Self {
            index,
            gauge: Gauge::with_opts(opts)?,
            written: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Validator this gauge is labeled with.
    pub fn index(&self) -> ValidatorIndex {
        self.index
    }

    /// Publishes a balance in gwei.
    pub fn set(&self, balance_gwei: u64) {
        self.gauge.set(balance_gwei as f64);
        self.written.store(true, Ordering::Release);
    }

    /// Last published balance, or `None` if nothing was published yet.
    pub fn value(&self) -> Option<f64> {
        if self.written.load(Ordering::Acquire) {
            Some(self.gauge.get())
        } else {
            None
        }
    }
}

impl Collector for BalanceGauge {
    fn desc(&self) -> Vec<&Desc> {
        self.gauge.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        if self.written.load(Ordering::Acquire) {
            self.gauge.collect()
        } else {
            Vec::new()
        }
    }
}

/// Shared handle to the process-wide metric registry.
///
/// This is the main handle you pass around in the exporter. Registration,
/// updates and reads are internally synchronised.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    gauges: Arc<RwLock<BTreeMap<ValidatorIndex, BalanceGauge>>>,
}

impl MetricsRegistry {
    /// Creates a registry holding no balance gauges.
    ///
    /// On Linux the process collector (`process_*` metrics) is registered
    /// as well.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            gauges: Arc::new(RwLock::new(BTreeMap::new())),
        })
    }

    /// Registers the balance gauge for `index`.
    ///
    /// Registering the same index twice fails with
    /// [`prometheus::Error::AlreadyReg`].
    pub fn register_balance_gauge(
        &self,
        index: ValidatorIndex,
    ) -> Result<BalanceGauge, prometheus::Error> {
        let gauge = BalanceGauge::new(index)?;
        self.registry.register(Box::new(gauge.clone()))?;
        self.gauges
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, gauge.clone());
        Ok(gauge)
    }

    /// Last published balance of `index`.
    pub fn balance(&self, index: ValidatorIndex) -> Option<f64> {
        self.gauges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index)
            .and_then(BalanceGauge::value)
    }

    /// Number of registered balance gauges.
    pub fn balance_gauge_count(&self) -> usize {
        self.gauges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Indices with a registered balance gauge, in ascending order.
    pub fn validator_indices(&self) -> Vec<ValidatorIndex> {
        self.gauges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Snapshot of every metric family currently carrying samples.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Encodes all metrics in the requested exposition format.
    pub fn encode(&self, format: ExpositionFormat) -> Result<Vec<u8>, prometheus::Error> {
        let families = self.gather();
        match format {
            ExpositionFormat::Classic => {
                let mut buffer = Vec::new();
                TextEncoder::new().encode(&families, &mut buffer)?;
                Ok(buffer)
            }
            ExpositionFormat::OpenMetrics => encode_openmetrics(&families).map(String::into_bytes),
        }
    }

    /// Encodes all metrics into the classic Prometheus text format.
    pub fn gather_text(&self) -> String {
        match self.encode(ExpositionFormat::Classic) {
            Ok(buffer) => String::from_utf8(buffer).unwrap_or_default(),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}
