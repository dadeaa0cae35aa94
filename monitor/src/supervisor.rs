//! Wiring of configuration into a running exporter.
//!
//! The [`Supervisor`] registers one balance gauge per configured validator,
//! builds one [`BalanceMonitor`] per gauge around a shared
//! [`BalanceSource`], starts them, and serves the registry over HTTP.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use crate::client::{BalanceSource, BeaconChainClient};
use crate::config::{DEFAULT_SHUTDOWN_GRACE, ExporterConfig};
use crate::error::ExporterError;
use crate::metrics::{MetricsRegistry, bind_metrics_listener, serve_metrics};
use crate::monitor::{BalanceMonitor, MonitorHandle, MonitorState};
use crate::types::ValidatorIndex;

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Owns every monitor of the process and the registry they publish to.
pub struct Supervisor<S: ?Sized = BeaconChainClient> {
    registry: MetricsRegistry,
    pending: Vec<BalanceMonitor<S>>,
    running: Vec<MonitorHandle>,
    shutdown_grace: Duration,
}

impl Supervisor<BeaconChainClient> {
    /// Builds a supervisor polling the beacon node described by `cfg`.
    pub fn from_config(cfg: &ExporterConfig) -> Result<Self, ExporterError> {
        cfg.validate()?;

        let registry = MetricsRegistry::new().map_err(|e| {
            ExporterError::Config(format!("failed to initialise metrics registry: {e}"))
        })?;
        let client = Arc::new(BeaconChainClient::new(&cfg.beacon)?);
        info!(base_url = client.base_url(), "beacon chain client ready");

        Ok(Self::new(
            registry,
            client,
            cfg.monitor.refresh_interval,
            &cfg.monitor.validator_indices,
        )?
        .with_shutdown_grace(cfg.monitor.shutdown_grace))
    }
}

impl<S> Supervisor<S>
where
    S: BalanceSource + ?Sized + 'static,
{
    /// Registers one gauge and builds one monitor per index.
    ///
    /// A repeated index fails with [`ExporterError::Registration`].
    pub fn new(
        registry: MetricsRegistry,
        source: Arc<S>,
        interval: Duration,
        indices: &[ValidatorIndex],
    ) -> Result<Self, ExporterError> {
        if indices.is_empty() {
            warn!("no validator indices configured, only process metrics will be exported");
        }

        let mut pending = Vec::with_capacity(indices.len());
        for &index in indices {
            let gauge = registry
                .register_balance_gauge(index)
                .map_err(|source| ExporterError::Registration { index, source })?;
            pending.push(BalanceMonitor::new(Arc::clone(&source), gauge, interval));
        }

        Ok(Self {
            registry,
            pending,
            running: Vec::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    /// Sets how long [`Supervisor::shutdown`] waits for in-flight polls.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Registry every gauge of this supervisor is registered in.
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Number of monitors, started or not.
    pub fn monitor_count(&self) -> usize {
        self.pending.len() + self.running.len()
    }

    /// State of every monitor, keyed by validator index.
    pub fn monitor_states(&self) -> Vec<(ValidatorIndex, MonitorState)> {
        self.pending
            .iter()
            .map(|m| (m.index(), m.state()))
            .chain(self.running.iter().map(|h| (h.index(), h.state())))
            .collect()
    }

    /// Starts every monitor that has not been started yet.
    pub fn start(&mut self) -> Result<(), ExporterError> {
        for monitor in self.pending.drain(..) {
            self.running.push(monitor.start()?);
        }
        info!(monitors = self.running.len(), "balance monitors running");
        Ok(())
    }

    /// Serves the registry on `listener` until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ExporterError>
    where
        F: Future<Output = ()>,
    {
        serve_metrics(self.registry.clone(), listener, shutdown).await
    }

    /// Stops every monitor and waits up to the shutdown grace for them to
    /// exit.
    ///
    /// A monitor blocked in a request only exits once that request returns.
    /// Monitors still running when the grace expires are detached and their
    /// indices returned; their threads die with the process.
    pub fn shutdown(mut self) -> Vec<ValidatorIndex> {
        for handle in &mut self.running {
            handle.stop();
        }

        let deadline = Instant::now() + self.shutdown_grace;
        let mut in_flight: Vec<MonitorHandle> = self.running.drain(..).collect();
        loop {
            let (finished, rest): (Vec<_>, Vec<_>) = in_flight
                .into_iter()
                .partition(MonitorHandle::is_finished);
            for handle in finished {
                let index = handle.index();
                if handle.join().is_err() {
                    error!(validator_index = %index, "balance monitor thread panicked");
                }
            }
            in_flight = rest;
            if in_flight.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(SHUTDOWN_POLL);
        }

        let abandoned: Vec<ValidatorIndex> = in_flight.iter().map(MonitorHandle::index).collect();
        if abandoned.is_empty() {
            info!("all balance monitors stopped");
        } else {
            warn!(
                validator_indices = ?abandoned,
                grace = ?self.shutdown_grace,
                "balance monitors still in flight after shutdown grace, not waiting for them"
            );
        }
        abandoned
    }

    /// Runs the exporter until SIGINT/SIGTERM or a listener failure.
    ///
    /// Binds `listen_addr` before any monitor starts, so an unusable
    /// address fails fast. Blocks the calling thread, which must not be
    /// inside an async runtime.
    pub fn run(mut self, listen_addr: SocketAddr) -> Result<(), ExporterError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("metrics-http")
            .build()
            .map_err(ExporterError::Runtime)?;

        let listener = runtime.block_on(bind_metrics_listener(listen_addr))?;
        self.start()?;

        let result = runtime.block_on(self.serve(listener, shutdown_signal()));
        if let Err(e) = &result {
            error!(error = %e, "metrics endpoint failed");
        }

        self.shutdown();
        result
    }
}

/// Waits for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
