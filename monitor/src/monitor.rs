//! Per-validator balance monitor.
//!
//! A [`BalanceMonitor`] owns the gauge of exactly one validator and a handle
//! to the shared [`BalanceSource`]. Starting it hands it to a dedicated OS
//! thread that polls the source on a fixed interval until the returned
//! [`MonitorHandle`] signals stop:
//!
//! ```text
//! Created --start()--> Running --stop()/join()--> Stopped
//! ```
//!
//! Poll failures never leave `Running`: they are logged, the gauge keeps
//! its previous value and the next tick tries again.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select};
use tracing::{debug, error, info};

use crate::client::{BalanceSource, ClientError};
use crate::error::ExporterError;
use crate::metrics::BalanceGauge;
use crate::types::{ValidatorIndex, ValidatorInfo};

/// Lifecycle state of a monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    /// Built but not started.
    Created,
    /// Polling loop is running.
    Running,
    /// Stop was signalled (or the loop thread is gone).
    Stopped,
}

/// Polls one validator's balance and publishes it to its gauge.
pub struct BalanceMonitor<S: ?Sized> {
    index: ValidatorIndex,
    interval: Duration,
    source: Arc<S>,
    gauge: BalanceGauge,
}

impl<S> BalanceMonitor<S>
where
    S: BalanceSource + ?Sized + 'static,
{
    /// Creates a monitor for the validator `gauge` is labeled with.
    pub fn new(source: Arc<S>, gauge: BalanceGauge, interval: Duration) -> Self {
        Self {
            index: gauge.index(),
            interval,
            source,
            gauge,
        }
    }

    /// Validator this monitor polls.
    pub fn index(&self) -> ValidatorIndex {
        self.index
    }

    /// A monitor that has not been started is always `Created`.
    pub fn state(&self) -> MonitorState {
        MonitorState::Created
    }

    /// Runs a single poll.
    ///
    /// On success the gauge is set to the fetched balance. On failure the
    /// gauge is left untouched and the error is returned to the caller.
    pub fn record_balance(&self) -> Result<ValidatorInfo, ClientError> {
        let info = self.source.fetch(self.index)?;
        info!(
            validator_index = %self.index,
            balance = info.balance,
            record = ?info,
            "validator response"
        );
        self.gauge.set(info.balance);
        Ok(info)
    }

    /// Starts the polling loop on its own thread.
    ///
    /// The first poll happens one interval after start; ticks missed while a
    /// poll is still in flight are dropped rather than queued.
    pub fn start(self) -> Result<MonitorHandle, ExporterError> {
        let index = self.index;
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let thread = thread::Builder::new()
            .name(format!("balance-monitor-{index}"))
            .spawn(move || self.run(stop_rx))
            .map_err(|source| ExporterError::Spawn { index, source })?;

        Ok(MonitorHandle {
            index,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn run(self, stop: Receiver<()>) {
        info!(
            validator_index = %self.index,
            interval = ?self.interval,
            "balance monitor started"
        );
        let ticker = crossbeam_channel::tick(self.interval);

        loop {
            select! {
                recv(stop) -> _ => break,
                recv(ticker) -> _ => {
                    if let Err(e) = self.record_balance() {
                        error!(
                            validator_index = %self.index,
                            stage = e.stage(),
                            error = %e,
                            "error recording balance"
                        );
                    }
                }
            }
        }

        info!(validator_index = %self.index, "balance monitor stopped");
    }
}

/// Handle to a running monitor.
///
/// Dropping the handle signals stop without waiting for the thread.
#[derive(Debug)]
pub struct MonitorHandle {
    index: ValidatorIndex,
    // Disconnecting this channel is the stop signal.
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Validator the monitor behind this handle polls.
    pub fn index(&self) -> ValidatorIndex {
        self.index
    }

    /// `Running` until stop is signalled or the loop thread exits.
    pub fn state(&self) -> MonitorState {
        let alive = self.thread.as_ref().is_some_and(|t| !t.is_finished());
        if self.stop_tx.is_some() && alive {
            MonitorState::Running
        } else {
            MonitorState::Stopped
        }
    }

    /// Whether the loop thread has exited (or was already joined).
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signals the loop to exit once its current poll, if any, completes.
    ///
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        if self.stop_tx.take().is_some() {
            debug!(validator_index = %self.index, "stop requested");
        }
    }

    /// Stops the monitor and waits for its thread to exit.
    ///
    /// Returns `Err` with the panic payload if the loop thread panicked.
    pub fn join(mut self) -> thread::Result<()> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread.join(),
            None => Ok(()),
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
