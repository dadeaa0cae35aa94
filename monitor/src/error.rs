use std::io;
use std::net::SocketAddr;

use crate::client::ClientError;
use crate::types::ValidatorIndex;

/// Fatal errors of the exporter process.
///
/// Everything in here is raised either at startup or by the metrics
/// listener; per-poll failures are [`ClientError`]s and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    /// Invalid flag or config value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The beacon-chain client could not be constructed.
    #[error("failed to create beacon chain client: {0}")]
    Client(#[from] ClientError),

    /// The balance gauge for a validator could not be registered, most
    /// likely because the same index was configured twice.
    #[error("failed to register balance gauge for validator {index}: {source}")]
    Registration {
        index: ValidatorIndex,
        #[source]
        source: prometheus::Error,
    },

    /// The monitor thread for a validator could not be spawned.
    #[error("failed to start balance monitor for validator {index}: {source}")]
    Spawn {
        index: ValidatorIndex,
        #[source]
        source: io::Error,
    },

    /// The metrics listener could not be bound.
    #[error("failed to bind metrics listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The metrics listener failed while serving.
    #[error("metrics listener error: {0}")]
    Listener(#[source] io::Error),

    /// The async runtime hosting the metrics endpoint could not be built.
    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] io::Error),
}
