//! Clients for the beacon-chain HTTP API.
//!
//! [`BalanceSource`] abstracts "give me the balance record of validator N"
//! so that monitors can be driven by fakes in tests. [`BeaconChainClient`]
//! is the production implementation talking to a beacon node over HTTP.

pub mod http;

pub use http::BeaconChainClient;

use reqwest::StatusCode;

use crate::types::{ValidatorIndex, ValidatorInfo};

/// Errors returned by a [`BalanceSource`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configured base address is not a usable URL.
    #[error("invalid beacon chain address {address:?}: {reason}")]
    InvalidBaseAddress { address: String, reason: String },

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(String),

    /// Connecting, sending the request or reading the body failed
    /// (includes timeouts).
    #[error("transport error: {0}")]
    Transport(String),

    /// The beacon node answered with a non-success status.
    #[error("beacon node returned HTTP status {0}")]
    Status(StatusCode),

    /// The response body did not match the expected JSON shape.
    #[error("failed to decode validator response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Stage at which the request failed: `config`, `network` or `decode`.
    pub fn stage(&self) -> &'static str {
        match self {
            ClientError::InvalidBaseAddress { .. } | ClientError::Build(_) => "config",
            ClientError::Transport(_) | ClientError::Status(_) => "network",
            ClientError::Decode(_) => "decode",
        }
    }
}

/// Source of validator balance records.
///
/// Implementations must be safe to call concurrently from many monitor
/// threads. Calls are blocking and are not retried; the caller decides
/// when to try again.
pub trait BalanceSource: Send + Sync {
    fn fetch(&self, index: ValidatorIndex) -> Result<ValidatorInfo, ClientError>;
}
