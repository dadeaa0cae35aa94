//! HTTP beacon-chain client.
//!
//! Talks to the standard beacon node REST API:
//!
//! ```text
//! GET /eth/v1/beacon/states/head/validators/{index}
//!
//! {
//!   "data": {
//!     "balance": "32000000000",
//!     "pubkey": "0x93...",
//!     "validator_index": 1,
//!     "validator": { "effective_balance": "32000000000", "slashed": false, ... }
//!   }
//! }
//! ```

use reqwest::Url;
use reqwest::blocking::Client;

use crate::client::{BalanceSource, ClientError};
use crate::config::{BeaconClientConfig, normalize_base_address};
use crate::types::{ValidatorIndex, ValidatorInfo, ValidatorResponse};

const VALIDATOR_PATH: &str = "/eth/v1/beacon/states/head/validators";

/// HTTP client for a beacon node.
///
/// Thread-safe (`Send + Sync`); share one instance behind an [`Arc`] across
/// all monitors so they reuse the same keep-alive connection pool. It uses
/// the blocking `reqwest` client, so calls must be made from plain threads,
/// not from inside an async runtime.
///
/// [`Arc`]: std::sync::Arc
#[derive(Clone, Debug)]
pub struct BeaconChainClient {
    base_url: String,
    client: Client,
}

impl BeaconChainClient {
    /// Builds a client for the beacon node at `cfg.base_address`.
    ///
    /// Fails if the normalised address is not an absolute URL with a host,
    /// or if the HTTP client cannot be built.
    pub fn new(cfg: &BeaconClientConfig) -> Result<Self, ClientError> {
        let base_url = normalize_base_address(&cfg.base_address);
        let invalid = |reason: String| ClientError::InvalidBaseAddress {
            address: cfg.base_address.clone(),
            reason,
        };

        let parsed = Url::parse(&base_url).map_err(|e| invalid(e.to_string()))?;
        if !parsed.has_host() {
            return Err(invalid("missing host".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(cfg.connect_timeout)
            .tcp_keepalive(cfg.tcp_keepalive)
            .pool_max_idle_per_host(cfg.pool_max_idle_per_host)
            .pool_idle_timeout(cfg.pool_idle_timeout)
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self { base_url, client })
    }

    /// Normalised base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn validator_url(&self, index: ValidatorIndex) -> String {
        format!("{}{VALIDATOR_PATH}/{index}", self.base_url)
    }
}

impl BalanceSource for BeaconChainClient {
    fn fetch(&self, index: ValidatorIndex) -> Result<ValidatorInfo, ClientError> {
        let url = self.validator_url(index);

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| ClientError::Transport(format!("HTTP GET {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        let body = resp.bytes().map_err(|e| {
            ClientError::Transport(format!("failed to read response body from {url}: {e}"))
        })?;

        let parsed: ValidatorResponse = serde_json::from_slice(&body)?;
        Ok(parsed.data)
    }
}
