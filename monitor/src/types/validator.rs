use serde::{Deserialize, Serialize};

use super::{ValidatorIndex, quoted_u64};

/// Envelope returned by the beacon node: `{ "data": { ... } }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorResponse {
    pub data: ValidatorInfo,
}

/// Balance record for one validator.
///
/// Only [`ValidatorInfo::balance`] feeds the exported gauge; everything else
/// is carried through so that it shows up in the log line for each poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    /// Current balance in gwei.
    #[serde(with = "quoted_u64")]
    pub balance: u64,
    pub pubkey: String,
    pub validator: Validator,
    #[serde(rename = "validator_index")]
    pub index: ValidatorIndex,
}

/// Validator registry entry nested under `data.validator`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    #[serde(with = "quoted_u64")]
    pub activation_eligibility_epoch: u64,
    #[serde(with = "quoted_u64")]
    pub activation_epoch: u64,
    /// Effective balance in gwei.
    #[serde(with = "quoted_u64")]
    pub effective_balance: u64,
    #[serde(with = "quoted_u64")]
    pub exit_epoch: u64,
    pub pubkey: String,
    pub slashed: bool,
    #[serde(with = "quoted_u64")]
    pub withdrawable_epoch: u64,
    pub withdrawal_credentials: String,
}
