//! Core domain types used by the exporter.
//!
//! This module defines the strongly-typed validator index and the records
//! returned by the beacon-chain validator endpoint. The goal is to avoid
//! "naked" integers in public APIs and keep the wire contract in one place.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Records returned by `GET /eth/v1/beacon/states/head/validators/{index}`.
pub mod validator;

pub use validator::{Validator, ValidatorInfo, ValidatorResponse};

/// Index of a validator in the beacon-chain state.
///
/// On the wire this is a bare JSON number. It is also the value of the
/// `validator_index` label on the balance gauge.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ValidatorIndex(pub u64);

impl ValidatorIndex {
    /// Returns the raw index.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ValidatorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ValidatorIndex {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(ValidatorIndex)
    }
}

/// Serde helpers for `u64` values carried as JSON strings.
///
/// The beacon API quotes 64-bit quantities so that JavaScript clients do not
/// lose precision; a bare number is rejected.
pub(crate) mod quoted_u64 {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_index_parses_and_displays() {
        let idx: ValidatorIndex = " 42 ".parse().expect("index should parse");
        assert_eq!(idx, ValidatorIndex(42));
        assert_eq!(idx.to_string(), "42");
        assert!("-1".parse::<ValidatorIndex>().is_err());
        assert!("abc".parse::<ValidatorIndex>().is_err());
    }

    #[test]
    fn validator_index_is_a_bare_json_number() {
        let json = serde_json::to_string(&ValidatorIndex(7)).unwrap();
        assert_eq!(json, "7");
        let back: ValidatorIndex = serde_json::from_str("18446744073709551615").unwrap();
        assert_eq!(back, ValidatorIndex(u64::MAX));
    }
}
