//! DAO configuration table: numeric and address-typed parameters.

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Seconds a sponsored proposal stays open for voting.
pub const VOTING_PERIOD: &str = "voting.period";

/// Seconds a submitted off-chain result can be challenged.
pub const CHALLENGE_WINDOW: &str = "voting.challenge-window";

pub const DEFAULT_VOTING_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_CHALLENGE_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Key/value parameters changed only through `UPDATE_CONFIG`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaoConfiguration {
    numeric: BTreeMap<String, u64>,
    #[serde(default)]
    addresses: BTreeMap<String, Address>,
}

impl Default for DaoConfiguration {
    fn default() -> Self {
        let mut numeric = BTreeMap::new();
        numeric.insert(VOTING_PERIOD.to_string(), DEFAULT_VOTING_PERIOD_SECS);
        numeric.insert(CHALLENGE_WINDOW.to_string(), DEFAULT_CHALLENGE_WINDOW_SECS);
        Self {
            numeric,
            addresses: BTreeMap::new(),
        }
    }
}

impl DaoConfiguration {
    pub fn get(&self, key: &str) -> Option<u64> {
        self.numeric.get(key).copied()
    }

    pub fn get_address(&self, key: &str) -> Option<Address> {
        self.addresses.get(key).copied()
    }

    pub fn voting_period(&self) -> u64 {
        self.get(VOTING_PERIOD).unwrap_or(DEFAULT_VOTING_PERIOD_SECS)
    }

    pub fn challenge_window(&self) -> u64 {
        self.get(CHALLENGE_WINDOW)
            .unwrap_or(DEFAULT_CHALLENGE_WINDOW_SECS)
    }

    pub(crate) fn set(&mut self, key: &str, value: u64) -> Option<u64> {
        self.numeric.insert(key.to_string(), value)
    }

    pub(crate) fn set_address(&mut self, key: &str, value: Address) -> Option<Address> {
        self.addresses.insert(key.to_string(), value)
    }

    pub fn numeric(&self) -> impl Iterator<Item = (&str, u64)> {
        self.numeric.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn addresses(&self) -> impl Iterator<Item = (&str, Address)> {
        self.addresses.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
