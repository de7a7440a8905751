//! Identifier and context types shared by the registry, bank and voting modules.
//!
//! Fixed-width byte identifiers (`Address`, `ProposalId`, `Digest`) render as
//! lowercase hex and serialize as hex strings, so the same value reads the
//! same way in JSON vote files, CBOR state exports and log lines.

use crate::error::{DaoError, DaoResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// Ledger epoch (block number). Snapshots are expressed in epochs.
pub type Epoch = u64;

/// Execution context of a single serialized ledger operation.
///
/// Every mutating operation receives the context explicitly; epochs and
/// timestamps never go backwards between consecutive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    /// Current epoch (block number).
    pub epoch: Epoch,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

impl BlockContext {
    pub fn new(epoch: Epoch, timestamp: u64) -> Self {
        Self { epoch, timestamp }
    }

    /// The most recent closed epoch, used to pin voting weight at sponsorship.
    pub fn closed_epoch(&self) -> DaoResult<Epoch> {
        self.epoch.checked_sub(1).ok_or(DaoError::InvalidSnapshot {
            snapshot: self.epoch,
            reason: "no closed epoch before genesis".to_string(),
        })
    }

    /// Context advanced by `epochs` blocks and `secs` seconds.
    pub fn advance(&self, epochs: u64, secs: u64) -> Self {
        Self {
            epoch: self.epoch + epochs,
            timestamp: self.timestamp + secs,
        }
    }
}

macro_rules! hex_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Parse from hex, with or without a `0x` prefix.
            pub fn from_hex(input: &str) -> DaoResult<Self> {
                let trimmed = input.strip_prefix("0x").unwrap_or(input);
                let bytes = hex::decode(trimmed).map_err(|e| {
                    DaoError::InvalidInput(format!(
                        "invalid {} hex '{}': {}",
                        stringify!($name),
                        input,
                        e
                    ))
                })?;
                let array: [u8; $len] = bytes.try_into().map_err(|b: Vec<u8>| {
                    DaoError::InvalidInput(format!(
                        "{} must be {} bytes, got {}",
                        stringify!($name),
                        $len,
                        b.len()
                    ))
                })?;
                Ok(Self(array))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = DaoError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(
    /// 20-byte account or module address.
    Address,
    20,
    "0x"
);

hex_newtype!(
    /// 32-byte proposal identifier.
    ProposalId,
    32,
    ""
);

hex_newtype!(
    /// 32-byte SHA-256 digest (leaf digests, tree nodes, roots).
    Digest,
    32,
    ""
);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Account address of an Ed25519 public key: first 20 bytes of SHA-256(key).
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let hash = Sha256::digest(public_key);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[..20]);
        Self(bytes)
    }

    /// Deterministic address for a well-known label (reserved accounts, tests).
    pub fn from_label(label: &str) -> Self {
        Self::from_public_key(label.as_bytes())
    }
}

impl ProposalId {
    /// Proposal id derived from a human label (e.g. "P1").
    pub fn from_label(label: &str) -> Self {
        Self(Sha256::digest(label.as_bytes()).into())
    }
}

impl Digest {
    /// SHA-256 of arbitrary bytes.
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }
}

/// Opaque module identifier (adapter or extension name). Never empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> DaoResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DaoError::InvalidInput("module id must not be empty".to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModuleId {
    type Error = DaoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModuleId> for String {
    fn from(id: ModuleId) -> Self {
        id.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
