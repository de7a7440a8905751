//! CBOR encoding for registry and ledger state exports.
//!
//! Exports are wrapped in a versioned envelope so a host can reject state
//! written by an incompatible schema before decoding the payload. New fields
//! added to state structs carry `#[serde(default)]`.

use crate::error::{DaoError, DaoResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Current state export schema version.
pub const STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StateEnvelope<T> {
    schema_version: u32,
    kind: String,
    state: T,
}

/// Serialize to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> DaoResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| DaoError::Serialization(format!("CBOR encoding failed: {:?}", e)))?;
    Ok(bytes)
}

/// Deserialize from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> DaoResult<T> {
    ciborium::from_reader(bytes)
        .map_err(|e| DaoError::Serialization(format!("CBOR decoding failed: {:?}", e)))
}

/// Encode `state` inside a versioned envelope tagged with `kind`.
pub fn export_state<T: Serialize>(kind: &str, state: &T) -> DaoResult<Vec<u8>> {
    to_cbor(&StateEnvelope {
        schema_version: STATE_SCHEMA_VERSION,
        kind: kind.to_string(),
        state,
    })
}

/// Decode an envelope written by [`export_state`], checking kind and version.
pub fn import_state<T: DeserializeOwned>(kind: &str, bytes: &[u8]) -> DaoResult<T> {
    let envelope: StateEnvelope<T> = from_cbor(bytes)?;
    if envelope.kind != kind {
        return Err(DaoError::Serialization(format!(
            "expected {} state, found {}",
            kind, envelope.kind
        )));
    }
    if envelope.schema_version != STATE_SCHEMA_VERSION {
        return Err(DaoError::Serialization(format!(
            "unsupported {} schema version {} (expected {})",
            kind, envelope.schema_version, STATE_SCHEMA_VERSION
        )));
    }
    Ok(envelope.state)
}
