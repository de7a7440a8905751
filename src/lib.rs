//! Covenant - modular DAO governance
//!
//! A registry of adapters and extensions gated by capability flags, a
//! proposal lifecycle, snapshot-pinned voting weight, and off-chain vote
//! aggregation committed to a Merkle root that anyone can challenge.
//!
//! Key principles:
//! - One serialized ledger context per operation (epoch + timestamp)
//! - Validate fully, then mutate: a failed call changes nothing
//! - Voting weight is always read at the proposal's pinned snapshot
//! - An off-chain result is only authoritative after its challenge window

pub mod adapters;
pub mod bank;
pub mod error;
pub mod registry;
pub mod serialization;
pub mod types;
pub mod voting;

pub use error::{DaoError, DaoResult, StateViolation};
