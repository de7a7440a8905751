//! Error taxonomy for registry, ledger and vote-verification operations.
//!
//! Every error is terminal for the attempted operation and leaves state
//! untouched: operations validate fully before they mutate.

use thiserror::Error;

/// Result type for governance operations.
pub type DaoResult<T> = Result<T, DaoError>;

/// Governance operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DaoError {
    /// Caller lacks the capability bit required by the operation.
    #[error("{caller} lacks capability {capability}")]
    Unauthorized { caller: String, capability: String },

    /// Identifier is not present.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Identifier is already taken.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// Lifecycle violation (wrong-state transition attempted).
    #[error("invalid state: {0}")]
    InvalidState(StateViolation),

    /// Merkle proof does not rebuild the stored root.
    #[error("merkle proof for leaf {index} does not match the submitted root")]
    InvalidProof { index: u64 },

    /// Challenge window has elapsed.
    #[error("challenge window closed at {deadline}")]
    Stale { deadline: u64 },

    /// Ledger balance too low for a debit.
    #[error("insufficient balance: {account} holds {available} of {token}, needs {required}")]
    InsufficientBalance {
        account: String,
        token: String,
        available: u128,
        required: u128,
    },

    /// Snapshot reference is malformed (not yet closed, or out of order).
    #[error("invalid snapshot {snapshot}: {reason}")]
    InvalidSnapshot { snapshot: u64, reason: String },

    /// Vote signature failed verification.
    #[error("signature verification failed: {0}")]
    InvalidSignature(String),

    /// Malformed caller input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// State encoding or decoding failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Which lifecycle rule an `InvalidState` error violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateViolation {
    #[error("proposal already sponsored")]
    AlreadySponsored,
    #[error("proposal not sponsored")]
    NotSponsored,
    #[error("proposal already processed")]
    AlreadyProcessed,
    #[error("vote result already final")]
    ResultAlreadyFinal,
    #[error("replacement result must count more votes than the pending one")]
    ResultNotImproved,
    #[error("voting period still open")]
    VotingPeriodOpen,
    #[error("voting period closed")]
    VotingClosed,
    #[error("challenge window still open")]
    ChallengeWindowOpen,
    #[error("vote result invalidated by a challenge")]
    ResultInvalidated,
    #[error("vote result not finalized")]
    NotFinalized,
    #[error("member is jailed")]
    MemberJailed,
    #[error("delegate key already in use")]
    DelegateInUse,
    #[error("only adapters may call privileged operations")]
    NotAdapter,
}

impl DaoError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn already_exists(kind: &'static str, id: impl ToString) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn unauthorized(caller: impl ToString, capability: impl ToString) -> Self {
        Self::Unauthorized {
            caller: caller.to_string(),
            capability: capability.to_string(),
        }
    }
}

impl From<StateViolation> for DaoError {
    fn from(violation: StateViolation) -> Self {
        Self::InvalidState(violation)
    }
}
