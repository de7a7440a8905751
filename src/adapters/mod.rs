//! Proposal adapters: business logic that opens proposals in the registry and
//! applies their side effect once the vote has passed.
//!
//! Every adapter follows the same shape. `submit` validates the payload and
//! opens the proposal; `sponsor` is called on behalf of an active member and
//! pins the last closed epoch as the voting snapshot; `process` reads the
//! authoritative outcome, applies the side effect on `Pass` and marks the
//! proposal processed. Processing validates everything it can before writing
//! so a failure leaves both the registry and the ledger untouched.

pub mod configuration;
pub mod financing;
pub mod onboarding;

pub use configuration::{ConfigChange, ConfigurationAdapter};
pub use financing::{FinancingAdapter, FundingRequest};
pub use onboarding::{OnboardingAdapter, OnboardingRequest};

use crate::error::{DaoError, DaoResult, StateViolation};
use crate::registry::{AccessFlags, DaoRegistry};
use crate::types::{Address, BlockContext, ModuleId, ProposalId};

pub trait ProposalAdapter {
    fn id(&self) -> &ModuleId;

    /// Flags the adapter needs in the registry.
    fn required_flags(&self) -> AccessFlags;
}

/// Sponsor `proposal` on behalf of `sponsor`, who must be an active member
/// (or an active member's delegate key).
pub(crate) fn sponsor_as_member(
    registry: &mut DaoRegistry,
    adapter: &ModuleId,
    proposal: &ProposalId,
    sponsor: &Address,
    ctx: &BlockContext,
) -> DaoResult<()> {
    let member = registry
        .members()
        .member_for_delegate(sponsor)
        .ok_or_else(|| DaoError::unauthorized(sponsor, "membership"))?;
    if member.jailed {
        return Err(StateViolation::MemberJailed.into());
    }
    let snapshot = ctx.closed_epoch()?;
    registry.sponsor_proposal(adapter, proposal, snapshot, ctx)
}
