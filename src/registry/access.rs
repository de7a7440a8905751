//! Capability flags.
//!
//! A module's capabilities are a fixed-width bitset over [`DaoFlag`]. Flags are
//! declared at registration and only change by re-registration or replacement.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Privileged registry operations an adapter may be allowed to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum DaoFlag {
    AddModule = 0,
    RemoveModule = 1,
    SubmitProposal = 2,
    SponsorProposal = 3,
    ProcessProposal = 4,
    UpdateConfig = 5,
    MoveFunds = 6,
    SetDelegate = 7,
    NewMember = 8,
    JailMember = 9,
    SubmitVoteResult = 10,
}

impl DaoFlag {
    pub const ALL: [DaoFlag; 11] = [
        DaoFlag::AddModule,
        DaoFlag::RemoveModule,
        DaoFlag::SubmitProposal,
        DaoFlag::SponsorProposal,
        DaoFlag::ProcessProposal,
        DaoFlag::UpdateConfig,
        DaoFlag::MoveFunds,
        DaoFlag::SetDelegate,
        DaoFlag::NewMember,
        DaoFlag::JailMember,
        DaoFlag::SubmitVoteResult,
    ];

    pub const fn bit(self) -> u64 {
        1u64 << (self as u8)
    }

    pub const fn name(self) -> &'static str {
        match self {
            DaoFlag::AddModule => "ADD_MODULE",
            DaoFlag::RemoveModule => "REMOVE_MODULE",
            DaoFlag::SubmitProposal => "SUBMIT_PROPOSAL",
            DaoFlag::SponsorProposal => "SPONSOR_PROPOSAL",
            DaoFlag::ProcessProposal => "PROCESS_PROPOSAL",
            DaoFlag::UpdateConfig => "UPDATE_CONFIG",
            DaoFlag::MoveFunds => "MOVE_FUNDS",
            DaoFlag::SetDelegate => "SET_DELEGATE",
            DaoFlag::NewMember => "NEW_MEMBER",
            DaoFlag::JailMember => "JAIL_MEMBER",
            DaoFlag::SubmitVoteResult => "SUBMIT_VOTE_RESULT",
        }
    }
}

impl fmt::Display for DaoFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitset of [`DaoFlag`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(u64);

impl AccessFlags {
    const KNOWN_BITS: u64 = (1u64 << DaoFlag::ALL.len()) - 1;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Flags for the bootstrap configurator that wires the DAO together.
    pub const fn configurator() -> Self {
        Self(
            DaoFlag::AddModule.bit()
                | DaoFlag::RemoveModule.bit()
                | DaoFlag::UpdateConfig.bit()
                | DaoFlag::NewMember.bit(),
        )
    }

    /// Flags for a proposal adapter (submit, sponsor, process).
    pub const fn proposal_adapter() -> Self {
        Self(
            DaoFlag::SubmitProposal.bit()
                | DaoFlag::SponsorProposal.bit()
                | DaoFlag::ProcessProposal.bit(),
        )
    }

    pub fn from_flags(flags: &[DaoFlag]) -> Self {
        flags.iter().fold(Self::empty(), |acc, flag| acc.with(*flag))
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, flag: DaoFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    #[must_use]
    pub const fn with(self, flag: DaoFlag) -> Self {
        Self(self.0 | flag.bit())
    }

    pub const fn union(self, other: AccessFlags) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = DaoFlag> {
        DaoFlag::ALL.into_iter().filter(move |flag| self.contains(*flag))
    }
}

impl fmt::Debug for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(DaoFlag::name).collect();
        write!(f, "[{}]", names.join("|"))
    }
}

impl FromIterator<DaoFlag> for AccessFlags {
    fn from_iter<I: IntoIterator<Item = DaoFlag>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |acc, flag| acc.with(flag))
    }
}

impl Serialize for AccessFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for AccessFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u64::deserialize(deserializer)?;
        if bits & !Self::KNOWN_BITS != 0 {
            return Err(serde::de::Error::custom(format!(
                "unknown access flag bits: {:#x}",
                bits & !Self::KNOWN_BITS
            )));
        }
        Ok(Self(bits))
    }
}
