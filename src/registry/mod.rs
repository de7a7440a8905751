//! Governance registry: modules, access flags, members, configuration and the
//! proposal lifecycle.

pub mod access;
pub mod configuration;
pub mod dao;
pub mod events;
pub mod members;
pub mod modules;
pub mod proposals;

pub use access::{AccessFlags, DaoFlag};
pub use configuration::{DaoConfiguration, CHALLENGE_WINDOW, VOTING_PERIOD};
pub use dao::DaoRegistry;
pub use events::{DaoEvent, EventKind, EventLog, EventQuery, EventRecord, EventStream};
pub use members::{Member, MemberTable};
pub use modules::{ModuleKind, ModuleRecord};
pub use proposals::{Proposal, ProposalState};
