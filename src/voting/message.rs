//! Vote messages, signatures and Merkle leaves.
//!
//! A vote is an Ed25519 signature over a domain-separated digest of
//! `{proposal, choice, account, timestamp}`. The domain separator binds the
//! DAO name, protocol version, chain id, verifying address and action id, so
//! a signature cannot be replayed against another deployment.
//!
//! All integers are hashed big-endian at fixed width.

use super::merkle::LEAF_TAG;
use crate::error::{DaoError, DaoResult};
use crate::types::{Address, Digest, ProposalId};
use ring::signature::{UnparsedPublicKey, ED25519};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

const DOMAIN_TAG: &[u8] = b"covenant-domain-v1";
const VOTE_TAG: &[u8] = b"covenant-vote-v1";

/// Domain separator inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    /// Address of the voting adapter that verifies results.
    pub verifying_address: Address,
    /// Address of the action (adapter) the votes are for.
    pub action_id: Address,
}

impl VotingDomain {
    pub fn separator(&self) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_TAG);
        update_str(&mut hasher, &self.name);
        update_str(&mut hasher, &self.version);
        hasher.update(self.chain_id.to_be_bytes());
        hasher.update(self.verifying_address.as_bytes());
        hasher.update(self.action_id.as_bytes());
        Digest(hasher.finalize().into())
    }
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Yes,
    No,
}

impl VoteChoice {
    fn tag(self) -> u8 {
        match self {
            VoteChoice::Yes => 1,
            VoteChoice::No => 2,
        }
    }

    pub fn is_yes(self) -> bool {
        self == VoteChoice::Yes
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteChoice::Yes => f.write_str("yes"),
            VoteChoice::No => f.write_str("no"),
        }
    }
}

impl std::str::FromStr for VoteChoice {
    type Err = DaoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" | "y" => Ok(VoteChoice::Yes),
            "no" | "n" => Ok(VoteChoice::No),
            other => Err(DaoError::InvalidInput(format!("unknown vote choice '{}'", other))),
        }
    }
}

/// The signed content of a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePayload {
    pub proposal: ProposalId,
    pub choice: VoteChoice,
    pub account: Address,
    pub timestamp: u64,
}

impl VotePayload {
    /// Digest the voter signs.
    pub fn message_digest(&self, domain: &VotingDomain) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(VOTE_TAG);
        hasher.update(domain.separator().as_bytes());
        self.hash_fields(&mut hasher);
        Digest(hasher.finalize().into())
    }

    fn hash_fields(&self, hasher: &mut Sha256) {
        hasher.update(self.proposal.as_bytes());
        hasher.update([self.choice.tag()]);
        hasher.update(self.account.as_bytes());
        hasher.update(self.timestamp.to_be_bytes());
    }
}

/// Ed25519 public key and signature, hex encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSignature {
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl VoteSignature {
    /// Check the signature over `message` and that the key owns `account`.
    pub fn verify(&self, account: &Address, message: &Digest) -> DaoResult<()> {
        if Address::from_public_key(&self.public_key) != *account {
            return Err(DaoError::InvalidSignature(format!(
                "public key does not belong to {}",
                account
            )));
        }
        UnparsedPublicKey::new(&ED25519, &self.public_key)
            .verify(message.as_bytes(), &self.signature)
            .map_err(|_| DaoError::InvalidSignature(format!("bad signature from {}", account)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedVote {
    pub payload: VotePayload,
    pub signature: VoteSignature,
}

impl SignedVote {
    pub fn verify(&self, domain: &VotingDomain) -> DaoResult<()> {
        let message = self.payload.message_digest(domain);
        self.signature.verify(&self.payload.account, &message)
    }
}

/// One entry of an off-chain vote batch.
///
/// Running counts and weights are inclusive of this leaf, so
/// `running_yes_count + running_no_count == index + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteLeaf {
    pub account: Address,
    pub proposal: ProposalId,
    pub choice: VoteChoice,
    pub weight: u128,
    pub index: u64,
    pub timestamp: u64,
    pub running_yes_count: u64,
    pub running_no_count: u64,
    pub running_yes_weight: u128,
    pub running_no_weight: u128,
    pub signature: VoteSignature,
}

impl VoteLeaf {
    pub fn payload(&self) -> VotePayload {
        VotePayload {
            proposal: self.proposal,
            choice: self.choice,
            account: self.account,
            timestamp: self.timestamp,
        }
    }

    /// Tagged leaf digest committed to by the Merkle root.
    pub fn digest(&self, domain: &VotingDomain) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update([LEAF_TAG]);
        hasher.update(domain.separator().as_bytes());
        self.payload().hash_fields(&mut hasher);
        hasher.update(self.weight.to_be_bytes());
        hasher.update(self.index.to_be_bytes());
        hasher.update(self.running_yes_count.to_be_bytes());
        hasher.update(self.running_no_count.to_be_bytes());
        hasher.update(self.running_yes_weight.to_be_bytes());
        hasher.update(self.running_no_weight.to_be_bytes());
        hasher.update((self.signature.public_key.len() as u64).to_be_bytes());
        hasher.update(&self.signature.public_key);
        hasher.update((self.signature.signature.len() as u64).to_be_bytes());
        hasher.update(&self.signature.signature);
        Digest(hasher.finalize().into())
    }

    pub fn verify_signature(&self, domain: &VotingDomain) -> DaoResult<()> {
        let message = self.payload().message_digest(domain);
        self.signature.verify(&self.account, &message)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
