//! Voter signing keys.
//!
//! Keys are Ed25519 (ring). A key is either random, loaded from a 32-byte
//! seed, or derived from master key material with HKDF-SHA256 so one operator
//! secret can produce per-DAO voter keys. Seeds are zeroized on drop.

use super::message::{SignedVote, VoteChoice, VotePayload, VoteSignature, VotingDomain};
use crate::error::{DaoError, DaoResult};
use crate::types::{Address, ProposalId};
use hkdf::Hkdf;
use rand::RngCore;
use ring::signature::{Ed25519KeyPair, KeyPair};
use sha2::Sha256;
use zeroize::Zeroizing;

const DERIVATION_SALT: &[u8] = b"covenant-voter-key-v1";

pub struct VoterKey {
    seed: Zeroizing<[u8; 32]>,
    key_pair: Ed25519KeyPair,
}

impl VoterKey {
    pub fn generate() -> DaoResult<Self> {
        let mut seed = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut seed[..]);
        Self::from_seed(*seed)
    }

    pub fn from_seed(seed: [u8; 32]) -> DaoResult<Self> {
        let seed = Zeroizing::new(seed);
        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed[..])
            .map_err(|e| DaoError::InvalidInput(format!("invalid Ed25519 seed: {}", e)))?;
        Ok(Self { seed, key_pair })
    }

    /// Parse a hex-encoded 32-byte seed.
    pub fn from_seed_hex(seed_hex: &str) -> DaoResult<Self> {
        let bytes = Zeroizing::new(
            hex::decode(seed_hex.trim())
                .map_err(|e| DaoError::InvalidInput(format!("invalid seed hex: {}", e)))?,
        );
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| DaoError::InvalidInput(format!("seed must be 32 bytes, got {}", bytes.len())))?;
        Self::from_seed(seed)
    }

    /// Derive the key for `label` from master key material.
    pub fn derive(master: &[u8], label: &str) -> DaoResult<Self> {
        let hkdf = Hkdf::<Sha256>::new(Some(DERIVATION_SALT), master);
        let mut seed = Zeroizing::new([0u8; 32]);
        hkdf.expand(label.as_bytes(), &mut seed[..])
            .map_err(|e| DaoError::InvalidInput(format!("key derivation failed: {:?}", e)))?;
        Self::from_seed(*seed)
    }

    pub fn public_key(&self) -> &[u8] {
        self.key_pair.public_key().as_ref()
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(self.public_key())
    }

    pub fn seed_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.seed[..]))
    }

    /// Sign `payload`, which must name this key's address as the account.
    pub fn sign(&self, payload: VotePayload, domain: &VotingDomain) -> DaoResult<SignedVote> {
        if payload.account != self.address() {
            return Err(DaoError::InvalidInput(format!(
                "payload account {} is not the signer {}",
                payload.account,
                self.address()
            )));
        }
        Ok(self.sign_unchecked(payload, domain))
    }

    /// Sign a vote from this key's own account.
    pub fn vote(
        &self,
        domain: &VotingDomain,
        proposal: ProposalId,
        choice: VoteChoice,
        timestamp: u64,
    ) -> SignedVote {
        let payload = VotePayload {
            proposal,
            choice,
            account: self.address(),
            timestamp,
        };
        self.sign_unchecked(payload, domain)
    }

    fn sign_unchecked(&self, payload: VotePayload, domain: &VotingDomain) -> SignedVote {
        let message = payload.message_digest(domain);
        let signature = self.key_pair.sign(message.as_bytes());
        SignedVote {
            payload,
            signature: VoteSignature {
                public_key: self.public_key().to_vec(),
                signature: signature.as_ref().to_vec(),
            },
        }
    }
}

impl std::fmt::Debug for VoterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoterKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
