//! Bank ledger: token balances per account with historical checkpoints.
//!
//! Adapters never hold a mutable bank directly. They obtain a [`GatedLedger`]
//! from the registry, which is only handed out to adapters holding
//! `MOVE_FUNDS`.

pub mod checkpoints;
pub mod extension;

pub use checkpoints::{Checkpoint, CheckpointHistory};
pub use extension::BankExtension;

use crate::error::{DaoError, DaoResult};
use crate::types::{Address, BlockContext, ModuleId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Treasury account owned by the DAO.
pub const GUILD: Address = Address([0xaa; 20]);

/// Reserved account tracking the sum of all balances of a token.
pub const TOTAL: Address = Address([0xbb; 20]);

/// Token identifier (e.g. `UNITS`, `LOOT`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(String);

impl TokenId {
    pub const UNITS: &'static str = "UNITS";
    pub const LOOT: &'static str = "LOOT";

    pub fn new(name: impl Into<String>) -> DaoResult<Self> {
        let name = name.into();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(DaoError::InvalidInput(format!("invalid token name '{}'", name)));
        }
        Ok(Self(name))
    }

    /// Voting units.
    pub fn units() -> Self {
        Self(Self::UNITS.to_string())
    }

    /// Non-voting economic share.
    pub fn loot() -> Self {
        Self(Self::LOOT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TokenId {
    type Error = DaoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TokenId> for String {
    fn from(token: TokenId) -> Self {
        token.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token balance ledger.
///
/// Credits and debits are recorded against the context epoch so historical
/// balances stay queryable. Unknown tokens fail with `NotFound`.
pub trait Ledger {
    fn credit_account(
        &mut self,
        account: &Address,
        token: &TokenId,
        amount: u128,
        ctx: &BlockContext,
    ) -> DaoResult<()>;

    /// Fails with `InsufficientBalance` if `account` holds less than `amount`.
    fn debit_account(
        &mut self,
        account: &Address,
        token: &TokenId,
        amount: u128,
        ctx: &BlockContext,
    ) -> DaoResult<()>;

    fn balance_of(&self, account: &Address, token: &TokenId) -> DaoResult<u128>;

    /// Move `amount` between accounts. Nothing changes if the debit would fail.
    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        token: &TokenId,
        amount: u128,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        let available = self.balance_of(from, token)?;
        if available < amount {
            return Err(DaoError::InsufficientBalance {
                account: from.to_string(),
                token: token.to_string(),
                available,
                required: amount,
            });
        }
        self.debit_account(from, token, amount, ctx)?;
        self.credit_account(to, token, amount, ctx)
    }
}

/// Ledger handle bound to the adapter that obtained it.
pub struct GatedLedger<'a, L: Ledger + ?Sized> {
    caller: ModuleId,
    inner: &'a mut L,
}

impl<'a, L: Ledger + ?Sized> GatedLedger<'a, L> {
    pub(crate) fn new(caller: ModuleId, inner: &'a mut L) -> Self {
        Self { caller, inner }
    }

    pub fn caller(&self) -> &ModuleId {
        &self.caller
    }
}

impl<L: Ledger + ?Sized> Ledger for GatedLedger<'_, L> {
    fn credit_account(
        &mut self,
        account: &Address,
        token: &TokenId,
        amount: u128,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        debug!(caller = %self.caller, %account, %token, amount, "credit");
        self.inner.credit_account(account, token, amount, ctx)
    }

    fn debit_account(
        &mut self,
        account: &Address,
        token: &TokenId,
        amount: u128,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        debug!(caller = %self.caller, %account, %token, amount, "debit");
        self.inner.debit_account(account, token, amount, ctx)
    }

    fn balance_of(&self, account: &Address, token: &TokenId) -> DaoResult<u128> {
        self.inner.balance_of(account, token)
    }

    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        token: &TokenId,
        amount: u128,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        debug!(caller = %self.caller, %from, %to, %token, amount, "transfer");
        self.inner.transfer(from, to, token, amount, ctx)
    }
}
