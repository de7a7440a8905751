//! Module table: adapters and extensions keyed by opaque id.

use super::access::AccessFlags;
use crate::error::{DaoError, DaoResult};
use crate::types::{Address, ModuleId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Whether a module is business logic or a shared-state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    /// Business logic allowed to call privileged registry operations.
    Adapter,
    /// Shared-state store (e.g. the bank ledger) consumed by adapters.
    Extension,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Adapter => f.write_str("adapter"),
            ModuleKind::Extension => f.write_str("extension"),
        }
    }
}

/// A registered module. Never partially updated; replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub address: Address,
    pub flags: AccessFlags,
    pub kind: ModuleKind,
    /// Timestamp of the registration that created this record.
    pub registered_at: u64,
}

/// Id → record table with a reverse address index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleTable {
    modules: BTreeMap<ModuleId, ModuleRecord>,
    #[serde(skip)]
    by_address: HashMap<Address, ModuleId>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `record` could be inserted without touching the table.
    pub fn check_insert(&self, record: &ModuleRecord) -> DaoResult<()> {
        if self.modules.contains_key(&record.id) {
            return Err(DaoError::already_exists("module", &record.id));
        }
        if let Some(owner) = self.by_address.get(&record.address) {
            return Err(DaoError::already_exists(
                "module address",
                format!("{} (held by {})", record.address, owner),
            ));
        }
        Ok(())
    }

    pub fn insert(&mut self, record: ModuleRecord) -> DaoResult<()> {
        self.check_insert(&record)?;
        self.by_address.insert(record.address, record.id.clone());
        self.modules.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn remove(&mut self, id: &ModuleId) -> DaoResult<ModuleRecord> {
        let record = self
            .modules
            .remove(id)
            .ok_or_else(|| DaoError::not_found("module", id))?;
        self.by_address.remove(&record.address);
        Ok(record)
    }

    pub fn get(&self, id: &ModuleId) -> Option<&ModuleRecord> {
        self.modules.get(id)
    }

    pub fn by_address(&self, address: &Address) -> Option<&ModuleRecord> {
        self.by_address
            .get(address)
            .and_then(|id| self.modules.get(id))
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// All modules in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    /// Rebuild the reverse index after deserialization.
    pub(crate) fn reindex(&mut self) {
        self.by_address = self
            .modules
            .values()
            .map(|record| (record.address, record.id.clone()))
            .collect();
    }
}
