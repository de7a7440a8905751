//! Balance checkpoints.
//!
//! A history is a list of `(from_epoch, amount)` pairs ordered by epoch. The
//! amount recorded at epoch `e` applies from `e` onward, so the balance as of a
//! snapshot is the last checkpoint at or before it (binary search).

use crate::error::{DaoError, DaoResult};
use crate::types::Epoch;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub from_epoch: Epoch,
    pub amount: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointHistory {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest amount (0 for an empty history).
    pub fn latest(&self) -> u128 {
        self.checkpoints.last().map_or(0, |c| c.amount)
    }

    pub fn last_epoch(&self) -> Option<Epoch> {
        self.checkpoints.last().map(|c| c.from_epoch)
    }

    /// Amount as of `epoch`, or `None` if the history starts after it.
    pub fn at(&self, epoch: Epoch) -> Option<u128> {
        let idx = self.checkpoints.partition_point(|c| c.from_epoch <= epoch);
        idx.checked_sub(1).map(|i| self.checkpoints[i].amount)
    }

    /// Fail if recording at `epoch` would rewrite history.
    pub fn check_record(&self, epoch: Epoch) -> DaoResult<()> {
        match self.last_epoch() {
            Some(last) if epoch < last => Err(DaoError::InvalidSnapshot {
                snapshot: epoch,
                reason: format!("checkpoint epoch precedes latest checkpoint {}", last),
            }),
            _ => Ok(()),
        }
    }

    /// Record `amount` from `epoch` onward. Several changes within one epoch
    /// collapse into a single checkpoint holding the last amount.
    pub fn record(&mut self, epoch: Epoch, amount: u128) -> DaoResult<()> {
        self.check_record(epoch)?;
        match self.checkpoints.last_mut() {
            Some(last) if last.from_epoch == epoch => last.amount = amount,
            _ => self.checkpoints.push(Checkpoint {
                from_epoch: epoch,
                amount,
            }),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }
}
