//! Append-only event log with live subscription.
//!
//! The indexing layer consumes records either by querying the log or by
//! subscribing to the live stream. Records are numbered from 0 in append
//! order and never removed.

use super::access::AccessFlags;
use super::modules::ModuleKind;
use crate::types::{Address, BlockContext, Epoch, ModuleId, ProposalId};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

/// Buffer of the live subscription channel.
const SUBSCRIPTION_CAPACITY: usize = 256;

/// Classification used for log queries.
pub trait EventKind {
    /// Stable kind name (e.g. "module-added").
    fn kind(&self) -> &'static str;

    /// Module the event concerns, if any.
    fn module(&self) -> Option<&ModuleId>;
}

/// Registry events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaoEvent {
    ModuleAdded {
        id: ModuleId,
        address: Address,
        flags: AccessFlags,
        kind: ModuleKind,
    },
    ModuleRemoved {
        id: ModuleId,
        address: Address,
        flags: AccessFlags,
    },
    ProposalSubmitted {
        proposal: ProposalId,
        module: ModuleId,
        timestamp: u64,
    },
    ProposalSponsored {
        proposal: ProposalId,
        module: ModuleId,
        timestamp: u64,
        snapshot: Epoch,
    },
    ProposalProcessed {
        proposal: ProposalId,
        module: ModuleId,
        timestamp: u64,
    },
    ConfigurationUpdated {
        module: ModuleId,
        key: String,
        value: u64,
    },
    AddressConfigurationUpdated {
        module: ModuleId,
        key: String,
        value: Address,
    },
    MemberAdded {
        module: ModuleId,
        member: Address,
    },
    DelegateKeyUpdated {
        module: ModuleId,
        member: Address,
        delegate: Address,
    },
    MemberJailed {
        module: ModuleId,
        member: Address,
    },
    MemberUnjailed {
        module: ModuleId,
        member: Address,
    },
}

impl EventKind for DaoEvent {
    fn kind(&self) -> &'static str {
        match self {
            DaoEvent::ModuleAdded { .. } => "module-added",
            DaoEvent::ModuleRemoved { .. } => "module-removed",
            DaoEvent::ProposalSubmitted { .. } => "proposal-submitted",
            DaoEvent::ProposalSponsored { .. } => "proposal-sponsored",
            DaoEvent::ProposalProcessed { .. } => "proposal-processed",
            DaoEvent::ConfigurationUpdated { .. } => "configuration-updated",
            DaoEvent::AddressConfigurationUpdated { .. } => "address-configuration-updated",
            DaoEvent::MemberAdded { .. } => "member-added",
            DaoEvent::DelegateKeyUpdated { .. } => "delegate-key-updated",
            DaoEvent::MemberJailed { .. } => "member-jailed",
            DaoEvent::MemberUnjailed { .. } => "member-unjailed",
        }
    }

    fn module(&self) -> Option<&ModuleId> {
        match self {
            DaoEvent::ModuleAdded { id, .. } | DaoEvent::ModuleRemoved { id, .. } => Some(id),
            DaoEvent::ProposalSubmitted { module, .. }
            | DaoEvent::ProposalSponsored { module, .. }
            | DaoEvent::ProposalProcessed { module, .. }
            | DaoEvent::ConfigurationUpdated { module, .. }
            | DaoEvent::AddressConfigurationUpdated { module, .. }
            | DaoEvent::MemberAdded { module, .. }
            | DaoEvent::DelegateKeyUpdated { module, .. }
            | DaoEvent::MemberJailed { module, .. }
            | DaoEvent::MemberUnjailed { module, .. } => Some(module),
        }
    }
}

/// A logged event with its position and ledger context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord<E> {
    pub seq: u64,
    pub epoch: Epoch,
    pub timestamp: u64,
    pub event: E,
}

/// Query filters for [`EventLog::query`].
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub kind: Option<&'static str>,
    pub module: Option<ModuleId>,
    /// Only records with a sequence number greater than this.
    pub after_seq: Option<u64>,
    /// Most recent N records.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "E: Serialize", deserialize = "E: serde::de::DeserializeOwned"))]
pub struct EventLog<E> {
    records: Vec<EventRecord<E>>,
    #[serde(skip)]
    publisher: Option<broadcast::Sender<EventRecord<E>>>,
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            publisher: None,
        }
    }
}

impl<E: Clone + Send + 'static> EventLog<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, ctx: &BlockContext, event: E) -> &EventRecord<E> {
        let record = EventRecord {
            seq: self.records.len() as u64,
            epoch: ctx.epoch,
            timestamp: ctx.timestamp,
            event,
        };
        if let Some(publisher) = &self.publisher {
            // No live subscribers is not an error; the log keeps the record.
            let _ = publisher.send(record.clone());
        }
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[EventRecord<E>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&EventRecord<E>> {
        self.records.last()
    }

    /// Live stream of records appended after this call.
    pub fn subscribe(&mut self) -> EventStream<E> {
        let publisher = self
            .publisher
            .get_or_insert_with(|| broadcast::channel(SUBSCRIPTION_CAPACITY).0);
        EventStream {
            inner: BroadcastStream::new(publisher.subscribe()),
        }
    }
}

impl<E: EventKind + Clone + Send + 'static> EventLog<E> {
    /// Filtered records, most recent first.
    pub fn query(&self, query: &EventQuery) -> Vec<&EventRecord<E>> {
        let matching = self.records.iter().rev().filter(|record| {
            if let Some(kind) = query.kind {
                if record.event.kind() != kind {
                    return false;
                }
            }
            if let Some(ref module) = query.module {
                if record.event.module() != Some(module) {
                    return false;
                }
            }
            if let Some(after) = query.after_seq {
                if record.seq <= after {
                    return false;
                }
            }
            true
        });
        match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }
}

/// Live event subscription. Records missed by a lagging subscriber are
/// skipped (they remain queryable in the log).
pub struct EventStream<E> {
    inner: BroadcastStream<EventRecord<E>>,
}

impl<E: Clone + Send + 'static> Stream for EventStream<E> {
    type Item = EventRecord<E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(record))) => return Poll::Ready(Some(record)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(skipped, "event subscriber lagged; records skipped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
