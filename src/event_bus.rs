// SPDX-License-Identifier: MIT

//! Typed, in-process pub/sub (§4.A).
//!
//! A single `tokio::sync::broadcast` channel carries the [`Event`] enum, so
//! every subscriber receives every topic and filters by variant. Delivery is
//! fan-out concurrent but per-subscriber serialized: a lagging subscriber
//! drops the oldest queued events rather than blocking the publisher or its
//! peers. Each subscriber task is expected to log the first `Lagged` it
//! observes per overflow episode; [`EventBus::subscribe`] returns a
//! [`Subscription`] helper that does this bookkeeping for callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::{DesiredRecord, DiscoveredHostnames, Stats};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEvent {
    pub provider_id: Uuid,
    pub external_id: String,
    pub hostname: String,
    pub record_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanEvent {
    pub provider_id: Uuid,
    pub external_id: String,
    pub hostname: String,
    pub grace_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsUpdatedEvent {
    pub stats: Stats,
    pub processed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerEvent {
    pub container_id: String,
    pub hostnames: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelEvent {
    pub tunnel_id: Uuid,
    pub hostname: String,
    pub kind: TunnelEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TunnelEventKind {
    Created,
    Updated,
    Orphaned,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsChangedEvent {
    pub key: String,
    pub value: String,
    pub restart_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub reason: &'static str,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Every payload the core publishes, named after the §6 topic list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    HostnamesDiscovered(DiscoveredHostnames),
    DnsRecordCreated(RecordEvent),
    DnsRecordUpdated(RecordEvent),
    DnsRecordDeleted(RecordEvent),
    DnsRecordOrphaned(OrphanEvent),
    DnsRecordsUpdated(RecordsUpdatedEvent),
    DnsSyncCompleted,
    ContainerStarted(ContainerEvent),
    ContainerStopped(ContainerEvent),
    ContainerDestroyed(ContainerEvent),
    TunnelRouteChanged(TunnelEvent),
    SettingsChanged(SettingsChangedEvent),
    ErrorOccurred(ErrorEvent),
}

impl Event {
    /// Returns a desired-record-shaped `RecordEvent` for the CREATED/UPDATED
    /// topics, used by the engine after a successful batch-ensure outcome.
    pub fn record_event(provider_id: Uuid, external_id: &str, record: &DesiredRecord) -> RecordEvent {
        RecordEvent {
            provider_id,
            external_id: external_id.to_string(),
            hostname: record.name.clone(),
            record_type: record.record_type.to_string(),
        }
    }
}

/// The in-process event bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all current subscribers. Returns the number of
    /// subscribers the event was delivered to (best-effort, per
    /// `tokio::sync::broadcast` semantics).
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribes from any thread; takes effect on the next publish.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            lagged_warned: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// A bounded receiver handle with once-per-overflow-episode lag logging.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
    lagged_warned: Arc<AtomicBool>,
}

impl Subscription {
    /// Awaits the next event, transparently skipping and logging a lag
    /// warning at most once per overflow episode.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    self.lagged_warned.store(false, Ordering::Relaxed);
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    if !self.lagged_warned.swap(true, Ordering::Relaxed) {
                        tracing::warn!(skipped, "event bus subscriber lagged, dropping oldest events");
                    }
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
