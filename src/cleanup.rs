// SPDX-License-Identifier: MIT

//! Orphan Cleanup Coordinator (§4.L): retires tracked records for hostnames
//! that stopped being discovered, with a grace period and preserved-pattern
//! protection. Shared by the reconciliation engine and the tunnel route
//! manager.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::CoreResult;
use crate::event_bus::{Event, EventBus, OrphanEvent};
use crate::metrics;
use crate::model::{PreservedPattern, RecordSource};
use crate::providers::Provider;
use crate::repository::{SourceFilter, TrackedRecordRepository};

/// Per-provider tally of what one cleanup pass did, for logging/metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub reactivated: u64,
    pub preserved: u64,
    pub marked: u64,
    pub deleted: u64,
    pub delete_failures: u64,
}

pub struct CleanupCoordinator<'a> {
    repository: &'a dyn TrackedRecordRepository,
    events: &'a EventBus,
}

impl<'a> CleanupCoordinator<'a> {
    pub fn new(repository: &'a dyn TrackedRecordRepository, events: &'a EventBus) -> Self {
        Self { repository, events }
    }

    /// Runs one provider's share of the orphan state machine against
    /// `active_hostnames` (already normalised lowercase).
    pub async fn reconcile_provider(
        &self,
        provider: &dyn Provider,
        active_hostnames: &HashSet<String>,
        preserved: &[PreservedPattern],
        now: DateTime<Utc>,
        grace_period: Duration,
    ) -> CoreResult<CleanupOutcome> {
        let filter = SourceFilter {
            source: None,
            managed_only: true,
        };
        let tracked = self.repository.list_by_provider(provider.id(), filter).await?;
        let grace = chrono::Duration::from_std(grace_period).unwrap_or(chrono::Duration::zero());
        let mut outcome = CleanupOutcome::default();
        let mut still_orphaned: u64 = 0;

        for record in tracked {
            if !matches!(record.source, RecordSource::Proxy | RecordSource::Direct) || !record.managed {
                continue;
            }
            let hostname = record.record.name.to_ascii_lowercase();

            if active_hostnames.contains(&hostname) {
                if record.orphaned_at.is_some() {
                    self.repository.clear_orphan(provider.id(), &record.external_id).await?;
                    outcome.reactivated += 1;
                }
                continue;
            }

            if preserved.iter().any(|p| p.matches(&hostname)) {
                if record.orphaned_at.is_some() {
                    self.repository.clear_orphan(provider.id(), &record.external_id).await?;
                }
                outcome.preserved += 1;
                continue;
            }

            match record.orphaned_at {
                None => {
                    self.repository.mark_orphan(provider.id(), &record.external_id, now).await?;
                    outcome.marked += 1;
                    still_orphaned += 1;
                    self.events.publish(Event::DnsRecordOrphaned(OrphanEvent {
                        provider_id: provider.id(),
                        external_id: record.external_id.clone(),
                        hostname: hostname.clone(),
                        grace_minutes: grace_period.as_secs() / 60,
                    }));
                }
                Some(orphaned_at) if now - orphaned_at > grace => {
                    match provider.delete_record(&record.external_id).await {
                        Ok(()) => {
                            self.repository.delete(provider.id(), &record.external_id).await?;
                            outcome.deleted += 1;
                            metrics::record_record_deleted(provider.zone());
                            self.events.publish(Event::DnsRecordDeleted(Event::record_event(
                                provider.id(),
                                &record.external_id,
                                &record.record,
                            )));
                        }
                        Err(e) => {
                            tracing::warn!(
                                provider_id = %provider.id(),
                                external_id = %record.external_id,
                                error = %e,
                                "failed to delete orphaned record, retrying next pass"
                            );
                            outcome.delete_failures += 1;
                            still_orphaned += 1;
                        }
                    }
                }
                Some(_) => {
                    still_orphaned += 1;
                }
            }
        }

        metrics::set_orphaned_records(provider.zone(), still_orphaned as f64);
        Ok(outcome)
    }
}
