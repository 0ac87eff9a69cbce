// SPDX-License-Identifier: MIT

//! Reconciliation Engine (§4.H): the stateful component with one public
//! entry point, `process_hostnames`, that turns a discovery pass into
//! provider-side DNS changes and durable tracked-record state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cleanup::CleanupCoordinator;
use crate::config::SettingsStore;
use crate::event_bus::{ErrorEvent, Event, EventBus, RecordsUpdatedEvent};
use crate::intent::{Intent, IntentExtractor};
use crate::metrics;
use crate::model::{
    normalize_hostname, DiscoveredHostnames, Provider as ProviderConfig, RecordSource, Stats,
    TrackedRecord,
};
use crate::providers::Provider;
use crate::public_ip::PublicIpResolver;
use crate::repository::TrackedRecordRepository;
use crate::router;

/// Drives one reconciliation pass. Stateless across passes apart from the
/// repository and each provider's own record cache (§4.H).
pub struct ReconciliationEngine {
    settings: Arc<SettingsStore>,
    repository: Arc<dyn TrackedRecordRepository>,
    providers: HashMap<uuid::Uuid, Arc<dyn Provider>>,
    public_ip: Arc<PublicIpResolver>,
    events: EventBus,
}

impl ReconciliationEngine {
    pub fn new(
        settings: Arc<SettingsStore>,
        repository: Arc<dyn TrackedRecordRepository>,
        providers: HashMap<uuid::Uuid, Arc<dyn Provider>>,
        public_ip: Arc<PublicIpResolver>,
        events: EventBus,
    ) -> Self {
        Self {
            settings,
            repository,
            providers,
            public_ip,
            events,
        }
    }

    /// The entry point: `ProcessHostnames(hostnames, labels) -> Stats`.
    pub async fn process_hostnames(&self, discovered: &DiscoveredHostnames) -> crate::errors::CoreResult<Stats> {
        let settings = self.settings.get();
        let provider_configs = self.repository.list_providers().await?;
        let preserved = self.repository.list_preserved().await?;
        let provider_names: HashMap<uuid::Uuid, String> =
            provider_configs.iter().map(|p| (p.id, p.name.clone())).collect();
        let source = if settings.operation_mode == "direct" {
            RecordSource::Direct
        } else {
            RecordSource::Proxy
        };

        let mut stats = Stats::default();
        let mut batches: HashMap<uuid::Uuid, Vec<crate::model::DesiredRecord>> = HashMap::new();
        let mut active_by_provider: HashMap<uuid::Uuid, HashSet<String>> = HashMap::new();
        let mut record_source: HashMap<String, RecordSource> = HashMap::new();

        for hostname in &discovered.hostnames {
            stats.total += 1;
            let hostname = normalize_hostname(hostname);
            let labels = discovered.labels.get(hostname.as_str()).cloned().unwrap_or_default();

            let targets: Vec<&ProviderConfig> = router::route(
                &hostname,
                &labels,
                &settings.dns_label_prefix,
                &provider_configs,
                settings.dns_routing_mode,
                settings.dns_multi_provider_same_zone,
            );
            if targets.is_empty() {
                stats.skipped += 1;
                continue;
            }

            let extractor = IntentExtractor::new(&settings, &self.public_ip);
            let mut any_target = false;
            for target in targets {
                match extractor.extract(&hostname, &labels, &target.zone).await {
                    Ok(Intent::Skip) => {}
                    Ok(Intent::Record(record)) => {
                        batches.entry(target.id).or_default().push(record);
                        active_by_provider.entry(target.id).or_default().insert(hostname.clone());
                        record_source.insert(hostname.clone(), source);
                        any_target = true;
                    }
                    Err(e) => {
                        stats.errors += 1;
                        self.events.publish(Event::ErrorOccurred(ErrorEvent {
                            reason: "ValidationFailed",
                            message: e.to_string(),
                            occurred_at: Utc::now(),
                        }));
                    }
                }
            }
            if !any_target {
                stats.skipped += 1;
            }
        }

        // Externally configured hostnames (§3 ManagedHostname) are ensured
        // every pass regardless of discovery, unless this pass's discovery
        // already covers the same hostname.
        let mut seen: HashSet<String> = discovered.hostnames.iter().map(|h| normalize_hostname(h)).collect();
        for managed in self.repository.list_managed().await? {
            let hostname = normalize_hostname(&managed.hostname);
            if !seen.insert(hostname.clone()) {
                continue;
            }
            stats.total += 1;
            batches.entry(managed.provider_id).or_default().push(managed.record.clone());
            active_by_provider.entry(managed.provider_id).or_default().insert(hostname.clone());
            record_source.insert(hostname, RecordSource::Managed);
        }

        let mut processed = Vec::new();
        for (provider_id, desired) in batches {
            let Some(provider) = self.providers.get(&provider_id) else {
                continue;
            };
            let result = provider.batch_ensure_records(desired).await;
            stats.created += result.created.len() as u64;
            stats.updated += result.updated.len() as u64;
            stats.up_to_date += result.unchanged.len() as u64;
            stats.errors += result.errors.len() as u64;

            let provider_name = provider_names.get(&provider_id).map(|s| s.as_str()).unwrap_or("unknown");

            for created in &result.created {
                let record_src = record_source.get(&created.desired.name).copied().unwrap_or(source);
                self.upsert_tracked(provider_id, created, record_src).await?;
                metrics::record_dns_record(provider_name, "created");
                self.events.publish(Event::DnsRecordCreated(Event::record_event(
                    provider_id,
                    &created.external_id,
                    &created.desired,
                )));
                processed.push(created.desired.name.clone());
            }
            for updated in &result.updated {
                let record_src = record_source.get(&updated.desired.name).copied().unwrap_or(source);
                self.upsert_tracked(provider_id, updated, record_src).await?;
                metrics::record_dns_record(provider_name, "updated");
                self.events.publish(Event::DnsRecordUpdated(Event::record_event(
                    provider_id,
                    &updated.external_id,
                    &updated.desired,
                )));
                processed.push(updated.desired.name.clone());
            }
            for unchanged in &result.unchanged {
                if self
                    .repository
                    .get(provider_id, &unchanged.external_id)
                    .await?
                    .is_none()
                {
                    let record_src = record_source.get(&unchanged.desired.name).copied().unwrap_or(source);
                    self.upsert_tracked(provider_id, unchanged, record_src).await?;
                }
                metrics::record_dns_record(provider_name, "up_to_date");
                processed.push(unchanged.desired.name.clone());
            }
            for error in &result.errors {
                metrics::record_dns_record(provider_name, "error");
                metrics::record_provider_error(provider_name, error.reason);
            }
        }

        if settings.cleanup_orphaned {
            let coordinator = CleanupCoordinator::new(self.repository.as_ref(), &self.events);
            let grace_period = Duration::from_secs(settings.cleanup_grace_period_secs);
            let empty = HashSet::new();
            for (provider_id, provider) in &self.providers {
                let active = active_by_provider.get(provider_id).unwrap_or(&empty);
                if let Err(e) = coordinator
                    .reconcile_provider(provider.as_ref(), active, &preserved, Utc::now(), grace_period)
                    .await
                {
                    tracing::warn!(provider_id = %provider_id, error = %e, "orphan cleanup pass failed");
                }
            }
        }

        self.events.publish(Event::DnsRecordsUpdated(RecordsUpdatedEvent {
            stats: stats.clone(),
            processed,
        }));
        self.events.publish(Event::DnsSyncCompleted);

        Ok(stats)
    }

    async fn upsert_tracked(
        &self,
        provider_id: uuid::Uuid,
        record: &crate::model::ProviderRecord,
        source: RecordSource,
    ) -> crate::errors::CoreResult<()> {
        self.repository
            .upsert(TrackedRecord {
                provider_id,
                external_id: record.external_id.clone(),
                record: record.desired.clone(),
                source,
                managed: true,
                orphaned_at: None,
                last_synced_at: Utc::now(),
            })
            .await
    }
}
