// SPDX-License-Identifier: MIT

//! Shared end-to-end test harness: an in-memory repository and a stub
//! provider backend standing in for a real DNS API, used by the scenario
//! suite in `reconciliation.rs` and the invariant suite in `invariants.rs`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use trafegodns::config::{NoopPersister, RoutingMode, Settings, SettingsStore};
use trafegodns::engine::ReconciliationEngine;
use trafegodns::errors::CoreResult;
use trafegodns::event_bus::EventBus;
use trafegodns::model::{
    DesiredRecord, DiscoveredHostnames, LabelMap, ManagedHostname, PreservedPattern,
    Provider as ProviderConfig, ProviderRecord, RecordSource, TrackedRecord,
};
use trafegodns::providers::{Provider, RecordCache};
use trafegodns::public_ip::PublicIpResolver;
use trafegodns::repository::{SourceFilter, TrackedRecordRepository};

#[derive(Default)]
pub struct InMemoryRepository {
    records: Mutex<HashMap<(Uuid, String), TrackedRecord>>,
    providers: Mutex<Vec<ProviderConfig>>,
    preserved: Mutex<Vec<PreservedPattern>>,
    managed: Mutex<Vec<ManagedHostname>>,
    settings: Mutex<HashMap<String, String>>,
}

impl InMemoryRepository {
    pub fn with_providers(providers: Vec<ProviderConfig>) -> Self {
        Self {
            providers: Mutex::new(providers),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TrackedRecordRepository for InMemoryRepository {
    async fn upsert(&self, record: TrackedRecord) -> CoreResult<()> {
        self.records.lock().unwrap().insert(record.identity(), record);
        Ok(())
    }

    async fn clear_orphan(&self, provider_id: Uuid, external_id: &str) -> CoreResult<()> {
        if let Some(r) = self.records.lock().unwrap().get_mut(&(provider_id, external_id.to_string())) {
            r.orphaned_at = None;
        }
        Ok(())
    }

    async fn mark_orphan(&self, provider_id: Uuid, external_id: &str, at: DateTime<Utc>) -> CoreResult<()> {
        if let Some(r) = self.records.lock().unwrap().get_mut(&(provider_id, external_id.to_string())) {
            r.orphaned_at = Some(at);
        }
        Ok(())
    }

    async fn delete(&self, provider_id: Uuid, external_id: &str) -> CoreResult<()> {
        self.records.lock().unwrap().remove(&(provider_id, external_id.to_string()));
        Ok(())
    }

    async fn list_by_provider(&self, provider_id: Uuid, filter: SourceFilter) -> CoreResult<Vec<TrackedRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.provider_id == provider_id)
            .filter(|r| filter.source.is_none_or(|s| s == r.source))
            .filter(|r| !filter.managed_only || r.managed)
            .cloned()
            .collect())
    }

    async fn get(&self, provider_id: Uuid, external_id: &str) -> CoreResult<Option<TrackedRecord>> {
        Ok(self.records.lock().unwrap().get(&(provider_id, external_id.to_string())).cloned())
    }

    async fn list_preserved(&self) -> CoreResult<Vec<PreservedPattern>> {
        Ok(self.preserved.lock().unwrap().clone())
    }

    async fn add_preserved(&self, pattern: PreservedPattern) -> CoreResult<()> {
        self.preserved.lock().unwrap().push(pattern);
        Ok(())
    }

    async fn remove_preserved(&self, pattern: &PreservedPattern) -> CoreResult<()> {
        self.preserved.lock().unwrap().retain(|p| p != pattern);
        Ok(())
    }

    async fn list_managed(&self) -> CoreResult<Vec<ManagedHostname>> {
        Ok(self.managed.lock().unwrap().clone())
    }

    async fn add_managed(&self, hostname: ManagedHostname) -> CoreResult<()> {
        self.managed.lock().unwrap().push(hostname);
        Ok(())
    }

    async fn remove_managed(&self, hostname: &str) -> CoreResult<()> {
        self.managed.lock().unwrap().retain(|m| m.hostname != hostname);
        Ok(())
    }

    async fn list_providers(&self) -> CoreResult<Vec<ProviderConfig>> {
        Ok(self.providers.lock().unwrap().clone())
    }

    async fn get_provider(&self, id: Uuid) -> CoreResult<Option<ProviderConfig>> {
        Ok(self.providers.lock().unwrap().iter().find(|p| p.id == id).cloned())
    }

    async fn upsert_provider(&self, provider: ProviderConfig) -> CoreResult<()> {
        let mut providers = self.providers.lock().unwrap();
        providers.retain(|p| p.id != provider.id);
        providers.push(provider);
        Ok(())
    }

    async fn delete_provider(&self, id: Uuid) -> CoreResult<()> {
        self.providers.lock().unwrap().retain(|p| p.id != id);
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.settings.lock().unwrap().get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> CoreResult<()> {
        self.settings.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Stands in for a real DNS API: `records` is the "remote" state, keyed by
/// cache key, mutated only through the four `Provider` primitives.
pub struct StubProvider {
    pub id: Uuid,
    pub zone: String,
    pub cache: RecordCache,
    pub remote: Mutex<HashMap<String, ProviderRecord>>,
    pub next_id: Mutex<u64>,
}

impl StubProvider {
    pub fn new(zone: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            zone: zone.to_string(),
            cache: RecordCache::new(Duration::from_secs(60)),
            remote: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }

    pub fn with_id(zone: &str, id: Uuid) -> Self {
        let mut provider = Self::new(zone);
        provider.id = id;
        provider
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{}-{}", self.zone, next)
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn id(&self) -> Uuid {
        self.id
    }

    fn zone(&self) -> &str {
        &self.zone
    }

    fn cache(&self) -> &RecordCache {
        &self.cache
    }

    async fn list_records(&self) -> CoreResult<Vec<ProviderRecord>> {
        Ok(self.remote.lock().unwrap().values().cloned().collect())
    }

    async fn create_record(&self, desired: &DesiredRecord) -> CoreResult<ProviderRecord> {
        let record = ProviderRecord {
            fingerprint: desired.fingerprint(),
            external_id: self.allocate_id(),
            desired: desired.clone(),
        };
        self.remote.lock().unwrap().insert(record.cache_key(), record.clone());
        Ok(record)
    }

    async fn update_record(&self, external_id: &str, desired: &DesiredRecord) -> CoreResult<ProviderRecord> {
        let record = ProviderRecord {
            fingerprint: desired.fingerprint(),
            external_id: external_id.to_string(),
            desired: desired.clone(),
        };
        self.remote.lock().unwrap().insert(record.cache_key(), record.clone());
        Ok(record)
    }

    async fn delete_record(&self, external_id: &str) -> CoreResult<()> {
        self.remote.lock().unwrap().retain(|_, r| r.external_id != external_id);
        Ok(())
    }
}

pub fn provider_config(name: &str, zone: &str, id: Uuid, is_default: bool) -> ProviderConfig {
    use trafegodns::model::{ProviderCredentials, ProviderType};
    ProviderConfig {
        id,
        name: name.to_string(),
        provider_type: ProviderType::Cloudflare,
        credentials: ProviderCredentials::Cloudflare {
            api_token: "test-token".to_string(),
        },
        zone: zone.to_string(),
        is_default,
        enabled: true,
    }
}

/// `Settings` with routing/cleanup knobs set explicitly, everything else
/// at its compiled default (§4.B).
pub fn base_settings(mode: RoutingMode, same_zone: bool, grace_secs: u64) -> Settings {
    let mut settings = Settings::default();
    settings.dns_default_type = "A".to_string();
    settings.dns_routing_mode = mode;
    settings.dns_multi_provider_same_zone = same_zone;
    settings.cleanup_orphaned = true;
    settings.cleanup_grace_period_secs = grace_secs;
    settings
}

/// Wires a `ReconciliationEngine` over the in-memory harness, seeded with a
/// fixed public IPv4 so `A`-record intent extraction never depends on a
/// live probe.
pub async fn engine_for(
    repo: std::sync::Arc<InMemoryRepository>,
    settings: Settings,
    providers: HashMap<Uuid, std::sync::Arc<dyn Provider>>,
    events: EventBus,
) -> ReconciliationEngine {
    let settings_store =
        std::sync::Arc::new(SettingsStore::new(settings, std::sync::Arc::new(NoopPersister), events.clone()));
    let public_ip = std::sync::Arc::new(PublicIpResolver::new(reqwest::Client::new(), events.clone()));
    public_ip.seed(Some("203.0.113.9".parse().unwrap()), None).await;
    ReconciliationEngine::new(settings_store, repo, providers, public_ip, events)
}

/// Builds a `DiscoveredHostnames` from `(hostname, [(label_suffix, value)])`
/// pairs, all under the default `dns.` prefix.
pub fn discovered(entries: &[(&str, &[(&str, &str)])]) -> DiscoveredHostnames {
    let mut result = DiscoveredHostnames::default();
    for (hostname, pairs) in entries {
        result.hostnames.push(hostname.to_string());
        let labels: LabelMap = pairs.iter().map(|(k, v)| (format!("dns.{k}"), v.to_string())).collect();
        result.labels.insert(hostname.to_string(), labels);
    }
    result
}
