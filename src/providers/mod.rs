// SPDX-License-Identifier: MIT

//! The provider abstraction (§4.E): a uniform contract over every DNS
//! backend, a per-provider record cache, and the shared `BatchEnsureRecords`
//! algorithm every backend gets for free.

pub mod cloudflare;
pub mod digitalocean;
pub mod route53;
pub mod technitium;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::constants::DEFAULT_RATE_LIMIT_MAX_BACKOFF_SECS;
use crate::errors::{CoreError, CoreResult, ProviderError};
use crate::model::{BatchError, BatchResult, DesiredRecord, ProviderRecord};

/// `{records, lastUpdated}` with its own refresh interval (§4.E). Mutation
/// only happens through the owning provider's methods; reads are safe from
/// any task.
pub struct RecordCache {
    records: RwLock<HashMap<String, ProviderRecord>>,
    last_updated: RwLock<Option<Instant>>,
    refresh_interval: Duration,
}

impl RecordCache {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            last_updated: RwLock::new(None),
            refresh_interval,
        }
    }

    pub async fn is_stale(&self) -> bool {
        match *self.last_updated.read().await {
            None => true,
            Some(t) => t.elapsed() > self.refresh_interval,
        }
    }

    /// Replaces the cache wholesale after a fresh `ListRecords` call.
    pub async fn replace(&self, records: Vec<ProviderRecord>) {
        let mut map = HashMap::with_capacity(records.len());
        for record in records {
            map.insert(record.cache_key(), record);
        }
        *self.records.write().await = map;
        *self.last_updated.write().await = Some(Instant::now());
    }

    pub async fn get(&self, key: &str) -> Option<ProviderRecord> {
        self.records.read().await.get(key).cloned()
    }

    /// Inserts or overwrites one entry, touching `lastUpdated` (§4.E: "every
    /// mutating op updates `lastUpdated` and rewrites the affected entry").
    pub async fn put(&self, record: ProviderRecord) {
        let key = record.cache_key();
        self.records.write().await.insert(key, record);
        *self.last_updated.write().await = Some(Instant::now());
    }

    pub async fn remove(&self, key: &str) {
        self.records.write().await.remove(key);
        *self.last_updated.write().await = Some(Instant::now());
    }

    pub async fn snapshot(&self) -> Vec<ProviderRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

/// The uniform contract every DNS backend implements (§4.E).
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> Uuid;
    fn zone(&self) -> &str;
    fn cache(&self) -> &RecordCache;

    fn max_backoff(&self) -> Duration {
        Duration::from_secs(DEFAULT_RATE_LIMIT_MAX_BACKOFF_SECS)
    }

    /// Whether this backend has a proxy/CDN toggle it actually reads and
    /// reports back (only Cloudflare does). Backends that answer `false`
    /// always round-trip `proxied` as `None`, so the default
    /// `batch_ensure_records` normalizes it away before drift comparison,
    /// since a display-only field the backend discards must not drive a
    /// spurious update on every pass.
    fn supports_proxied(&self) -> bool {
        false
    }

    async fn list_records(&self) -> CoreResult<Vec<ProviderRecord>>;
    async fn create_record(&self, desired: &DesiredRecord) -> CoreResult<ProviderRecord>;
    async fn update_record(&self, external_id: &str, desired: &DesiredRecord) -> CoreResult<ProviderRecord>;
    async fn delete_record(&self, external_id: &str) -> CoreResult<()>;

    /// Step 1 of `BatchEnsureRecords`: re-list if the cache has aged past
    /// its refresh interval.
    async fn ensure_cache_fresh(&self) -> CoreResult<()> {
        if self.cache().is_stale().await {
            let records = self.list_records().await?;
            self.cache().replace(records).await;
        }
        Ok(())
    }

    /// The shared create/update/unchanged/error algorithm from §4.E. A
    /// backend only has to implement the four primitives above; this
    /// default is the entire batch contract including the
    /// abort-remaining-on-AuthFailed-or-RateLimited rule.
    async fn batch_ensure_records(&self, desired: Vec<DesiredRecord>) -> BatchResult {
        let mut result = BatchResult::default();

        if let Err(e) = self.ensure_cache_fresh().await {
            let reason = e.status_reason();
            for d in desired {
                result.errors.push(BatchError { desired: d, reason });
            }
            return result;
        }

        let supports_proxied = self.supports_proxied();
        let mut aborting = false;
        for mut d in desired {
            if !supports_proxied {
                d.proxied = None;
            }
            if aborting {
                result.errors.push(BatchError {
                    desired: d,
                    reason: "SkippedDueToEarlierFailure",
                });
                continue;
            }

            let key = d.cache_key();
            match self.cache().get(&key).await {
                None => match self.create_record(&d).await {
                    Ok(created) => {
                        self.cache().put(created.clone()).await;
                        result.created.push(created);
                    }
                    Err(e) => aborting |= self.record_failure(&mut result, d, e),
                },
                Some(existing) => {
                    if existing.fingerprint == d.fingerprint() {
                        result.unchanged.push(existing);
                    } else {
                        match self.update_record(&existing.external_id, &d).await {
                            Ok(updated) => {
                                self.cache().put(updated.clone()).await;
                                result.updated.push(updated);
                            }
                            Err(e) => aborting |= self.record_failure(&mut result, d, e),
                        }
                    }
                }
            }
        }

        result
    }

    /// Records one per-record failure and reports whether the remaining
    /// batch must now be abandoned (§4.E step 6).
    fn record_failure(&self, result: &mut BatchResult, desired: DesiredRecord, error: CoreError) -> bool {
        let reason = error.status_reason();
        let must_abort = matches!(
            error,
            CoreError::Provider(ProviderError::AuthFailed(_))
                | CoreError::Provider(ProviderError::RateLimited { .. })
        );
        result.errors.push(BatchError { desired, reason });
        must_abort
    }
}

/// Classifies an HTTP response into the abstract error kinds of §7, shared
/// by every backend's primitive operations.
pub fn classify_http_error(status: reqwest::StatusCode, message: String) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::AuthFailed(message),
        404 => ProviderError::NotFound(message),
        409 => ProviderError::Conflict(message),
        429 => ProviderError::RateLimited {
            retry_after_secs: DEFAULT_RATE_LIMIT_MAX_BACKOFF_SECS,
        },
        500..=599 => ProviderError::NetworkFailed(message),
        _ => ProviderError::NetworkFailed(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockProvider {
        id: Uuid,
        zone: String,
        cache: RecordCache,
        create_calls: AtomicUsize,
        fail_auth: bool,
    }

    #[async_trait]
    impl Provider for MockProvider {
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
            Ok(self.cache.snapshot().await)
        }

        async fn create_record(&self, desired: &DesiredRecord) -> CoreResult<ProviderRecord> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_auth {
                return Err(ProviderError::AuthFailed("bad token".into()).into());
            }
            Ok(ProviderRecord {
                desired: desired.clone(),
                external_id: format!("ext-{}", self.create_calls.load(Ordering::SeqCst)),
                fingerprint: desired.fingerprint(),
            })
        }

        async fn update_record(
            &self,
            external_id: &str,
            desired: &DesiredRecord,
        ) -> CoreResult<ProviderRecord> {
            Ok(ProviderRecord {
                desired: desired.clone(),
                external_id: external_id.to_string(),
                fingerprint: desired.fingerprint(),
            })
        }

        async fn delete_record(&self, _external_id: &str) -> CoreResult<()> {
            Ok(())
        }
    }

    fn record(content: &str) -> DesiredRecord {
        DesiredRecord {
            record_type: RecordType::A,
            name: "web.example.com".into(),
            content: content.into(),
            ttl: 120,
            proxied: None,
            priority: None,
            weight: None,
            port: None,
            flags: None,
            tag: None,
        }
    }

    #[tokio::test]
    async fn creates_when_no_cache_match() {
        let provider = MockProvider {
            id: Uuid::new_v4(),
            zone: "example.com".into(),
            cache: RecordCache::new(Duration::from_secs(60)),
            create_calls: AtomicUsize::new(0),
            fail_auth: false,
        };
        let result = provider.batch_ensure_records(vec![record("10.0.0.1")]).await;
        assert_eq!(result.created.len(), 1);
        assert_eq!(result.updated.len(), 0);
        assert_eq!(result.unchanged.len(), 0);
    }

    #[tokio::test]
    async fn second_call_is_unchanged() {
        let provider = MockProvider {
            id: Uuid::new_v4(),
            zone: "example.com".into(),
            cache: RecordCache::new(Duration::from_secs(60)),
            create_calls: AtomicUsize::new(0),
            fail_auth: false,
        };
        provider.batch_ensure_records(vec![record("10.0.0.1")]).await;
        let second = provider.batch_ensure_records(vec![record("10.0.0.1")]).await;
        assert_eq!(second.created.len(), 0);
        assert_eq!(second.updated.len(), 0);
        assert_eq!(second.unchanged.len(), 1);
    }

    /// A backend that never honors `proxied` (Route53, DigitalOcean,
    /// Technitium) must not see a spurious update when the intent
    /// extractor always yields `Some(dns_default_proxied)` for every pass.
    #[tokio::test]
    async fn unsupported_proxied_field_does_not_cause_perpetual_update() {
        let provider = MockProvider {
            id: Uuid::new_v4(),
            zone: "example.com".into(),
            cache: RecordCache::new(Duration::from_secs(60)),
            create_calls: AtomicUsize::new(0),
            fail_auth: false,
        };
        let mut desired = record("10.0.0.1");
        desired.proxied = Some(false);
        provider.batch_ensure_records(vec![desired.clone()]).await;

        let second = provider.batch_ensure_records(vec![desired]).await;
        assert_eq!(second.created.len(), 0);
        assert_eq!(second.updated.len(), 0);
        assert_eq!(second.unchanged.len(), 1);
    }

    #[tokio::test]
    async fn changed_content_triggers_update() {
        let provider = MockProvider {
            id: Uuid::new_v4(),
            zone: "example.com".into(),
            cache: RecordCache::new(Duration::from_secs(60)),
            create_calls: AtomicUsize::new(0),
            fail_auth: false,
        };
        provider.batch_ensure_records(vec![record("10.0.0.1")]).await;
        let result = provider.batch_ensure_records(vec![record("10.0.0.2")]).await;
        assert_eq!(result.updated.len(), 1);
    }

    #[tokio::test]
    async fn auth_failure_aborts_remaining_batch() {
        let provider = Arc::new(MockProvider {
            id: Uuid::new_v4(),
            zone: "example.com".into(),
            cache: RecordCache::new(Duration::from_secs(60)),
            create_calls: AtomicUsize::new(0),
            fail_auth: true,
        });
        let result = provider
            .batch_ensure_records(vec![record("10.0.0.1"), record("10.0.0.2")])
            .await;
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[1].reason, "SkippedDueToEarlierFailure");
    }
}
