// SPDX-License-Identifier: MIT

//! SQLite-backed [`TrackedRecordRepository`], via `sqlx`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::errors::{CoreResult, RepositoryError};
use crate::model::{
    DesiredRecord, ManagedHostname, PreservedPattern, Provider, ProviderCredentials, ProviderType,
    RecordSource, TrackedRecord,
};

use super::{Cipher, NoopCipher, SourceFilter, TrackedRecordRepository};

/// Opens (creating if necessary) the SQLite database at `path` and runs the
/// bundled migrations.
pub async fn connect(path: &str) -> CoreResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(RepositoryError::Sqlx)?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(RepositoryError::Migrate)?;
    Ok(pool)
}

pub struct SqliteRepository {
    pool: SqlitePool,
    cipher: Arc<dyn Cipher>,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            cipher: Arc::new(NoopCipher),
        }
    }

    pub fn with_cipher(pool: SqlitePool, cipher: Arc<dyn Cipher>) -> Self {
        Self { pool, cipher }
    }

    fn source_to_str(source: RecordSource) -> &'static str {
        match source {
            RecordSource::Proxy => "proxy",
            RecordSource::Direct => "direct",
            RecordSource::Api => "api",
            RecordSource::Managed => "managed",
            RecordSource::Discovered => "discovered",
        }
    }

    fn source_from_str(raw: &str) -> CoreResult<RecordSource> {
        Ok(match raw {
            "proxy" => RecordSource::Proxy,
            "direct" => RecordSource::Direct,
            "api" => RecordSource::Api,
            "managed" => RecordSource::Managed,
            "discovered" => RecordSource::Discovered,
            other => {
                return Err(
                    RepositoryError::StorageFailed(format!("unknown record source `{other}`"))
                        .into(),
                )
            }
        })
    }

    fn provider_type_to_str(t: &ProviderType) -> &'static str {
        match t {
            ProviderType::Cloudflare => "cloudflare",
            ProviderType::Route53 => "route53",
            ProviderType::Digitalocean => "digitalocean",
            ProviderType::Technitium => "technitium",
        }
    }

    fn provider_type_from_str(raw: &str) -> CoreResult<ProviderType> {
        Ok(match raw {
            "cloudflare" => ProviderType::Cloudflare,
            "route53" => ProviderType::Route53,
            "digitalocean" => ProviderType::Digitalocean,
            "technitium" => ProviderType::Technitium,
            other => {
                return Err(RepositoryError::StorageFailed(format!(
                    "unknown provider type `{other}`"
                ))
                .into())
            }
        })
    }
}

#[async_trait]
impl TrackedRecordRepository for SqliteRepository {
    async fn upsert(&self, record: TrackedRecord) -> CoreResult<()> {
        let record_json =
            serde_json::to_string(&record.record).map_err(|e| RepositoryError::StorageFailed(e.to_string()))?;
        sqlx::query(
            "INSERT INTO dns_records
                (provider_id, external_id, record_json, source, managed, orphaned_at, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(provider_id, external_id) DO UPDATE SET
                record_json = excluded.record_json,
                source = excluded.source,
                managed = excluded.managed,
                orphaned_at = excluded.orphaned_at,
                last_synced_at = excluded.last_synced_at",
        )
        .bind(record.provider_id.to_string())
        .bind(&record.external_id)
        .bind(record_json)
        .bind(Self::source_to_str(record.source))
        .bind(record.managed)
        .bind(record.orphaned_at.map(|t| t.to_rfc3339()))
        .bind(record.last_synced_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::Sqlx)?;
        Ok(())
    }

    async fn clear_orphan(&self, provider_id: Uuid, external_id: &str) -> CoreResult<()> {
        sqlx::query(
            "UPDATE dns_records SET orphaned_at = NULL WHERE provider_id = ?1 AND external_id = ?2",
        )
        .bind(provider_id.to_string())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::Sqlx)?;
        Ok(())
    }

    async fn mark_orphan(
        &self,
        provider_id: Uuid,
        external_id: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        sqlx::query(
            "UPDATE dns_records SET orphaned_at = ?3 WHERE provider_id = ?1 AND external_id = ?2",
        )
        .bind(provider_id.to_string())
        .bind(external_id)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::Sqlx)?;
        Ok(())
    }

    async fn delete(&self, provider_id: Uuid, external_id: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM dns_records WHERE provider_id = ?1 AND external_id = ?2")
            .bind(provider_id.to_string())
            .bind(external_id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::Sqlx)?;
        Ok(())
    }

    async fn list_by_provider(
        &self,
        provider_id: Uuid,
        filter: SourceFilter,
    ) -> CoreResult<Vec<TrackedRecord>> {
        let rows = sqlx::query(
            "SELECT external_id, record_json, source, managed, orphaned_at, last_synced_at
             FROM dns_records WHERE provider_id = ?1",
        )
        .bind(provider_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::Sqlx)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let source = Self::source_from_str(row.get::<String, _>("source").as_str())?;
            if let Some(wanted) = filter.source {
                if wanted != source {
                    continue;
                }
            }
            let managed: bool = row.get("managed");
            if filter.managed_only && !managed {
                continue;
            }
            let record_json: String = row.get("record_json");
            let record: DesiredRecord = serde_json::from_str(&record_json)
                .map_err(|e| RepositoryError::StorageFailed(e.to_string()))?;
            let orphaned_at: Option<String> = row.get("orphaned_at");
            let last_synced_at: String = row.get("last_synced_at");
            out.push(TrackedRecord {
                provider_id,
                external_id: row.get("external_id"),
                record,
                source,
                managed,
                orphaned_at: orphaned_at
                    .map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
                    .transpose()
                    .map_err(|e| RepositoryError::StorageFailed(e.to_string()))?,
                last_synced_at: DateTime::parse_from_rfc3339(&last_synced_at)
                    .map_err(|e| RepositoryError::StorageFailed(e.to_string()))?
                    .with_timezone(&Utc),
            });
        }
        Ok(out)
    }

    async fn get(&self, provider_id: Uuid, external_id: &str) -> CoreResult<Option<TrackedRecord>> {
        Ok(self
            .list_by_provider(provider_id, SourceFilter::default())
            .await?
            .into_iter()
            .find(|r| r.external_id == external_id))
    }

    async fn list_preserved(&self) -> CoreResult<Vec<PreservedPattern>> {
        let rows = sqlx::query("SELECT pattern FROM preserved_hostnames")
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::Sqlx)?;
        Ok(rows
            .into_iter()
            .map(|row| PreservedPattern(row.get("pattern")))
            .collect())
    }

    async fn add_preserved(&self, pattern: PreservedPattern) -> CoreResult<()> {
        sqlx::query("INSERT OR IGNORE INTO preserved_hostnames (pattern) VALUES (?1)")
            .bind(pattern.0.to_ascii_lowercase())
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::Sqlx)?;
        Ok(())
    }

    async fn remove_preserved(&self, pattern: &PreservedPattern) -> CoreResult<()> {
        sqlx::query("DELETE FROM preserved_hostnames WHERE pattern = ?1")
            .bind(pattern.0.to_ascii_lowercase())
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::Sqlx)?;
        Ok(())
    }

    async fn list_managed(&self) -> CoreResult<Vec<ManagedHostname>> {
        let rows = sqlx::query("SELECT hostname, record_json, provider_id FROM managed_hostnames")
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::Sqlx)?;
        rows.into_iter()
            .map(|row| {
                let record_json: String = row.get("record_json");
                let provider_id: String = row.get("provider_id");
                Ok(ManagedHostname {
                    hostname: row.get("hostname"),
                    record: serde_json::from_str(&record_json)
                        .map_err(|e| RepositoryError::StorageFailed(e.to_string()))?,
                    provider_id: Uuid::parse_str(&provider_id)
                        .map_err(|e| RepositoryError::StorageFailed(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn add_managed(&self, hostname: ManagedHostname) -> CoreResult<()> {
        let record_json = serde_json::to_string(&hostname.record)
            .map_err(|e| RepositoryError::StorageFailed(e.to_string()))?;
        sqlx::query(
            "INSERT INTO managed_hostnames (hostname, record_json, provider_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(hostname) DO UPDATE SET
                record_json = excluded.record_json, provider_id = excluded.provider_id",
        )
        .bind(hostname.hostname)
        .bind(record_json)
        .bind(hostname.provider_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::Sqlx)?;
        Ok(())
    }

    async fn remove_managed(&self, hostname: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM managed_hostnames WHERE hostname = ?1")
            .bind(hostname)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::Sqlx)?;
        Ok(())
    }

    async fn list_providers(&self) -> CoreResult<Vec<Provider>> {
        let rows = sqlx::query(
            "SELECT id, name, type, credentials_blob, zone, is_default, enabled FROM providers",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::Sqlx)?;
        rows.into_iter().map(|row| self.provider_from_row(row)).collect()
    }

    async fn get_provider(&self, id: Uuid) -> CoreResult<Option<Provider>> {
        let row = sqlx::query(
            "SELECT id, name, type, credentials_blob, zone, is_default, enabled
             FROM providers WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::Sqlx)?;
        row.map(|r| self.provider_from_row(r)).transpose()
    }

    async fn upsert_provider(&self, provider: Provider) -> CoreResult<()> {
        let credentials_json = serde_json::to_vec(&provider.credentials)
            .map_err(|e| RepositoryError::StorageFailed(e.to_string()))?;
        let blob = self.cipher.encrypt(&credentials_json);
        sqlx::query(
            "INSERT INTO providers (id, name, type, credentials_blob, zone, is_default, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, type = excluded.type,
                credentials_blob = excluded.credentials_blob, zone = excluded.zone,
                is_default = excluded.is_default, enabled = excluded.enabled",
        )
        .bind(provider.id.to_string())
        .bind(provider.name)
        .bind(Self::provider_type_to_str(&provider.provider_type))
        .bind(blob)
        .bind(provider.zone)
        .bind(provider.is_default)
        .bind(provider.enabled)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::Sqlx)?;
        Ok(())
    }

    async fn delete_provider(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM providers WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::Sqlx)?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> CoreResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::Sqlx)?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn set_setting(&self, key: &str, value: &str) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::Sqlx)?;
        Ok(())
    }
}

impl SqliteRepository {
    fn provider_from_row(&self, row: sqlx::sqlite::SqliteRow) -> CoreResult<Provider> {
        let id: String = row.get("id");
        let provider_type: String = row.get("type");
        let credentials_blob: Vec<u8> = row.get("credentials_blob");
        let plaintext = self.cipher.decrypt(&credentials_blob);
        let credentials: ProviderCredentials = serde_json::from_slice(&plaintext)
            .map_err(|e| RepositoryError::StorageFailed(e.to_string()))?;
        Ok(Provider {
            id: Uuid::parse_str(&id).map_err(|e| RepositoryError::StorageFailed(e.to_string()))?,
            name: row.get("name"),
            provider_type: Self::provider_type_from_str(&provider_type)?,
            credentials,
            zone: row.get("zone"),
            is_default: row.get("is_default"),
            enabled: row.get("enabled"),
        })
    }
}

/// Wires the settings store's persistence callback to this repository.
pub struct RepositorySettingsPersister {
    pub repository: Arc<SqliteRepository>,
}

#[async_trait]
impl crate::config::SettingsPersister for RepositorySettingsPersister {
    async fn persist(&self, key: &str, value: &str) -> CoreResult<()> {
        self.repository.set_setting(key, value).await
    }
}
