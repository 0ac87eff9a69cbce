// SPDX-License-Identifier: MIT

//! DigitalOcean backend: JSON over HTTPS, bearer-token authentication.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::DEFAULT_PROVIDER_CACHE_REFRESH_SECS;
use crate::errors::{CoreResult, ProviderError};
use crate::model::{DesiredRecord, ProviderRecord, RecordType};

use super::{classify_http_error, Provider, RecordCache};

const API_BASE: &str = "https://api.digitalocean.com/v2";

#[derive(Debug, Serialize)]
struct RecordRequest<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    data: &'a str,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    weight: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flags: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DoRecord {
    id: u64,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    data: String,
    ttl: u32,
    #[serde(default)]
    priority: Option<u32>,
    #[serde(default)]
    weight: Option<u32>,
    #[serde(default)]
    port: Option<u32>,
    #[serde(default)]
    flags: Option<u32>,
    #[serde(default)]
    tag: Option<String>,
}

impl DoRecord {
    fn into_provider_record(self, zone: &str) -> Option<ProviderRecord> {
        let record_type: RecordType = self.record_type.parse().ok()?;
        let name = if self.name == "@" {
            zone.to_string()
        } else {
            format!("{}.{zone}", self.name)
        };
        let desired = DesiredRecord {
            record_type,
            name,
            content: self.data,
            ttl: self.ttl,
            proxied: None,
            priority: self.priority,
            weight: self.weight,
            port: self.port,
            flags: self.flags,
            tag: self.tag,
        };
        Some(ProviderRecord {
            fingerprint: desired.fingerprint(),
            external_id: self.id.to_string(),
            desired,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RecordsEnvelope {
    #[serde(default)]
    domain_record: Option<DoRecord>,
    #[serde(default)]
    domain_records: Option<Vec<DoRecord>>,
    #[serde(default)]
    message: Option<String>,
}

pub struct DigitalOceanProvider {
    id: Uuid,
    zone: String,
    api_token: String,
    client: reqwest::Client,
    cache: RecordCache,
}

impl DigitalOceanProvider {
    pub fn new(id: Uuid, zone: String, api_token: String, client: reqwest::Client) -> Self {
        Self {
            id,
            zone,
            api_token,
            client,
            cache: RecordCache::new(Duration::from_secs(DEFAULT_PROVIDER_CACHE_REFRESH_SECS)),
        }
    }

    /// Relativizes a fully qualified name to the record-name shape
    /// DigitalOcean expects (`@` for the apex, otherwise the left-hand
    /// label(s)).
    fn relative_name<'a>(&self, fqdn: &'a str) -> std::borrow::Cow<'a, str> {
        if fqdn == self.zone {
            std::borrow::Cow::Borrowed("@")
        } else if let Some(prefix) = fqdn.strip_suffix(&format!(".{}", self.zone)) {
            std::borrow::Cow::Borrowed(prefix)
        } else {
            std::borrow::Cow::Borrowed(fqdn)
        }
    }
}

#[async_trait]
impl Provider for DigitalOceanProvider {
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
        let url = format!("{API_BASE}/domains/{}/records?per_page=200", self.zone);
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(ProviderError::Http)?;
        let status = response.status();
        let body: RecordsEnvelope = response.json().await.map_err(ProviderError::Http)?;
        if !status.is_success() {
            return Err(classify_http_error(status, body.message.unwrap_or_default()).into());
        }
        Ok(body
            .domain_records
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| r.into_provider_record(&self.zone))
            .collect())
    }

    async fn create_record(&self, desired: &DesiredRecord) -> CoreResult<ProviderRecord> {
        let url = format!("{API_BASE}/domains/{}/records", self.zone);
        let name = self.relative_name(&desired.name);
        let payload = RecordRequest {
            record_type: &desired.record_type.to_string(),
            name: &name,
            data: &desired.content,
            ttl: desired.ttl,
            priority: desired.priority,
            weight: desired.weight,
            port: desired.port,
            flags: desired.flags,
            tag: desired.tag.clone(),
        };
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(ProviderError::Http)?;
        let status = response.status();
        let body: RecordsEnvelope = response.json().await.map_err(ProviderError::Http)?;
        if !status.is_success() {
            return Err(classify_http_error(status, body.message.unwrap_or_default()).into());
        }
        body.domain_record
            .and_then(|r| r.into_provider_record(&self.zone))
            .ok_or_else(|| ProviderError::NetworkFailed("empty create response".into()).into())
    }

    async fn update_record(
        &self,
        external_id: &str,
        desired: &DesiredRecord,
    ) -> CoreResult<ProviderRecord> {
        let url = format!("{API_BASE}/domains/{}/records/{external_id}", self.zone);
        let name = self.relative_name(&desired.name);
        let payload = RecordRequest {
            record_type: &desired.record_type.to_string(),
            name: &name,
            data: &desired.content,
            ttl: desired.ttl,
            priority: desired.priority,
            weight: desired.weight,
            port: desired.port,
            flags: desired.flags,
            tag: desired.tag.clone(),
        };
        let response = self
            .client
            .put(url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(ProviderError::Http)?;
        let status = response.status();
        let body: RecordsEnvelope = response.json().await.map_err(ProviderError::Http)?;
        if !status.is_success() {
            return Err(classify_http_error(status, body.message.unwrap_or_default()).into());
        }
        body.domain_record
            .and_then(|r| r.into_provider_record(&self.zone))
            .ok_or_else(|| ProviderError::NetworkFailed("empty update response".into()).into())
    }

    async fn delete_record(&self, external_id: &str) -> CoreResult<()> {
        let url = format!("{API_BASE}/domains/{}/records/{external_id}", self.zone);
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(ProviderError::Http)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !status.is_success() {
            return Err(classify_http_error(status, "delete failed".to_string()).into());
        }
        Ok(())
    }
}
