// SPDX-License-Identifier: MIT

//! Cloudflare backend: JSON over HTTPS, bearer-token authentication.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::DEFAULT_PROVIDER_CACHE_REFRESH_SECS;
use crate::errors::{CoreResult, ProviderError};
use crate::model::{DesiredRecord, ProviderRecord, RecordType};

use super::{classify_http_error, Provider, RecordCache};

const API_BASE: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxied: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ZoneLookup {
    id: String,
}

#[derive(Debug, Deserialize, Clone)]
struct CfRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    ttl: u32,
    #[serde(default)]
    proxied: Option<bool>,
    #[serde(default)]
    priority: Option<u32>,
}

impl CfRecord {
    fn into_provider_record(self) -> Option<ProviderRecord> {
        let record_type: RecordType = self.record_type.parse().ok()?;
        let desired = DesiredRecord {
            record_type,
            name: self.name,
            content: self.content,
            ttl: self.ttl,
            proxied: self.proxied,
            priority: self.priority,
            weight: None,
            port: None,
            flags: None,
            tag: None,
        };
        Some(ProviderRecord {
            fingerprint: desired.fingerprint(),
            external_id: self.id,
            desired,
        })
    }
}

pub struct CloudflareProvider {
    id: Uuid,
    zone: String,
    zone_id: String,
    api_token: String,
    client: reqwest::Client,
    cache: RecordCache,
}

impl CloudflareProvider {
    /// Resolves the Cloudflare zone id for `zone` and returns a ready
    /// provider. Corresponds to §4.E `Init(credentials)`.
    pub async fn init(
        id: Uuid,
        zone: String,
        api_token: String,
        client: reqwest::Client,
    ) -> CoreResult<Self> {
        let url = format!("{API_BASE}/zones?name={zone}");
        let response = client
            .get(url)
            .bearer_auth(&api_token)
            .send()
            .await
            .map_err(ProviderError::Http)?;
        let status = response.status();
        let body: ApiEnvelope<Vec<ZoneLookup>> = response.json().await.map_err(ProviderError::Http)?;
        if !status.is_success() || !body.success {
            return Err(classify_http_error(status, error_message(&body.errors)).into());
        }
        let zone_id = body
            .result
            .and_then(|zones| zones.into_iter().next())
            .ok_or_else(|| ProviderError::MisconfiguredZone(format!("zone `{zone}` not found")))?
            .id;

        Ok(Self {
            id,
            zone,
            zone_id,
            api_token,
            client,
            cache: RecordCache::new(Duration::from_secs(DEFAULT_PROVIDER_CACHE_REFRESH_SECS)),
        })
    }
}

#[async_trait]
impl Provider for CloudflareProvider {
    fn id(&self) -> Uuid {
        self.id
    }

    fn zone(&self) -> &str {
        &self.zone
    }

    fn cache(&self) -> &RecordCache {
        &self.cache
    }

    fn supports_proxied(&self) -> bool {
        true
    }

    async fn list_records(&self) -> CoreResult<Vec<ProviderRecord>> {
        let mut records = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{API_BASE}/zones/{}/dns_records?page={page}&per_page=100",
                self.zone_id
            );
            let response = self
                .client
                .get(url)
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(ProviderError::Http)?;
            let status = response.status();
            let body: ApiEnvelope<Vec<CfRecord>> = response.json().await.map_err(ProviderError::Http)?;
            if !status.is_success() || !body.success {
                return Err(classify_http_error(status, error_message(&body.errors)).into());
            }
            let batch = body.result.unwrap_or_default();
            let fetched = batch.len();
            records.extend(batch.into_iter().filter_map(CfRecord::into_provider_record));
            if fetched < 100 {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    async fn create_record(&self, desired: &DesiredRecord) -> CoreResult<ProviderRecord> {
        let url = format!("{API_BASE}/zones/{}/dns_records", self.zone_id);
        let payload = CreateRecordRequest {
            record_type: &desired.record_type.to_string(),
            name: &desired.name,
            content: &desired.content,
            ttl: desired.ttl,
            proxied: desired.proxied,
            priority: desired.priority,
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
        let body: ApiEnvelope<CfRecord> = response.json().await.map_err(ProviderError::Http)?;
        if !status.is_success() || !body.success {
            return Err(classify_http_error(status, error_message(&body.errors)).into());
        }
        body.result
            .and_then(CfRecord::into_provider_record)
            .ok_or_else(|| ProviderError::NetworkFailed("empty create response".into()).into())
    }

    async fn update_record(
        &self,
        external_id: &str,
        desired: &DesiredRecord,
    ) -> CoreResult<ProviderRecord> {
        let url = format!("{API_BASE}/zones/{}/dns_records/{external_id}", self.zone_id);
        let payload = CreateRecordRequest {
            record_type: &desired.record_type.to_string(),
            name: &desired.name,
            content: &desired.content,
            ttl: desired.ttl,
            proxied: desired.proxied,
            priority: desired.priority,
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
        let body: ApiEnvelope<CfRecord> = response.json().await.map_err(ProviderError::Http)?;
        if !status.is_success() || !body.success {
            return Err(classify_http_error(status, error_message(&body.errors)).into());
        }
        body.result
            .and_then(CfRecord::into_provider_record)
            .ok_or_else(|| ProviderError::NetworkFailed("empty update response".into()).into())
    }

    async fn delete_record(&self, external_id: &str) -> CoreResult<()> {
        let url = format!("{API_BASE}/zones/{}/dns_records/{external_id}", self.zone_id);
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(ProviderError::Http)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            // §7 NotFound: idempotent for delete.
            return Ok(());
        }
        if !status.is_success() {
            let body: ApiEnvelope<serde_json::Value> =
                response.json().await.unwrap_or(ApiEnvelope {
                    success: false,
                    result: None,
                    errors: vec![],
                });
            return Err(classify_http_error(status, error_message(&body.errors)).into());
        }
        Ok(())
    }
}

fn error_message(errors: &[ApiError]) -> String {
    if errors.is_empty() {
        "cloudflare API error".to_string()
    } else {
        errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
