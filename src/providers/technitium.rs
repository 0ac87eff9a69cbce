// SPDX-License-Identifier: MIT

//! Technitium DNS Server backend: query-parameter API-key authentication,
//! JSON responses.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::constants::DEFAULT_PROVIDER_CACHE_REFRESH_SECS;
use crate::errors::{CoreResult, ProviderError};
use crate::model::{DesiredRecord, ProviderRecord, RecordType};

use super::{classify_http_error, Provider, RecordCache};

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
    #[serde(default)]
    response: Option<Value>,
}

pub struct TechnitiumProvider {
    id: Uuid,
    zone: String,
    base_url: String,
    api_token: String,
    client: reqwest::Client,
    cache: RecordCache,
}

impl TechnitiumProvider {
    pub fn new(
        id: Uuid,
        zone: String,
        base_url: String,
        api_token: String,
        client: reqwest::Client,
    ) -> Self {
        Self {
            id,
            zone,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            client,
            cache: RecordCache::new(Duration::from_secs(DEFAULT_PROVIDER_CACHE_REFRESH_SECS)),
        }
    }

    async fn call(&self, path: &str, params: &[(&str, String)]) -> CoreResult<Value> {
        let mut query: Vec<(&str, String)> = vec![("token", self.api_token.clone())];
        query.extend(params.iter().cloned());
        let url = format!("{}/api/{path}", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(ProviderError::Http)?;
        let status = response.status();
        let body: ApiResponse = response.json().await.map_err(ProviderError::Http)?;
        if !status.is_success() {
            return Err(classify_http_error(status, body.error_message.unwrap_or_default()).into());
        }
        if body.status != "ok" {
            let message = body.error_message.unwrap_or_else(|| "technitium API error".to_string());
            return Err(if message.to_ascii_lowercase().contains("not found") {
                ProviderError::NotFound(message).into()
            } else {
                ProviderError::Conflict(message).into()
            });
        }
        Ok(body.response.unwrap_or(Value::Null))
    }

    fn rdata_field(record_type: RecordType) -> &'static str {
        match record_type {
            RecordType::A => "ipAddress",
            RecordType::Aaaa => "ipAddress",
            RecordType::Cname => "cname",
            RecordType::Mx => "exchange",
            RecordType::Txt => "text",
            RecordType::Srv => "target",
            RecordType::Caa => "value",
        }
    }
}

#[async_trait]
impl Provider for TechnitiumProvider {
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
        let response = self
            .call(
                "zones/records/get",
                &[
                    ("domain", self.zone.clone()),
                    ("zone", self.zone.clone()),
                    ("listZone", "true".to_string()),
                ],
            )
            .await?;

        let mut out = Vec::new();
        let records = response.get("records").and_then(Value::as_array).cloned().unwrap_or_default();
        for entry in records {
            let Some(domain) = entry.get("name").and_then(Value::as_str) else { continue };
            let Some(type_str) = entry.get("type").and_then(Value::as_str) else { continue };
            let Ok(record_type) = type_str.parse::<RecordType>() else { continue };
            let ttl = entry.get("ttl").and_then(Value::as_u64).unwrap_or(300) as u32;
            let rdata = entry.get("rData").cloned().unwrap_or(Value::Null);
            let field = Self::rdata_field(record_type);
            let Some(content) = rdata.get(field).and_then(Value::as_str) else { continue };

            let desired = DesiredRecord {
                record_type,
                name: domain.to_string(),
                content: content.to_string(),
                ttl,
                proxied: None,
                priority: rdata.get("preference").and_then(Value::as_u64).map(|v| v as u32),
                weight: rdata.get("weight").and_then(Value::as_u64).map(|v| v as u32),
                port: rdata.get("port").and_then(Value::as_u64).map(|v| v as u32),
                flags: rdata.get("flags").and_then(Value::as_u64).map(|v| v as u32),
                tag: rdata.get("tag").and_then(Value::as_str).map(str::to_string),
            };
            out.push(ProviderRecord {
                external_id: format!("{record_type}:{domain}"),
                fingerprint: desired.fingerprint(),
                desired,
            });
        }
        Ok(out)
    }

    async fn create_record(&self, desired: &DesiredRecord) -> CoreResult<ProviderRecord> {
        let mut params = vec![
            ("domain", desired.name.clone()),
            ("zone", self.zone.clone()),
            ("type", desired.record_type.to_string()),
            ("ttl", desired.ttl.to_string()),
        ];
        params.push((Self::rdata_field(desired.record_type), desired.content.clone()));
        if let Some(priority) = desired.priority {
            params.push(("preference", priority.to_string()));
        }
        if let Some(weight) = desired.weight {
            params.push(("weight", weight.to_string()));
        }
        if let Some(port) = desired.port {
            params.push(("port", port.to_string()));
        }
        self.call("zones/records/add", &params).await?;
        Ok(ProviderRecord {
            external_id: format!("{}:{}", desired.record_type, desired.name),
            fingerprint: desired.fingerprint(),
            desired: desired.clone(),
        })
    }

    async fn update_record(
        &self,
        _external_id: &str,
        desired: &DesiredRecord,
    ) -> CoreResult<ProviderRecord> {
        let mut params = vec![
            ("domain", desired.name.clone()),
            ("zone", self.zone.clone()),
            ("type", desired.record_type.to_string()),
            ("newTtl", desired.ttl.to_string()),
        ];
        params.push((Self::rdata_field(desired.record_type), desired.content.clone()));
        self.call("zones/records/update", &params).await?;
        Ok(ProviderRecord {
            external_id: format!("{}:{}", desired.record_type, desired.name),
            fingerprint: desired.fingerprint(),
            desired: desired.clone(),
        })
    }

    async fn delete_record(&self, external_id: &str) -> CoreResult<()> {
        let Some((type_str, domain)) = external_id.split_once(':') else { return Ok(()) };
        let params = vec![
            ("domain", domain.to_string()),
            ("zone", self.zone.clone()),
            ("type", type_str.to_string()),
        ];
        match self.call("zones/records/delete", &params).await {
            Ok(_) => Ok(()),
            Err(crate::errors::CoreError::Provider(ProviderError::NotFound(_))) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
