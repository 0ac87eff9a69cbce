// SPDX-License-Identifier: MIT

//! AWS Route53 backend. Route53's control API is REST/XML rather than JSON,
//! and pulling in the full AWS SDK for one call shape is out of proportion
//! here, so authentication is a minimal hand-rolled SigV4 signer built on
//! `sha2`/`hmac`, and request/response bodies are built and read as XML
//! strings rather than through a generic XML crate.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::constants::DEFAULT_PROVIDER_CACHE_REFRESH_SECS;
use crate::errors::{CoreResult, ProviderError};
use crate::model::{DesiredRecord, ProviderRecord, RecordType};

use super::{classify_http_error, Provider, RecordCache};

const SERVICE: &str = "route53";
const SIGNING_REGION: &str = "us-east-1";
const API_BASE: &str = "https://route53.amazonaws.com/2013-04-01";

type HmacSha256 = Hmac<Sha256>;

struct SigningCredentials<'a> {
    access_key_id: &'a str,
    secret_access_key: &'a str,
}

/// Computes the `Authorization` header value for AWS Signature Version 4.
fn sign(
    creds: &SigningCredentials<'_>,
    method: &str,
    canonical_uri: &str,
    canonical_querystring: &str,
    body: &str,
    amz_date: &str,
    date_stamp: &str,
) -> String {
    let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));
    let canonical_headers = format!(
        "host:route53.amazonaws.com\nx-amz-date:{amz_date}\n"
    );
    let signed_headers = "host;x-amz-date";
    let canonical_request = format!(
        "{method}\n{canonical_uri}\n{canonical_querystring}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );

    let credential_scope = format!("{date_stamp}/{SIGNING_REGION}/{SERVICE}/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac_sha256(format!("AWS4{}", creds.secret_access_key).as_bytes(), date_stamp);
    let k_region = hmac_sha256(&k_date, SIGNING_REGION);
    let k_service = hmac_sha256(&k_region, SERVICE);
    let k_signing = hmac_sha256(&k_service, "aws4_request");
    let signature = hex::encode(hmac_sha256(&k_signing, &string_to_sign));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        creds.access_key_id
    )
}

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

pub struct Route53Provider {
    id: Uuid,
    zone: String,
    hosted_zone_id: String,
    access_key_id: String,
    secret_access_key: String,
    client: reqwest::Client,
    cache: RecordCache,
}

impl Route53Provider {
    pub fn new(
        id: Uuid,
        zone: String,
        hosted_zone_id: String,
        access_key_id: String,
        secret_access_key: String,
        client: reqwest::Client,
    ) -> Self {
        Self {
            id,
            zone,
            hosted_zone_id,
            access_key_id,
            secret_access_key,
            client,
            cache: RecordCache::new(Duration::from_secs(DEFAULT_PROVIDER_CACHE_REFRESH_SECS)),
        }
    }

    async fn signed_request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: String,
    ) -> CoreResult<reqwest::Response> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let creds = SigningCredentials {
            access_key_id: &self.access_key_id,
            secret_access_key: &self.secret_access_key,
        };
        let authorization = sign(&creds, method.as_str(), path, "", &body, &amz_date, &date_stamp);

        let url = format!("{API_BASE}{path}");
        let mut builder = self
            .client
            .request(method, url)
            .header("X-Amz-Date", amz_date)
            .header("Authorization", authorization)
            .header("Content-Type", "text/xml; charset=utf-8");
        if !body.is_empty() {
            builder = builder.body(body);
        }
        builder.send().await.map_err(|e| ProviderError::Http(e).into())
    }

    fn relative_name(&self, fqdn: &str) -> String {
        if fqdn.ends_with('.') {
            fqdn.to_string()
        } else {
            format!("{fqdn}.")
        }
    }
}

#[async_trait]
impl Provider for Route53Provider {
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
        let path = format!("/hostedzone/{}/rrset", self.hosted_zone_id);
        let response = self.signed_request(reqwest::Method::GET, &path, String::new()).await?;
        let status = response.status();
        let body = response.text().await.map_err(ProviderError::Http)?;
        if !status.is_success() {
            return Err(classify_http_error(status, body).into());
        }
        Ok(parse_record_sets(&body))
    }

    async fn create_record(&self, desired: &DesiredRecord) -> CoreResult<ProviderRecord> {
        self.change_record("CREATE", desired).await?;
        Ok(ProviderRecord {
            fingerprint: desired.fingerprint(),
            external_id: record_external_id(desired),
            desired: desired.clone(),
        })
    }

    async fn update_record(
        &self,
        _external_id: &str,
        desired: &DesiredRecord,
    ) -> CoreResult<ProviderRecord> {
        self.change_record("UPSERT", desired).await?;
        Ok(ProviderRecord {
            fingerprint: desired.fingerprint(),
            external_id: record_external_id(desired),
            desired: desired.clone(),
        })
    }

    async fn delete_record(&self, external_id: &str) -> CoreResult<()> {
        let Some(desired) = decode_external_id(external_id) else {
            return Ok(());
        };
        match self.change_record("DELETE", &desired).await {
            Ok(()) => Ok(()),
            Err(e) => match &e {
                crate::errors::CoreError::Provider(ProviderError::NotFound(_)) => Ok(()),
                _ => Err(e),
            },
        }
    }
}

impl Route53Provider {
    async fn change_record(&self, action: &str, desired: &DesiredRecord) -> CoreResult<()> {
        let path = format!("/hostedzone/{}/rrset/", self.hosted_zone_id);
        let name = self.relative_name(&desired.name);
        let value = record_value_xml(desired);
        let body = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ChangeResourceRecordSetsRequest xmlns="https://route53.amazonaws.com/doc/2013-04-01/">
  <ChangeBatch>
    <Changes>
      <Change>
        <Action>{action}</Action>
        <ResourceRecordSet>
          <Name>{name}</Name>
          <Type>{}</Type>
          <TTL>{}</TTL>
          <ResourceRecords>
            <ResourceRecord>
              <Value>{value}</Value>
            </ResourceRecord>
          </ResourceRecords>
        </ResourceRecordSet>
      </Change>
    </Changes>
  </ChangeBatch>
</ChangeResourceRecordSetsRequest>"#,
            desired.record_type, desired.ttl,
        );
        let response = self.signed_request(reqwest::Method::POST, &path, body).await?;
        let status = response.status();
        let body = response.text().await.map_err(ProviderError::Http)?;
        if !status.is_success() {
            return Err(classify_http_error(status, body).into());
        }
        Ok(())
    }
}

fn record_value_xml(desired: &DesiredRecord) -> String {
    match desired.record_type {
        RecordType::Mx => format!("{} {}", desired.priority.unwrap_or_default(), desired.content),
        RecordType::Srv => format!(
            "{} {} {} {}",
            desired.priority.unwrap_or_default(),
            desired.weight.unwrap_or_default(),
            desired.port.unwrap_or_default(),
            desired.content
        ),
        RecordType::Txt => format!("\"{}\"", desired.content.replace('"', "\\\"")),
        _ => desired.content.clone(),
    }
}

/// Route53 has no independent external id per record set; the engine keys
/// tracked records by `(type, name)` encoded into a synthetic id.
fn record_external_id(desired: &DesiredRecord) -> String {
    format!("{}:{}", desired.record_type, desired.name)
}

fn decode_external_id(external_id: &str) -> Option<DesiredRecord> {
    let (record_type, name) = external_id.split_once(':')?;
    Some(DesiredRecord {
        record_type: record_type.parse().ok()?,
        name: name.to_string(),
        content: String::new(),
        ttl: 300,
        proxied: None,
        priority: None,
        weight: None,
        port: None,
        flags: None,
        tag: None,
    })
}

/// Minimal hand-written extraction of `<ResourceRecordSet>` entries; avoids
/// pulling in a general-purpose XML crate for one response shape.
fn parse_record_sets(xml: &str) -> Vec<ProviderRecord> {
    let mut out = Vec::new();
    for block in xml.split("<ResourceRecordSet>").skip(1) {
        let Some(end) = block.find("</ResourceRecordSet>") else { continue };
        let block = &block[..end];
        let Some(name) = extract_tag(block, "Name") else { continue };
        let Some(type_str) = extract_tag(block, "Type") else { continue };
        let Ok(record_type) = type_str.parse::<RecordType>() else { continue };
        let ttl = extract_tag(block, "TTL").and_then(|s| s.parse().ok()).unwrap_or(300);
        let Some(value) = extract_tag(block, "Value") else { continue };
        let name = name.trim_end_matches('.').to_string();

        let desired = DesiredRecord {
            record_type,
            name,
            content: value,
            ttl,
            proxied: None,
            priority: None,
            weight: None,
            port: None,
            flags: None,
            tag: None,
        };
        out.push(ProviderRecord {
            fingerprint: desired.fingerprint(),
            external_id: record_external_id(&desired),
            desired,
        });
    }
    out
}

fn extract_tag<'a>(xml: &'a str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].to_string())
}
