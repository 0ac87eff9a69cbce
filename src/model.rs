// SPDX-License-Identifier: MIT

//! Core data model (§3): the types that flow between discovery, the intent
//! extractor, the router, provider implementations, and the repository.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A DNS record type supported by the provider abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Txt,
    Srv,
    Caa,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
            RecordType::Srv => "SRV",
            RecordType::Caa => "CAA",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RecordType {
    type Err = crate::errors::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "MX" => Ok(RecordType::Mx),
            "TXT" => Ok(RecordType::Txt),
            "SRV" => Ok(RecordType::Srv),
            "CAA" => Ok(RecordType::Caa),
            other => Err(crate::errors::ValidationError::UnknownRecordType(
                other.to_string(),
            )),
        }
    }
}

/// Normalizes a hostname: lowercase, trailing dot stripped.
pub fn normalize_hostname(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// The engine's intent for one name (§3 `DesiredRecord`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredRecord {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: Option<bool>,
    pub priority: Option<u32>,
    pub weight: Option<u32>,
    pub port: Option<u32>,
    pub flags: Option<u32>,
    pub tag: Option<String>,
}

impl DesiredRecord {
    /// A stable hash of the canonicalised fields, used to detect drift
    /// against a [`ProviderRecord`] without a field-by-field compare.
    pub fn fingerprint(&self) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.record_type.to_string().hash(&mut hasher);
        self.name.hash(&mut hasher);
        self.content.hash(&mut hasher);
        self.ttl.hash(&mut hasher);
        self.proxied.hash(&mut hasher);
        self.priority.hash(&mut hasher);
        self.weight.hash(&mut hasher);
        self.port.hash(&mut hasher);
        self.flags.hash(&mut hasher);
        self.tag.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Discriminator key used to match this record against a provider's
    /// cache: `(type, name)` plus the type-specific discriminators from §4.E
    /// step 2 (MX priority, SRV target+port, CAA tag, TXT content prefix).
    pub fn cache_key(&self) -> String {
        match self.record_type {
            RecordType::Mx => format!(
                "{}:{}:{}",
                self.record_type,
                self.name,
                self.priority.unwrap_or_default()
            ),
            RecordType::Srv => format!(
                "{}:{}:{}:{}",
                self.record_type,
                self.name,
                self.content,
                self.port.unwrap_or_default()
            ),
            RecordType::Caa => format!(
                "{}:{}:{}",
                self.record_type,
                self.name,
                self.tag.as_deref().unwrap_or_default()
            ),
            RecordType::Txt => {
                let prefix: String = self.content.chars().take(32).collect();
                format!("{}:{}:{}", self.record_type, self.name, prefix)
            }
            _ => format!("{}:{}", self.record_type, self.name),
        }
    }
}

/// What a provider returned for a record it holds (§3 `ProviderRecord`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    #[serde(flatten)]
    pub desired: DesiredRecord,
    pub external_id: String,
    pub fingerprint: String,
}

impl ProviderRecord {
    pub fn cache_key(&self) -> String {
        self.desired.cache_key()
    }
}

/// A configured DNS provider backend (§3 `Provider`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    Cloudflare,
    Route53,
    Digitalocean,
    Technitium,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderType::Cloudflare => "cloudflare",
            ProviderType::Route53 => "route53",
            ProviderType::Digitalocean => "digitalocean",
            ProviderType::Technitium => "technitium",
        };
        f.write_str(s)
    }
}

/// Per-backend credentials, stored as an opaque encrypted blob at rest (the
/// JSON serialization of this enum is what the repository encrypts; see
/// `crate::repository::Cipher`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProviderCredentials {
    Cloudflare { api_token: String },
    Route53 {
        access_key_id: String,
        secret_access_key: String,
        region: String,
    },
    Digitalocean { api_token: String },
    Technitium { base_url: String, api_token: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub credentials: ProviderCredentials,
    pub zone: String,
    pub is_default: bool,
    pub enabled: bool,
}

/// Where a [`TrackedRecord`] originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Proxy,
    Direct,
    Api,
    Managed,
    Discovered,
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordSource::Proxy => "proxy",
            RecordSource::Direct => "direct",
            RecordSource::Api => "api",
            RecordSource::Managed => "managed",
            RecordSource::Discovered => "discovered",
        };
        f.write_str(s)
    }
}

/// The engine's durable tombstone for a record it owns (§3 `TrackedRecord`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedRecord {
    pub provider_id: Uuid,
    pub external_id: String,
    pub record: DesiredRecord,
    pub source: RecordSource,
    pub managed: bool,
    pub orphaned_at: Option<DateTime<Utc>>,
    pub last_synced_at: DateTime<Utc>,
}

impl TrackedRecord {
    pub fn identity(&self) -> (Uuid, String) {
        (self.provider_id, self.external_id.clone())
    }
}

/// An exact hostname or single-leading-wildcard pattern protecting a record
/// from deletion (§3 `PreservedPattern`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreservedPattern(pub String);

impl PreservedPattern {
    /// True if `hostname` (already lowercased) matches this pattern: either
    /// an exact match, or `hostname` is a proper subdomain of `*.suffix`.
    pub fn matches(&self, hostname: &str) -> bool {
        match self.0.strip_prefix("*.") {
            Some(suffix) => {
                hostname.ends_with(suffix)
                    && hostname.len() > suffix.len()
                    && hostname.as_bytes()[hostname.len() - suffix.len() - 1] == b'.'
            }
            None => hostname == self.0,
        }
    }
}

/// An externally configured hostname the engine must ensure regardless of
/// discovery (§3 `ManagedHostname`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedHostname {
    pub hostname: String,
    pub record: DesiredRecord,
    pub provider_id: Uuid,
}

/// A provider-side HTTP tunnel ingress route (tunnel mode only, §3
/// `IngressRoute`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressRoute {
    pub tunnel_id: Uuid,
    pub hostname: String,
    pub service: String,
    pub path: Option<String>,
    pub source: RecordSource,
    pub orphaned_at: Option<DateTime<Utc>>,
}

/// Labels merged for one discovered hostname, as produced by the proxy and
/// container monitors.
pub type LabelMap = HashMap<String, String>;

/// The payload of a `HOSTNAMES_DISCOVERED` event: the set of hostnames seen
/// this pass, each with its merged label map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveredHostnames {
    pub hostnames: Vec<String>,
    pub labels: HashMap<String, LabelMap>,
}

/// Aggregate counters for one reconciliation pass (§4.H `Stats`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub created: u64,
    pub updated: u64,
    pub up_to_date: u64,
    pub errors: u64,
    pub skipped: u64,
    pub total: u64,
}

/// Outcome of [`crate::providers::Provider::batch_ensure_records`] (§4.E
/// `BatchResult`).
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub created: Vec<ProviderRecord>,
    pub updated: Vec<ProviderRecord>,
    pub unchanged: Vec<ProviderRecord>,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Clone)]
pub struct BatchError {
    pub desired: DesiredRecord,
    pub reason: &'static str,
}
