// SPDX-License-Identifier: MIT

//! Intent extraction (§4.G): turns container labels plus settings defaults
//! into a canonical [`DesiredRecord`], or a skip marker.

use crate::config::Settings;
use crate::constants::{PORT_MAX, PORT_MIN, PRIORITY_MAX, TTL_AUTO, TTL_MIN};
use crate::errors::ValidationError;
use crate::labels::{self, label_key};
use crate::model::{DesiredRecord, LabelMap, RecordType};
use crate::public_ip::PublicIpResolver;

/// Outcome of extracting one hostname's intent.
pub enum Intent {
    /// `{prefix}skip=true`, `{prefix}manage=false`, or a self-referencing
    /// CNAME at the zone apex.
    Skip,
    Record(DesiredRecord),
}

pub struct IntentExtractor<'a> {
    pub settings: &'a Settings,
    pub public_ip: &'a PublicIpResolver,
}

impl<'a> IntentExtractor<'a> {
    pub fn new(settings: &'a Settings, public_ip: &'a PublicIpResolver) -> Self {
        Self { settings, public_ip }
    }

    /// Extracts intent for `hostname` (already fully qualified against its
    /// target provider's zone) from its merged label map.
    pub async fn extract(
        &self,
        hostname: &str,
        label_map: &LabelMap,
        zone: &str,
    ) -> Result<Intent, ValidationError> {
        let prefix = &self.settings.dns_label_prefix;
        let get = |suffix: &str| label_map.get(&label_key(prefix, suffix));

        if get(labels::SKIP).map(|v| is_truthy(v)).unwrap_or(false) {
            return Ok(Intent::Skip);
        }

        let manage = get(labels::MANAGE)
            .map(|v| is_truthy(v))
            .unwrap_or(self.settings.dns_default_manage);
        if !manage {
            return Ok(Intent::Skip);
        }

        let record_type: RecordType = get(labels::TYPE)
            .map(|s| s.as_str())
            .unwrap_or(&self.settings.dns_default_type)
            .parse()?;

        let mut content = get(labels::CONTENT).cloned().unwrap_or_default();
        if content.is_empty() {
            content = match record_type {
                RecordType::A => self
                    .public_ip
                    .ipv4()
                    .await
                    .map(|ip| ip.to_string())
                    .unwrap_or_default(),
                RecordType::Aaaa => self
                    .public_ip
                    .ipv6()
                    .await
                    .map(|ip| ip.to_string())
                    .unwrap_or_default(),
                _ => content,
            };
        }

        if record_type == RecordType::Cname && hostname == zone {
            // Self-referencing CNAME at the apex: omit per §4.3/§4.G.
            return Ok(Intent::Skip);
        }

        let ttl = get(labels::TTL)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(self.settings.dns_default_ttl);
        validate_ttl(ttl)?;

        let proxied = get(labels::PROXIED)
            .map(|v| is_truthy(v))
            .or(Some(self.settings.dns_default_proxied));

        let priority = parse_optional_u32(get(labels::PRIORITY))?;
        if let Some(p) = priority {
            if p > PRIORITY_MAX {
                return Err(ValidationError::InvalidPriority { priority: p });
            }
        }

        let weight = parse_optional_u32(get(labels::WEIGHT))?;
        let port = parse_optional_u32(get(labels::PORT))?;
        if let Some(p) = port {
            if p < PORT_MIN || p > PORT_MAX {
                return Err(ValidationError::InvalidPort { port: p });
            }
        }

        let flags = parse_optional_u32(get(labels::FLAGS))?;
        let tag = get(labels::TAG).cloned();

        validate_content(record_type, &content)?;

        Ok(Intent::Record(DesiredRecord {
            record_type,
            name: hostname.to_string(),
            content,
            ttl,
            proxied,
            priority,
            weight,
            port,
            flags,
            tag,
        }))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_optional_u32(value: Option<&String>) -> Result<Option<u32>, ValidationError> {
    match value {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| ValidationError::Other(format!("`{s}` is not a valid number"))),
    }
}

fn validate_ttl(ttl: u32) -> Result<(), ValidationError> {
    if ttl == TTL_AUTO || ttl >= TTL_MIN {
        Ok(())
    } else {
        Err(ValidationError::InvalidTtl { ttl })
    }
}

fn validate_content(record_type: RecordType, content: &str) -> Result<(), ValidationError> {
    match record_type {
        RecordType::A => {
            if content.parse::<std::net::Ipv4Addr>().is_err() {
                return Err(ValidationError::InvalidIpv4 {
                    content: content.to_string(),
                });
            }
        }
        RecordType::Aaaa => {
            if content.parse::<std::net::Ipv6Addr>().is_err() {
                return Err(ValidationError::InvalidIpv6 {
                    content: content.to_string(),
                });
            }
        }
        _ => {
            if content.is_empty() {
                return Err(ValidationError::MissingField {
                    field: "content",
                    record_type: record_type.to_string(),
                });
            }
        }
    }
    Ok(())
}
