// SPDX-License-Identifier: MIT

//! Multi-provider router (§4.F): resolves, per hostname, the ordered set of
//! target providers.

use crate::config::RoutingMode;
use crate::labels;
use crate::model::{LabelMap, Provider};

/// Resolves the ordered list of providers a hostname's record must be
/// written to. First-match-wins across rules 1-4, except rule 1
/// ("broadcast" to all enabled providers).
pub fn route<'a>(
    hostname: &str,
    labels: &LabelMap,
    prefix: &str,
    providers: &'a [Provider],
    mode: RoutingMode,
    multi_provider_same_zone: bool,
) -> Vec<&'a Provider> {
    let key = |suffix: &str| labels::label_key(prefix, suffix);

    if let Some(value) = labels.get(&key(labels::PROVIDERS)) {
        if value.eq_ignore_ascii_case("all") {
            return providers.iter().filter(|p| p.enabled).collect();
        }
        let wanted: Vec<String> = value.split(',').map(|s| s.trim().to_ascii_lowercase()).collect();
        let mut matched = Vec::new();
        for name in &wanted {
            match providers
                .iter()
                .find(|p| p.enabled && p.name.to_ascii_lowercase() == *name)
            {
                Some(p) => matched.push(p),
                None => tracing::info!(provider = %name, hostname, "named provider not found or disabled, skipping"),
            }
        }
        return matched;
    }

    if let Some(value) = labels.get(&key(labels::PROVIDER_ID)) {
        if let Ok(id) = value.parse() {
            if let Some(p) = providers.iter().find(|p| p.id == id && p.enabled) {
                return vec![p];
            }
        }
        return Vec::new();
    }

    if let Some(value) = labels.get(&key(labels::PROVIDER)) {
        return providers
            .iter()
            .find(|p| p.enabled && p.name.eq_ignore_ascii_case(value))
            .into_iter()
            .collect();
    }

    match mode {
        RoutingMode::DefaultOnly => providers
            .iter()
            .find(|p| p.enabled && p.is_default)
            .into_iter()
            .collect(),
        RoutingMode::Auto | RoutingMode::AutoWithFallback => {
            let mut matches: Vec<&Provider> = providers
                .iter()
                .filter(|p| p.enabled && zone_matches(hostname, &p.zone))
                .collect();
            matches.sort_by_key(|p| std::cmp::Reverse(p.zone.len()));

            if matches.is_empty() {
                if mode == RoutingMode::AutoWithFallback {
                    return providers
                        .iter()
                        .find(|p| p.enabled && p.is_default)
                        .into_iter()
                        .collect();
                }
                return Vec::new();
            }

            if multi_provider_same_zone {
                let most_specific_len = matches[0].zone.len();
                matches.retain(|p| p.zone.len() == most_specific_len);
                matches
            } else {
                vec![matches[0]]
            }
        }
    }
}

/// True if `hostname` is the zone apex or a subdomain of it.
fn zone_matches(hostname: &str, zone: &str) -> bool {
    hostname == zone || hostname.ends_with(&format!(".{zone}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProviderCredentials, ProviderType};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn provider(name: &str, zone: &str, is_default: bool) -> Provider {
        Provider {
            id: Uuid::new_v4(),
            name: name.to_string(),
            provider_type: ProviderType::Cloudflare,
            credentials: ProviderCredentials::Cloudflare {
                api_token: "x".into(),
            },
            zone: zone.to_string(),
            is_default,
            enabled: true,
        }
    }

    #[test]
    fn default_only_picks_default_provider() {
        let providers = vec![provider("p1", "example.com", true), provider("p2", "example.com", false)];
        let labels = HashMap::new();
        let result = route(
            "web.example.com",
            &labels,
            "dns.",
            &providers,
            RoutingMode::DefaultOnly,
            false,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "p1");
    }

    #[test]
    fn auto_picks_most_specific_zone() {
        let providers = vec![provider("p1", "example.com", true), provider("p2", "sub.example.com", false)];
        let labels = HashMap::new();
        let result = route(
            "web.sub.example.com",
            &labels,
            "dns.",
            &providers,
            RoutingMode::Auto,
            false,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "p2");
    }

    #[test]
    fn auto_with_fallback_uses_default_on_no_match() {
        let providers = vec![provider("p1", "example.com", true)];
        let labels = HashMap::new();
        let result = route(
            "service.other.net",
            &labels,
            "dns.",
            &providers,
            RoutingMode::AutoWithFallback,
            false,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "p1");
    }

    #[test]
    fn auto_without_fallback_skips_on_no_match() {
        let providers = vec![provider("p1", "example.com", true)];
        let labels = HashMap::new();
        let result = route("service.other.net", &labels, "dns.", &providers, RoutingMode::Auto, false);
        assert!(result.is_empty());
    }

    #[test]
    fn broadcast_label_selects_all_enabled() {
        let providers = vec![provider("p1", "example.com", true), provider("p2", "example.com", false)];
        let mut labels = HashMap::new();
        labels.insert("dns.providers".to_string(), "all".to_string());
        let result = route(
            "api.example.com",
            &labels,
            "dns.",
            &providers,
            RoutingMode::Auto,
            true,
        );
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn same_zone_true_returns_all_matches_at_most_specific_length() {
        let providers = vec![provider("p1", "example.com", true), provider("p2", "example.com", false)];
        let labels = HashMap::new();
        let result = route(
            "api.example.com",
            &labels,
            "dns.",
            &providers,
            RoutingMode::Auto,
            true,
        );
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn routing_is_idempotent() {
        let providers = vec![provider("p1", "example.com", true), provider("p2", "sub.example.com", false)];
        let labels = HashMap::new();
        let first = route("web.sub.example.com", &labels, "dns.", &providers, RoutingMode::Auto, false);
        let second = route("web.sub.example.com", &labels, "dns.", &providers, RoutingMode::Auto, false);
        let first_ids: Vec<_> = first.iter().map(|p| p.id).collect();
        let second_ids: Vec<_> = second.iter().map(|p| p.id).collect();
        assert_eq!(first_ids, second_ids);
    }
}
