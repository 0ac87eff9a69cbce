// SPDX-License-Identifier: MIT

//! Cached public IPv4/IPv6 resolution (§4.D), used as default A/AAAA
//! content when a label doesn't supply one.

use std::net::IpAddr;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::event_bus::{ErrorEvent, Event, EventBus};
use crate::metrics;

const DEFAULT_ENDPOINTS_V4: &[&str] = &["https://api.ipify.org", "https://ifconfig.me/ip"];
const DEFAULT_ENDPOINTS_V6: &[&str] = &["https://api6.ipify.org", "https://ifconfig.co/ip"];

/// Holds the last-known public IPv4/IPv6, refreshed on demand or on a
/// periodic timer. A failed refresh leaves the prior value in place and
/// emits at most one warning event per cycle.
pub struct PublicIpResolver {
    client: reqwest::Client,
    v4: RwLock<Option<IpAddr>>,
    v6: RwLock<Option<IpAddr>>,
    endpoints_v4: Vec<String>,
    endpoints_v6: Vec<String>,
    events: EventBus,
}

impl PublicIpResolver {
    pub fn new(client: reqwest::Client, events: EventBus) -> Self {
        Self {
            client,
            v4: RwLock::new(None),
            v6: RwLock::new(None),
            endpoints_v4: DEFAULT_ENDPOINTS_V4.iter().map(|s| s.to_string()).collect(),
            endpoints_v6: DEFAULT_ENDPOINTS_V6.iter().map(|s| s.to_string()).collect(),
            events,
        }
    }

    /// Seeds the resolver with operator-supplied static addresses
    /// (`PUBLIC_IP`/`PUBLIC_IPV6`), skipping the network probe entirely.
    pub async fn seed(&self, v4: Option<IpAddr>, v6: Option<IpAddr>) {
        if let Some(addr) = v4 {
            *self.v4.write().await = Some(addr);
        }
        if let Some(addr) = v6 {
            *self.v6.write().await = Some(addr);
        }
    }

    pub async fn ipv4(&self) -> Option<IpAddr> {
        *self.v4.read().await
    }

    pub async fn ipv6(&self) -> Option<IpAddr> {
        *self.v6.read().await
    }

    /// Refreshes both families. Probe failures are swallowed: the prior
    /// cached value (if any) is kept and a warning event is published.
    pub async fn refresh(&self) {
        let previous_v4 = *self.v4.read().await;
        match self.probe(&self.endpoints_v4).await {
            Some(addr) => {
                *self.v4.write().await = Some(addr);
                metrics::record_public_ip_refresh(if previous_v4 == Some(addr) { "unchanged" } else { "hit" });
            }
            None => {
                self.warn_probe_failed("IPv4");
                metrics::record_public_ip_refresh("miss");
            }
        }
        let previous_v6 = *self.v6.read().await;
        match self.probe(&self.endpoints_v6).await {
            Some(addr) => {
                *self.v6.write().await = Some(addr);
                metrics::record_public_ip_refresh(if previous_v6 == Some(addr) { "unchanged" } else { "hit" });
            }
            None => {
                self.warn_probe_failed("IPv6");
                metrics::record_public_ip_refresh("miss");
            }
        }
    }

    fn warn_probe_failed(&self, family: &'static str) {
        tracing::warn!(family, "public IP probe failed, keeping prior value");
        self.events.publish(Event::ErrorOccurred(ErrorEvent {
            reason: "NetworkFailed",
            message: format!("public {family} probe failed"),
            occurred_at: chrono::Utc::now(),
        }));
    }

    async fn probe(&self, endpoints: &[String]) -> Option<IpAddr> {
        for endpoint in endpoints {
            let result = self
                .client
                .get(endpoint)
                .timeout(Duration::from_secs(crate::constants::DEFAULT_HEALTH_CALL_TIMEOUT_SECS))
                .send()
                .await;
            let Ok(response) = result else { continue };
            let Ok(text) = response.text().await else { continue };
            if let Ok(addr) = text.trim().parse::<IpAddr>() {
                return Some(addr);
            }
        }
        None
    }
}
