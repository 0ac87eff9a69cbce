// SPDX-License-Identifier: MIT

//! Proxy Monitor (§4.I): polls a reverse proxy's HTTP API for router
//! configuration, extracts `Host(...)`/`HostRegexp(...)` rules, and merges
//! each hostname's originating container labels (resolved via the
//! [`super::container_monitor::ContainerMonitor`]'s shared map).

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tokio::sync::{watch, RwLock};

use crate::errors::{CoreResult, DiscoveryError};
use crate::event_bus::{Event, EventBus};
use crate::model::{normalize_hostname, DiscoveredHostnames, LabelMap};

#[derive(Debug, Deserialize)]
struct RouterEntry {
    #[serde(default)]
    name: String,
    rule: String,
}

fn host_rule_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Host(?:Regexp)?\(([^)]*)\)").expect("valid regex"))
}

/// Extracts the backtick- or quote-delimited hostnames inside a
/// `Host(...)`/`HostRegexp(...)` router rule.
fn extract_hostnames(rule: &str) -> Vec<String> {
    let mut out = Vec::new();
    for caps in host_rule_pattern().captures_iter(rule) {
        for token in caps[1].split(',') {
            let token = token.trim().trim_matches('`').trim_matches('"');
            if !token.is_empty() {
                out.push(token.to_string());
            }
        }
    }
    out
}

pub struct ProxyMonitor {
    client: reqwest::Client,
    api_base_url: String,
    basic_auth: Option<(String, String)>,
    events: EventBus,
    container_labels: Arc<RwLock<HashMap<String, LabelMap>>>,
}

impl ProxyMonitor {
    pub fn new(
        client: reqwest::Client,
        api_base_url: String,
        basic_auth: Option<(String, String)>,
        events: EventBus,
        container_labels: Arc<RwLock<HashMap<String, LabelMap>>>,
    ) -> Self {
        Self {
            client,
            api_base_url,
            basic_auth,
            events,
            container_labels,
        }
    }

    /// One poll: lists routers, extracts hostnames, merges container
    /// labels, and publishes `HOSTNAMES_DISCOVERED`.
    pub async fn poll_once(&self) -> CoreResult<DiscoveredHostnames> {
        let url = format!("{}/api/http/routers", self.api_base_url);
        let mut request = self.client.get(url);
        if let Some((user, pass)) = &self.basic_auth {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request
            .send()
            .await
            .map_err(|e| DiscoveryError::ProxyUnreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DiscoveryError::ProxyUnreachable(format!("status {}", response.status())).into());
        }
        let routers: Vec<RouterEntry> = response
            .json()
            .await
            .map_err(|e| DiscoveryError::MalformedPayload(e.to_string()))?;

        let container_labels = self.container_labels.read().await;
        let mut discovered = DiscoveredHostnames::default();
        for router in &routers {
            let hostnames = extract_hostnames(&router.rule);
            if hostnames.is_empty() {
                continue;
            }
            let service_key = router.name.split('@').next().unwrap_or(&router.name);
            let labels = container_labels.get(service_key).cloned().unwrap_or_default();

            for hostname in hostnames {
                let hostname = normalize_hostname(&hostname);
                if !discovered.hostnames.contains(&hostname) {
                    discovered.hostnames.push(hostname.clone());
                }
                discovered.labels.entry(hostname).or_default().extend(labels.clone());
            }
        }

        self.events.publish(Event::HostnamesDiscovered(discovered.clone()));
        Ok(discovered)
    }

    /// Runs the polling loop until the shutdown signal fires. A failed poll
    /// is logged and retried at the next tick; it never tears down the loop.
    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!(error = %e, "proxy poll failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
