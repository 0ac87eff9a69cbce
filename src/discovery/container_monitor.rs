// SPDX-License-Identifier: MIT

//! Container Monitor (§4.J): maintains an in-memory `containerId -> labels`
//! map and, in "direct" mode, derives a hostname set straight from container
//! labels. A genuine container-engine event stream would observe
//! start/stop/destroy as they happen over the engine's UNIX socket; this
//! implementation polls the list endpoint and diffs against the prior
//! snapshot instead, trading a little latency for not pulling in a raw
//! events-stream JSON parser.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{watch, RwLock};

use crate::errors::{CoreResult, DiscoveryError};
use crate::event_bus::{ContainerEvent, Event, EventBus};
use crate::labels;
use crate::model::{normalize_hostname, DiscoveredHostnames, LabelMap};
use crate::retry::ExponentialBackoff;

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Labels", default)]
    labels: HashMap<String, String>,
}

pub struct ContainerMonitor {
    client: reqwest::Client,
    api_base_url: String,
    label_prefix: String,
    direct_mode: bool,
    events: EventBus,
    containers: Arc<RwLock<HashMap<String, LabelMap>>>,
}

impl ContainerMonitor {
    pub fn new(
        client: reqwest::Client,
        api_base_url: String,
        label_prefix: String,
        direct_mode: bool,
        events: EventBus,
    ) -> Self {
        Self {
            client,
            api_base_url,
            label_prefix,
            direct_mode,
            events,
            containers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A shared handle the proxy monitor uses to resolve a router's
    /// originating container labels by name.
    pub fn labels_handle(&self) -> Arc<RwLock<HashMap<String, LabelMap>>> {
        self.containers.clone()
    }

    async fn list_containers(&self) -> CoreResult<Vec<ContainerSummary>> {
        let url = format!("{}/containers/json", self.api_base_url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DiscoveryError::ContainerEngineUnreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DiscoveryError::ContainerEngineUnreachable(format!(
                "status {}",
                response.status()
            ))
            .into());
        }
        response
            .json()
            .await
            .map_err(|e| DiscoveryError::MalformedPayload(e.to_string()).into())
    }

    /// Lists containers, diffs against the prior snapshot, publishes
    /// start/stop events, and (in direct mode) returns a freshly computed
    /// hostname set derived solely from container labels.
    pub async fn refresh_once(&self) -> CoreResult<Option<DiscoveredHostnames>> {
        let summaries = self.list_containers().await?;
        let mut next: HashMap<String, LabelMap> = HashMap::new();
        for summary in &summaries {
            let name = summary.names.first().cloned().unwrap_or_else(|| summary.id.clone());
            next.insert(name, summary.labels.clone());
        }

        let previous_keys: HashSet<String> = self.containers.read().await.keys().cloned().collect();
        let next_keys: HashSet<String> = next.keys().cloned().collect();

        for started in next_keys.difference(&previous_keys) {
            self.events.publish(Event::ContainerStarted(ContainerEvent {
                container_id: started.clone(),
                hostnames: self.direct_hostnames_for(&next[started]),
            }));
        }
        for stopped in previous_keys.difference(&next_keys) {
            self.events.publish(Event::ContainerStopped(ContainerEvent {
                container_id: stopped.clone(),
                hostnames: Vec::new(),
            }));
        }

        *self.containers.write().await = next.clone();

        if !self.direct_mode {
            return Ok(None);
        }

        let mut discovered = DiscoveredHostnames::default();
        for container_labels in next.values() {
            for hostname in self.direct_hostnames_for(container_labels) {
                if !discovered.hostnames.contains(&hostname) {
                    discovered.hostnames.push(hostname.clone());
                }
                discovered.labels.insert(hostname, container_labels.clone());
            }
        }
        Ok(Some(discovered))
    }

    fn direct_hostnames_for(&self, container_labels: &LabelMap) -> Vec<String> {
        let key = labels::label_key(&self.label_prefix, labels::HOST);
        match container_labels.get(&key) {
            Some(value) => value
                .split([',', ' '])
                .filter(|s| !s.is_empty())
                .map(normalize_hostname)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Runs the polling loop until the shutdown signal fires, reconnecting
    /// with backoff on transport failure. Never propagates a failure to the
    /// caller: the last-known map is kept and a warning is logged.
    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = ExponentialBackoff::provider_backoff(Duration::from_secs(60));
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.refresh_once().await {
                        Ok(discovered) => {
                            backoff.reset();
                            if let Some(discovered) = discovered {
                                self.events.publish(Event::HostnamesDiscovered(discovered));
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "container engine poll failed, keeping last-known map");
                            if let Some(delay) = backoff.next_backoff() {
                                tokio::time::sleep(delay).await;
                            }
                        }
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
