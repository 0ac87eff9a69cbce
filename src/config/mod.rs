// SPDX-License-Identifier: MIT

//! Typed settings with three-layer precedence (§4.B): persisted value ≻
//! environment variable ≻ compiled default. `get` is O(1) and lock-free
//! after init (readers clone an `Arc` snapshot under a read lock that is
//! never held across I/O); `set` validates, persists, swaps the snapshot,
//! and fires `SETTINGS_CHANGED`.

pub mod env;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::constants::{
    DEFAULT_CLEANUP_GRACE_PERIOD_SECS, DEFAULT_IP_REFRESH_INTERVAL_SECS, DEFAULT_LABEL_PREFIX,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_TTL_SECS,
};
use crate::errors::{ConfigError, CoreResult};
use crate::event_bus::{Event, EventBus, SettingsChangedEvent};

/// Routing-mode policy consulted by the multi-provider router (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingMode {
    DefaultOnly,
    Auto,
    AutoWithFallback,
}

impl FromStr for RoutingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default-only" => Ok(RoutingMode::DefaultOnly),
            "auto" => Ok(RoutingMode::Auto),
            "auto-with-fallback" => Ok(RoutingMode::AutoWithFallback),
            other => Err(ConfigError::InvalidValue {
                key: "DNS_ROUTING_MODE".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// A snapshot of every setting the core honors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub operation_mode: String,
    pub log_level: String,
    pub log_format: String,
    pub poll_interval_secs: u64,
    pub ip_refresh_interval_secs: u64,
    pub dns_default_type: String,
    pub dns_default_ttl: u32,
    pub dns_default_proxied: bool,
    pub dns_default_manage: bool,
    pub dns_routing_mode: RoutingMode,
    pub dns_multi_provider_same_zone: bool,
    pub cleanup_orphaned: bool,
    pub cleanup_grace_period_secs: u64,
    pub dns_label_prefix: String,
    pub public_ip: Option<String>,
    pub public_ipv6: Option<String>,
    pub config_dir: String,
    pub proxy_api_url: String,
    pub container_api_url: String,
    pub proxy_basic_auth_user: Option<String>,
    pub proxy_basic_auth_pass: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            operation_mode: "traefik".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            ip_refresh_interval_secs: DEFAULT_IP_REFRESH_INTERVAL_SECS,
            dns_default_type: "A".to_string(),
            dns_default_ttl: DEFAULT_TTL_SECS,
            dns_default_proxied: false,
            dns_default_manage: true,
            dns_routing_mode: RoutingMode::Auto,
            dns_multi_provider_same_zone: false,
            cleanup_orphaned: true,
            cleanup_grace_period_secs: DEFAULT_CLEANUP_GRACE_PERIOD_SECS,
            dns_label_prefix: DEFAULT_LABEL_PREFIX.to_string(),
            public_ip: None,
            public_ipv6: None,
            config_dir: "/etc/trafegodns".to_string(),
            proxy_api_url: "http://localhost:8080".to_string(),
            container_api_url: "http://localhost:2375".to_string(),
            proxy_basic_auth_user: None,
            proxy_basic_auth_pass: None,
        }
    }
}

impl Settings {
    /// Applies the environment-variable overlay layer on top of compiled
    /// defaults.
    pub fn with_env_overlay(mut self) -> Self {
        self.operation_mode = env::operation_mode(&self.operation_mode);
        self.log_level = env::log_level(&self.log_level);
        self.poll_interval_secs = env::poll_interval_secs(self.poll_interval_secs);
        self.ip_refresh_interval_secs = env::ip_refresh_interval_secs(self.ip_refresh_interval_secs);
        self.dns_default_type = env::dns_default_type(&self.dns_default_type);
        self.dns_default_ttl = env::dns_default_ttl(self.dns_default_ttl);
        self.dns_default_proxied = env::dns_default_proxied(self.dns_default_proxied);
        self.dns_default_manage = env::dns_default_manage(self.dns_default_manage);
        if let Ok(mode) = env::dns_routing_mode(&format!("{:?}", self.dns_routing_mode)).parse() {
            self.dns_routing_mode = mode;
        }
        self.dns_multi_provider_same_zone =
            env::dns_multi_provider_same_zone(self.dns_multi_provider_same_zone);
        self.cleanup_orphaned = env::cleanup_orphaned(self.cleanup_orphaned);
        self.cleanup_grace_period_secs =
            env::cleanup_grace_period_secs(self.cleanup_grace_period_secs);
        self.dns_label_prefix = env::dns_label_prefix(&self.dns_label_prefix);
        self.public_ip = env::public_ip().or(self.public_ip);
        self.public_ipv6 = env::public_ipv6().or(self.public_ipv6);
        self.config_dir = env::config_dir(&self.config_dir);
        self.proxy_api_url = env::proxy_api_url(&self.proxy_api_url);
        self.container_api_url = env::container_api_url(&self.container_api_url);
        self.proxy_basic_auth_user = env::proxy_basic_auth_user().or(self.proxy_basic_auth_user);
        self.proxy_basic_auth_pass = env::proxy_basic_auth_pass().or(self.proxy_basic_auth_pass);
        self
    }

    /// Applies CLI overrides on top of the env/default-seeded settings,
    /// mirroring the precedence CLI flags take over their matching
    /// environment variables in the main binary's argument parser.
    pub fn with_cli_overlay(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.config_dir {
            self.config_dir = dir.clone();
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            self.log_format = format.clone();
        }
        self
    }
}

/// CLI overrides accepted by the `trafegodns` binary (out-of-band from the
/// environment-variable overlay, for operators who prefer flags).
#[derive(Debug, Parser)]
#[command(name = "trafegodns", about = "DNS reconciliation core")]
pub struct Cli {
    #[arg(long, env = "CONFIG_DIR")]
    pub config_dir: Option<String>,

    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, env = "RUST_LOG_FORMAT")]
    pub log_format: Option<String>,
}

/// Identifies one runtime-mutable key honored without a restart (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKey {
    LogLevel,
    CleanupOrphaned,
    CleanupGracePeriodSecs,
    DnsRoutingMode,
    DnsDefaultTtl,
    DnsDefaultProxied,
}

impl RuntimeKey {
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeKey::LogLevel => "LOG_LEVEL",
            RuntimeKey::CleanupOrphaned => "CLEANUP_ORPHANED",
            RuntimeKey::CleanupGracePeriodSecs => "CLEANUP_GRACE_PERIOD",
            RuntimeKey::DnsRoutingMode => "DNS_ROUTING_MODE",
            RuntimeKey::DnsDefaultTtl => "DNS_DEFAULT_TTL",
            RuntimeKey::DnsDefaultProxied => "DNS_DEFAULT_PROXIED",
        }
    }

    /// Restart-required keys are persisted but not applied live; every
    /// `RuntimeKey` is, by construction, one the core honors live.
    pub fn restart_required(&self) -> bool {
        false
    }
}

/// Persists a single setting value durably. Implemented by the repository
/// so the config store does not depend on a concrete storage engine.
#[async_trait]
pub trait SettingsPersister: Send + Sync {
    async fn persist(&self, key: &str, value: &str) -> CoreResult<()>;
}

/// A persister that only updates the in-memory snapshot, used when no
/// durable store is wired (tests, or `CONFIG_DIR`-less ephemeral runs).
pub struct NoopPersister;

#[async_trait]
impl SettingsPersister for NoopPersister {
    async fn persist(&self, _key: &str, _value: &str) -> CoreResult<()> {
        Ok(())
    }
}

/// The settings store: lock-free reads, single-writer `set`.
pub struct SettingsStore {
    snapshot: RwLock<Arc<Settings>>,
    persister: Arc<dyn SettingsPersister>,
    events: EventBus,
}

impl SettingsStore {
    pub fn new(initial: Settings, persister: Arc<dyn SettingsPersister>, events: EventBus) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(initial)),
            persister,
            events,
        }
    }

    /// O(1), lock-free after init: readers only ever clone an `Arc`.
    pub fn get(&self) -> Arc<Settings> {
        self.snapshot.read().expect("settings lock poisoned").clone()
    }

    pub async fn set_log_level(&self, value: String) -> CoreResult<()> {
        self.persister.persist(RuntimeKey::LogLevel.name(), &value).await?;
        self.mutate(|s| s.log_level = value.clone());
        self.notify(RuntimeKey::LogLevel, value);
        Ok(())
    }

    pub async fn set_cleanup_orphaned(&self, value: bool) -> CoreResult<()> {
        self.persister
            .persist(RuntimeKey::CleanupOrphaned.name(), &value.to_string())
            .await?;
        self.mutate(|s| s.cleanup_orphaned = value);
        self.notify(RuntimeKey::CleanupOrphaned, value.to_string());
        Ok(())
    }

    pub async fn set_cleanup_grace_period_secs(&self, value: u64) -> CoreResult<()> {
        self.persister
            .persist(RuntimeKey::CleanupGracePeriodSecs.name(), &value.to_string())
            .await?;
        self.mutate(|s| s.cleanup_grace_period_secs = value);
        self.notify(RuntimeKey::CleanupGracePeriodSecs, value.to_string());
        Ok(())
    }

    pub async fn set_dns_routing_mode(&self, value: RoutingMode) -> CoreResult<()> {
        let serialized = serde_json::to_string(&value).unwrap_or_default();
        self.persister
            .persist(RuntimeKey::DnsRoutingMode.name(), &serialized)
            .await?;
        self.mutate(|s| s.dns_routing_mode = value);
        self.notify(RuntimeKey::DnsRoutingMode, serialized);
        Ok(())
    }

    pub async fn set_dns_default_ttl(&self, value: u32) -> CoreResult<()> {
        if value != 1 && value < 60 {
            return Err(ConfigError::InvalidValue {
                key: RuntimeKey::DnsDefaultTtl.name().to_string(),
                value: value.to_string(),
            }
            .into());
        }
        self.persister
            .persist(RuntimeKey::DnsDefaultTtl.name(), &value.to_string())
            .await?;
        self.mutate(|s| s.dns_default_ttl = value);
        self.notify(RuntimeKey::DnsDefaultTtl, value.to_string());
        Ok(())
    }

    pub async fn set_dns_default_proxied(&self, value: bool) -> CoreResult<()> {
        self.persister
            .persist(RuntimeKey::DnsDefaultProxied.name(), &value.to_string())
            .await?;
        self.mutate(|s| s.dns_default_proxied = value);
        self.notify(RuntimeKey::DnsDefaultProxied, value.to_string());
        Ok(())
    }

    fn mutate(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self.snapshot.write().expect("settings lock poisoned");
        let mut next = (**guard).clone();
        f(&mut next);
        *guard = Arc::new(next);
    }

    fn notify(&self, key: RuntimeKey, value: String) {
        self.events.publish(Event::SettingsChanged(SettingsChangedEvent {
            key: key.name().to_string(),
            value,
            restart_required: key.restart_required(),
        }));
    }
}
