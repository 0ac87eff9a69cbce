// SPDX-License-Identifier: MIT

//! Label keys consulted on discovered containers/services.
//!
//! Every key is relative to the configurable label prefix (default `dns.`,
//! see [`crate::constants::DEFAULT_LABEL_PREFIX`]); callers build the full
//! key via [`label_key`].

// ============================================================================
// Label Suffixes
// ============================================================================

/// Drop the hostname entirely when `true`.
pub const SKIP: &str = "skip";

/// Whether the engine may manage this hostname's record.
pub const MANAGE: &str = "manage";

/// Record type override (A, AAAA, CNAME, MX, TXT, SRV, CAA).
pub const TYPE: &str = "type";

/// Record content override.
pub const CONTENT: &str = "content";

/// TTL override, in seconds, or `1` for provider-auto.
pub const TTL: &str = "ttl";

/// Front-proxy flag, meaningful only to providers that support it.
pub const PROXIED: &str = "proxied";

/// MX/SRV priority.
pub const PRIORITY: &str = "priority";

/// SRV weight.
pub const WEIGHT: &str = "weight";

/// SRV port.
pub const PORT: &str = "port";

/// CAA flags.
pub const FLAGS: &str = "flags";

/// CAA tag.
pub const TAG: &str = "tag";

/// Target provider by name.
pub const PROVIDER: &str = "provider";

/// Target provider by id.
pub const PROVIDER_ID: &str = "provider.id";

/// Target providers, comma-separated, or `all`.
pub const PROVIDERS: &str = "providers";

/// Route this hostname through a named tunnel.
pub const TUNNEL: &str = "tunnel";

/// Explicit hostname override used by the container monitor in direct mode.
pub const HOST: &str = "host";

/// Builds the fully-qualified label key for a given prefix and suffix.
pub fn label_key(prefix: &str, suffix: &str) -> String {
    format!("{prefix}{suffix}")
}
