// SPDX-License-Identifier: MIT

//! Global constants for the reconciliation core.
//!
//! Constants are grouped by concern for easy maintenance, following the same
//! layout as the rest of the crate's modules.

// ============================================================================
// Label Prefix
// ============================================================================

/// Default label prefix consulted on containers/services (overridable via
/// `DNS_LABEL_PREFIX`).
pub const DEFAULT_LABEL_PREFIX: &str = "dns.";

// ============================================================================
// DNS Protocol Constants
// ============================================================================

/// Provider-sentinel TTL meaning "automatic" (e.g. Cloudflare's TTL=1).
pub const TTL_AUTO: u32 = 1;

/// Minimum TTL accepted for a non-auto value.
pub const TTL_MIN: u32 = 60;

/// Default TTL applied when no label/default overrides it.
pub const DEFAULT_TTL_SECS: u32 = 300;

/// Minimum valid port for SRV records.
pub const PORT_MIN: u32 = 1;

/// Maximum valid port for SRV records.
pub const PORT_MAX: u32 = 65535;

/// Maximum valid MX/SRV priority.
pub const PRIORITY_MAX: u32 = 65535;

// ============================================================================
// Timing Constants
// ============================================================================

/// Default interval between proxy-API polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default interval between public-IP refreshes.
pub const DEFAULT_IP_REFRESH_INTERVAL_SECS: u64 = 300;

/// Default grace period between marking a record orphaned and deleting it.
pub const DEFAULT_CLEANUP_GRACE_PERIOD_SECS: u64 = 15 * 60;

/// Default per-call timeout for outbound provider HTTP calls.
pub const DEFAULT_PROVIDER_CALL_TIMEOUT_SECS: u64 = 30;

/// Default per-call timeout for health/public-IP probes.
pub const DEFAULT_HEALTH_CALL_TIMEOUT_SECS: u64 = 5;

/// Default refresh interval for a provider's record cache.
pub const DEFAULT_PROVIDER_CACHE_REFRESH_SECS: u64 = 60;

/// Default maximum provider rate-limit backoff.
pub const DEFAULT_RATE_LIMIT_MAX_BACKOFF_SECS: u64 = 60;

// ============================================================================
// Repository / File Lock Constants
// ============================================================================

/// Name of the advisory lock file inside the config directory.
pub const LOCK_FILE_NAME: &str = ".trafegodns.lock";

/// Age after which an owned lock is considered stale and reclaimable.
pub const LOCK_STALE_AFTER_SECS: u64 = 120;

/// Age after which a stale lock is force-reclaimed unconditionally.
pub const LOCK_FORCE_RECLAIM_AFTER_SECS: u64 = 600;

/// Default SQLite file name inside the config directory.
pub const DEFAULT_DB_FILE_NAME: &str = "trafegodns.sqlite";

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for the Prometheus metrics / health HTTP server.
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for the Prometheus metrics endpoint.
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path for the liveness endpoint.
pub const HEALTHZ_SERVER_PATH: &str = "/healthz";

/// Bind address for the metrics/health HTTP server.
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime.
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Bounded capacity of each event-bus subscriber queue.
pub const EVENT_BUS_QUEUE_CAPACITY: usize = 256;
