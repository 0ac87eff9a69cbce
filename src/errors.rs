// SPDX-License-Identifier: MIT

//! Error taxonomy for the reconciliation core.
//!
//! Every fallible operation in the crate returns a [`CoreError`], composed
//! from the concern-specific enums below via `#[from]`. The taxonomy mirrors
//! the abstract error kinds consulted by the engine to decide retry-this-tick
//! vs. skip-and-continue: a record-level `ValidationFailed` must never abort
//! a batch, while `AuthFailed`/`RateLimited` abort the remaining batch.

use thiserror::Error;

/// Errors raised while extracting or validating a single hostname's intent.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required field `{field}` for record type {record_type}")]
    MissingField {
        field: &'static str,
        record_type: String,
    },

    #[error("invalid TTL {ttl}: must be 1 (auto) or >= 60")]
    InvalidTtl { ttl: u32 },

    #[error("invalid port {port}: must be in 1..=65535")]
    InvalidPort { port: u32 },

    #[error("invalid priority {priority}: must be in 0..=65535")]
    InvalidPriority { priority: u32 },

    #[error("invalid IPv4 literal `{content}` for A record")]
    InvalidIpv4 { content: String },

    #[error("invalid IPv6 literal `{content}` for AAAA record")]
    InvalidIpv6 { content: String },

    #[error("unknown record type `{0}`")]
    UnknownRecordType(String),

    #[error("{0}")]
    Other(String),
}

/// Errors raised by a [`crate::providers::Provider`] implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider credentials rejected: {0}")]
    AuthFailed(String),

    #[error("provider request throttled, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflicting record: {0}")]
    Conflict(String),

    #[error("network error talking to provider: {0}")]
    NetworkFailed(String),

    #[error("provider request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("zone misconfigured: {0}")]
    MisconfiguredZone(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors raised by the discovery layer (proxy monitor, container monitor).
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("proxy API request failed: {0}")]
    ProxyUnreachable(String),

    #[error("container engine socket unreachable: {0}")]
    ContainerEngineUnreachable(String),

    #[error("failed to parse discovery payload: {0}")]
    MalformedPayload(String),
}

/// Errors raised by the tracked-record repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository storage failure: {0}")]
    StorageFailed(String),

    #[error("repository lock could not be acquired: {0}")]
    LockFailed(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for setting `{key}`")]
    InvalidValue { key: String, value: String },

    #[error("unknown setting key `{0}`")]
    UnknownKey(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Composite error type returned by the core's public operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Generic(String),
}

impl CoreError {
    /// True for errors the engine should retry on the next tick rather than
    /// count as a terminal failure for the current one.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Provider(ProviderError::NetworkFailed(_) | ProviderError::Timeout(_)) => {
                true
            }
            CoreError::Provider(ProviderError::RateLimited { .. }) => true,
            CoreError::Provider(ProviderError::Http(e)) => e.is_timeout() || e.is_connect(),
            CoreError::Discovery(_) => true,
            CoreError::Repository(RepositoryError::Sqlx(_)) => true,
            _ => false,
        }
    }

    /// A short, stable machine-readable reason string, used for log
    /// deduplication and event payloads.
    pub fn status_reason(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "ValidationFailed",
            CoreError::Provider(ProviderError::AuthFailed(_)) => "AuthFailed",
            CoreError::Provider(ProviderError::RateLimited { .. }) => "RateLimited",
            CoreError::Provider(ProviderError::NotFound(_)) => "NotFound",
            CoreError::Provider(ProviderError::Conflict(_)) => "Conflict",
            CoreError::Provider(
                ProviderError::NetworkFailed(_) | ProviderError::Timeout(_) | ProviderError::Http(_),
            ) => "NetworkFailed",
            CoreError::Provider(ProviderError::MisconfiguredZone(_)) => "MisconfiguredZone",
            CoreError::Discovery(_) => "NetworkFailed",
            CoreError::Repository(_) => "StorageFailed",
            CoreError::Config(_) => "ValidationFailed",
            CoreError::Cancelled => "Cancelled",
            CoreError::Generic(_) => "Generic",
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Generic(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
