// SPDX-License-Identifier: MIT

//! Environment-variable overlay for the settings store (§6 "Environment
//! variables the core reads directly").
//!
//! Each function reads one known key and falls back to a caller-supplied
//! default, following the `std::env::var(...).ok().and_then(|s|
//! s.parse().ok()).unwrap_or(default)` idiom used throughout this crate.

use std::str::FromStr;

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

pub fn operation_mode(default: &str) -> String {
    std::env::var("OPERATION_MODE").unwrap_or_else(|_| default.to_string())
}

pub fn log_level(default: &str) -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| default.to_string())
}

pub fn poll_interval_secs(default: u64) -> u64 {
    parsed("POLL_INTERVAL").unwrap_or(default)
}

pub fn ip_refresh_interval_secs(default: u64) -> u64 {
    parsed("IP_REFRESH_INTERVAL").unwrap_or(default)
}

pub fn dns_default_type(default: &str) -> String {
    std::env::var("DNS_DEFAULT_TYPE").unwrap_or_else(|_| default.to_string())
}

pub fn dns_default_ttl(default: u32) -> u32 {
    parsed("DNS_DEFAULT_TTL").unwrap_or(default)
}

pub fn dns_default_proxied(default: bool) -> bool {
    parsed("DNS_DEFAULT_PROXIED").unwrap_or(default)
}

pub fn dns_default_manage(default: bool) -> bool {
    parsed("DNS_DEFAULT_MANAGE").unwrap_or(default)
}

pub fn dns_routing_mode(default: &str) -> String {
    std::env::var("DNS_ROUTING_MODE").unwrap_or_else(|_| default.to_string())
}

pub fn dns_multi_provider_same_zone(default: bool) -> bool {
    parsed("DNS_MULTI_PROVIDER_SAME_ZONE").unwrap_or(default)
}

pub fn cleanup_orphaned(default: bool) -> bool {
    parsed("CLEANUP_ORPHANED").unwrap_or(default)
}

pub fn cleanup_grace_period_secs(default: u64) -> u64 {
    parsed("CLEANUP_GRACE_PERIOD").unwrap_or(default)
}

pub fn dns_label_prefix(default: &str) -> String {
    std::env::var("DNS_LABEL_PREFIX").unwrap_or_else(|_| default.to_string())
}

pub fn preserved_hostnames() -> Vec<String> {
    std::env::var("PRESERVED_HOSTNAMES")
        .ok()
        .map(|s| split_list(&s))
        .unwrap_or_default()
}

pub fn managed_hostnames() -> Vec<String> {
    std::env::var("MANAGED_HOSTNAMES")
        .ok()
        .map(|s| split_list(&s))
        .unwrap_or_default()
}

pub fn public_ip() -> Option<String> {
    std::env::var("PUBLIC_IP").ok()
}

pub fn public_ipv6() -> Option<String> {
    std::env::var("PUBLIC_IPV6").ok()
}

pub fn config_dir(default: &str) -> String {
    std::env::var("CONFIG_DIR").unwrap_or_else(|_| default.to_string())
}

/// Base URL of the reverse proxy's API (§4.I), e.g. Traefik's `:8080`.
pub fn proxy_api_url(default: &str) -> String {
    std::env::var("PROXY_API_URL").unwrap_or_else(|_| default.to_string())
}

/// Base URL of the container engine's HTTP API (§4.J).
pub fn container_api_url(default: &str) -> String {
    std::env::var("CONTAINER_API_URL").unwrap_or_else(|_| default.to_string())
}

pub fn proxy_basic_auth_user() -> Option<String> {
    std::env::var("PROXY_API_USER").ok()
}

pub fn proxy_basic_auth_pass() -> Option<String> {
    std::env::var("PROXY_API_PASSWORD").ok()
}

/// Splits a comma or whitespace separated list, trimming empty entries.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
