// SPDX-License-Identifier: MIT

//! Prometheus metrics for the reconciliation engine, exposed over `/metrics`
//! (§6 AMBIENT). All metrics carry the `trafegodns_` namespace prefix.

use prometheus::{CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

const METRICS_NAMESPACE: &str = "trafegodns";

/// Global Prometheus registry. All metrics below register into it; the
/// `/metrics` HTTP handler gathers and encodes it on each scrape.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Total reconciliation passes by outcome (`success`, `error`).
pub static RECONCILIATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliation passes by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Duration of a reconciliation pass in seconds.
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of one process_hostnames pass in seconds",
    )
    .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = HistogramVec::new(opts, &[]).unwrap();
    METRICS_REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

/// Total DNS record mutations by provider and outcome
/// (`created`, `updated`, `up_to_date`, `error`, `skipped`).
pub static DNS_RECORDS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dns_records_total"),
        "Total DNS record operations by provider and outcome",
    );
    let counter = CounterVec::new(opts, &["provider", "outcome"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Number of tracked records currently marked orphaned, by provider.
pub static ORPHANED_RECORDS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_orphaned_records"),
        "Number of tracked records currently in the orphaned state, by provider",
    );
    let gauge = GaugeVec::new(opts, &["provider"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Total records deleted by the orphan cleanup coordinator, by provider.
pub static RECORDS_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_records_deleted_total"),
        "Total DNS records deleted after the orphan grace period elapsed",
    );
    let counter = CounterVec::new(opts, &["provider"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Total provider API calls by provider and error category.
pub static PROVIDER_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_provider_errors_total"),
        "Total provider API errors by provider and error category",
    );
    let counter = CounterVec::new(opts, &["provider", "error_type"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Resolved public IP refresh outcomes (`hit`, `miss`, `unchanged`).
pub static PUBLIC_IP_REFRESH_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_public_ip_refresh_total"),
        "Total public IP resolver refresh attempts by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub fn record_reconciliation(outcome: &str, duration: Duration) {
    RECONCILIATIONS_TOTAL.with_label_values(&[outcome]).inc();
    RECONCILIATION_DURATION_SECONDS.with_label_values(&[]).observe(duration.as_secs_f64());
}

pub fn record_dns_record(provider: &str, outcome: &str) {
    DNS_RECORDS_TOTAL.with_label_values(&[provider, outcome]).inc();
}

pub fn set_orphaned_records(provider: &str, count: f64) {
    ORPHANED_RECORDS.with_label_values(&[provider]).set(count);
}

pub fn record_record_deleted(provider: &str) {
    RECORDS_DELETED_TOTAL.with_label_values(&[provider]).inc();
}

pub fn record_provider_error(provider: &str, error_type: &str) {
    PROVIDER_ERRORS_TOTAL.with_label_values(&[provider, error_type]).inc();
}

pub fn record_public_ip_refresh(outcome: &str) {
    PUBLIC_IP_REFRESH_TOTAL.with_label_values(&[outcome]).inc();
}

/// Gathers and encodes all registered metrics in Prometheus text format.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
