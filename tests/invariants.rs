// SPDX-License-Identifier: MIT

//! Quantified invariants, round-trip laws, and boundary behaviors from §8,
//! exercised through the real entry point (`ReconciliationEngine::process_hostnames`)
//! rather than re-deriving the module-level unit coverage already present in
//! `cleanup`, `router`, `intent`, and `providers`.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{base_settings, discovered, engine_for, provider_config, InMemoryRepository, StubProvider};
use trafegodns::config::RoutingMode;
use trafegodns::event_bus::{Event, EventBus};
use trafegodns::model::{DesiredRecord, DiscoveredHostnames, ManagedHostname, PreservedPattern, RecordSource, RecordType};
use trafegodns::providers::Provider;
use trafegodns::repository::{SourceFilter, TrackedRecordRepository};
use uuid::Uuid;

fn all_filter() -> SourceFilter {
    SourceFilter { source: None, managed_only: false }
}

// ---------------------------------------------------------------------------
// Quantified invariants
// ---------------------------------------------------------------------------

/// A managed record for a hostname still present in the discovery set is
/// never left in the orphaned state, even if it passed through ORPHANED in
/// an earlier pass.
#[tokio::test]
async fn invariant_active_record_is_reactivated_not_left_orphaned() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, Arc::new(StubProvider::with_id("example.com", provider_id)));

    let events = EventBus::new(16);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 900);
    let engine = engine_for(repo.clone(), settings, providers, events).await;

    let present = discovered(&[("flaky.example.com", &[("type", "A"), ("content", "10.0.0.1")])]);
    let absent = DiscoveredHostnames::default();

    engine.process_hostnames(&present).await.unwrap();
    engine.process_hostnames(&absent).await.unwrap();
    engine.process_hostnames(&present).await.unwrap();

    let tracked = repo.list_by_provider(provider_id, all_filter()).await.unwrap();
    let record = tracked.iter().find(|r| r.record.name == "flaky.example.com").unwrap();
    assert!(record.orphaned_at.is_none());
}

/// An orphaned record is never deleted before its grace period elapses: the
/// provider-side record and the tracked row both survive an empty pass run
/// immediately after marking.
#[tokio::test]
async fn invariant_orphaned_record_survives_within_grace_period() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    let provider = Arc::new(StubProvider::with_id("example.com", provider_id));
    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, provider.clone());

    let events = EventBus::new(16);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 900);
    let engine = engine_for(repo.clone(), settings, providers, events).await;

    let present = discovered(&[("stable.example.com", &[("type", "A"), ("content", "10.0.0.1")])]);
    let absent = DiscoveredHostnames::default();

    engine.process_hostnames(&present).await.unwrap();
    engine.process_hostnames(&absent).await.unwrap();
    engine.process_hostnames(&absent).await.unwrap();

    let tracked = repo.list_by_provider(provider_id, all_filter()).await.unwrap();
    let record = tracked.iter().find(|r| r.record.name == "stable.example.com").unwrap();
    assert!(record.orphaned_at.is_some());
    assert!(!provider.remote.lock().unwrap().is_empty());
}

/// Every label combination the extractor accepts produces a `DesiredRecord`
/// whose content already passes that record type's validation (A and AAAA
/// content must parse as the matching address family).
#[tokio::test]
async fn invariant_extracted_records_carry_valid_content() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, Arc::new(StubProvider::with_id("example.com", provider_id)));

    let events = EventBus::new(16);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 900);
    let engine = engine_for(repo.clone(), settings, providers, events).await;

    let hostnames = discovered(&[
        ("a.example.com", &[("type", "A"), ("content", "10.0.0.1")]),
        ("aaaa.example.com", &[("type", "AAAA"), ("content", "2001:db8::1")]),
        ("implicit-a.example.com", &[]),
    ]);
    let stats = engine.process_hostnames(&hostnames).await.unwrap();
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.created, 3);

    let tracked = repo.list_by_provider(provider_id, all_filter()).await.unwrap();
    for record in &tracked {
        match record.record.record_type {
            trafegodns::model::RecordType::A => {
                assert!(record.record.content.parse::<std::net::Ipv4Addr>().is_ok());
            }
            trafegodns::model::RecordType::Aaaa => {
                assert!(record.record.content.parse::<std::net::Ipv6Addr>().is_ok());
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Round-trip laws
// ---------------------------------------------------------------------------

/// `AddPreserved; RemovePreserved` returns the system to the state it would
/// have been in had the pattern never been added: the record resumes
/// orphaning on the next pass where it is absent.
#[tokio::test]
async fn roundtrip_add_then_remove_preserved_resumes_orphaning() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, Arc::new(StubProvider::with_id("example.com", provider_id)));

    let events = EventBus::new(16);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 900);
    let engine = engine_for(repo.clone(), settings, providers, events).await;

    let present = discovered(&[("roundtrip.example.com", &[("type", "A"), ("content", "10.0.0.1")])]);
    let absent = DiscoveredHostnames::default();
    engine.process_hostnames(&present).await.unwrap();

    let pattern = PreservedPattern("roundtrip.example.com".to_string());
    repo.add_preserved(pattern.clone()).await.unwrap();
    engine.process_hostnames(&absent).await.unwrap();
    let tracked = repo.list_by_provider(provider_id, all_filter()).await.unwrap();
    assert!(tracked.iter().find(|r| r.record.name == "roundtrip.example.com").unwrap().orphaned_at.is_none());

    repo.remove_preserved(&pattern).await.unwrap();
    engine.process_hostnames(&absent).await.unwrap();
    let tracked = repo.list_by_provider(provider_id, all_filter()).await.unwrap();
    assert!(tracked.iter().find(|r| r.record.name == "roundtrip.example.com").unwrap().orphaned_at.is_some());
}

/// Running the same discovery set twice in a row changes nothing on the
/// second pass, across multiple hostnames and both default providers.
#[tokio::test]
async fn roundtrip_repeat_pass_is_a_fixed_point() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, Arc::new(StubProvider::with_id("example.com", provider_id)));

    let events = EventBus::new(16);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 900);
    let engine = engine_for(repo.clone(), settings, providers, events).await;

    let hostnames = discovered(&[
        ("one.example.com", &[("type", "A"), ("content", "10.0.0.1")]),
        ("two.example.com", &[("type", "A"), ("content", "10.0.0.2")]),
        ("three.example.com", &[("type", "A"), ("content", "10.0.0.3")]),
    ]);

    engine.process_hostnames(&hostnames).await.unwrap();
    let second = engine.process_hostnames(&hostnames).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.up_to_date, 3);
}

/// Create, then update (content change), then let grace elapse so the
/// record is deleted: the tracked row vanishes and exactly one CREATED, one
/// UPDATED, and one DELETED event fire, in that order.
#[tokio::test]
async fn roundtrip_create_update_delete_leaves_no_tracked_record() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, Arc::new(StubProvider::with_id("example.com", provider_id)));

    let events = EventBus::new(32);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 0);
    let engine = engine_for(repo.clone(), settings, providers, events.clone()).await;

    let mut sub = events.subscribe();

    let created = discovered(&[("cud.example.com", &[("type", "A"), ("content", "10.0.0.1")])]);
    let updated = discovered(&[("cud.example.com", &[("type", "A"), ("content", "10.0.0.2")])]);
    let absent = DiscoveredHostnames::default();

    engine.process_hostnames(&created).await.unwrap();
    engine.process_hostnames(&updated).await.unwrap();
    engine.process_hostnames(&absent).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    engine.process_hostnames(&absent).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(20), sub.recv()).await {
        match event {
            Event::DnsRecordCreated(_) => seen.push("created"),
            Event::DnsRecordUpdated(_) => seen.push("updated"),
            Event::DnsRecordDeleted(_) => seen.push("deleted"),
            _ => {}
        }
    }
    assert_eq!(seen, vec!["created", "updated", "deleted"]);

    let tracked = repo.list_by_provider(provider_id, all_filter()).await.unwrap();
    assert!(tracked.iter().all(|r| r.record.name != "cud.example.com"));
}

// ---------------------------------------------------------------------------
// Boundary behaviors
// ---------------------------------------------------------------------------

/// TTL=1 (provider-auto) and TTL=60 are accepted; TTL=59 is rejected as a
/// validation error rather than silently clamped.
#[tokio::test]
async fn boundary_ttl_accepts_auto_and_minimum_rejects_just_below() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, Arc::new(StubProvider::with_id("example.com", provider_id)));

    let events = EventBus::new(16);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 900);
    let engine = engine_for(repo.clone(), settings, providers, events).await;

    let hostnames = discovered(&[
        ("ttl-auto.example.com", &[("type", "A"), ("content", "10.0.0.1"), ("ttl", "1")]),
        ("ttl-min.example.com", &[("type", "A"), ("content", "10.0.0.2"), ("ttl", "60")]),
        ("ttl-below.example.com", &[("type", "A"), ("content", "10.0.0.3"), ("ttl", "59")]),
    ]);
    let stats = engine.process_hostnames(&hostnames).await.unwrap();

    assert_eq!(stats.created, 2);
    assert_eq!(stats.errors, 1);

    let tracked = repo.list_by_provider(provider_id, all_filter()).await.unwrap();
    assert!(tracked.iter().any(|r| r.record.name == "ttl-auto.example.com" && r.record.ttl == 1));
    assert!(tracked.iter().any(|r| r.record.name == "ttl-min.example.com" && r.record.ttl == 60));
    assert!(!tracked.iter().any(|r| r.record.name == "ttl-below.example.com"));
}

/// SRV port 0 and port 65536 are both rejected; MX priority 65535 (the
/// maximum valid value) is accepted.
#[tokio::test]
async fn boundary_port_range_and_max_priority() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, Arc::new(StubProvider::with_id("example.com", provider_id)));

    let events = EventBus::new(16);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 900);
    let engine = engine_for(repo.clone(), settings, providers, events).await;

    let hostnames = discovered(&[
        (
            "_svc1._tcp.example.com",
            &[("type", "SRV"), ("content", "target.example.com"), ("port", "0")],
        ),
        (
            "_svc2._tcp.example.com",
            &[("type", "SRV"), ("content", "target.example.com"), ("port", "65536")],
        ),
        (
            "mx.example.com",
            &[("type", "MX"), ("content", "mail.example.com"), ("priority", "65535")],
        ),
    ]);
    let stats = engine.process_hostnames(&hostnames).await.unwrap();

    assert_eq!(stats.errors, 2);
    assert_eq!(stats.created, 1);

    let tracked = repo.list_by_provider(provider_id, all_filter()).await.unwrap();
    assert!(tracked.iter().any(|r| r.record.name == "mx.example.com" && r.record.priority == Some(65535)));
}

/// A CNAME whose target is the zone apex itself is omitted, not created or
/// errored.
#[tokio::test]
async fn boundary_self_referencing_cname_at_apex_is_omitted() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, Arc::new(StubProvider::with_id("example.com", provider_id)));

    let events = EventBus::new(16);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 900);
    let engine = engine_for(repo.clone(), settings, providers, events).await;

    let hostnames = discovered(&[("example.com", &[("type", "CNAME"), ("content", "example.com")])]);
    let stats = engine.process_hostnames(&hostnames).await.unwrap();

    assert_eq!(stats.created, 0);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.skipped, 1);
}

/// A hostname matching no provider's zone still resolves under
/// `default-only` routing, since that mode never consults the zone at all.
#[tokio::test]
async fn boundary_default_only_ignores_zone_membership() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, Arc::new(StubProvider::with_id("example.com", provider_id)));

    let events = EventBus::new(16);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 900);
    let engine = engine_for(repo.clone(), settings, providers, events).await;

    let hostnames = discovered(&[("totally.unrelated.net", &[("type", "A"), ("content", "10.0.0.1")])]);
    let stats = engine.process_hostnames(&hostnames).await.unwrap();

    assert_eq!(stats.created, 1);
    assert_eq!(stats.skipped, 0);
}

/// A `ManagedHostname` is ensured on every pass even when discovery finds
/// nothing at all, and is tracked with `RecordSource::Managed`.
#[tokio::test]
async fn invariant_managed_hostname_is_ensured_without_discovery() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    repo.add_managed(ManagedHostname {
        hostname: "static.example.com".to_string(),
        record: DesiredRecord {
            record_type: RecordType::A,
            name: "static.example.com".to_string(),
            content: "10.9.9.9".to_string(),
            ttl: 300,
            proxied: None,
            priority: None,
            weight: None,
            port: None,
            flags: None,
            tag: None,
        },
        provider_id,
    })
    .await
    .unwrap();

    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, Arc::new(StubProvider::with_id("example.com", provider_id)));

    let events = EventBus::new(16);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 900);
    let engine = engine_for(repo.clone(), settings, providers, events).await;

    let stats = engine.process_hostnames(&DiscoveredHostnames::default()).await.unwrap();

    assert_eq!(stats.created, 1);
    let tracked = repo.list_by_provider(provider_id, all_filter()).await.unwrap();
    let record = tracked.iter().find(|r| r.record.name == "static.example.com").unwrap();
    assert_eq!(record.source, RecordSource::Managed);
}

/// When discovery and a `ManagedHostname` both name the same hostname,
/// discovery wins and the hostname is not submitted twice in one pass.
#[tokio::test]
async fn invariant_discovery_takes_precedence_over_managed_hostname() {
    let provider_id = Uuid::new_v4();
    let repo = Arc::new(InMemoryRepository::with_providers(vec![provider_config(
        "p1",
        "example.com",
        provider_id,
        true,
    )]));
    repo.add_managed(ManagedHostname {
        hostname: "shared.example.com".to_string(),
        record: DesiredRecord {
            record_type: RecordType::A,
            name: "shared.example.com".to_string(),
            content: "10.9.9.9".to_string(),
            ttl: 300,
            proxied: None,
            priority: None,
            weight: None,
            port: None,
            flags: None,
            tag: None,
        },
        provider_id,
    })
    .await
    .unwrap();

    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    providers.insert(provider_id, Arc::new(StubProvider::with_id("example.com", provider_id)));

    let events = EventBus::new(16);
    let settings = base_settings(RoutingMode::DefaultOnly, false, 900);
    let engine = engine_for(repo.clone(), settings, providers, events).await;

    let hostnames = discovered(&[("shared.example.com", &[("type", "A"), ("content", "10.0.0.1")])]);
    let stats = engine.process_hostnames(&hostnames).await.unwrap();

    assert_eq!(stats.created, 1);
    let tracked = repo.list_by_provider(provider_id, all_filter()).await.unwrap();
    let record = tracked.iter().find(|r| r.record.name == "shared.example.com").unwrap();
    assert_eq!(record.source, RecordSource::Proxy);
    assert_eq!(record.record.content, "10.0.0.1");
}
