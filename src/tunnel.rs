// SPDX-License-Identifier: MIT

//! Tunnel Route Manager (§4.K, optional, `tunnel` feature): mirrors the
//! reconciliation engine's shape for provider-side HTTP tunnel ingress
//! routes. The orphan protocol mirrors §4.L's `TrackedRecord` state machine,
//! applied here to [`IngressRoute`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::CoreResult;
use crate::event_bus::{Event, EventBus, TunnelEvent, TunnelEventKind};
use crate::model::{normalize_hostname, IngressRoute, PreservedPattern, RecordSource};

/// Durable storage for tunnel ingress routes, mirroring
/// [`crate::repository::TrackedRecordRepository`]'s shape for `IngressRoute`.
#[async_trait]
pub trait TunnelRouteRepository: Send + Sync {
    async fn upsert(&self, route: IngressRoute) -> CoreResult<()>;
    async fn clear_orphan(&self, tunnel_id: Uuid, hostname: &str) -> CoreResult<()>;
    async fn mark_orphan(&self, tunnel_id: Uuid, hostname: &str, at: DateTime<Utc>) -> CoreResult<()>;
    async fn delete(&self, tunnel_id: Uuid, hostname: &str) -> CoreResult<()>;
    async fn list_by_tunnel(&self, tunnel_id: Uuid) -> CoreResult<Vec<IngressRoute>>;
}

/// The provider-side tunnel API contract: ensure or remove one route.
#[async_trait]
pub trait TunnelBackend: Send + Sync {
    async fn ensure_route(&self, hostname: &str, service: &str, path: Option<&str>) -> CoreResult<()>;
    async fn remove_route(&self, hostname: &str) -> CoreResult<()>;
}

pub struct TunnelRouteManager {
    tunnel_id: Uuid,
    backend: Arc<dyn TunnelBackend>,
    repository: Arc<dyn TunnelRouteRepository>,
    events: EventBus,
}

impl TunnelRouteManager {
    pub fn new(
        tunnel_id: Uuid,
        backend: Arc<dyn TunnelBackend>,
        repository: Arc<dyn TunnelRouteRepository>,
        events: EventBus,
    ) -> Self {
        Self {
            tunnel_id,
            backend,
            repository,
            events,
        }
    }

    /// Ensures one ingress route per active hostname, pointed at `service`.
    pub async fn ensure_routes(&self, hostnames: &[String], service: &str, path: Option<&str>) -> CoreResult<()> {
        for hostname in hostnames {
            let hostname = normalize_hostname(hostname);
            self.backend.ensure_route(&hostname, service, path).await?;
            self.repository
                .upsert(IngressRoute {
                    tunnel_id: self.tunnel_id,
                    hostname: hostname.clone(),
                    service: service.to_string(),
                    path: path.map(str::to_string),
                    source: RecordSource::Proxy,
                    orphaned_at: None,
                })
                .await?;
            self.events.publish(Event::TunnelRouteChanged(TunnelEvent {
                tunnel_id: self.tunnel_id,
                hostname,
                kind: TunnelEventKind::Updated,
            }));
        }
        Ok(())
    }

    /// Applies §4.L's orphan state machine to this tunnel's routes.
    pub async fn reconcile_orphans(
        &self,
        active_hostnames: &HashSet<String>,
        preserved: &[PreservedPattern],
        now: DateTime<Utc>,
        grace_period: Duration,
    ) -> CoreResult<()> {
        let grace = chrono::Duration::from_std(grace_period).unwrap_or(chrono::Duration::zero());
        let routes = self.repository.list_by_tunnel(self.tunnel_id).await?;

        for route in routes {
            let hostname = route.hostname.to_ascii_lowercase();

            if active_hostnames.contains(&hostname) {
                if route.orphaned_at.is_some() {
                    self.repository.clear_orphan(self.tunnel_id, &hostname).await?;
                }
                continue;
            }

            if preserved.iter().any(|p| p.matches(&hostname)) {
                if route.orphaned_at.is_some() {
                    self.repository.clear_orphan(self.tunnel_id, &hostname).await?;
                }
                continue;
            }

            match route.orphaned_at {
                None => {
                    self.repository.mark_orphan(self.tunnel_id, &hostname, now).await?;
                    self.events.publish(Event::TunnelRouteChanged(TunnelEvent {
                        tunnel_id: self.tunnel_id,
                        hostname,
                        kind: TunnelEventKind::Orphaned,
                    }));
                }
                Some(orphaned_at) if now - orphaned_at > grace => match self.backend.remove_route(&hostname).await {
                    Ok(()) => {
                        self.repository.delete(self.tunnel_id, &hostname).await?;
                        self.events.publish(Event::TunnelRouteChanged(TunnelEvent {
                            tunnel_id: self.tunnel_id,
                            hostname,
                            kind: TunnelEventKind::Deleted,
                        }));
                    }
                    Err(e) => {
                        tracing::warn!(
                            tunnel_id = %self.tunnel_id,
                            hostname,
                            error = %e,
                            "failed to remove orphaned tunnel route, retrying next pass"
                        );
                    }
                },
                Some(_) => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryTunnelRepository {
        routes: Mutex<HashMap<(Uuid, String), IngressRoute>>,
    }

    #[async_trait]
    impl TunnelRouteRepository for InMemoryTunnelRepository {
        async fn upsert(&self, route: IngressRoute) -> CoreResult<()> {
            self.routes.lock().unwrap().insert((route.tunnel_id, route.hostname.clone()), route);
            Ok(())
        }
        async fn clear_orphan(&self, tunnel_id: Uuid, hostname: &str) -> CoreResult<()> {
            if let Some(r) = self.routes.lock().unwrap().get_mut(&(tunnel_id, hostname.to_string())) {
                r.orphaned_at = None;
            }
            Ok(())
        }
        async fn mark_orphan(&self, tunnel_id: Uuid, hostname: &str, at: DateTime<Utc>) -> CoreResult<()> {
            if let Some(r) = self.routes.lock().unwrap().get_mut(&(tunnel_id, hostname.to_string())) {
                r.orphaned_at = Some(at);
            }
            Ok(())
        }
        async fn delete(&self, tunnel_id: Uuid, hostname: &str) -> CoreResult<()> {
            self.routes.lock().unwrap().remove(&(tunnel_id, hostname.to_string()));
            Ok(())
        }
        async fn list_by_tunnel(&self, tunnel_id: Uuid) -> CoreResult<Vec<IngressRoute>> {
            Ok(self
                .routes
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.tunnel_id == tunnel_id)
                .cloned()
                .collect())
        }
    }

    struct StubBackend {
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TunnelBackend for StubBackend {
        async fn ensure_route(&self, _hostname: &str, _service: &str, _path: Option<&str>) -> CoreResult<()> {
            Ok(())
        }
        async fn remove_route(&self, hostname: &str) -> CoreResult<()> {
            self.removed.lock().unwrap().push(hostname.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn ensure_routes_upserts_and_publishes() {
        let tunnel_id = Uuid::new_v4();
        let repo = Arc::new(InMemoryTunnelRepository::default());
        let backend = Arc::new(StubBackend { removed: Mutex::new(Vec::new()) });
        let events = EventBus::new(16);
        let mut sub = events.subscribe();
        let manager = TunnelRouteManager::new(tunnel_id, backend, repo.clone(), events);

        manager
            .ensure_routes(&["Web.Example.com".to_string()], "web-service", None)
            .await
            .unwrap();

        let routes = repo.list_by_tunnel(tunnel_id).await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].hostname, "web.example.com");
        let event = sub.recv().await.unwrap();
        assert!(matches!(event, Event::TunnelRouteChanged(_)));
    }

    #[tokio::test]
    async fn orphans_and_deletes_after_grace_period() {
        let tunnel_id = Uuid::new_v4();
        let repo = Arc::new(InMemoryTunnelRepository::default());
        let backend = Arc::new(StubBackend { removed: Mutex::new(Vec::new()) });
        let events = EventBus::new(16);
        let manager = TunnelRouteManager::new(tunnel_id, backend.clone(), repo.clone(), events);

        repo.upsert(IngressRoute {
            tunnel_id,
            hostname: "gone.example.com".to_string(),
            service: "svc".to_string(),
            path: None,
            source: RecordSource::Proxy,
            orphaned_at: None,
        })
        .await
        .unwrap();

        manager
            .reconcile_orphans(&HashSet::new(), &[], Utc::now(), Duration::from_secs(900))
            .await
            .unwrap();
        let routes = repo.list_by_tunnel(tunnel_id).await.unwrap();
        assert_eq!(routes.len(), 1);
        assert!(routes[0].orphaned_at.is_some());

        let past = Utc::now() - chrono::Duration::seconds(1000);
        repo.mark_orphan(tunnel_id, "gone.example.com", past).await.unwrap();
        manager
            .reconcile_orphans(&HashSet::new(), &[], Utc::now(), Duration::from_secs(900))
            .await
            .unwrap();
        assert!(repo.list_by_tunnel(tunnel_id).await.unwrap().is_empty());
        assert_eq!(backend.removed.lock().unwrap().as_slice(), &["gone.example.com".to_string()]);
    }
}
