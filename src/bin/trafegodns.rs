// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use trafegodns::config::{Cli, Settings, SettingsStore};
use trafegodns::constants::{
    DEFAULT_DB_FILE_NAME, DEFAULT_HEALTH_CALL_TIMEOUT_SECS, DEFAULT_PROVIDER_CALL_TIMEOUT_SECS,
    EVENT_BUS_QUEUE_CAPACITY, HEALTHZ_SERVER_PATH, METRICS_SERVER_BIND_ADDRESS,
    METRICS_SERVER_PATH, METRICS_SERVER_PORT, TOKIO_WORKER_THREADS,
};
use trafegodns::discovery::container_monitor::ContainerMonitor;
use trafegodns::discovery::proxy_monitor::ProxyMonitor;
use trafegodns::engine::ReconciliationEngine;
use trafegodns::errors::CoreResult;
use trafegodns::event_bus::{Event, EventBus};
use trafegodns::metrics;
use trafegodns::model::{Provider as ProviderConfig, ProviderCredentials};
use trafegodns::providers::cloudflare::CloudflareProvider;
use trafegodns::providers::digitalocean::DigitalOceanProvider;
use trafegodns::providers::route53::Route53Provider;
use trafegodns::providers::technitium::TechnitiumProvider;
use trafegodns::providers::Provider;
use trafegodns::public_ip::PublicIpResolver;
use trafegodns::repository::acquire_lock;
use trafegodns::repository::sqlite::{self, RepositorySettingsPersister, SqliteRepository};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("trafegodns-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Respects `RUST_LOG`/`RUST_LOG_FORMAT`; defaults to compact text at info.
fn initialize_logging(format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .compact()
                .init();
        }
    }
}

fn start_http_server() -> tokio::task::JoinHandle<()> {
    info!(
        bind_address = METRICS_SERVER_BIND_ADDRESS,
        port = METRICS_SERVER_PORT,
        metrics_path = METRICS_SERVER_PATH,
        healthz_path = HEALTHZ_SERVER_PATH,
        "starting metrics/health HTTP server"
    );

    tokio::spawn(async move {
        async fn metrics_handler() -> String {
            match metrics::gather_metrics() {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "failed to gather metrics");
                    String::from("# error gathering metrics\n")
                }
            }
        }

        async fn healthz_handler() -> &'static str {
            "ok"
        }

        let app = Router::new()
            .route(METRICS_SERVER_PATH, get(metrics_handler))
            .route(HEALTHZ_SERVER_PATH, get(healthz_handler));

        let bind_addr = format!("{METRICS_SERVER_BIND_ADDRESS}:{METRICS_SERVER_PORT}");
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, bind_addr, "failed to bind metrics/health server");
                return;
            }
        };

        info!("metrics/health server listening on http://{bind_addr}");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "metrics/health server exited");
        }
    })
}

/// Builds one backend per enabled, persisted provider configuration (§4.E
/// `Init(credentials)`). Route53's hosted zone id is not a distinct
/// persisted field; the provider's `zone` doubles as the hosted zone id.
async fn build_providers(
    configs: &[ProviderConfig],
    client: &reqwest::Client,
) -> CoreResult<HashMap<Uuid, Arc<dyn Provider>>> {
    let mut providers: HashMap<Uuid, Arc<dyn Provider>> = HashMap::new();
    for config in configs {
        if !config.enabled {
            continue;
        }
        let provider: Arc<dyn Provider> = match &config.credentials {
            ProviderCredentials::Cloudflare { api_token } => Arc::new(
                CloudflareProvider::init(config.id, config.zone.clone(), api_token.clone(), client.clone())
                    .await?,
            ),
            ProviderCredentials::Route53 {
                access_key_id,
                secret_access_key,
                ..
            } => Arc::new(Route53Provider::new(
                config.id,
                config.zone.clone(),
                config.zone.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                client.clone(),
            )),
            ProviderCredentials::Digitalocean { api_token } => Arc::new(DigitalOceanProvider::new(
                config.id,
                config.zone.clone(),
                api_token.clone(),
                client.clone(),
            )),
            ProviderCredentials::Technitium { base_url, api_token } => Arc::new(TechnitiumProvider::new(
                config.id,
                config.zone.clone(),
                base_url.clone(),
                api_token.clone(),
                client.clone(),
            )),
        };
        providers.insert(config.id, provider);
    }
    Ok(providers)
}

/// Adds every pattern from `PRESERVED_HOSTNAMES` to the durable preserved
/// list (§6). Idempotent: `add_preserved` is an insert-or-ignore at the
/// storage layer, so this is safe to run on every startup.
async fn seed_preserved_hostnames(repository: &dyn trafegodns::repository::TrackedRecordRepository) -> Result<()> {
    for pattern in trafegodns::config::env::preserved_hostnames() {
        repository
            .add_preserved(trafegodns::model::PreservedPattern(pattern))
            .await?;
    }
    Ok(())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::default().with_env_overlay().with_cli_overlay(&cli);
    initialize_logging(&settings.log_format);
    info!(operation_mode = %settings.operation_mode, config_dir = %settings.config_dir, "starting trafegodns");

    std::fs::create_dir_all(&settings.config_dir)?;
    let config_dir = std::path::PathBuf::from(&settings.config_dir);
    let _lock_guard = acquire_lock(&config_dir)?;

    let db_path = config_dir.join(DEFAULT_DB_FILE_NAME);
    let pool = sqlite::connect(db_path.to_string_lossy().as_ref()).await?;
    let repository = Arc::new(SqliteRepository::new(pool));

    let events = EventBus::new(EVENT_BUS_QUEUE_CAPACITY);
    let persister = Arc::new(RepositorySettingsPersister {
        repository: repository.clone(),
    });
    let settings_store = Arc::new(SettingsStore::new(settings.clone(), persister, events.clone()));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_PROVIDER_CALL_TIMEOUT_SECS))
        .build()?;
    let health_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_HEALTH_CALL_TIMEOUT_SECS))
        .build()?;

    let public_ip = Arc::new(PublicIpResolver::new(client.clone(), events.clone()));
    let seed_v4 = settings.public_ip.as_ref().and_then(|ip| ip.parse().ok());
    let seed_v6 = settings.public_ipv6.as_ref().and_then(|ip| ip.parse().ok());
    public_ip.seed(seed_v4, seed_v6).await;

    let provider_configs = repository.list_providers().await?;
    let providers = build_providers(&provider_configs, &client).await?;
    info!(count = providers.len(), "providers initialized");

    seed_preserved_hostnames(repository.as_ref()).await?;

    let _http_handle = start_http_server();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let container_monitor = Arc::new(ContainerMonitor::new(
        health_client.clone(),
        settings.container_api_url.clone(),
        settings.dns_label_prefix.clone(),
        settings.operation_mode == "direct",
        events.clone(),
    ));
    let proxy_basic_auth = match (&settings.proxy_basic_auth_user, &settings.proxy_basic_auth_pass) {
        (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
        _ => None,
    };
    let proxy_monitor = Arc::new(ProxyMonitor::new(
        client.clone(),
        settings.proxy_api_url.clone(),
        proxy_basic_auth,
        events.clone(),
        container_monitor.labels_handle(),
    ));

    let engine = Arc::new(ReconciliationEngine::new(
        settings_store.clone(),
        repository.clone(),
        providers,
        public_ip.clone(),
        events.clone(),
    ));

    let poll_interval = Duration::from_secs(settings.poll_interval_secs);
    let ip_refresh_interval = Duration::from_secs(settings.ip_refresh_interval_secs);

    {
        let container_monitor = container_monitor.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            container_monitor.run(poll_interval, shutdown_rx).await;
        });
    }
    if settings.operation_mode != "direct" {
        let proxy_monitor = proxy_monitor.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            proxy_monitor.run(poll_interval, shutdown_rx).await;
        });
    }
    {
        let public_ip = public_ip.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ip_refresh_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        public_ip.refresh().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    {
        let engine = engine.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        let mut subscription = events.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = subscription.recv() => {
                        match event {
                            Some(Event::HostnamesDiscovered(discovered)) => {
                                let start = std::time::Instant::now();
                                match engine.process_hostnames(&discovered).await {
                                    Ok(stats) => {
                                        metrics::record_reconciliation("success", start.elapsed());
                                        info!(
                                            total = stats.total,
                                            created = stats.created,
                                            updated = stats.updated,
                                            errors = stats.errors,
                                            "reconciliation pass completed"
                                        );
                                    }
                                    Err(e) => {
                                        metrics::record_reconciliation("error", start.elapsed());
                                        error!(error = %e, "reconciliation pass failed");
                                    }
                                }
                            }
                            Some(_) => {}
                            None => break,
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    let shutdown_result: Result<()> = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
            result.map_err(anyhow::Error::from)
        }
        result = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                sigterm.recv().await;
                info!("received SIGTERM, shutting down");
                Ok(())
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<Result<()>>().await
            }
        } => result,
    };
    shutdown_result?;

    let _ = shutdown_tx.send(true);
    info!("graceful shutdown complete");
    Ok(())
}
