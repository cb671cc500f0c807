//! Access Meter server
//!
//! ## REST Endpoints
//!
//! - `POST /access/:feature` - Authorize one use of a feature
//! - `GET /quota/:feature` - Remaining allowance for the caller
//! - `POST /webhooks/payment` - Payment provider events
//! - `GET /health` - Liveness check

use std::net::SocketAddr;
use std::sync::Arc;

use access_meter::adapters::http::{app_router, AppState, RateLimitState};
use access_meter::adapters::{
    FallbackCache, PostgresCounterStore, PostgresEntitlementRepository, PostgresPaymentLedger, RedisCounterStore,
};
use access_meter::application::{
    spawn_sweeper, AccessGate, HandlePaymentWebhookHandler, RateLimitService, UsageQuotaTracker,
};
use access_meter::config::{AppConfig, LogFormat, StoreBackend};
use access_meter::domain::billing::WebhookVerifier;
use access_meter::domain::entitlement::{CapabilityTable, EntitlementResolver};
use access_meter::domain::foundation::{Clock, SystemClock};
use access_meter::ports::CounterStore;
use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use axum::Router;
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Access Meter");

    config.validate()?;
    CapabilityTable::global().validate()?;

    let addr = config.server.socket_addr()?;
    tracing::info!(
        %addr,
        backend = ?config.store.backend,
        environment = ?config.server.environment,
        "Configuration loaded"
    );

    let pool = connect_database(&config).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = build_counter_store(&config, &pool).await?;
    let fallback = Arc::new(FallbackCache::new(config.rate_limit.fallback_max_entries));

    let limiter = Arc::new(RateLimitService::new(
        store.clone(),
        fallback.clone(),
        config.rate_limit.policy(config.store.timeout()),
        clock.clone(),
    ));
    let quotas = Arc::new(UsageQuotaTracker::new(
        store.clone(),
        fallback.clone(),
        config.quota.policies()?,
        config.store.timeout(),
        clock.clone(),
    ));
    let resolver = EntitlementResolver::new(CapabilityTable::global())
        .with_privileged(config.entitlement.privileged()?);
    let gate = Arc::new(
        AccessGate::new(
            limiter.clone(),
            Arc::new(PostgresEntitlementRepository::new(pool.clone())),
            resolver,
            quotas.clone(),
            clock.clone(),
            config.entitlement.trial_days,
        )
        .with_anonymous_features(config.entitlement.anonymous()?)
        .with_store_timeout(config.store.timeout()),
    );

    let mut webhooks = HandlePaymentWebhookHandler::new(
        WebhookVerifier::new(config.payment.webhook_secret.clone()),
        Arc::new(PostgresPaymentLedger::new(pool.clone())),
        clock.clone(),
    )
    .with_store_timeout(config.store.ledger_timeout());
    if config.store.backend == StoreBackend::Redis {
        webhooks = webhooks.with_usage_store(store.clone());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(
        store,
        fallback,
        clock.clone(),
        config.store.sweep_interval(),
        shutdown_rx,
    );

    let state = AppState {
        gate,
        quotas,
        webhooks: Arc::new(webhooks),
        rate_limit: RateLimitState::new(limiter, clock)
            .with_proxy_headers(config.server.trust_proxy_headers)
            .with_upstream_secret(config.server.upstream_secret.clone()),
    };
    let app = build_router(state, &config);

    let result = run_http_server(app, addr).await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Sweeper task ended abnormally");
    }
    pool.close().await;

    tracing::info!("Shutdown complete");
    result
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.server.log_format() {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn connect_database(config: &AppConfig) -> anyhow::Result<PgPool> {
    let db = &config.database;
    let pool = PgPoolOptions::new()
        .min_connections(db.min_connections)
        .max_connections(db.max_connections)
        .acquire_timeout(db.acquire_timeout())
        .idle_timeout(db.idle_timeout())
        .connect(db.url.expose_secret())
        .await?;
    tracing::info!("Database pool created");

    if db.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Migrations applied");
    }

    Ok(pool)
}

async fn build_counter_store(config: &AppConfig, pool: &PgPool) -> anyhow::Result<Arc<dyn CounterStore>> {
    match config.store.backend {
        StoreBackend::Postgres => Ok(Arc::new(PostgresCounterStore::new(pool.clone()))),
        StoreBackend::Redis => {
            let url = config
                .redis
                .url
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("redis backend selected without a redis url"))?;
            let client = redis::Client::open(url.expose_secret().as_str())?;
            let conn = tokio::time::timeout(config.redis.timeout(), client.get_multiplexed_tokio_connection())
                .await
                .map_err(|_| anyhow::anyhow!("timed out connecting to redis"))??;
            tracing::info!("Redis counter store connected");
            Ok(Arc::new(RedisCounterStore::new(conn)))
        }
    }
}

fn build_router(state: AppState, config: &AppConfig) -> Router {
    // Outermost first
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(config.server.request_timeout()));

    app_router(state).layer(middleware)
}

async fn run_http_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let service: IntoMakeServiceWithConnectInfo<Router, SocketAddr> = app.into_make_service_with_connect_info();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
