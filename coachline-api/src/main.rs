use anyhow::Context;
use coachline_api::{app, AppState, Dependencies};
use coachline_core::clock::SystemClock;
use coachline_core::events::{EventPublisher, NoopPublisher};
use coachline_payment::HttpRefundClient;
use coachline_store::{DbClient, PgBookingStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "coachline_api=debug,coachline_order=debug,coachline_payment=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = coachline_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Coachline API on port {}", config.server.port);

    // Database
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let rules = match db.fetch_business_rules(config.business_rules.clone()).await {
        Ok(rules) => rules,
        Err(e) => {
            tracing::warn!("Using configured business rules, overrides unavailable: {}", e);
            config.business_rules.clone()
        }
    };

    // Redis (rate limiting)
    let redis = match config.redis.url.as_deref() {
        Some(url) => Some(Arc::new(RedisClient::new(url).context("Invalid Redis URL")?)),
        None => None,
    };

    let events = event_publisher(&config)?;
    let refunds = HttpRefundClient::new(config.vnpay.api_url.clone()).context("Failed to build refund client")?;

    let state = AppState::new(
        Dependencies {
            store: Arc::new(PgBookingStore::new(db.pool.clone())),
            clock: Arc::new(SystemClock),
            events,
            refunds: Arc::new(refunds),
            redis,
        },
        rules,
        config.vnpay.clone(),
        config.auth.jwt_secret.clone(),
    );

    let reaper = state.reaper.clone().start();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "kafka")]
fn event_publisher(config: &coachline_store::app_config::Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match config.kafka.brokers.as_deref() {
        Some(brokers) => {
            let producer = coachline_store::EventProducer::new(brokers).context("Failed to create Kafka producer")?;
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(NoopPublisher)),
    }
}

#[cfg(not(feature = "kafka"))]
fn event_publisher(config: &coachline_store::app_config::Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    if config.kafka.brokers.is_some() {
        tracing::warn!("kafka.brokers is set but this build has no kafka support; events are dropped");
    }
    Ok(Arc::new(NoopPublisher))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
