use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use voyage_api::middleware::RateLimiter;
use voyage_api::{app, worker, AppState, AuthConfig, Services};
use voyage_core::repository::{BookingNotifier, LogNotifier};
use voyage_payment::PaywayClient;
use voyage_shared::Masked;
use voyage_store::{Config, DbClient, PgCatalog, PgReservationStore, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "voyage_api=debug,voyage_order=debug,voyage_payment=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;

    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let rate_limiter: Option<Arc<dyn RateLimiter>> = match &config.redis {
        Some(redis) => Some(Arc::new(
            RedisClient::new(&redis.url).await.context("Failed to connect to Redis")?,
        )),
        None => None,
    };

    let gateway = PaywayClient::new(config.payment.clone()).context("Failed to build payment client")?;
    let state = AppState::new(
        Services {
            store: Arc::new(PgReservationStore::new(db.pool.clone())),
            catalog: Arc::new(PgCatalog::new(db.pool.clone())),
            gateway: Arc::new(gateway),
            notifier: notifier(&config)?,
            webhook_secret: config.payment.webhook_secret.clone(),
        },
        rate_limiter,
        AuthConfig { secret: Masked::new(config.auth.jwt_secret.clone()) },
        config.business_rules.clone(),
    );

    if std::env::args().nth(1).as_deref() == Some("sweep") {
        let code = worker::run_sweep_once(&state.sweeper()).await;
        std::process::exit(code);
    }

    if config.payment.webhook_secret.is_none() {
        tracing::warn!("No payment webhook secret configured; webhooks are accepted unsigned");
    }

    tokio::spawn(worker::start_expiry_worker(
        state.sweeper(),
        tokio::time::Duration::from_secs(config.business_rules.sweep_interval_seconds.max(1)),
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Starting Voyage API on {} ({:?} payments)", addr, config.payment.mode);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>()
    ).await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn notifier(config: &Config) -> anyhow::Result<Arc<dyn BookingNotifier>> {
    match &config.kafka {
        Some(kafka) => {
            let producer = voyage_store::EventProducer::new(&kafka.brokers)
                .context("Failed to create Kafka producer")?;
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

#[cfg(not(feature = "kafka"))]
fn notifier(config: &Config) -> anyhow::Result<Arc<dyn BookingNotifier>> {
    if config.kafka.is_some() {
        tracing::warn!("Kafka brokers configured but the `kafka` feature is off; notifications are only logged");
    }
    Ok(Arc::new(LogNotifier))
}
