use anyhow::Context;
use marquee_api::{
    app,
    state::{AppState, AuthConfig, RateLimit},
};
use marquee_booking::memory::{InMemoryBookingRepository, InMemoryBundleOrderRepository};
use marquee_booking::{BookingPolicy, BookingService, BundleService, ExpirySweeper};
use marquee_core::{BookingRepository, BundleOrderRepository, ProofStorage, SeatEventSink};
use marquee_shared::models::events::SeatUpdateEvent;
use marquee_store::app_config::{Config, StorageBackend};
use marquee_store::{DbClient, FsProofStorage, InlineProofStorage, PgBookingRepository, PgBundleOrderRepository, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "marquee_api=debug,marquee_booking=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Marquee API on port {}", config.server.port);

    let bookings_repo: Arc<dyn BookingRepository>;
    let bundles_repo: Arc<dyn BundleOrderRepository>;
    let rules = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            bookings_repo = Arc::new(PgBookingRepository::new(db.pool.clone()));
            bundles_repo = Arc::new(PgBundleOrderRepository::new(db.pool.clone()));
            db.fetch_business_rules(config.business_rules.clone())
                .await
                .context("Failed to load business rules")?
        }
        None => {
            tracing::warn!("No database configured, bookings are kept in memory");
            bookings_repo = Arc::new(InMemoryBookingRepository::new());
            bundles_repo = Arc::new(InMemoryBundleOrderRepository::new());
            config.business_rules.clone()
        }
    };

    let storage: Arc<dyn ProofStorage> = match config.storage.backend {
        StorageBackend::Inline => Arc::new(InlineProofStorage::new()),
        StorageBackend::Filesystem => Arc::new(FsProofStorage::new(&config.storage.directory)),
    };

    // SSE Broadcast Channel
    let (sse_tx, _) = tokio::sync::broadcast::channel::<SeatUpdateEvent>(100);
    let events: Arc<dyn SeatEventSink> = Arc::new(sse_tx.clone());

    let policy = BookingPolicy {
        max_proof_bytes: rules.max_proof_bytes,
        backfill_missing_references: rules.backfill_missing_references,
        hold_seats_pending_verification: rules.hold_seats_pending_verification,
    };
    let bookings = BookingService::new(bookings_repo.clone(), storage.clone(), events.clone(), policy);
    let bundles = BundleService::new(bundles_repo.clone(), storage, rules.max_proof_bytes);

    let sweeper = ExpirySweeper::new(
        bookings_repo,
        bundles_repo,
        events,
        chrono::Duration::minutes(rules.verification_ttl_minutes),
    );
    tokio::spawn(sweeper.run(Duration::from_secs(rules.sweep_interval_seconds)));

    let rate_limit = match &config.redis.url {
        Some(url) => Some(RateLimit {
            client: Arc::new(RedisClient::new(url).context("Invalid Redis URL")?),
            requests_per_minute: config.redis.requests_per_minute,
        }),
        None => None,
    };

    let app_state = AppState {
        bookings,
        bundles,
        sse_tx,
        rate_limit,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        business_rules: rules,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error")?;

    Ok(())
}
