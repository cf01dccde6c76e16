use marquee_booking::{BookingService, BundleService};
use marquee_shared::models::events::SeatUpdateEvent;
use marquee_store::app_config::BusinessRules;
use marquee_store::RedisClient;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct RateLimit {
    pub client: Arc<RedisClient>,
    pub requests_per_minute: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: BookingService,
    pub bundles: BundleService,
    pub sse_tx: broadcast::Sender<SeatUpdateEvent>,
    /// Absent when no Redis is configured; requests are then not limited.
    pub rate_limit: Option<RateLimit>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}
