use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use marquee_booking::{BookingDraft, BookingError, BookingLookup, TicketPayload};
use marquee_core::{Booking, BookingFilter, BookingStatus, BundleOrder};
use marquee_shared::Masked;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::upload::{decode_base64_proof, ProofForm};

/// A booking as returned to clients. Confirmed bookings carry their QR
/// ticket payload.
#[derive(Debug, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub has_payment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_data: Option<TicketPayload>,
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        Self {
            has_payment: booking.has_payment(),
            qr_code_data: TicketPayload::for_booking(&booking),
            booking,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OccupiedSeatsQuery {
    pub showtime_id: Option<i64>,
    pub movie_title: Option<String>,
    pub include_pending: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct Base64ProofRequest {
    pub booking_reference: Option<String>,
    pub payment_base64: Option<String>,
    pub payment_filename: Option<String>,
    pub payment_mimetype: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    pub customer: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "order_type", rename_all = "snake_case")]
pub enum CustomerOrder {
    Booking(BookingView),
    Bundle(BundleOrder),
}

impl CustomerOrder {
    fn placed_at(&self) -> chrono::DateTime<chrono::Utc> {
        match self {
            CustomerOrder::Booking(view) => view.booking.booking_date,
            CustomerOrder::Bundle(order) => order.order_date,
        }
    }

    fn status(&self) -> BookingStatus {
        match self {
            CustomerOrder::Booking(view) => view.booking.status,
            CustomerOrder::Bundle(order) => order.status,
        }
    }
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct OrderSummary {
    pub total: usize,
    pub regular: usize,
    pub bundle: usize,
    pub pending: usize,
    pub pending_verification: usize,
    pub confirmed: usize,
    pub rejected: usize,
    pub cancelled: usize,
}

impl OrderSummary {
    pub fn of(orders: &[CustomerOrder]) -> Self {
        let mut summary = OrderSummary {
            total: orders.len(),
            ..Default::default()
        };
        for order in orders {
            match order {
                CustomerOrder::Booking(_) => summary.regular += 1,
                CustomerOrder::Bundle(_) => summary.bundle += 1,
            }
            match order.status() {
                BookingStatus::Pending => summary.pending += 1,
                BookingStatus::PendingVerification => summary.pending_verification += 1,
                BookingStatus::Confirmed => summary.confirmed += 1,
                BookingStatus::PaymentRejected => summary.rejected += 1,
                BookingStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

pub fn routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/occupied-seats", get(occupied_seats))
        .route(
            "/api/bookings/upload-payment",
            post(upload_payment).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/bookings/update-payment-base64",
            post(upload_payment_base64).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/bookings/my-bookings", get(my_bookings))
        .route("/api/bookings/{reference}", get(get_booking))
}

async fn create_booking(
    State(state): State<AppState>,
    Json(draft): Json<BookingDraft>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let booking = state.bookings.create_booking(draft).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Booking created successfully",
            "data": BookingView::from(booking),
        })),
    ))
}

async fn occupied_seats(
    State(state): State<AppState>,
    Query(query): Query<OccupiedSeatsQuery>,
) -> Result<Json<Value>, AppError> {
    let movie_title = query.movie_title.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let (showtime_id, movie_title) = match (query.showtime_id, movie_title) {
        (Some(id), Some(title)) => (id, title),
        (id, title) => {
            let mut missing = Vec::new();
            if id.is_none() {
                missing.push("showtime_id");
            }
            if title.is_none() {
                missing.push("movie_title");
            }
            return Err(BookingError::missing_fields(missing).into());
        }
    };

    let include_pending = query
        .include_pending
        .unwrap_or(state.bookings.policy().hold_seats_pending_verification);
    let occupied = state
        .bookings
        .resolver()
        .compute_occupied_seats(showtime_id, movie_title, include_pending)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": occupied,
    })))
}

async fn upload_payment(State(state): State<AppState>, multipart: Multipart) -> Result<Json<Value>, AppError> {
    let mut form = ProofForm::read(multipart).await?;

    let lookup = match (form.field("booking_reference"), form.field("booking_id")) {
        (Some(reference), _) => BookingLookup::Reference(reference.to_string()),
        (None, Some(id)) => BookingLookup::Id(
            Uuid::parse_str(id).map_err(|_| BookingError::invalid("booking_id", "booking_id is not a valid id"))?,
        ),
        (None, None) => return Err(BookingError::missing_fields(vec!["booking_reference"]).into()),
    };
    let artifact = form.take_artifact()?;

    let receipt = state.bookings.attach_payment_proof(lookup, artifact).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Payment proof uploaded. Waiting for admin verification.",
        "data": {
            "booking_reference": receipt.booking.booking_reference,
            "status": receipt.booking.status,
            "reference_issued": receipt.reference_issued,
        },
    })))
}

async fn upload_payment_base64(
    State(state): State<AppState>,
    Json(req): Json<Base64ProofRequest>,
) -> Result<Json<Value>, AppError> {
    let (reference, payload) = match (req.booking_reference, req.payment_base64) {
        (Some(reference), Some(payload)) if !reference.trim().is_empty() => (reference, payload),
        (reference, payload) => {
            let mut missing = Vec::new();
            if reference.map_or(true, |r| r.trim().is_empty()) {
                missing.push("booking_reference");
            }
            if payload.is_none() {
                missing.push("payment_base64");
            }
            return Err(BookingError::missing_fields(missing).into());
        }
    };

    let artifact = decode_base64_proof(&payload, req.payment_filename, req.payment_mimetype)?;
    let receipt = state
        .bookings
        .attach_payment_proof(BookingLookup::Reference(reference.trim().to_string()), artifact)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Payment proof uploaded. Waiting for admin verification.",
        "data": {
            "booking_reference": receipt.booking.booking_reference,
            "status": receipt.booking.status,
            "reference_issued": receipt.reference_issued,
        },
    })))
}

async fn my_bookings(
    State(state): State<AppState>,
    Query(query): Query<CustomerQuery>,
) -> Result<Json<Value>, AppError> {
    let customer = query
        .customer
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| BookingError::missing_fields(vec!["customer"]))?;

    let filter = BookingFilter::for_customer(customer);
    let bookings = state.bookings.list_bookings(&filter).await?;
    let bundles = state.bundles.list_orders(&filter).await?;

    let mut orders: Vec<CustomerOrder> = bookings
        .into_iter()
        .map(|b| CustomerOrder::Booking(BookingView::from(b)))
        .chain(bundles.into_iter().map(CustomerOrder::Bundle))
        .collect();
    orders.sort_by(|a, b| b.placed_at().cmp(&a.placed_at()));
    let summary = OrderSummary::of(&orders);

    info!(customer = ?Masked(customer), total = summary.total, "Customer orders listed");

    Ok(Json(json!({
        "success": true,
        "data": orders,
        "summary": summary,
    })))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.get_booking(&reference).await?;

    Ok(Json(json!({
        "success": true,
        "data": BookingView::from(booking),
    })))
}
