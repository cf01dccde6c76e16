use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use marquee_booking::{BookingError, ScanOutcome};
use marquee_core::repository::ReviewDecision;
use marquee_core::{BookingFilter, BookingStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::bookings::BookingView;
use crate::error::AppError;
use crate::middleware::{admin_auth_middleware, AdminClaims};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub action: Option<String>,
    pub verification_code: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// The QR content, either as the raw JSON string or already parsed.
    pub qr_data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct PendingView {
    #[serde(flatten)]
    pub view: BookingView,
    pub conflicting_seats: Vec<String>,
}

fn parse_action(action: Option<&str>) -> Result<ReviewDecision, BookingError> {
    match action.map(|a| a.trim().to_ascii_lowercase()).as_deref() {
        Some("approve") | Some("confirm") => Ok(ReviewDecision::Approve),
        Some("reject") => Ok(ReviewDecision::Reject),
        Some(_) => Err(BookingError::invalid("action", "action must be approve or reject")),
        None => Err(BookingError::missing_fields(vec!["action"])),
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/bookings", get(list_bookings))
        .route("/api/admin/bookings/pending", get(pending_bookings))
        .route("/api/admin/bookings/{reference}/verify", post(verify_booking))
        .route("/api/admin/bookings/{reference}/cancel", post(cancel_booking))
        .route("/api/admin/bookings/{reference}/payment-proof", get(payment_proof))
        .route("/api/admin/tickets/scan", post(scan_ticket))
        .route("/api/admin/bundle-orders/pending", get(pending_bundle_orders))
        .route("/api/admin/bundle-orders/{reference}/verify", post(verify_bundle_order))
        .route_layer(axum::middleware::from_fn_with_state(state, admin_auth_middleware))
}

async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let filter = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => BookingFilter::with_status(
            raw.parse::<BookingStatus>()
                .map_err(|e| BookingError::invalid("status", e.to_string()))?,
        ),
        None => BookingFilter::default(),
    };

    let bookings: Vec<BookingView> = state
        .bookings
        .list_bookings(&filter)
        .await?
        .into_iter()
        .map(BookingView::from)
        .collect();

    Ok(Json(json!({
        "success": true,
        "count": bookings.len(),
        "data": bookings,
    })))
}

/// Review queue. Each entry lists seats that another confirmed booking
/// already holds, so reviewers can spot conflicts before approving.
async fn pending_bookings(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let resolver = state.bookings.resolver();
    let mut queue = Vec::new();
    for booking in state.bookings.pending_verifications().await? {
        let conflicting_seats = resolver.preview_conflicts(&booking).await?;
        queue.push(PendingView {
            view: BookingView::from(booking),
            conflicting_seats,
        });
    }

    Ok(Json(json!({
        "success": true,
        "count": queue.len(),
        "data": queue,
    })))
}

async fn verify_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(reference): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Value>, AppError> {
    let decision = parse_action(req.action.as_deref())?;
    let code = req.verification_code.as_deref().map(str::trim).filter(|c| !c.is_empty());

    let booking = state
        .bookings
        .verify_payment(&reference, code, claims.reviewer(), decision.clone(), req.notes)
        .await?;

    let message = match decision {
        ReviewDecision::Approve => "Payment approved. Ticket issued.",
        ReviewDecision::Reject => "Payment rejected.",
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "data": BookingView::from(booking),
    })))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(reference): Path<String>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.cancel_booking(&reference).await?;
    info!(booking_reference = %reference, admin = claims.reviewer(), "Cancelled by admin");

    Ok(Json(json!({
        "success": true,
        "message": "Booking cancelled",
        "data": BookingView::from(booking),
    })))
}

async fn payment_proof(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (proof, bytes) = state.bookings.payment_proof(&reference).await?;
    let disposition = format!("inline; filename=\"{}\"", proof.filename.replace(['"', '\r', '\n'], ""));

    Ok((
        [(header::CONTENT_TYPE, proof.mimetype), (header::CONTENT_DISPOSITION, disposition)],
        bytes,
    ))
}

async fn scan_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<Value>, AppError> {
    let raw = match req.qr_data {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => return Err(BookingError::missing_fields(vec!["qr_data"]).into()),
        Some(other) => other.to_string(),
    };

    let body = match state.bookings.scan_ticket(&raw).await {
        Ok(ScanOutcome::Admitted(ticket)) => {
            info!(booking_reference = %ticket.booking_reference, scanner = claims.reviewer(), "Admitted");
            json!({
                "valid": true,
                "message": "Ticket valid. Enjoy the show.",
                "ticket_info": ticket,
            })
        }
        Ok(ScanOutcome::AlreadyUsed {
            booking_reference,
            used_at,
        }) => json!({
            "valid": false,
            "message": "Ticket has already been used",
            "booking_reference": booking_reference,
            "used_at": used_at,
        }),
        Err(e @ (BookingError::InvalidFormat(_) | BookingError::InvalidCode | BookingError::NotFound { .. })) => {
            json!({
                "valid": false,
                "message": e.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(body))
}

async fn pending_bundle_orders(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let orders = state.bundles.pending_verifications().await?;

    Ok(Json(json!({
        "success": true,
        "count": orders.len(),
        "data": orders,
    })))
}

async fn verify_bundle_order(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(reference): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Value>, AppError> {
    let decision = parse_action(req.action.as_deref())?;
    let order = state
        .bundles
        .verify_order(&reference, claims.reviewer(), decision, req.notes)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": order,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action(Some("approve")).unwrap(), ReviewDecision::Approve);
        assert_eq!(parse_action(Some(" CONFIRM ")).unwrap(), ReviewDecision::Approve);
        assert_eq!(parse_action(Some("reject")).unwrap(), ReviewDecision::Reject);
        assert!(matches!(parse_action(Some("refund")), Err(BookingError::Validation { .. })));
        assert!(matches!(parse_action(None), Err(BookingError::Validation { .. })));
    }
}
