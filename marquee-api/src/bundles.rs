use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use marquee_booking::{BookingError, BundleDraft};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;
use crate::upload::ProofForm;

pub fn routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/api/bundle-orders", post(create_order))
        .route(
            "/api/bundle-orders/upload-payment",
            post(upload_payment).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/bundle-orders/{reference}", get(get_order))
}

async fn create_order(
    State(state): State<AppState>,
    Json(draft): Json<BundleDraft>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let order = state.bundles.create_order(draft).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Bundle order created successfully",
            "data": order,
        })),
    ))
}

async fn upload_payment(State(state): State<AppState>, multipart: Multipart) -> Result<Json<Value>, AppError> {
    let mut form = ProofForm::read(multipart).await?;
    let reference = form
        .field("order_reference")
        .map(str::to_string)
        .ok_or_else(|| BookingError::missing_fields(vec!["order_reference"]))?;
    let artifact = form.take_artifact()?;

    let order = state.bundles.attach_payment_proof(&reference, artifact).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Payment proof uploaded. Waiting for admin verification.",
        "data": {
            "order_reference": order.order_reference,
            "status": order.status,
        },
    })))
}

async fn get_order(State(state): State<AppState>, Path(reference): Path<String>) -> Result<Json<Value>, AppError> {
    let order = state.bundles.get_order(&reference).await?;

    Ok(Json(json!({
        "success": true,
        "data": order,
    })))
}
