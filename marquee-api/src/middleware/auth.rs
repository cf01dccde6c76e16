use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::AppState;

const ADMIN_ROLES: [&str; 2] = ["admin", "super_admin"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminClaims {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    pub role: String,
    pub exp: usize,
}

impl AdminClaims {
    /// Name recorded as `verified_by` on reviewed payments.
    pub fn reviewer(&self) -> &str {
        if self.email.is_empty() {
            &self.sub
        } else {
            &self.email
        }
    }
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header.strip_prefix("Bearer ").ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected admin token: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    let role = token_data.claims.role.to_ascii_lowercase();
    if !ADMIN_ROLES.contains(&role.as_str()) {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}
