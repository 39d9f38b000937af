use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::auth;
use crate::errors::AppError;
use crate::services::payments::{self, CaptureOutcome, CaptureRequest, CreateOrderRequest, OrderCreated};
use crate::state::AppState;

// POST /api/payments/create-order
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreated>), AppError> {
    let user_id = auth::bearer_user(&headers, &state.config.jwt_secret)?;
    let Json(req) = body?;
    let created = payments::create_order(&state, user_id, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// POST /api/payments/capture
pub async fn capture_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CaptureRequest>, JsonRejection>,
) -> Result<Json<CaptureOutcome>, AppError> {
    let user_id = auth::bearer_user(&headers, &state.config.jwt_secret)?;
    let Json(req) = body?;
    let outcome = payments::capture_payment(&state, user_id, req).await?;
    Ok(Json(outcome))
}
