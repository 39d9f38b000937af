use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::errors::AppError;
use crate::services::payments;
use crate::state::AppState;

// POST /api/payments/webhook
//
// The raw body is kept so the exact event PayPal sent is what gets verified.
pub async fn paypal_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = payments::handle_webhook(&state, &headers, &body).await?;
    Ok(Json(serde_json::json!({ "status": outcome })))
}
