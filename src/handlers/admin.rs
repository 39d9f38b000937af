use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::bookings::BookingResponse;
use crate::models::{BookingStatus, PaymentStatus, PaymentUpdate};
use crate::services::bookings::load_details;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub payment_status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    auth::check_admin(&headers, &state.config.admin_token)?;

    let status_filter = match query.payment_status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            PaymentStatus::ALL
                .into_iter()
                .find(|s| s.as_str() == raw)
                .ok_or_else(|| AppError::validation(format!("Unknown payment_status: {raw}")))?,
        ),
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let details = {
        let conn = state.conn()?;
        let bookings = queries::get_all_bookings(&conn, status_filter.map(|s| s.as_str()), limit)?;
        bookings
            .into_iter()
            .map(|b| load_details(&conn, b))
            .collect::<anyhow::Result<Vec<_>>>()?
    };

    Ok(Json(details.into_iter().map(BookingResponse::from).collect()))
}

// GET /api/admin/stats
#[derive(Serialize)]
pub struct StatsResponse {
    total_bookings: i64,
    paid_bookings: i64,
    total_revenue: Decimal,
    today_revenue: Decimal,
    by_payment_status: Vec<StatusCount>,
}

#[derive(Serialize)]
pub struct StatusCount {
    payment_status: String,
    count: i64,
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, AppError> {
    auth::check_admin(&headers, &state.config.admin_token)?;

    let stats = {
        let conn = state.conn()?;
        queries::get_dashboard_stats(&conn)?
    };

    Ok(Json(StatsResponse {
        total_bookings: stats.total_bookings,
        paid_bookings: stats.paid_bookings,
        total_revenue: stats.total_revenue,
        today_revenue: stats.today_revenue,
        by_payment_status: stats
            .by_payment_status
            .into_iter()
            .map(|(payment_status, count)| StatusCount {
                payment_status,
                count,
            })
            .collect(),
    }))
}

// POST /api/admin/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    auth::check_admin(&headers, &state.config.admin_token)?;

    let updated = {
        let conn = state.conn()?;
        queries::update_booking_status(&conn, id, BookingStatus::Cancelled)?
    };

    if !updated {
        return Err(AppError::not_found("Booking not found"));
    }
    tracing::info!(booking_id = id, "booking cancelled by admin");
    Ok(Json(serde_json::json!({ "ok": true })))
}

// POST /api/admin/bookings/:id/mark-paid
//
// Manual reconciliation for cash and card bookings settled at the counter.
pub async fn mark_paid(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    auth::check_admin(&headers, &state.config.admin_token)?;

    let mut update = PaymentUpdate::new(PaymentStatus::Completed, true);
    update.status = Some(BookingStatus::Confirmed);

    let updated = {
        let conn = state.conn()?;
        queries::apply_payment_update(&conn, id, &update)?
    };

    if !updated {
        return Err(AppError::not_found("Booking not found"));
    }
    tracing::info!(booking_id = id, "booking marked paid by admin");
    Ok(Json(serde_json::json!({ "ok": true })))
}
