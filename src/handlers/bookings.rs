use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::errors::AppError;
use crate::models::{
    BookingStatus, CustomerSnapshot, PaymentMethod, PaymentStatus, Service, User, VehicleSnapshot,
};
use crate::services::bookings::{self, BookingDetails, CreateBookingRequest};
use crate::state::AppState;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Client-facing booking. The verification token is deliberately absent.
#[derive(Serialize)]
pub struct BookingResponse {
    id: i64,
    user: Option<UserSummary>,
    service: Option<ServiceSummary>,
    mot_class: String,
    date: String,
    time: String,
    vehicle: VehicleSnapshot,
    customer: CustomerSnapshot,
    payment_method: PaymentMethod,
    card_number: String,
    name_on_card: String,
    payment_status: PaymentStatus,
    is_paid: bool,
    paypal_order_id: Option<String>,
    paypal_transaction_id: Option<String>,
    payment_amount: Decimal,
    payment_currency: String,
    status: BookingStatus,
    is_verified: bool,
    verified_at: Option<String>,
    created: String,
    updated: String,
}

#[derive(Serialize)]
pub struct UserSummary {
    id: i64,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
}

impl From<User> for UserSummary {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
        }
    }
}

#[derive(Serialize)]
pub struct ServiceSummary {
    id: i64,
    code: String,
    name: String,
    price: Decimal,
}

impl From<Service> for ServiceSummary {
    fn from(s: Service) -> Self {
        Self {
            id: s.id,
            code: s.code,
            name: s.name,
            price: s.price,
        }
    }
}

impl From<BookingDetails> for BookingResponse {
    fn from(details: BookingDetails) -> Self {
        let b = details.booking;
        Self {
            id: b.id,
            user: details.user.map(UserSummary::from),
            service: details.service.map(ServiceSummary::from),
            mot_class: b.mot_class,
            date: b.date.format("%Y-%m-%d").to_string(),
            time: b.time,
            vehicle: b.vehicle,
            customer: b.customer,
            payment_method: b.payment_method,
            card_number: b.card_number,
            name_on_card: b.name_on_card,
            payment_status: b.payment_status,
            is_paid: b.is_paid,
            paypal_order_id: b.paypal_order_id,
            paypal_transaction_id: b.paypal_transaction_id,
            payment_amount: b.payment_amount,
            payment_currency: b.payment_currency,
            status: b.status,
            is_verified: b.is_verified,
            verified_at: b.verified_at.map(|t| t.format(TS_FORMAT).to_string()),
            created: b.created_at.format(TS_FORMAT).to_string(),
            updated: b.updated_at.format(TS_FORMAT).to_string(),
        }
    }
}

// GET /api/bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let user_id = auth::bearer_user(&headers, &state.config.jwt_secret)?;
    let details = bookings::list_bookings(&state, user_id)?;
    Ok(Json(details.into_iter().map(BookingResponse::from).collect()))
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let user_id = auth::bearer_user(&headers, &state.config.jwt_secret)?;
    let Json(req) = body?;
    let details = bookings::create_booking(&state, user_id, req)?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

// POST /api/bookings/anonymous
pub async fn create_anonymous_booking(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let Json(req) = body?;
    let details = bookings::create_booking(&state, None, req)?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

// GET /api/bookings/:id
#[derive(Deserialize)]
pub struct AccessQuery {
    pub customer_email: Option<String>,
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(query): Query<AccessQuery>,
) -> Result<Json<BookingResponse>, AppError> {
    let user_id = auth::bearer_user(&headers, &state.config.jwt_secret)?;
    let details = bookings::get_booking(&state, id, user_id, query.customer_email.as_deref())?;
    Ok(Json(details.into()))
}

// GET /api/bookings/verify/:token
pub async fn verify_booking(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = bookings::verify_token(&state, &token)?;
    Ok(Json(serde_json::json!({ "message": outcome.message() })))
}
