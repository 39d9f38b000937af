use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    mask_card_number, Booking, BookingStatus, CustomerSnapshot, PaymentMethod, PaymentStatus,
    Service, User, VehicleSnapshot,
};
use crate::services::{email, reminders};
use crate::state::AppState;

// ── Requests ──

#[derive(Debug, Default, Deserialize)]
pub struct CreateBookingRequest {
    #[serde(default, alias = "service")]
    pub service_id: Option<i64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default, rename = "motClass", alias = "mot_class")]
    pub mot_class: Option<String>,
    #[serde(default)]
    pub vehicle: VehicleInput,
    #[serde(default)]
    pub customer: CustomerInput,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub payment: PaymentInput,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VehicleInput {
    #[serde(default, deserialize_with = "loose_string")]
    pub make: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub model: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub year: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub registration: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub mileage: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    #[serde(default, deserialize_with = "loose_string")]
    pub first_name: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub last_name: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub email: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub phone: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub address: String,
}

/// Card CVV and expiry may be sent by the client; they are never read.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub card_number: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub name_on_card: String,
}

/// Accepts strings, numbers or null. Form clients send years and mileage either way.
fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

// ── Results ──

/// A booking with the records it references, as rendered to clients.
#[derive(Debug, Clone)]
pub struct BookingDetails {
    pub booking: Booking,
    pub service: Option<Service>,
    pub user: Option<User>,
}

pub fn load_details(conn: &Connection, booking: Booking) -> anyhow::Result<BookingDetails> {
    let service = queries::get_service(conn, booking.service_id)?;
    let user = match booking.user_id {
        Some(id) => queries::get_user(conn, id)?,
        None => None,
    };
    Ok(BookingDetails {
        booking,
        service,
        user,
    })
}

#[derive(Debug)]
pub enum VerifyOutcome {
    Verified(Booking),
    AlreadyVerified(Booking),
}

impl VerifyOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            VerifyOutcome::Verified(_) => "Booking successfully verified.",
            VerifyOutcome::AlreadyVerified(_) => "Booking already verified.",
        }
    }
}

// ── Operations ──

pub fn create_booking(
    state: &Arc<AppState>,
    user_id: Option<i64>,
    req: CreateBookingRequest,
) -> Result<BookingDetails, AppError> {
    let mut missing = vec![];
    if req.service_id.is_none() {
        missing.push("service_id");
    }
    if req.date.as_deref().map_or(true, |d| d.trim().is_empty()) {
        missing.push("date");
    }
    if req.time.as_deref().map_or(true, |t| t.trim().is_empty()) {
        missing.push("time");
    }
    if !missing.is_empty() {
        return Err(AppError::validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let date = parse_date(req.date.as_deref().unwrap_or_default())?;
    let time = parse_time(req.time.as_deref().unwrap_or_default())?;

    let payment_method = match req.payment.method.as_deref().map(str::trim) {
        None | Some("") => PaymentMethod::Card,
        Some(raw) => PaymentMethod::try_parse(raw)
            .ok_or_else(|| AppError::validation(format!("Invalid payment method: {raw}")))?,
    };

    let quantity = req.quantity.unwrap_or(1);
    if quantity < 1 {
        return Err(AppError::validation("Quantity must be at least 1"));
    }
    if req.price.is_some_and(|p| p.is_sign_negative()) {
        return Err(AppError::validation("Price cannot be negative"));
    }
    let requested_amount = req.price.map(|p| booking_amount(p, quantity)).transpose()?;

    let conn = state.conn()?;

    let service_id = req.service_id.unwrap_or_default();
    let service = queries::get_service(&conn, service_id)?
        .filter(|s| s.active)
        .ok_or_else(|| AppError::validation(format!("Service with id {service_id} not found")))?;

    let user = match user_id {
        Some(id) => Some(
            queries::get_user(&conn, id)?
                .ok_or_else(|| AppError::unauthorized("User not found"))?,
        ),
        None => None,
    };

    let mut customer = CustomerSnapshot {
        first_name: req.customer.first_name,
        last_name: req.customer.last_name,
        email: if req.customer.email.is_empty() {
            req.customer_email.unwrap_or_default().trim().to_string()
        } else {
            req.customer.email
        },
        phone: req.customer.phone,
        address: req.customer.address,
    };
    if let Some(user) = &user {
        fill_from_user(&mut customer, user);
    }

    if customer.email.is_empty() {
        if user.is_none() {
            return Err(AppError::validation(
                "Customer email is required for anonymous bookings",
            ));
        }
    } else if !looks_like_email(&customer.email) {
        return Err(AppError::validation("Invalid customer email address"));
    }

    let payment_amount = match requested_amount {
        Some(amount) => amount,
        None => booking_amount(service.price, quantity)?,
    };
    let now = Utc::now().naive_utc();

    let mut booking = Booking {
        id: 0,
        user_id: user.as_ref().map(|u| u.id),
        service_id: service.id,
        mot_class: req.mot_class.unwrap_or_default().trim().to_string(),
        date,
        time: time.format("%H:%M").to_string(),
        vehicle: VehicleSnapshot {
            make: req.vehicle.make,
            model: req.vehicle.model,
            year: req.vehicle.year,
            registration: req.vehicle.registration.to_uppercase(),
            mileage: req.vehicle.mileage,
        },
        customer,
        payment_method,
        card_number: if payment_method == PaymentMethod::Card {
            mask_card_number(&req.payment.card_number)
        } else {
            String::new()
        },
        name_on_card: if payment_method == PaymentMethod::Card {
            req.payment.name_on_card
        } else {
            String::new()
        },
        payment_status: PaymentStatus::Pending,
        is_paid: false,
        paypal_order_id: None,
        paypal_transaction_id: None,
        payment_amount,
        payment_currency: "GBP".to_string(),
        status: BookingStatus::Pending,
        is_verified: false,
        verification_token: new_verification_token(),
        verified_at: None,
        created_at: now,
        updated_at: now,
    };

    booking.id = queries::create_booking(&conn, &booking)?;
    tracing::info!(
        booking_id = booking.id,
        user_id = ?booking.user_id,
        service = %service.code,
        amount = %booking.payment_amount,
        "booking created"
    );

    match reminders::schedule_reminder(&conn, &booking, now) {
        Ok(Some(reminder_id)) => {
            tracing::info!(booking_id = booking.id, reminder_id, "reminder scheduled")
        }
        Ok(None) => {}
        Err(e) => tracing::error!(booking_id = booking.id, error = %e, "failed to schedule reminder"),
    }
    drop(conn);

    if booking.customer.email.is_empty() {
        tracing::info!(booking_id = booking.id, "no customer email, skipping booking confirmation");
    } else {
        let verify_url = email::templates::verification_url(
            &state.config.booking_url,
            &booking.verification_token,
        );
        let to = email::recipients(&booking.customer.email, &state.config.owner_email);
        email::dispatch_detached(
            state,
            email::templates::booking_confirmation(
                &booking,
                &service.name,
                &verify_url,
                &state.config.default_from_email,
                to,
            ),
        );
    }

    Ok(BookingDetails {
        booking,
        service: Some(service),
        user,
    })
}

pub fn list_bookings(state: &AppState, user_id: Option<i64>) -> Result<Vec<BookingDetails>, AppError> {
    let user_id = user_id.ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let conn = state.conn()?;
    let bookings = queries::get_bookings_for_user(&conn, user_id)?;
    let details = bookings
        .into_iter()
        .map(|b| load_details(&conn, b))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(details)
}

pub fn get_booking(
    state: &AppState,
    booking_id: i64,
    user_id: Option<i64>,
    customer_email: Option<&str>,
) -> Result<BookingDetails, AppError> {
    let conn = state.conn()?;
    let booking = queries::get_booking_by_id(&conn, booking_id)?
        .ok_or_else(|| AppError::not_found("Booking not found"))?;
    authorize_access(&booking, user_id, customer_email)?;
    Ok(load_details(&conn, booking)?)
}

/// Owner match for registered users, case-insensitive email match otherwise.
/// A mismatch is reported as not found so existence is not disclosed.
pub fn authorize_access(
    booking: &Booking,
    user_id: Option<i64>,
    customer_email: Option<&str>,
) -> Result<(), AppError> {
    if let Some(uid) = user_id {
        if booking.user_id == Some(uid) {
            return Ok(());
        }
    }

    let email = customer_email.map(str::trim).filter(|e| !e.is_empty());
    match email {
        Some(email) => {
            let stored = booking.customer.email.trim();
            if !stored.is_empty() && stored.eq_ignore_ascii_case(email) {
                Ok(())
            } else {
                Err(AppError::not_found("Booking not found"))
            }
        }
        None if user_id.is_some() => Err(AppError::not_found("Booking not found")),
        None => Err(AppError::validation(
            "Authentication or customer_email is required",
        )),
    }
}

pub fn verify_token(state: &AppState, token: &str) -> Result<VerifyOutcome, AppError> {
    let conn = state.conn()?;
    let booking = queries::get_booking_by_token(&conn, token)?
        .ok_or_else(|| AppError::not_found("Invalid verification token."))?;

    if booking.is_verified {
        return Ok(VerifyOutcome::AlreadyVerified(booking));
    }

    // A concurrent request may have won the conditional update.
    let changed = queries::mark_verified(&conn, booking.id)?;
    let reloaded = queries::get_booking_by_id(&conn, booking.id)?
        .ok_or_else(|| AppError::not_found("Invalid verification token."))?;

    if changed {
        tracing::info!(booking_id = reloaded.id, "booking verified");
        Ok(VerifyOutcome::Verified(reloaded))
    } else {
        Ok(VerifyOutcome::AlreadyVerified(reloaded))
    }
}

// ── Helpers ──

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation("Invalid date format. Use YYYY-MM-DD."))
}

fn parse_time(raw: &str) -> Result<NaiveTime, AppError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| AppError::validation("Invalid time format. Use HH:MM."))
}

fn fill_from_user(customer: &mut CustomerSnapshot, user: &User) {
    if customer.first_name.is_empty() {
        customer.first_name = user.first_name.clone();
    }
    if customer.last_name.is_empty() {
        customer.last_name = user.last_name.clone();
    }
    if customer.email.is_empty() {
        customer.email = user.email.clone();
    }
}

fn booking_amount(unit_price: Decimal, quantity: i64) -> Result<Decimal, AppError> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .map(|amount| amount.round_dp(2))
        .ok_or_else(|| AppError::validation("Invalid price or quantity"))
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(' '),
        None => false,
    }
}

/// Two v4 UUIDs (244 random bits), URL-safe base64 without padding.
fn new_verification_token() -> String {
    let mut bytes = [0u8; 32];
    bytes[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    bytes[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_state, RecordingMailer};

    fn anonymous_request(email: &str) -> CreateBookingRequest {
        serde_json::from_value(serde_json::json!({
            "service_id": 1,
            "date": "2099-08-15",
            "time": "10:00",
            "customer_email": email,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_booking_defaults() {
        let (state, _) = test_state();
        let details = create_booking(&state, None, anonymous_request("a@b.com")).unwrap();
        let b = &details.booking;

        assert!(b.user_id.is_none());
        assert_eq!(b.status, BookingStatus::Pending);
        assert_eq!(b.payment_status, PaymentStatus::Pending);
        assert!(!b.is_paid);
        assert!(!b.is_verified);
        assert_eq!(b.payment_amount, Decimal::new(5485, 2));
        assert_eq!(b.verification_token.len(), 43);
        assert_eq!(details.service.as_ref().unwrap().code, "mot");
    }

    #[tokio::test]
    async fn test_anonymous_booking_requires_email() {
        let (state, _) = test_state();
        let err = create_booking(&state, None, anonymous_request("")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_fields_reported_together() {
        let (state, _) = test_state();
        let req: CreateBookingRequest =
            serde_json::from_value(serde_json::json!({ "customer_email": "a@b.com" })).unwrap();
        match create_booking(&state, None, req).unwrap_err() {
            AppError::Validation(msg) => assert_eq!(msg, "Missing required fields: service_id, date, time"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_date_and_unknown_service() {
        let (state, _) = test_state();

        let mut req = anonymous_request("a@b.com");
        req.date = Some("15/08/2025".to_string());
        assert!(matches!(create_booking(&state, None, req), Err(AppError::Validation(_))));

        let mut req = anonymous_request("a@b.com");
        req.service_id = Some(999);
        assert!(matches!(create_booking(&state, None, req), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_full_payload_amount_and_card_masking() {
        let (state, _) = test_state();
        let req: CreateBookingRequest = serde_json::from_value(serde_json::json!({
            "service_id": 2,
            "date": "2099-01-10",
            "time": "09:30",
            "motClass": "Class 4",
            "vehicle": { "make": "Ford", "model": "Focus", "year": 2019, "registration": "ab12 cde", "mileage": 42000 },
            "customer": { "firstName": "Jane", "lastName": "Doe", "email": "jane@example.com", "phone": "07700 900000" },
            "payment": { "method": "card", "cardNumber": "4111 1111 1111 1234", "nameOnCard": "J DOE", "cvv": "123" },
            "price": "20.50",
            "quantity": 3
        }))
        .unwrap();

        let b = create_booking(&state, None, req).unwrap().booking;
        assert_eq!(b.payment_amount, Decimal::new(6150, 2));
        assert_eq!(b.card_number, "**** 1234");
        assert_eq!(b.name_on_card, "J DOE");
        assert_eq!(b.vehicle.year, "2019");
        assert_eq!(b.vehicle.registration, "AB12 CDE");
        assert_eq!(b.mot_class, "Class 4");
    }

    #[tokio::test]
    async fn test_overflowing_amount_rejected_without_poisoning_db() {
        let (state, _) = test_state();
        let mut req = anonymous_request("a@b.com");
        req.price = Some("10000000000".parse().unwrap());
        req.quantity = Some(9_000_000_000_000_000_000);

        match create_booking(&state, None, req) {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "Invalid price or quantity"),
            other => panic!("expected validation error, got {:?}", other.map(|d| d.booking.id)),
        }

        assert!(state.conn().is_ok());
        assert!(create_booking(&state, None, anonymous_request("a@b.com")).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_payment_method_rejected() {
        let (state, _) = test_state();
        let mut req = anonymous_request("a@b.com");
        req.payment.method = Some("bitcoin".to_string());
        assert!(matches!(create_booking(&state, None, req), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_authenticated_booking_fills_customer_from_user() {
        let (state, _) = test_state();
        let user_id = {
            let conn = state.conn().unwrap();
            queries::create_user(&conn, "jdoe", "jdoe@example.com", "John", "Doe").unwrap()
        };

        let req: CreateBookingRequest = serde_json::from_value(serde_json::json!({
            "service_id": 1, "date": "2099-08-15", "time": "10:00"
        }))
        .unwrap();
        let details = create_booking(&state, Some(user_id), req).unwrap();

        assert_eq!(details.booking.user_id, Some(user_id));
        assert_eq!(details.booking.customer.email, "jdoe@example.com");
        assert_eq!(details.booking.customer.first_name, "John");
        assert_eq!(details.user.unwrap().username, "jdoe");
    }

    #[tokio::test]
    async fn test_future_booking_schedules_reminder() {
        let (state, _) = test_state();
        let id = create_booking(&state, None, anonymous_request("a@b.com"))
            .unwrap()
            .booking
            .id;
        let conn = state.conn().unwrap();
        let reminders = queries::get_reminders_for_booking(&conn, id).unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].email, "a@b.com");
    }

    #[tokio::test]
    async fn test_confirmation_email_sent_to_customer_and_owner() {
        let (state, mailer) = test_state();
        let details = create_booking(&state, None, anonymous_request("a@b.com")).unwrap();

        let sent = RecordingMailer::wait_for(&mailer, 1).await;
        assert_eq!(sent[0].to, vec!["a@b.com", "owner@test.local"]);
        assert!(sent[0].subject.starts_with("Booking Confirmation"));
        assert!(sent[0].body.contains(&format!(
            "https://shop.test/booking?verify={}",
            details.booking.verification_token
        )));
    }

    #[tokio::test]
    async fn test_no_confirmation_without_customer_email() {
        let (state, mailer) = test_state();
        let user_id = {
            let conn = state.conn().unwrap();
            queries::create_user(&conn, "noemail", "", "No", "Email").unwrap()
        };
        let req: CreateBookingRequest = serde_json::from_value(serde_json::json!({
            "service_id": 1, "date": "2099-08-15", "time": "10:00"
        }))
        .unwrap();

        let details = create_booking(&state, Some(user_id), req).unwrap();
        assert!(details.booking.customer.email.is_empty());

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(mailer.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authorize_access_rules() {
        let (state, _) = test_state();
        let booking = create_booking(&state, None, anonymous_request("Jane@Example.com"))
            .unwrap()
            .booking;

        assert!(authorize_access(&booking, None, Some("jane@example.com")).is_ok());
        assert!(matches!(
            authorize_access(&booking, None, Some("other@example.com")),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            authorize_access(&booking, Some(5), None),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            authorize_access(&booking, None, None),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_token_is_idempotent() {
        let (state, _) = test_state();
        let booking = create_booking(&state, None, anonymous_request("a@b.com"))
            .unwrap()
            .booking;

        let first = verify_token(&state, &booking.verification_token).unwrap();
        let VerifyOutcome::Verified(first) = first else {
            panic!("expected first verification to succeed");
        };
        assert!(first.is_verified);
        assert!(first.verified_at.is_some());

        let second = verify_token(&state, &booking.verification_token).unwrap();
        assert_eq!(second.message(), "Booking already verified.");
        let VerifyOutcome::AlreadyVerified(second) = second else {
            panic!("expected already verified");
        };
        assert_eq!(first.verified_at, second.verified_at);

        assert!(matches!(
            verify_token(&state, "nope"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_verification_tokens_are_unique() {
        let a = new_verification_token();
        let b = new_verification_token();
        assert_ne!(a, b);
        assert!(!a.contains('=') && !a.contains('+') && !a.contains('/'));
    }
}
