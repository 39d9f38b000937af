//! Payment state transitions for bookings.
//!
//! Three independent entry points move a booking's payment columns: order
//! creation, the capture endpoint, and provider webhooks. Every transition is
//! written as one `UPDATE` so concurrent callers cannot clobber fields they did
//! not touch. Confirmation emails are dispatched after the write and never
//! affect the outcome.

use std::sync::Arc;

use axum::http::HeaderMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    mask_card_number, Booking, BookingStatus, PaymentMethod, PaymentStatus, PaymentUpdate,
};
use crate::services::bookings::authorize_access;
use crate::services::email::{self, templates};
use crate::services::paypal::{OrderRequest, WebhookHeaders};
use crate::state::AppState;

// ── Create order ──

#[derive(Debug, Default, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub booking_id: Option<i64>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderCreated {
    pub order_id: String,
    pub booking_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub approve_url: Option<String>,
}

pub async fn create_order(
    state: &AppState,
    user_id: Option<i64>,
    req: CreateOrderRequest,
) -> Result<OrderCreated, AppError> {
    let booking_id = req
        .booking_id
        .ok_or_else(|| AppError::validation("Missing booking_id"))?;

    let (booking, service_name) = {
        let conn = state.conn()?;
        let booking = load_authorized(&conn, booking_id, user_id, req.customer_email.as_deref())?;
        if booking.is_paid {
            return Err(AppError::AlreadyPaid);
        }
        let service_name = service_name(&conn, &booking)?;
        (booking, service_name)
    };

    let order = OrderRequest {
        amount: booking.payment_amount,
        currency: booking.payment_currency.clone(),
        description: format!("Booking for {service_name} on {}", booking.date.format("%Y-%m-%d")),
        custom_id: booking.id.to_string(),
    };

    let created = state.payments.create_order(&order).await.map_err(|e| {
        tracing::error!(booking_id, error = ?e, "failed to create PayPal order");
        AppError::OrderCreationFailed
    })?;

    {
        let conn = state.conn()?;
        queries::set_paypal_order(&conn, booking_id, &created.id)?;
    }
    tracing::info!(booking_id, order_id = %created.id, "PayPal order created");

    Ok(OrderCreated {
        order_id: created.id,
        booking_id,
        amount: booking.payment_amount,
        currency: booking.payment_currency,
        approve_url: created.approve_url,
    })
}

// ── Capture ──

#[derive(Debug, Default, Deserialize)]
pub struct CaptureRequest {
    #[serde(default)]
    pub booking_id: Option<i64>,
    #[serde(default, alias = "order_id")]
    pub paypal_order_id: Option<String>,
    #[serde(default, alias = "method")]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub name_on_card: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CaptureOutcome {
    pub message: String,
    pub booking_id: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub is_paid: bool,
    pub transaction_id: Option<String>,
}

pub async fn capture_payment(
    state: &Arc<AppState>,
    user_id: Option<i64>,
    req: CaptureRequest,
) -> Result<CaptureOutcome, AppError> {
    let booking_id = req
        .booking_id
        .ok_or_else(|| AppError::validation("Missing booking_id"))?;

    let method = match req.payment_method.as_deref().map(str::trim) {
        None | Some("") => PaymentMethod::Paypal,
        Some(raw) => PaymentMethod::try_parse(raw)
            .ok_or_else(|| AppError::validation(format!("Invalid payment method: {raw}")))?,
    };

    let booking = {
        let conn = state.conn()?;
        load_authorized(&conn, booking_id, user_id, req.customer_email.as_deref())?
    };
    if booking.is_paid {
        return Err(AppError::AlreadyPaid);
    }

    match method {
        PaymentMethod::Cash => {
            let mut update = PaymentUpdate::new(PaymentStatus::Pending, false);
            update.payment_method = Some(PaymentMethod::Cash);
            write_update(state, booking_id, &update)?;
            tracing::info!(booking_id, "cash payment selected, due on arrival");

            Ok(CaptureOutcome {
                message: "Cash payment selected. Please pay on arrival.".to_string(),
                booking_id,
                payment_method: PaymentMethod::Cash,
                payment_status: PaymentStatus::Pending,
                is_paid: false,
                transaction_id: None,
            })
        }
        PaymentMethod::Card => {
            let masked = mask_card_number(req.card_number.as_deref().unwrap_or_default());
            if masked.is_empty() {
                return Err(AppError::validation("Missing card_number"));
            }

            let mut update = PaymentUpdate::new(PaymentStatus::Pending, false);
            update.payment_method = Some(PaymentMethod::Card);
            update.card_number = Some(masked);
            update.name_on_card = req.name_on_card.map(|n| n.trim().to_string());
            write_update(state, booking_id, &update)?;
            tracing::info!(booking_id, "card details recorded, payment pending");

            Ok(CaptureOutcome {
                message: "Card details received. Payment is pending.".to_string(),
                booking_id,
                payment_method: PaymentMethod::Card,
                payment_status: PaymentStatus::Pending,
                is_paid: false,
                transaction_id: None,
            })
        }
        PaymentMethod::Paypal => capture_paypal(state, booking, req.paypal_order_id).await,
    }
}

async fn capture_paypal(
    state: &Arc<AppState>,
    booking: Booking,
    requested_order_id: Option<String>,
) -> Result<CaptureOutcome, AppError> {
    let booking_id = booking.id;
    let order_id = requested_order_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| booking.paypal_order_id.clone())
        .ok_or_else(|| AppError::validation("Missing booking_id or paypal_order_id"))?;

    let captured = state.payments.capture_order(&order_id).await.map_err(|e| {
        tracing::error!(booking_id, order_id = %order_id, error = ?e, "PayPal capture failed");
        AppError::CaptureFailed
    })?;

    let transaction_id = captured.capture_id.unwrap_or_else(|| order_id.clone());

    let mut update = PaymentUpdate::new(PaymentStatus::Completed, true);
    update.payment_method = Some(PaymentMethod::Paypal);
    update.paypal_order_id = Some(order_id.clone());
    update.paypal_transaction_id = Some(transaction_id.clone());
    update.status = Some(BookingStatus::Confirmed);
    write_update(state, booking_id, &update)?;

    tracing::info!(booking_id, order_id = %order_id, transaction_id = %transaction_id, "payment captured");
    send_payment_confirmation(state, booking_id);

    Ok(CaptureOutcome {
        message: "Payment captured successfully!".to_string(),
        booking_id,
        payment_method: PaymentMethod::Paypal,
        payment_status: PaymentStatus::Completed,
        is_paid: true,
        transaction_id: Some(transaction_id),
    })
}

// ── Webhook ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookOutcome {
    Processed,
    Ignored,
}

pub async fn handle_webhook(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookOutcome, AppError> {
    let event: Value = serde_json::from_slice(body)
        .map_err(|_| AppError::validation("Invalid webhook payload"))?;

    if !state.config.paypal_webhook_id.is_empty() {
        verify_signature(state, headers, &event).await?;
    }

    let event_type = event
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let resource = event.get("resource").cloned().unwrap_or(Value::Null);

    let Some(mut update) = transition_for(event_type) else {
        tracing::info!(event_type, "unhandled webhook event, ignoring");
        return Ok(WebhookOutcome::Ignored);
    };

    let (booking_id, was_paid) = {
        let conn = state.conn()?;
        let Some(booking) = correlate(&conn, &resource)? else {
            tracing::warn!(
                event_type,
                custom_id = ?resource.get("custom_id"),
                "webhook does not match any booking, ignoring"
            );
            return Ok(WebhookOutcome::Ignored);
        };

        if update.payment_status == PaymentStatus::Completed {
            update.paypal_transaction_id = resource
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        queries::apply_payment_update(&conn, booking.id, &update)?;
        (booking.id, booking.is_paid)
    };

    tracing::info!(
        booking_id,
        event_type,
        payment_status = update.payment_status.as_str(),
        "webhook applied"
    );

    if update.is_paid && !was_paid {
        send_payment_confirmation(state, booking_id);
    }

    Ok(WebhookOutcome::Processed)
}

async fn verify_signature(
    state: &AppState,
    headers: &HeaderMap,
    event: &Value,
) -> Result<(), AppError> {
    let transmission = WebhookHeaders::from_headers(headers);
    if !transmission.is_complete() {
        tracing::warn!("webhook missing PayPal transmission headers");
        return Err(AppError::InvalidSignature);
    }

    match state
        .payments
        .verify_webhook_signature(&transmission, &state.config.paypal_webhook_id, event)
        .await
    {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::warn!(transmission_id = %transmission.transmission_id, "webhook signature rejected");
            Err(AppError::InvalidSignature)
        }
        Err(e) => {
            tracing::warn!(error = ?e, "webhook signature verification failed");
            Err(AppError::InvalidSignature)
        }
    }
}

/// Payment columns to write for a capture event, or `None` for events we ignore.
fn transition_for(event_type: &str) -> Option<PaymentUpdate> {
    match event_type {
        "PAYMENT.CAPTURE.COMPLETED" => {
            let mut update = PaymentUpdate::new(PaymentStatus::Completed, true);
            update.status = Some(BookingStatus::Confirmed);
            Some(update)
        }
        "PAYMENT.CAPTURE.DENIED" => Some(PaymentUpdate::new(PaymentStatus::Failed, false)),
        "PAYMENT.CAPTURE.REFUNDED" => Some(PaymentUpdate::new(PaymentStatus::Refunded, false)),
        _ => None,
    }
}

/// `custom_id` carries the booking id; older orders only match by order id.
fn correlate(conn: &rusqlite::Connection, resource: &Value) -> anyhow::Result<Option<Booking>> {
    let custom_id = resource
        .get("custom_id")
        .and_then(|v| match v {
            Value::String(s) => s.trim().parse::<i64>().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        });
    if let Some(id) = custom_id {
        if let Some(booking) = queries::get_booking_by_id(conn, id)? {
            return Ok(Some(booking));
        }
    }

    let order_id = resource
        .pointer("/supplementary_data/related_ids/order_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    match order_id {
        Some(order_id) => queries::get_booking_by_paypal_order(conn, order_id),
        None => Ok(None),
    }
}

// ── Helpers ──

fn load_authorized(
    conn: &rusqlite::Connection,
    booking_id: i64,
    user_id: Option<i64>,
    customer_email: Option<&str>,
) -> Result<Booking, AppError> {
    let booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::not_found("Booking not found"))?;
    authorize_access(&booking, user_id, customer_email)?;
    Ok(booking)
}

fn service_name(conn: &rusqlite::Connection, booking: &Booking) -> anyhow::Result<String> {
    Ok(queries::get_service(conn, booking.service_id)?
        .map(|s| s.name)
        .unwrap_or_else(|| "Service".to_string()))
}

fn write_update(state: &AppState, booking_id: i64, update: &PaymentUpdate) -> Result<(), AppError> {
    let conn = state.conn()?;
    if !queries::apply_payment_update(&conn, booking_id, update)? {
        return Err(AppError::not_found("Booking not found"));
    }
    Ok(())
}

/// Reloads the booking so the email carries the stored transaction id.
fn send_payment_confirmation(state: &Arc<AppState>, booking_id: i64) {
    let loaded = state.conn().map_err(anyhow::Error::from).and_then(|conn| {
        let booking = queries::get_booking_by_id(&conn, booking_id)?;
        match booking {
            Some(b) => {
                let name = service_name(&conn, &b)?;
                Ok(Some((b, name)))
            }
            None => Ok(None),
        }
    });

    match loaded {
        Ok(Some((booking, service_name))) => {
            let to = email::recipients(&booking.customer.email, &state.config.owner_email);
            email::dispatch_detached(
                state,
                templates::payment_confirmation(
                    &booking,
                    &service_name,
                    &state.config.default_from_email,
                    to,
                ),
            );
        }
        Ok(None) => {}
        Err(e) => tracing::error!(booking_id, error = ?e, "failed to prepare payment confirmation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bookings::{self, CreateBookingRequest};
    use crate::test_support::{build_state, test_config, test_state, MockGateway, RecordingMailer};

    fn new_booking(state: &Arc<AppState>, email: &str) -> Booking {
        let req: CreateBookingRequest = serde_json::from_value(serde_json::json!({
            "service_id": 1,
            "date": "2099-08-15",
            "time": "10:00",
            "customer_email": email,
        }))
        .unwrap();
        bookings::create_booking(state, None, req).unwrap().booking
    }

    fn reload(state: &AppState, id: i64) -> Booking {
        let conn = state.conn().unwrap();
        queries::get_booking_by_id(&conn, id).unwrap().unwrap()
    }

    fn mark_paid(state: &AppState, id: i64) {
        let conn = state.conn().unwrap();
        queries::apply_payment_update(&conn, id, &PaymentUpdate::new(PaymentStatus::Completed, true))
            .unwrap();
    }

    fn capture_req(booking_id: i64, method: &str) -> CaptureRequest {
        CaptureRequest {
            booking_id: Some(booking_id),
            payment_method: Some(method.to_string()),
            customer_email: Some("a@b.com".to_string()),
            ..Default::default()
        }
    }

    fn webhook_body(event_type: &str, resource: Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "WH-1",
            "event_type": event_type,
            "resource": resource,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_order_stores_order_id() {
        let (state, _) = test_state();
        let booking = new_booking(&state, "a@b.com");

        let created = create_order(
            &state,
            None,
            CreateOrderRequest {
                booking_id: Some(booking.id),
                customer_email: Some("a@b.com".to_string()),
            },
        )
        .await
        .unwrap();

        assert_eq!(created.order_id, format!("ORDER-{}", booking.id));
        assert_eq!(created.amount, Decimal::new(5485, 2));
        assert_eq!(created.currency, "GBP");

        let stored = reload(&state, booking.id);
        assert_eq!(stored.payment_status, PaymentStatus::Created);
        assert_eq!(stored.paypal_order_id.as_deref(), Some(created.order_id.as_str()));
    }

    #[tokio::test]
    async fn test_create_order_rejects_paid_booking() {
        let (state, _) = test_state();
        let booking = new_booking(&state, "a@b.com");
        mark_paid(&state, booking.id);

        let err = create_order(
            &state,
            None,
            CreateOrderRequest {
                booking_id: Some(booking.id),
                customer_email: Some("a@b.com".to_string()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::AlreadyPaid));
    }

    #[tokio::test]
    async fn test_create_order_provider_failure_leaves_state() {
        let (state, _) = build_state(
            test_config(),
            MockGateway {
                fail_create: true,
                ..Default::default()
            },
        );
        let booking = new_booking(&state, "a@b.com");

        let err = create_order(
            &state,
            None,
            CreateOrderRequest {
                booking_id: Some(booking.id),
                customer_email: Some("a@b.com".to_string()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::OrderCreationFailed));

        let stored = reload(&state, booking.id);
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert!(stored.paypal_order_id.is_none());
    }

    #[tokio::test]
    async fn test_create_order_requires_booking_id_and_access() {
        let (state, _) = test_state();
        let booking = new_booking(&state, "a@b.com");

        let err = create_order(&state, None, CreateOrderRequest::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = create_order(
            &state,
            None,
            CreateOrderRequest {
                booking_id: Some(booking.id),
                customer_email: Some("intruder@example.com".to_string()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cash_capture_never_marks_paid() {
        let (state, _) = test_state();
        let booking = new_booking(&state, "a@b.com");

        let outcome = capture_payment(&state, None, capture_req(booking.id, "cash"))
            .await
            .unwrap();
        assert!(!outcome.is_paid);

        let stored = reload(&state, booking.id);
        assert_eq!(stored.payment_method, PaymentMethod::Cash);
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert!(!stored.is_paid);
    }

    #[tokio::test]
    async fn test_card_capture_stores_masked_suffix() {
        let (state, _) = test_state();
        let booking = new_booking(&state, "a@b.com");

        let mut req = capture_req(booking.id, "card");
        let err = capture_payment(&state, None, capture_req(booking.id, "card"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        req.card_number = Some("4111111111119876".to_string());
        req.name_on_card = Some("A B".to_string());
        capture_payment(&state, None, req).await.unwrap();

        let stored = reload(&state, booking.id);
        assert_eq!(stored.card_number, "**** 9876");
        assert_eq!(stored.name_on_card, "A B");
        assert!(!stored.is_paid);
    }

    #[tokio::test]
    async fn test_cash_capture_cannot_unpay_booking() {
        let (state, _) = test_state();
        let booking = new_booking(&state, "a@b.com");
        mark_paid(&state, booking.id);

        let err = capture_payment(&state, None, capture_req(booking.id, "cash"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyPaid));
        assert!(reload(&state, booking.id).is_paid);
    }

    #[tokio::test]
    async fn test_paypal_capture_uses_stored_order() {
        let (state, sent) = test_state();
        let booking = new_booking(&state, "a@b.com");
        RecordingMailer::wait_for(&sent, 1).await;
        create_order(
            &state,
            None,
            CreateOrderRequest {
                booking_id: Some(booking.id),
                customer_email: Some("a@b.com".to_string()),
            },
        )
        .await
        .unwrap();

        let outcome = capture_payment(&state, None, capture_req(booking.id, "paypal"))
            .await
            .unwrap();
        assert!(outcome.is_paid);
        assert_eq!(outcome.transaction_id.as_deref(), Some("CAPTURE-ORDER-1"));

        let stored = reload(&state, booking.id);
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(stored.paypal_transaction_id.as_deref(), Some("CAPTURE-ORDER-1"));

        let emails = RecordingMailer::wait_for(&sent, 2).await;
        assert_eq!(emails[1].subject, "Payment Confirmed - Booking Confirmed");
        assert!(emails[1].body.contains("Transaction ID: CAPTURE-ORDER-1"));
    }

    #[tokio::test]
    async fn test_paypal_capture_without_order_rejected() {
        let (state, _) = test_state();
        let booking = new_booking(&state, "a@b.com");
        let err = capture_payment(&state, None, capture_req(booking.id, "paypal"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_paypal_capture_failure_keeps_state() {
        let (state, _) = build_state(
            test_config(),
            MockGateway {
                fail_capture: true,
                ..Default::default()
            },
        );
        let booking = new_booking(&state, "a@b.com");

        let mut req = capture_req(booking.id, "paypal");
        req.paypal_order_id = Some("ORDER-X".to_string());
        let err = capture_payment(&state, None, req).await.unwrap_err();
        assert!(matches!(err, AppError::CaptureFailed));

        let stored = reload(&state, booking.id);
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert!(!stored.is_paid);
    }

    #[tokio::test]
    async fn test_webhook_completed_marks_paid() {
        let (state, _) = test_state();
        let booking = new_booking(&state, "a@b.com");

        let body = webhook_body(
            "PAYMENT.CAPTURE.COMPLETED",
            serde_json::json!({ "id": "CAP-9", "custom_id": booking.id.to_string() }),
        );
        let outcome = handle_webhook(&state, &HeaderMap::new(), &body).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);

        let stored = reload(&state, booking.id);
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert!(stored.is_paid);
        assert_eq!(stored.paypal_transaction_id.as_deref(), Some("CAP-9"));
    }

    #[tokio::test]
    async fn test_webhook_refund_and_denial_clear_paid() {
        let (state, _) = test_state();
        let booking = new_booking(&state, "a@b.com");
        mark_paid(&state, booking.id);

        let body = webhook_body(
            "PAYMENT.CAPTURE.REFUNDED",
            serde_json::json!({ "id": "RF-1", "custom_id": booking.id }),
        );
        handle_webhook(&state, &HeaderMap::new(), &body).await.unwrap();
        let stored = reload(&state, booking.id);
        assert_eq!(stored.payment_status, PaymentStatus::Refunded);
        assert!(!stored.is_paid);

        let body = webhook_body(
            "PAYMENT.CAPTURE.DENIED",
            serde_json::json!({ "id": "DN-1", "custom_id": booking.id }),
        );
        handle_webhook(&state, &HeaderMap::new(), &body).await.unwrap();
        assert_eq!(reload(&state, booking.id).payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_webhook_correlates_by_order_id() {
        let (state, _) = test_state();
        let booking = new_booking(&state, "a@b.com");
        {
            let conn = state.conn().unwrap();
            queries::set_paypal_order(&conn, booking.id, "ORDER-77").unwrap();
        }

        let body = webhook_body(
            "PAYMENT.CAPTURE.COMPLETED",
            serde_json::json!({
                "id": "CAP-77",
                "supplementary_data": { "related_ids": { "order_id": "ORDER-77" } }
            }),
        );
        assert_eq!(
            handle_webhook(&state, &HeaderMap::new(), &body).await.unwrap(),
            WebhookOutcome::Processed
        );
        assert!(reload(&state, booking.id).is_paid);
    }

    #[tokio::test]
    async fn test_webhook_unknown_booking_ignored() {
        let (state, _) = test_state();
        let body = webhook_body(
            "PAYMENT.CAPTURE.COMPLETED",
            serde_json::json!({ "id": "CAP-1", "custom_id": "424242" }),
        );
        assert_eq!(
            handle_webhook(&state, &HeaderMap::new(), &body).await.unwrap(),
            WebhookOutcome::Ignored
        );

        let body = webhook_body("CHECKOUT.ORDER.APPROVED", serde_json::json!({}));
        assert_eq!(
            handle_webhook(&state, &HeaderMap::new(), &body).await.unwrap(),
            WebhookOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_webhook_replay_reapplies_without_second_email() {
        let (state, sent) = test_state();
        let booking = new_booking(&state, "a@b.com");
        RecordingMailer::wait_for(&sent, 1).await;

        let body = webhook_body(
            "PAYMENT.CAPTURE.COMPLETED",
            serde_json::json!({ "id": "CAP-5", "custom_id": booking.id }),
        );
        handle_webhook(&state, &HeaderMap::new(), &body).await.unwrap();
        RecordingMailer::wait_for(&sent, 2).await;
        handle_webhook(&state, &HeaderMap::new(), &body).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(sent.lock().unwrap().len(), 2);
        assert!(reload(&state, booking.id).is_paid);
    }

    #[tokio::test]
    async fn test_webhook_signature_enforced_when_configured() {
        let mut config = test_config();
        config.paypal_webhook_id = "WH-CONFIG".to_string();
        let (state, _) = build_state(config, MockGateway::default());
        let booking = new_booking(&state, "a@b.com");

        let body = webhook_body(
            "PAYMENT.CAPTURE.COMPLETED",
            serde_json::json!({ "id": "CAP-1", "custom_id": booking.id }),
        );
        let err = handle_webhook(&state, &HeaderMap::new(), &body).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));
        assert!(!reload(&state, booking.id).is_paid);
    }

    #[tokio::test]
    async fn test_webhook_signature_accepted() {
        let mut config = test_config();
        config.paypal_webhook_id = "WH-CONFIG".to_string();
        let (state, _) = build_state(
            config,
            MockGateway {
                signature_valid: true,
                ..Default::default()
            },
        );
        let booking = new_booking(&state, "a@b.com");

        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("paypal-auth-algo", "SHA256withRSA"),
            ("paypal-cert-url", "https://api.paypal.com/cert"),
            ("paypal-transmission-id", "T-1"),
            ("paypal-transmission-sig", "sig"),
            ("paypal-transmission-time", "2025-01-01T00:00:00Z"),
        ] {
            headers.insert(name, value.parse().unwrap());
        }

        let body = webhook_body(
            "PAYMENT.CAPTURE.COMPLETED",
            serde_json::json!({ "id": "CAP-1", "custom_id": booking.id }),
        );
        assert_eq!(
            handle_webhook(&state, &headers, &body).await.unwrap(),
            WebhookOutcome::Processed
        );
    }
}
