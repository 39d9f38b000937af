use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use super::{CapturedOrder, CreatedOrder, OrderRequest, PaymentGateway, WebhookHeaders};

/// Refresh the OAuth token this long before PayPal says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct PayPalClient {
    client_id: String,
    secret: String,
    api_base: String,
    return_url: String,
    cancel_url: String,
    client: reqwest::Client,
    token: Mutex<Option<AccessToken>>,
}

impl PayPalClient {
    pub fn new(
        client_id: String,
        secret: String,
        api_base: String,
        return_url: String,
        cancel_url: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build PayPal HTTP client")?;

        Ok(Self {
            client_id,
            secret,
            api_base: api_base.trim_end_matches('/').to_string(),
            return_url,
            cancel_url,
            client,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let resp = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.secret))
            .header("Accept", "application/json")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("failed to call PayPal token endpoint")?;

        let token: TokenResponse = parse_response(resp, "PayPal token").await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);

        tracing::info!("PayPal access token obtained");
        *cached = Some(AccessToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentGateway for PayPalClient {
    async fn create_order(&self, order: &OrderRequest) -> anyhow::Result<CreatedOrder> {
        let token = self.access_token().await?;

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "custom_id": order.custom_id,
                "description": order.description,
                "amount": {
                    "currency_code": order.currency,
                    "value": format!("{:.2}", order.amount),
                },
            }],
            "application_context": {
                "return_url": self.return_url,
                "cancel_url": self.cancel_url,
            },
        });

        let resp = self
            .client
            .post(format!("{}/v2/checkout/orders", self.api_base))
            .bearer_auth(&token)
            .header("PayPal-Request-Id", format!("booking-{}-{}", order.custom_id, uuid::Uuid::new_v4()))
            .json(&body)
            .send()
            .await
            .context("failed to call PayPal create order")?;

        let order: OrderResponse = parse_response(resp, "PayPal create order").await?;
        tracing::info!(order_id = %order.id, "PayPal order created");
        Ok(order.into_created())
    }

    async fn capture_order(&self, order_id: &str) -> anyhow::Result<CapturedOrder> {
        let token = self.access_token().await?;

        let resp = self
            .client
            .post(format!("{}/v2/checkout/orders/{}/capture", self.api_base, order_id))
            .bearer_auth(&token)
            .json(&json!({}))
            .send()
            .await
            .context("failed to call PayPal capture")?;

        let capture: CaptureResponse = parse_response(resp, "PayPal capture").await?;
        tracing::info!(order_id, status = %capture.status, "PayPal order captured");
        Ok(capture.into_captured())
    }

    async fn verify_webhook_signature(
        &self,
        headers: &WebhookHeaders,
        webhook_id: &str,
        event: &serde_json::Value,
    ) -> anyhow::Result<bool> {
        let token = self.access_token().await?;

        let body = json!({
            "auth_algo": headers.auth_algo,
            "cert_url": headers.cert_url,
            "transmission_id": headers.transmission_id,
            "transmission_sig": headers.transmission_sig,
            "transmission_time": headers.transmission_time,
            "webhook_id": webhook_id,
            "webhook_event": event,
        });

        let resp = self
            .client
            .post(format!("{}/v1/notifications/verify-webhook-signature", self.api_base))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("failed to call PayPal webhook verification")?;

        let verification: VerificationResponse =
            parse_response(resp, "PayPal webhook verification").await?;
        Ok(verification.verification_status == "SUCCESS")
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    what: &str,
) -> anyhow::Result<T> {
    let status = resp.status();
    let data: serde_json::Value = resp
        .json()
        .await
        .with_context(|| format!("failed to parse {what} response"))?;

    if !status.is_success() {
        anyhow::bail!("{what} error ({status}): {data}");
    }

    serde_json::from_value(data).with_context(|| format!("unexpected {what} response shape"))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Link {
    rel: String,
    href: String,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    links: Vec<Link>,
}

impl OrderResponse {
    fn into_created(self) -> CreatedOrder {
        let approve_url = self
            .links
            .into_iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href);
        CreatedOrder {
            id: self.id,
            status: self.status,
            approve_url,
        }
    }
}

#[derive(Deserialize)]
struct CaptureResponse {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Deserialize)]
struct Capture {
    id: String,
}

impl CaptureResponse {
    fn into_captured(self) -> CapturedOrder {
        let capture_id = self
            .purchase_units
            .into_iter()
            .next()
            .and_then(|unit| unit.payments)
            .and_then(|payments| payments.captures.into_iter().next())
            .map(|capture| capture.id);
        CapturedOrder {
            order_id: self.id,
            status: self.status,
            capture_id,
        }
    }
}

#[derive(Deserialize)]
struct VerificationResponse {
    verification_status: String,
}
