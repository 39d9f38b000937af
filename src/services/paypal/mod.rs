pub mod client;

use async_trait::async_trait;
use axum::http::HeaderMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order to open with the provider.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    /// Echoed back on capture events; carries the booking id.
    pub custom_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub id: String,
    pub status: String,
    pub approve_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedOrder {
    pub order_id: String,
    pub status: String,
    pub capture_id: Option<String>,
}

/// Transmission headers PayPal attaches to webhook deliveries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WebhookHeaders {
    pub auth_algo: String,
    pub cert_url: String,
    pub transmission_id: String,
    pub transmission_sig: String,
    pub transmission_time: String,
}

impl WebhookHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };
        Self {
            auth_algo: get("paypal-auth-algo"),
            cert_url: get("paypal-cert-url"),
            transmission_id: get("paypal-transmission-id"),
            transmission_sig: get("paypal-transmission-sig"),
            transmission_time: get("paypal-transmission-time"),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.auth_algo.is_empty()
            && !self.cert_url.is_empty()
            && !self.transmission_id.is_empty()
            && !self.transmission_sig.is_empty()
            && !self.transmission_time.is_empty()
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, order: &OrderRequest) -> anyhow::Result<CreatedOrder>;

    async fn capture_order(&self, order_id: &str) -> anyhow::Result<CapturedOrder>;

    async fn verify_webhook_signature(
        &self,
        headers: &WebhookHeaders,
        webhook_id: &str,
        event: &serde_json::Value,
    ) -> anyhow::Result<bool>;
}
