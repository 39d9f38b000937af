use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::db;
use crate::services::email::{Email, Mailer};
use crate::services::paypal::{
    CapturedOrder, CreatedOrder, OrderRequest, PaymentGateway, WebhookHeaders,
};
use crate::state::AppState;

pub type SentEmails = Arc<Mutex<Vec<Email>>>;

#[derive(Default)]
pub struct MockGateway {
    pub fail_create: bool,
    pub fail_capture: bool,
    pub signature_valid: bool,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(&self, order: &OrderRequest) -> anyhow::Result<CreatedOrder> {
        if self.fail_create {
            anyhow::bail!("provider unavailable");
        }
        Ok(CreatedOrder {
            id: format!("ORDER-{}", order.custom_id),
            status: "CREATED".to_string(),
            approve_url: Some("https://paypal.test/approve".to_string()),
        })
    }

    async fn capture_order(&self, order_id: &str) -> anyhow::Result<CapturedOrder> {
        if self.fail_capture {
            anyhow::bail!("capture declined");
        }
        Ok(CapturedOrder {
            order_id: order_id.to_string(),
            status: "COMPLETED".to_string(),
            capture_id: Some(format!("CAPTURE-{order_id}")),
        })
    }

    async fn verify_webhook_signature(
        &self,
        _headers: &WebhookHeaders,
        _webhook_id: &str,
        _event: &serde_json::Value,
    ) -> anyhow::Result<bool> {
        Ok(self.signature_valid)
    }
}

pub struct RecordingMailer {
    sent: SentEmails,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: &Email) -> anyhow::Result<()> {
        anyhow::bail!("mail provider rejected the message")
    }
}

impl RecordingMailer {
    /// Waits for detached sends to land.
    pub async fn wait_for(sent: &SentEmails, count: usize) -> Vec<Email> {
        for _ in 0..100 {
            {
                let emails = sent.lock().unwrap();
                if emails.len() >= count {
                    return emails.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} emails, got {}", sent.lock().unwrap().len());
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        jwt_secret: "test-secret".to_string(),
        paypal_client_id: String::new(),
        paypal_secret: String::new(),
        paypal_api_base: "http://localhost:0".to_string(),
        paypal_webhook_id: String::new(), // empty = skip signature verification
        paypal_return_url: "http://localhost/success".to_string(),
        paypal_cancel_url: "http://localhost/cancel".to_string(),
        sendgrid_api_key: String::new(),
        default_from_email: "bookings@test.local".to_string(),
        owner_email: "owner@test.local".to_string(),
        booking_url: "https://shop.test/booking".to_string(),
        cors_allowed_origins: vec![],
        http_timeout_secs: 1,
        email_timeout_secs: 1,
        reminder_poll_secs: 60,
    }
}

pub fn build_state(config: AppConfig, gateway: MockGateway) -> (Arc<AppState>, SentEmails) {
    let sent: SentEmails = Arc::new(Mutex::new(vec![]));
    let mailer = RecordingMailer {
        sent: Arc::clone(&sent),
    };
    (build_state_with_mailer(config, gateway, Box::new(mailer)), sent)
}

pub fn build_state_with_mailer(
    config: AppConfig,
    gateway: MockGateway,
    mailer: Box<dyn Mailer>,
) -> Arc<AppState> {
    let conn = db::init_db(":memory:").unwrap();
    Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
        payments: Box::new(gateway),
        mailer,
    })
}

pub fn test_state() -> (Arc<AppState>, SentEmails) {
    build_state(test_config(), MockGateway::default())
}
