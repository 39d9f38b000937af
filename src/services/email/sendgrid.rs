use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{Email, Mailer};

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendGridMailer {
    api_key: String,
    client: reqwest::Client,
}

impl SendGridMailer {
    pub fn new(api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build SendGrid HTTP client")?;
        Ok(Self { api_key, client })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            tracing::warn!(to = ?email.to, subject = %email.subject, "SENDGRID_API_KEY not configured, skipping email");
            return Ok(());
        }

        let to: Vec<_> = email.to.iter().map(|addr| json!({ "email": addr })).collect();
        let body = json!({
            "personalizations": [{ "to": to }],
            "from": { "email": email.from },
            "subject": email.subject,
            "content": [{ "type": "text/plain", "value": email.body }],
        });

        self.client
            .post(SENDGRID_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to send email via SendGrid")?
            .error_for_status()
            .context("SendGrid API returned error")?;

        Ok(())
    }
}
