pub mod sendgrid;
pub mod templates;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: Vec<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Customer plus the shop owner, without duplicates or blanks.
pub fn recipients(customer_email: &str, owner_email: &str) -> Vec<String> {
    let mut to = Vec::new();
    if !customer_email.trim().is_empty() {
        to.push(customer_email.trim().to_string());
    }
    let owner = owner_email.trim();
    if !owner.is_empty() && !to.iter().any(|e| e.eq_ignore_ascii_case(owner)) {
        to.push(owner.to_string());
    }
    to
}

/// Sends with a timeout. The outcome is logged, never returned.
pub async fn send_with_timeout(state: &AppState, email: &Email) -> bool {
    let timeout = Duration::from_secs(state.config.email_timeout_secs);
    match tokio::time::timeout(timeout, state.mailer.send(email)).await {
        Ok(Ok(())) => {
            tracing::info!(to = ?email.to, subject = %email.subject, "email sent");
            true
        }
        Ok(Err(e)) => {
            tracing::error!(error = ?e, to = ?email.to, subject = %email.subject, "email send failed");
            false
        }
        Err(_) => {
            tracing::error!(to = ?email.to, subject = %email.subject, "email send timed out");
            false
        }
    }
}

/// Fire-and-forget send on a background task.
pub fn dispatch_detached(state: &Arc<AppState>, email: Email) {
    if email.to.is_empty() {
        tracing::warn!(subject = %email.subject, "no recipients, skipping email");
        return;
    }

    let state = Arc::clone(state);
    tokio::spawn(async move {
        send_with_timeout(&state, &email).await;
    });
}
