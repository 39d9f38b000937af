use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use autobook::config::AppConfig;
use autobook::db;
use autobook::handlers;
use autobook::services::email::sendgrid::SendGridMailer;
use autobook::services::paypal::client::PayPalClient;
use autobook::services::reminders;
use autobook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.paypal_client_id.is_empty() || config.paypal_secret.is_empty() {
        tracing::warn!("PAYPAL_CLIENT_ID / PAYPAL_SECRET not set, PayPal calls will fail");
    }
    if config.paypal_webhook_id.is_empty() {
        tracing::warn!("PAYPAL_WEBHOOK_ID not set, webhook signatures will not be verified");
    }
    tracing::info!("using PayPal API at {}", config.paypal_api_base);

    let payments = PayPalClient::new(
        config.paypal_client_id.clone(),
        config.paypal_secret.clone(),
        config.paypal_api_base.clone(),
        config.paypal_return_url.clone(),
        config.paypal_cancel_url.clone(),
        Duration::from_secs(config.http_timeout_secs),
    )?;
    let mailer = SendGridMailer::new(
        config.sendgrid_api_key.clone(),
        Duration::from_secs(config.email_timeout_secs),
    )?;

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        payments: Box::new(payments),
        mailer: Box::new(mailer),
    });

    tokio::spawn(reminders::reminder_task(Arc::clone(&state)));

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
