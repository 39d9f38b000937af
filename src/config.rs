use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub jwt_secret: String,
    pub paypal_client_id: String,
    pub paypal_secret: String,
    pub paypal_api_base: String,
    pub paypal_webhook_id: String,
    pub paypal_return_url: String,
    pub paypal_cancel_url: String,
    pub sendgrid_api_key: String,
    pub default_from_email: String,
    pub owner_email: String,
    pub booking_url: String,
    pub cors_allowed_origins: Vec<String>,
    pub http_timeout_secs: u64,
    pub email_timeout_secs: u64,
    pub reminder_poll_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parse_var("PORT", 8000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "autobook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "changeme".to_string()),
            paypal_client_id: env::var("PAYPAL_CLIENT_ID").unwrap_or_default(),
            paypal_secret: env::var("PAYPAL_SECRET").unwrap_or_default(),
            paypal_api_base: env::var("PAYPAL_API_BASE")
                .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string()),
            paypal_webhook_id: env::var("PAYPAL_WEBHOOK_ID").unwrap_or_default(),
            paypal_return_url: env::var("PAYPAL_RETURN_URL")
                .unwrap_or_else(|_| "http://localhost:3000/booking/success".to_string()),
            paypal_cancel_url: env::var("PAYPAL_CANCEL_URL")
                .unwrap_or_else(|_| "http://localhost:3000/booking/cancel".to_string()),
            sendgrid_api_key: env::var("SENDGRID_API_KEY").unwrap_or_default(),
            default_from_email: env::var("DEFAULT_FROM_EMAIL")
                .unwrap_or_else(|_| "bookings@localhost".to_string()),
            owner_email: env::var("OWNER_EMAIL").unwrap_or_default(),
            booking_url: env::var("BOOKING_URL")
                .unwrap_or_else(|_| "http://localhost:3000/booking".to_string()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| split_origins(&v))
                .unwrap_or_default(),
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", 10),
            email_timeout_secs: parse_var("EMAIL_TIMEOUT_SECS", 10),
            reminder_poll_secs: parse_var("REMINDER_POLL_SECS", 60),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}
