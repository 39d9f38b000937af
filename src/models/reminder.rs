use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingReminder {
    pub id: i64,
    pub booking_id: i64,
    pub email: String,
    pub appointment_at: NaiveDateTime,
    pub scheduled_for: NaiveDateTime,
    pub reminder_sent: bool,
    pub sent_at: Option<NaiveDateTime>,
}
