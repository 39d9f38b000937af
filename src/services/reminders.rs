use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use tokio::time;

use crate::db::queries;
use crate::models::{Booking, BookingStatus};
use crate::services::email::{self, templates, Email};
use crate::state::AppState;

const REMINDER_LEAD_HOURS: i64 = 24;

/// Schedules the day-before reminder. Returns `None` when that moment has
/// already passed or there is nobody to remind.
pub fn schedule_reminder(
    conn: &Connection,
    booking: &Booking,
    now: NaiveDateTime,
) -> anyhow::Result<Option<i64>> {
    if booking.customer.email.is_empty() {
        return Ok(None);
    }
    let Some(appointment_at) = booking.appointment_at() else {
        return Ok(None);
    };

    let scheduled_for = appointment_at - chrono::Duration::hours(REMINDER_LEAD_HOURS);
    if scheduled_for <= now {
        return Ok(None);
    }

    let id = queries::create_reminder(
        conn,
        booking.id,
        &booking.customer.email,
        &appointment_at,
        &scheduled_for,
    )?;
    Ok(Some(id))
}

/// Background loop sending due reminders every `REMINDER_POLL_SECS`.
pub async fn reminder_task(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.reminder_poll_secs.max(1));
    let mut interval = time::interval(period);
    tracing::info!(poll_secs = period.as_secs(), "reminder worker started");

    loop {
        interval.tick().await;

        match run_due_reminders(&state, Utc::now().naive_utc()).await {
            Ok(0) => {}
            Ok(sent) => tracing::info!(sent, "reminders sent"),
            Err(e) => tracing::error!(error = ?e, "reminder poll failed"),
        }
    }
}

/// Sends every unsent reminder due at `now`. Each reminder gets one attempt;
/// a failed send is logged and the reminder is closed anyway.
pub async fn run_due_reminders(state: &AppState, now: NaiveDateTime) -> anyhow::Result<usize> {
    let outgoing: Vec<(i64, Option<Email>)> = {
        let conn = state.conn()?;
        let due = queries::get_due_reminders(&conn, &now)?;

        let mut outgoing = Vec::with_capacity(due.len());
        for reminder in due {
            let booking = queries::get_booking_by_id(&conn, reminder.booking_id)?;
            let email = match booking {
                Some(b) if b.status != BookingStatus::Cancelled => {
                    let service_name = queries::get_service(&conn, b.service_id)?
                        .map(|s| s.name)
                        .unwrap_or_else(|| "Service".to_string());
                    Some(templates::appointment_reminder(
                        &b,
                        &service_name,
                        &state.config.default_from_email,
                        vec![reminder.email.clone()],
                    ))
                }
                _ => None,
            };
            outgoing.push((reminder.id, email));
        }
        outgoing
    };

    let mut sent = 0;
    for (reminder_id, email) in outgoing {
        match email {
            Some(email) => {
                if email::send_with_timeout(state, &email).await {
                    sent += 1;
                } else {
                    tracing::warn!(reminder_id, "reminder not delivered, not retrying");
                }
            }
            None => {
                tracing::info!(reminder_id, "booking cancelled or gone, dropping reminder");
            }
        }

        let conn = state.conn()?;
        queries::mark_reminder_sent(&conn, reminder_id)?;
    }

    Ok(sent)
}
