use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::models::{
    Booking, BookingReminder, BookingStatus, CustomerSnapshot, PaymentMethod, PaymentStatus,
    PaymentUpdate, Service, User, VehicleSnapshot,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

fn now_str() -> String {
    fmt_ts(&Utc::now().naive_utc())
}

// ── Services ──

pub fn list_active_services(conn: &Connection) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, code, name, price, description, category, active
         FROM services WHERE active = 1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map([], |row| Ok(parse_service_row(row)))?;

    let mut services = vec![];
    for row in rows {
        services.push(row??);
    }
    Ok(services)
}

pub fn get_service(conn: &Connection, id: i64) -> anyhow::Result<Option<Service>> {
    let result = conn
        .query_row(
            "SELECT id, code, name, price, description, category, active
             FROM services WHERE id = ?1",
            params![id],
            |row| Ok(parse_service_row(row)),
        )
        .optional()?;

    result.transpose()
}

fn parse_service_row(row: &rusqlite::Row) -> anyhow::Result<Service> {
    let price_str: String = row.get(3)?;
    Ok(Service {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        price: Decimal::from_str(&price_str)?,
        description: row.get(4)?,
        category: row.get(5)?,
        active: row.get::<_, i32>(6)? != 0,
    })
}

// ── Users ──

pub fn get_user(conn: &Connection, id: i64) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, email, first_name, last_name FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    email: row.get(2)?,
                    first_name: row.get(3)?,
                    last_name: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

pub fn create_user(
    conn: &Connection,
    username: &str,
    email: &str,
    first_name: &str,
    last_name: &str,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO users (username, email, first_name, last_name) VALUES (?1, ?2, ?3, ?4)",
        params![username, email, first_name, last_name],
    )?;
    Ok(conn.last_insert_rowid())
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, user_id, service_id, mot_class, date, time, \
     vehicle_make, vehicle_model, vehicle_year, vehicle_registration, vehicle_mileage, \
     customer_first_name, customer_last_name, customer_email, customer_phone, customer_address, \
     payment_method, card_number, name_on_card, payment_status, is_paid, \
     paypal_order_id, paypal_transaction_id, payment_amount, payment_currency, \
     status, is_verified, verification_token, verified_at, created_at, updated_at";

/// Inserts a booking and returns its new id. `booking.id` is ignored.
pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO bookings (user_id, service_id, mot_class, date, time,
            vehicle_make, vehicle_model, vehicle_year, vehicle_registration, vehicle_mileage,
            customer_first_name, customer_last_name, customer_email, customer_phone, customer_address,
            payment_method, card_number, name_on_card, payment_status, is_paid,
            paypal_order_id, paypal_transaction_id, payment_amount, payment_currency,
            status, is_verified, verification_token, verified_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                 ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30)",
        params![
            booking.user_id,
            booking.service_id,
            booking.mot_class,
            booking.date.format("%Y-%m-%d").to_string(),
            booking.time,
            booking.vehicle.make,
            booking.vehicle.model,
            booking.vehicle.year,
            booking.vehicle.registration,
            booking.vehicle.mileage,
            booking.customer.first_name,
            booking.customer.last_name,
            booking.customer.email,
            booking.customer.phone,
            booking.customer.address,
            booking.payment_method.as_str(),
            booking.card_number,
            booking.name_on_card,
            booking.payment_status.as_str(),
            booking.is_paid as i32,
            booking.paypal_order_id,
            booking.paypal_transaction_id,
            booking.payment_amount.to_string(),
            booking.payment_currency,
            booking.status.as_str(),
            booking.is_verified as i32,
            booking.verification_token,
            booking.verified_at.as_ref().map(fmt_ts),
            fmt_ts(&booking.created_at),
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn query_one_booking(
    conn: &Connection,
    filter: &str,
    param: &dyn rusqlite::types::ToSql,
) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE {filter}");
    let params_refs: &[&dyn rusqlite::types::ToSql] = &[param];
    let result = conn.query_row(&sql, params_refs, |row| Ok(parse_booking_row(row)));

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_id(conn: &Connection, id: i64) -> anyhow::Result<Option<Booking>> {
    query_one_booking(conn, "id = ?1", &id)
}

pub fn get_booking_by_token(conn: &Connection, token: &str) -> anyhow::Result<Option<Booking>> {
    query_one_booking(conn, "verification_token = ?1", &token)
}

pub fn get_booking_by_paypal_order(
    conn: &Connection,
    order_id: &str,
) -> anyhow::Result<Option<Booking>> {
    query_one_booking(
        conn,
        "paypal_order_id = ?1 ORDER BY id DESC LIMIT 1",
        &order_id,
    )
}

pub fn get_bookings_for_user(conn: &Connection, user_id: i64) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_all_bookings(
    conn: &Connection,
    payment_status: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match payment_status {
        Some(status) => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE payment_status = ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            ),
            vec![
                Box::new(status.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY created_at DESC, id DESC LIMIT ?1"
            ),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Records a freshly created provider order.
pub fn set_paypal_order(conn: &Connection, id: i64, order_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET paypal_order_id = ?1, payment_status = ?2, updated_at = ?3 WHERE id = ?4",
        params![order_id, PaymentStatus::Created.as_str(), now_str(), id],
    )?;
    Ok(count > 0)
}

/// Writes the payment sub-state in a single statement. `None` fields keep their value.
/// Payment columns always move; a cancelled booking keeps its lifecycle status.
pub fn apply_payment_update(
    conn: &Connection,
    id: i64,
    update: &PaymentUpdate,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
            payment_status = ?1,
            is_paid = ?2,
            payment_method = COALESCE(?3, payment_method),
            paypal_order_id = COALESCE(?4, paypal_order_id),
            paypal_transaction_id = COALESCE(?5, paypal_transaction_id),
            card_number = COALESCE(?6, card_number),
            name_on_card = COALESCE(?7, name_on_card),
            status = CASE WHEN status = 'cancelled' THEN status ELSE COALESCE(?8, status) END,
            updated_at = ?9
         WHERE id = ?10",
        params![
            update.payment_status.as_str(),
            update.is_paid as i32,
            update.payment_method.map(|m| m.as_str()),
            update.paypal_order_id,
            update.paypal_transaction_id,
            update.card_number,
            update.name_on_card,
            update.status.map(|s| s.as_str()),
            now_str(),
            id,
        ],
    )?;
    Ok(count > 0)
}

/// Flags a booking verified. Returns false if it already was.
pub fn mark_verified(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let now = now_str();
    let count = conn.execute(
        "UPDATE bookings SET is_verified = 1, verified_at = ?1, updated_at = ?1
         WHERE id = ?2 AND is_verified = 0",
        params![now, id],
    )?;
    Ok(count > 0)
}

pub fn update_booking_status(
    conn: &Connection,
    id: i64,
    status: BookingStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now_str(), id],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date_str: String = row.get(4)?;
    let payment_method: String = row.get(16)?;
    let payment_status: String = row.get(19)?;
    let amount_str: String = row.get(23)?;
    let status: String = row.get(25)?;
    let verified_at: Option<String> = row.get(28)?;
    let created_at: String = row.get(29)?;
    let updated_at: String = row.get(30)?;

    Ok(Booking {
        id: row.get(0)?,
        user_id: row.get(1)?,
        service_id: row.get(2)?,
        mot_class: row.get(3)?,
        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")?,
        time: row.get(5)?,
        vehicle: VehicleSnapshot {
            make: row.get(6)?,
            model: row.get(7)?,
            year: row.get(8)?,
            registration: row.get(9)?,
            mileage: row.get(10)?,
        },
        customer: CustomerSnapshot {
            first_name: row.get(11)?,
            last_name: row.get(12)?,
            email: row.get(13)?,
            phone: row.get(14)?,
            address: row.get(15)?,
        },
        payment_method: PaymentMethod::parse(&payment_method),
        card_number: row.get(17)?,
        name_on_card: row.get(18)?,
        payment_status: PaymentStatus::parse(&payment_status),
        is_paid: row.get::<_, i32>(20)? != 0,
        paypal_order_id: row.get(21)?,
        paypal_transaction_id: row.get(22)?,
        payment_amount: Decimal::from_str(&amount_str).unwrap_or_default(),
        payment_currency: row.get(24)?,
        status: BookingStatus::parse(&status),
        is_verified: row.get::<_, i32>(26)? != 0,
        verification_token: row.get(27)?,
        verified_at: verified_at.as_deref().map(parse_ts),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

// ── Dashboard ──

pub struct DashboardStats {
    pub total_bookings: i64,
    pub paid_bookings: i64,
    pub total_revenue: Decimal,
    pub today_revenue: Decimal,
    pub by_payment_status: Vec<(String, i64)>,
}

pub fn get_dashboard_stats(conn: &Connection) -> anyhow::Result<DashboardStats> {
    let total_bookings: i64 =
        conn.query_row("SELECT COUNT(*) FROM bookings", [], |row| row.get(0))?;

    let today = Utc::now().format("%Y-%m-%d").to_string();
    let mut stmt =
        conn.prepare("SELECT payment_amount, created_at FROM bookings WHERE is_paid = 1")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut paid_bookings = 0;
    let mut total_revenue = Decimal::ZERO;
    let mut today_revenue = Decimal::ZERO;
    for row in rows {
        let (amount_str, created_at) = row?;
        let amount = Decimal::from_str(&amount_str).unwrap_or_default();
        paid_bookings += 1;
        total_revenue += amount;
        if created_at.starts_with(&today) {
            today_revenue += amount;
        }
    }

    let mut stmt = conn.prepare(
        "SELECT payment_status, COUNT(*) FROM bookings GROUP BY payment_status ORDER BY payment_status",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    let mut by_payment_status = vec![];
    for row in rows {
        by_payment_status.push(row?);
    }

    Ok(DashboardStats {
        total_bookings,
        paid_bookings,
        total_revenue,
        today_revenue,
        by_payment_status,
    })
}

// ── Reminders ──

pub fn create_reminder(
    conn: &Connection,
    booking_id: i64,
    email: &str,
    appointment_at: &NaiveDateTime,
    scheduled_for: &NaiveDateTime,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO booking_reminders (booking_id, email, appointment_at, scheduled_for)
         VALUES (?1, ?2, ?3, ?4)",
        params![booking_id, email, fmt_ts(appointment_at), fmt_ts(scheduled_for)],
    )?;
    Ok(conn.last_insert_rowid())
}

const REMINDER_COLUMNS: &str =
    "id, booking_id, email, appointment_at, scheduled_for, reminder_sent, sent_at";

pub fn get_due_reminders(
    conn: &Connection,
    now: &NaiveDateTime,
) -> anyhow::Result<Vec<BookingReminder>> {
    let sql = format!(
        "SELECT {REMINDER_COLUMNS} FROM booking_reminders
         WHERE reminder_sent = 0 AND scheduled_for <= ?1 ORDER BY scheduled_for ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fmt_ts(now)], parse_reminder_row)?;

    let mut reminders = vec![];
    for row in rows {
        reminders.push(row?);
    }
    Ok(reminders)
}

pub fn get_reminders_for_booking(
    conn: &Connection,
    booking_id: i64,
) -> anyhow::Result<Vec<BookingReminder>> {
    let sql = format!(
        "SELECT {REMINDER_COLUMNS} FROM booking_reminders WHERE booking_id = ?1 ORDER BY id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![booking_id], parse_reminder_row)?;

    let mut reminders = vec![];
    for row in rows {
        reminders.push(row?);
    }
    Ok(reminders)
}

pub fn mark_reminder_sent(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE booking_reminders SET reminder_sent = 1, sent_at = ?1
         WHERE id = ?2 AND reminder_sent = 0",
        params![now_str(), id],
    )?;
    Ok(count > 0)
}

fn parse_reminder_row(row: &rusqlite::Row) -> rusqlite::Result<BookingReminder> {
    let appointment_at: String = row.get(3)?;
    let scheduled_for: String = row.get(4)?;
    let sent_at: Option<String> = row.get(6)?;
    Ok(BookingReminder {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        email: row.get(2)?,
        appointment_at: parse_ts(&appointment_at),
        scheduled_for: parse_ts(&scheduled_for),
        reminder_sent: row.get::<_, i32>(5)? != 0,
        sent_at: sent_at.as_deref().map(parse_ts),
    })
}
