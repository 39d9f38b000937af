use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: Option<i64>,
    pub service_id: i64,
    pub mot_class: String,
    pub date: NaiveDate,
    /// Time of day as entered, `HH:MM`.
    pub time: String,
    pub vehicle: VehicleSnapshot,
    pub customer: CustomerSnapshot,
    pub payment_method: PaymentMethod,
    /// Masked card suffix, never the full number.
    pub card_number: String,
    pub name_on_card: String,
    pub payment_status: PaymentStatus,
    pub is_paid: bool,
    pub paypal_order_id: Option<String>,
    pub paypal_transaction_id: Option<String>,
    pub payment_amount: Decimal,
    pub payment_currency: String,
    pub status: BookingStatus,
    pub is_verified: bool,
    pub verification_token: String,
    pub verified_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// Appointment start, if the stored time parses.
    pub fn appointment_at(&self) -> Option<NaiveDateTime> {
        NaiveTime::parse_from_str(&self.time, "%H:%M")
            .ok()
            .map(|t| self.date.and_time(t))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VehicleSnapshot {
    pub make: String,
    pub model: String,
    pub year: String,
    pub registration: String,
    pub mileage: String,
}

impl VehicleSnapshot {
    /// "Ford Focus (2019) - AB12 CDE - 42000 miles", or "Not specified".
    pub fn describe(&self) -> String {
        if self.make.is_empty() && self.model.is_empty() && self.registration.is_empty() {
            return "Not specified".to_string();
        }

        let mut parts: Vec<String> = Vec::new();
        if !self.make.is_empty() {
            parts.push(self.make.clone());
        }
        if !self.model.is_empty() {
            parts.push(self.model.clone());
        }
        if !self.year.is_empty() {
            parts.push(format!("({})", self.year));
        }

        let mut out = parts.join(" ");
        if !self.registration.is_empty() {
            if out.is_empty() {
                out = self.registration.clone();
            } else {
                out.push_str(&format!(" - {}", self.registration));
            }
        }
        if !self.mileage.is_empty() {
            out.push_str(&format!(" - {} miles", self.mileage));
        }
        out
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomerSnapshot {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

impl CustomerSnapshot {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Paypal => "paypal",
        }
    }

    /// Strict parse for client input.
    pub fn try_parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Some(PaymentMethod::Cash),
            "card" => Some(PaymentMethod::Card),
            "paypal" => Some(PaymentMethod::Paypal),
            _ => None,
        }
    }

    /// Lenient parse for stored values.
    pub fn parse(s: &str) -> Self {
        Self::try_parse(s).unwrap_or(PaymentMethod::Card)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Created,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Created => "created",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "created" => PaymentStatus::Created,
            "completed" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            "refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }

    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Created,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            "cancelled" => BookingStatus::Cancelled,
            _ => BookingStatus::Pending,
        }
    }
}

/// Payment columns written together by the payment entry points.
#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub payment_status: PaymentStatus,
    pub is_paid: bool,
    pub payment_method: Option<PaymentMethod>,
    pub paypal_order_id: Option<String>,
    pub paypal_transaction_id: Option<String>,
    pub card_number: Option<String>,
    pub name_on_card: Option<String>,
    pub status: Option<BookingStatus>,
}

impl PaymentUpdate {
    pub fn new(payment_status: PaymentStatus, is_paid: bool) -> Self {
        Self {
            payment_status,
            is_paid,
            payment_method: None,
            paypal_order_id: None,
            paypal_transaction_id: None,
            card_number: None,
            name_on_card: None,
            status: None,
        }
    }
}

/// Keep only the last four digits of a card number.
pub fn mask_card_number(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return String::new();
    }
    let suffix: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("**** {suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_card_number() {
        assert_eq!(mask_card_number("4111 1111 1111 1234"), "**** 1234");
        assert_eq!(mask_card_number("12"), "**** 12");
        assert_eq!(mask_card_number(""), "");
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(PaymentMethod::try_parse("PayPal"), Some(PaymentMethod::Paypal));
        assert_eq!(PaymentMethod::try_parse("bitcoin"), None);
        assert_eq!(PaymentMethod::parse("garbage"), PaymentMethod::Card);
    }

    #[test]
    fn test_payment_status_round_trips_through_str() {
        for status in PaymentStatus::ALL {
            assert_eq!(PaymentStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_vehicle_describe() {
        let v = VehicleSnapshot {
            make: "Ford".into(),
            model: "Focus".into(),
            year: "2019".into(),
            registration: "AB12 CDE".into(),
            mileage: "42000".into(),
        };
        assert_eq!(v.describe(), "Ford Focus (2019) - AB12 CDE - 42000 miles");
        assert_eq!(VehicleSnapshot::default().describe(), "Not specified");
    }
}
