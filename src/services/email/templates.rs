use std::fmt::Write;

use crate::models::Booking;

use super::Email;

const RULE: &str = "==================================================";
const SHOP_NAME: &str = "Access Auto Services";

fn greeting_name(booking: &Booking) -> &str {
    if booking.customer.first_name.is_empty() {
        "Customer"
    } else {
        &booking.customer.first_name
    }
}

fn amount_line(booking: &Booking) -> String {
    if booking.payment_currency == "GBP" {
        format!("Amount: £{:.2}", booking.payment_amount)
    } else {
        format!("Amount: {:.2} {}", booking.payment_amount, booking.payment_currency)
    }
}

/// Link the customer follows to prove they own the booking's email address.
pub fn verification_url(booking_url: &str, token: &str) -> String {
    format!("{}?verify={token}", booking_url.trim_end_matches('/'))
}

pub fn booking_confirmation(
    booking: &Booking,
    service_name: &str,
    verify_url: &str,
    from: &str,
    to: Vec<String>,
) -> Email {
    let mut body = String::new();
    let _ = writeln!(body, "Dear {},\n", greeting_name(booking));
    let _ = writeln!(body, "Your booking has been successfully created!\n");
    let _ = writeln!(body, "BOOKING DETAILS:\n{RULE}");
    let _ = writeln!(body, "Booking reference: #{}", booking.id);
    let _ = writeln!(body, "Service: {service_name}");
    if !booking.mot_class.is_empty() {
        let _ = writeln!(body, "MOT Class: {}", booking.mot_class);
    }
    let _ = writeln!(body, "Date: {}", booking.date.format("%A, %B %d, %Y"));
    let _ = writeln!(body, "Time: {}", booking.time);
    let _ = writeln!(body, "Vehicle: {}", booking.vehicle.describe());
    let _ = writeln!(body, "{}", amount_line(booking));
    let _ = writeln!(body, "Payment method: {}\n", booking.payment_method.as_str());

    let _ = writeln!(body, "CUSTOMER INFORMATION:\n{RULE}");
    let full_name = booking.customer.full_name();
    if !full_name.is_empty() {
        let _ = writeln!(body, "Customer: {full_name}");
    }
    if !booking.customer.phone.is_empty() {
        let _ = writeln!(body, "Phone: {}", booking.customer.phone);
    }
    if !booking.customer.address.is_empty() {
        let _ = writeln!(body, "Address: {}", booking.customer.address);
    }
    let _ = writeln!(body, "Email: {}\n", booking.customer.email);

    let _ = writeln!(body, "VERIFY YOUR EMAIL:\n{RULE}");
    let _ = writeln!(body, "Please confirm your email address to secure your booking:");
    let _ = writeln!(body, "{verify_url}\n");

    let _ = writeln!(body, "NEXT STEPS:\n{RULE}");
    let _ = writeln!(body, "- You will receive a reminder email 24 hours before your appointment");
    let _ = writeln!(body, "- If you need to reschedule or cancel, please contact us as soon as possible\n");
    let _ = write!(body, "Thank you for choosing {SHOP_NAME}!\n\nBest regards,\nThe {SHOP_NAME} Team");

    Email {
        subject: format!("Booking Confirmation - {SHOP_NAME}"),
        body,
        from: from.to_string(),
        to,
    }
}

pub fn payment_confirmation(booking: &Booking, service_name: &str, from: &str, to: Vec<String>) -> Email {
    let transaction = booking
        .paypal_transaction_id
        .as_deref()
        .unwrap_or("n/a");

    let body = format!(
        "Dear {name},\n\n\
         Your payment has been successfully processed!\n\n\
         Booking Details:\n\
         Service: {service_name}\n\
         Date: {date}\n\
         Time: {time}\n\
         Vehicle: {vehicle}\n\
         {amount}\n\
         Transaction ID: {transaction}\n\n\
         Your booking is now confirmed. We look forward to seeing you!\n\n\
         Best regards,\n{SHOP_NAME} Team",
        name = greeting_name(booking),
        date = booking.date.format("%Y-%m-%d"),
        time = booking.time,
        vehicle = booking.vehicle.describe(),
        amount = amount_line(booking),
    );

    Email {
        subject: "Payment Confirmed - Booking Confirmed".to_string(),
        body,
        from: from.to_string(),
        to,
    }
}

pub fn appointment_reminder(booking: &Booking, service_name: &str, from: &str, to: Vec<String>) -> Email {
    let body = format!(
        "Dear {name},\n\n\
         This is a friendly reminder about your upcoming appointment with {SHOP_NAME}.\n\n\
         APPOINTMENT DETAILS:\n{RULE}\n\
         Service: {service_name}\n\
         Date: {date}\n\
         Time: {time}\n\
         Vehicle registration: {registration}\n\n\
         IMPORTANT REMINDERS:\n\
         - Please arrive 10 minutes before your scheduled time\n\
         - Bring your vehicle registration documents\n\
         - If you need to reschedule, please contact us at least 24 hours in advance\n\n\
         We look forward to seeing you!\n\n\
         Best regards,\nThe {SHOP_NAME} Team",
        name = greeting_name(booking),
        date = booking.date.format("%A, %B %d, %Y"),
        time = booking.time,
        registration = if booking.vehicle.registration.is_empty() {
            "Not specified"
        } else {
            &booking.vehicle.registration
        },
    );

    Email {
        subject: format!("Appointment Reminder - {SHOP_NAME}"),
        body,
        from: from.to_string(),
        to,
    }
}
