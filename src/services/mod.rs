pub mod bookings;
pub mod email;
pub mod payments;
pub mod paypal;
pub mod reminders;
