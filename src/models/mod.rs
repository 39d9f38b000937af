pub mod booking;
pub mod reminder;
pub mod service;
pub mod user;

pub use booking::{
    mask_card_number, Booking, BookingStatus, CustomerSnapshot, PaymentMethod, PaymentStatus,
    PaymentUpdate, VehicleSnapshot,
};
pub use reminder::BookingReminder;
pub use service::Service;
pub use user::User;
