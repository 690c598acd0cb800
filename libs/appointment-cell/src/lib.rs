pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentType, Actor,
    BookAppointmentRequest, RescheduleAppointmentRequest,
};
pub use services::booking::BookingService;
pub use services::lifecycle::LifecycleService;
