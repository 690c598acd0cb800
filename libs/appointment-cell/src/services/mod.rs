pub mod availability;
pub mod booking;
pub mod lifecycle;
pub mod notify;
pub mod slots;
pub mod store;

pub use availability::AvailabilityService;
pub use booking::BookingService;
pub use lifecycle::LifecycleService;
pub use notify::NotificationService;
pub use store::AppointmentStore;
