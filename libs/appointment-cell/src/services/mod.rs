pub mod booking;
pub mod fees;
pub mod late_fees;
pub mod lifecycle;
pub mod validation;

pub use booking::AppointmentBookingService;
pub use late_fees::LateFeeSweepService;
pub use lifecycle::AppointmentLifecycleService;
