// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODEL
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub service_id: Option<Uuid>,

    // Scheduling
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,

    // Details
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub notes: String,
    pub status: AppointmentStatus,

    // Money
    pub base_price: Decimal,
    pub cancellation_fee: Decimal,
    pub late_payment_fee: Decimal,
    pub total_amount: Decimal,

    // Payment state
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    /// Set exactly once at creation; never recomputed afterwards.
    pub payment_due_date: Option<DateTime<Utc>>,

    // Metadata
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_reason: String,
}

impl Appointment {
    /// The appointment's start as the one timezone-aware instant used for
    /// every temporal comparison in the engine.
    pub fn appointment_datetime(&self) -> DateTime<Utc> {
        self.date.and_time(self.start_time).and_utc()
    }

    pub fn hours_until(&self, now: DateTime<Utc>) -> f64 {
        (self.appointment_datetime() - now).num_seconds() as f64 / 3600.0
    }

    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.appointment_datetime() < now
    }

    pub fn can_cancel(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
            && !self.is_past(now)
    }

    /// Free cancellation applies outside the 24-hour window.
    pub fn can_cancel_free(&self, now: DateTime<Utc>) -> bool {
        self.hours_until(now) >= 24.0
    }

    pub fn is_payment_overdue(&self, now: DateTime<Utc>) -> bool {
        if self.is_paid {
            return false;
        }
        match self.payment_due_date {
            Some(due) => now > due,
            None => false,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        match self.end_time {
            Some(end) => (self.date.and_time(end) - self.date.and_time(self.start_time)).num_minutes(),
            None => 30,
        }
    }

    pub fn scheduled_end_datetime(&self) -> DateTime<Utc> {
        self.appointment_datetime() + Duration::minutes(self.duration_minutes())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Canceled,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    /// Statuses that keep their slot reserved.
    pub fn holds_slot(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Canceled | AppointmentStatus::Completed | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "PENDING"),
            AppointmentStatus::Confirmed => write!(f, "CONFIRMED"),
            AppointmentStatus::Canceled => write!(f, "CANCELED"),
            AppointmentStatus::Completed => write!(f, "COMPLETED"),
            AppointmentStatus::NoShow => write!(f, "NO_SHOW"),
        }
    }
}

/// The prior and new status of a committed transition, handed to event
/// emission so it never has to diff fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: AppointmentStatus,
    pub to: AppointmentStatus,
}

/// What a cancellation decided: the transition, the fee levied (zero outside
/// the 24-hour window) and the partial refund owed when the appointment was
/// already paid.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub transition: StatusTransition,
    pub cancellation_fee: Decimal,
    pub refund_due: Option<Decimal>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Option<Uuid>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
    /// Required when the cancellation falls inside the fee window.
    #[serde(default)]
    pub acknowledge_fee: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub is_paid: Option<bool>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

/// Why a booking request was turned away. Ordered the way the validator
/// checks them; the first failure wins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingRejection {
    #[error("Cannot book appointments in the past")]
    PastDate,

    #[error("Cannot book appointments more than {0} days in advance")]
    TooFarAhead(i64),

    #[error("Doctor is not available on this day")]
    ClosedWeekday,

    #[error("Selected time is outside the doctor's working hours")]
    OutsideWorkingHours,

    #[error("Doctor is not available on this date")]
    DoctorDayOff,

    #[error("This time slot is already booked")]
    SlotTaken,
}

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error(transparent)]
    Rejected(#[from] BookingRejection),

    #[error("This time slot is already booked")]
    SlotTaken,

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Appointments in the past cannot be canceled")]
    CannotCancelPast,

    #[error("The cancellation fee must be acknowledged")]
    FeeNotAcknowledged,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Refund failed: {0}")]
    RefundFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
