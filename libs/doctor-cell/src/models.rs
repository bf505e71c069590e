// libs/doctor-cell/src/models.rs
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// SCHEDULE MODELS
// ==============================================================================

/// A recurring weekly range in which a doctor accepts bookings.
/// Day numbering is 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHour {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
}

/// A one-off date exception overriding working hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayOff {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: String,
    /// Stored for annual-recurrence plans; the slot calculator does not
    /// consult it yet (pending product clarification).
    #[serde(default)]
    pub is_recurring: bool,
    pub created_at: DateTime<Utc>,
}

/// Map a calendar date onto the schedule's day numbering.
pub fn weekday_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

// ==============================================================================
// CATALOG MODELS (READ-ONLY COLLABORATOR DATA)
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub specialization: String,
    pub consultation_fee: Decimal,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub duration_minutes: i32,
    pub is_active: bool,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkingHourRequest {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateWorkingHourRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDayOffRequest {
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub is_recurring: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub working_hours: Vec<WorkingHour>,
    pub days_off: Vec<DayOff>,
}

/// One bookable start time as rendered to the booking UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotView {
    pub time: String,
    pub formatted: String,
}

impl SlotView {
    pub fn from_time(time: NaiveTime) -> Self {
        Self {
            time: time.format("%H:%M").to_string(),
            formatted: time.format("%I:%M %p").to_string(),
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScheduleError {
    #[error("Start time must be before end time")]
    InvalidTimeRange,

    #[error("Day of week must be between 0 (Sunday) and 6 (Saturday), got {0}")]
    InvalidDayOfWeek(i32),

    #[error("A day off already exists for this date")]
    DuplicateDayOff,

    #[error("Working hour not found")]
    WorkingHourNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_index_starts_on_sunday() {
        // 2025-06-01 is a Sunday
        let sunday = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(weekday_index(sunday), 0);
        assert_eq!(weekday_index(sunday + chrono::Duration::days(1)), 1);
        assert_eq!(weekday_index(sunday + chrono::Duration::days(6)), 6);
    }

    #[test]
    fn slot_view_formats_both_representations() {
        let slot = SlotView::from_time(NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        assert_eq!(slot.time, "14:30");
        assert_eq!(slot.formatted, "02:30 PM");
    }
}
