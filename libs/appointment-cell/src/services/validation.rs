// libs/appointment-cell/src/services/validation.rs
//
// The conflict validator: a pure, ordered acceptance check over already
// fetched schedule data. Read-only; the booking insert re-checks the slot
// atomically through the storage uniqueness constraint.

use chrono::{NaiveDate, NaiveTime};

use doctor_cell::models::WorkingHour;

use crate::models::BookingRejection;

/// Decide whether a candidate (doctor, date, start time) is acceptable.
/// Checks run in a fixed order and the first failure wins:
///
/// 1. not in the past
/// 2. within the booking horizon
/// 3. the weekday has at least one active working-hour range
/// 4. the start time falls inside one of those ranges
/// 5. no day off on the date
/// 6. the exact slot is not already held
pub fn validate_booking(
    date: NaiveDate,
    start_time: NaiveTime,
    today: NaiveDate,
    max_advance_days: i64,
    working_hours: &[WorkingHour],
    has_day_off: bool,
    slot_taken: bool,
) -> Result<(), BookingRejection> {
    if date < today {
        return Err(BookingRejection::PastDate);
    }

    if date > today + chrono::Duration::days(max_advance_days) {
        return Err(BookingRejection::TooFarAhead(max_advance_days));
    }

    let active: Vec<&WorkingHour> = working_hours.iter().filter(|wh| wh.is_active).collect();
    if active.is_empty() {
        return Err(BookingRejection::ClosedWeekday);
    }

    let within_hours = active
        .iter()
        .any(|wh| wh.start_time <= start_time && start_time < wh.end_time);
    if !within_hours {
        return Err(BookingRejection::OutsideWorkingHours);
    }

    if has_day_off {
        return Err(BookingRejection::DoctorDayOff);
    }

    if slot_taken {
        return Err(BookingRejection::SlotTaken);
    }

    Ok(())
}
