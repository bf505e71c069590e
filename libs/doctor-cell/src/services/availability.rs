use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{weekday_index, ScheduleError, WorkingHour};

/// Start times of appointments that still hold their slot.
const SLOT_HOLDING_STATUSES: &str = "in.(PENDING,CONFIRMED)";

pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, Deserialize)]
struct BookedStart {
    start_time: NaiveTime,
}

impl AvailabilityService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Compute the bookable start times for a doctor on a date.
    ///
    /// Stateless: every call refetches the schedule and booked slots, so the
    /// result is only as fresh as the moment it was computed. Callers that
    /// present slots to a user must still expect the booking insert to lose
    /// a race.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        slot_minutes: i64,
    ) -> Result<Vec<NaiveTime>, ScheduleError> {
        debug!("Calculating available slots for doctor {} on {}", doctor_id, date);

        if self.has_day_off(doctor_id, date).await? {
            debug!("Doctor {} has a day off on {}", doctor_id, date);
            return Ok(vec![]);
        }

        let working_hours = self.working_hours_for_day(doctor_id, weekday_index(date)).await?;
        let booked = self.booked_start_times(doctor_id, date).await?;

        Ok(calculate_available_slots(
            &working_hours,
            &booked,
            date,
            slot_minutes,
            Utc::now(),
        ))
    }

    async fn has_day_off(&self, doctor_id: Uuid, date: NaiveDate) -> Result<bool, ScheduleError> {
        let path = format!("/rest/v1/days_off?doctor_id=eq.{}&date=eq.{}&select=id", doctor_id, date);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(!rows.is_empty())
    }

    async fn working_hours_for_day(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<WorkingHour>, ScheduleError> {
        let path = format!(
            "/rest/v1/working_hours?doctor_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&order=start_time.asc",
            doctor_id, day_of_week
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<WorkingHour>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse working hours: {}", e)))
    }

    async fn booked_start_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<NaiveTime>, ScheduleError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&status={}&select=start_time",
            doctor_id, date, SLOT_HOLDING_STATUSES
        );

        let rows: Vec<BookedStart> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(|b| b.start_time).collect())
    }
}

/// Walk every active working-hour range in `slot_minutes` steps and emit the
/// start times that are still free.
///
/// A slot is emitted only when it fits entirely inside its range, its start
/// is not taken by a booked appointment, and (for today's date) its start is
/// not already in the past. Ranges are sorted before walking and the output
/// is de-duplicated, so overlapping ranges never double-emit a time.
pub fn calculate_available_slots(
    working_hours: &[WorkingHour],
    booked_starts: &[NaiveTime],
    date: NaiveDate,
    slot_minutes: i64,
    now: DateTime<Utc>,
) -> Vec<NaiveTime> {
    if slot_minutes <= 0 {
        return vec![];
    }

    let mut ranges: Vec<&WorkingHour> = working_hours.iter().filter(|wh| wh.is_active).collect();
    ranges.sort_by_key(|wh| wh.start_time);

    let today = now.date_naive();
    let time_now = now.time();
    let slot = Duration::minutes(slot_minutes);

    let mut slots = Vec::new();

    for range in ranges {
        // Walk on NaiveDateTime so slot arithmetic cannot wrap past midnight.
        let mut cursor = date.and_time(range.start_time);
        let range_end = date.and_time(range.end_time);

        while cursor + slot <= range_end {
            let start = cursor.time();
            let is_past = date == today && start < time_now;

            if !is_past && !booked_starts.contains(&start) {
                slots.push(start);
            }

            cursor += slot;
        }
    }

    slots.sort();
    slots.dedup();
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn wh(day: i32, start: (u32, u32), end: (u32, u32)) -> WorkingHour {
        WorkingHour {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            day_of_week: day,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            is_active: true,
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // A Monday well in the future relative to the fixed "now" below.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn full_day_emits_sixteen_half_hour_slots() {
        let hours = vec![wh(1, (9, 0), (17, 0))];
        let slots = calculate_available_slots(&hours, &[], monday(), 30, fixed_now());

        assert_eq!(slots.len(), 16);
        assert_eq!(slots.first(), Some(&t(9, 0)));
        assert_eq!(slots.last(), Some(&t(16, 30)));
    }

    #[test]
    fn partial_slot_crossing_range_end_is_excluded() {
        let hours = vec![wh(1, (9, 0), (9, 45))];
        let slots = calculate_available_slots(&hours, &[], monday(), 30, fixed_now());

        // 09:30 + 30min would cross 09:45
        assert_eq!(slots, vec![t(9, 0)]);
    }

    #[test]
    fn booked_starts_are_excluded() {
        let hours = vec![wh(1, (9, 0), (11, 0))];
        let booked = vec![t(9, 30), t(10, 30)];
        let slots = calculate_available_slots(&hours, &booked, monday(), 30, fixed_now());

        assert_eq!(slots, vec![t(9, 0), t(10, 0)]);
    }

    #[test]
    fn never_returns_a_booked_slot() {
        let hours = vec![wh(1, (9, 0), (17, 0))];
        let booked = vec![t(9, 0), t(12, 0), t(16, 30)];
        let slots = calculate_available_slots(&hours, &booked, monday(), 30, fixed_now());

        for b in &booked {
            assert!(!slots.contains(b));
        }
    }

    #[test]
    fn same_day_past_slots_are_excluded() {
        let hours = vec![wh(4, (9, 0), (12, 0))];
        // now is 10:15 on the queried date
        let now = Utc.with_ymd_and_hms(2025, 1, 16, 10, 15, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 16).unwrap();

        let slots = calculate_available_slots(&hours, &[], date, 30, now);

        assert_eq!(slots, vec![t(10, 30), t(11, 0), t(11, 30)]);
    }

    #[test]
    fn multiple_ranges_are_sorted_and_walked_independently() {
        // Declared out of order on purpose
        let hours = vec![wh(1, (14, 0), (15, 0)), wh(1, (9, 0), (10, 0))];
        let slots = calculate_available_slots(&hours, &[], monday(), 30, fixed_now());

        assert_eq!(slots, vec![t(9, 0), t(9, 30), t(14, 0), t(14, 30)]);
    }

    #[test]
    fn overlapping_ranges_do_not_double_emit() {
        let hours = vec![wh(1, (9, 0), (11, 0)), wh(1, (10, 0), (12, 0))];
        let slots = calculate_available_slots(&hours, &[], monday(), 60, fixed_now());

        assert_eq!(slots, vec![t(9, 0), t(10, 0), t(11, 0)]);
    }

    #[test]
    fn inactive_ranges_are_ignored() {
        let mut inactive = wh(1, (9, 0), (17, 0));
        inactive.is_active = false;
        let slots = calculate_available_slots(&[inactive], &[], monday(), 30, fixed_now());

        assert!(slots.is_empty());
    }

    #[test]
    fn no_working_hours_means_no_slots() {
        let slots = calculate_available_slots(&[], &[], monday(), 30, fixed_now());
        assert!(slots.is_empty());
    }
}
