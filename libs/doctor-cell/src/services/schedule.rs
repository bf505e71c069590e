use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    CreateDayOffRequest, CreateWorkingHourRequest, DayOff, DoctorSchedule, ScheduleError,
    UpdateWorkingHourRequest, WorkingHour,
};

/// Doctor-facing schedule management: the weekly working-hour rules and
/// one-off day-off exceptions the availability calculator reads.
pub struct ScheduleService {
    supabase: Arc<SupabaseClient>,
}

impl ScheduleService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn create_working_hour(
        &self,
        doctor_id: Uuid,
        request: CreateWorkingHourRequest,
    ) -> Result<WorkingHour, ScheduleError> {
        debug!("Creating working hour for doctor {}", doctor_id);

        if request.day_of_week < 0 || request.day_of_week > 6 {
            return Err(ScheduleError::InvalidDayOfWeek(request.day_of_week));
        }
        if request.start_time >= request.end_time {
            return Err(ScheduleError::InvalidTimeRange);
        }

        let row = json!({
            "doctor_id": doctor_id,
            "day_of_week": request.day_of_week,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "is_active": request.is_active.unwrap_or(true),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::POST, "/rest/v1/working_hours", Some(row), Some(headers))
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let created = result
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::DatabaseError("Failed to create working hour".into()))?;

        serde_json::from_value(created)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse working hour: {}", e)))
    }

    pub async fn update_working_hour(
        &self,
        working_hour_id: Uuid,
        request: UpdateWorkingHourRequest,
    ) -> Result<WorkingHour, ScheduleError> {
        debug!("Updating working hour {}", working_hour_id);

        let current = self.get_working_hour(working_hour_id).await?;

        let start = request.start_time.unwrap_or(current.start_time);
        let end = request.end_time.unwrap_or(current.end_time);
        if start >= end {
            return Err(ScheduleError::InvalidTimeRange);
        }

        let mut update = serde_json::Map::new();
        if let Some(start_time) = request.start_time {
            update.insert("start_time".into(), json!(start_time.format("%H:%M:%S").to_string()));
        }
        if let Some(end_time) = request.end_time {
            update.insert("end_time".into(), json!(end_time.format("%H:%M:%S").to_string()));
        }
        if let Some(is_active) = request.is_active {
            update.insert("is_active".into(), json!(is_active));
        }

        let path = format!("/rest/v1/working_hours?id=eq.{}", working_hour_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(Value::Object(update)), Some(headers))
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let updated = result
            .into_iter()
            .next()
            .ok_or(ScheduleError::WorkingHourNotFound)?;

        serde_json::from_value(updated)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse working hour: {}", e)))
    }

    pub async fn delete_working_hour(&self, working_hour_id: Uuid) -> Result<(), ScheduleError> {
        debug!("Deleting working hour {}", working_hour_id);

        let path = format!("/rest/v1/working_hours?id=eq.{}", working_hour_id);
        self.supabase
            .execute(Method::DELETE, &path, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Record a day off. Unique per (doctor, date): a duplicate is rejected
    /// here and by the storage constraint.
    pub async fn create_day_off(
        &self,
        doctor_id: Uuid,
        request: CreateDayOffRequest,
    ) -> Result<DayOff, ScheduleError> {
        debug!("Creating day off for doctor {} on {}", doctor_id, request.date);

        let existing_path = format!(
            "/rest/v1/days_off?doctor_id=eq.{}&date=eq.{}&select=id",
            doctor_id, request.date
        );
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &existing_path, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(ScheduleError::DuplicateDayOff);
        }

        let row = json!({
            "doctor_id": doctor_id,
            "date": request.date,
            "reason": request.reason.unwrap_or_default(),
            "is_recurring": request.is_recurring.unwrap_or(false),
            "created_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::POST, "/rest/v1/days_off", Some(row), Some(headers))
            .await
            .map_err(|e| match e {
                shared_database::DbError::Conflict(_) => ScheduleError::DuplicateDayOff,
                other => ScheduleError::DatabaseError(other.to_string()),
            })?;

        let created = result
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::DatabaseError("Failed to create day off".into()))?;

        serde_json::from_value(created)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse day off: {}", e)))
    }

    pub async fn get_schedule(&self, doctor_id: Uuid) -> Result<DoctorSchedule, ScheduleError> {
        debug!("Fetching schedule for doctor {}", doctor_id);

        let hours_path = format!(
            "/rest/v1/working_hours?doctor_id=eq.{}&order=day_of_week.asc,start_time.asc",
            doctor_id
        );
        let hours: Vec<Value> = self
            .supabase
            .request(Method::GET, &hours_path, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let working_hours = hours
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<WorkingHour>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse working hours: {}", e)))?;

        let days_path = format!("/rest/v1/days_off?doctor_id=eq.{}&order=date.asc", doctor_id);
        let days: Vec<Value> = self
            .supabase
            .request(Method::GET, &days_path, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let days_off = days
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DayOff>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse days off: {}", e)))?;

        Ok(DoctorSchedule { working_hours, days_off })
    }

    async fn get_working_hour(&self, working_hour_id: Uuid) -> Result<WorkingHour, ScheduleError> {
        let path = format!("/rest/v1/working_hours?id=eq.{}", working_hour_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(ScheduleError::WorkingHourNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse working hour: {}", e)))
    }
}
