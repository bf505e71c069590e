use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{
    CreateDayOffRequest, CreateWorkingHourRequest, ScheduleError, SlotView, UpdateWorkingHourRequest,
};
use crate::services::{availability::AvailabilityService, schedule::ScheduleService};

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub duration_minutes: Option<i64>,
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidTimeRange | ScheduleError::InvalidDayOfWeek(_) => {
                AppError::ValidationError(err.to_string())
            }
            ScheduleError::DuplicateDayOff => AppError::Conflict(err.to_string()),
            ScheduleError::WorkingHourNotFound
            | ScheduleError::DoctorNotFound
            | ScheduleError::ServiceNotFound => AppError::NotFound(err.to_string()),
            ScheduleError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

fn supabase(state: &AppConfig) -> Arc<SupabaseClient> {
    Arc::new(SupabaseClient::new(state))
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

/// The slot-availability query surface consumed by the booking UI.
#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(supabase(&state));
    let slot_minutes = query
        .duration_minutes
        .unwrap_or(state.fee_policy.default_slot_minutes);

    let slots = service.available_slots(doctor_id, query.date, slot_minutes).await?;
    let views: Vec<SlotView> = slots.into_iter().map(SlotView::from_time).collect();

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "slots": views,
    })))
}

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = ScheduleService::new(supabase(&state));
    let schedule = service.get_schedule(doctor_id).await?;

    Ok(Json(json!(schedule)))
}

// ==============================================================================
// SCHEDULE MANAGEMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_working_hour(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<CreateWorkingHourRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ScheduleService::new(supabase(&state));
    let created = service.create_working_hour(doctor_id, request).await?;

    Ok(Json(json!(created)))
}

#[axum::debug_handler]
pub async fn update_working_hour(
    State(state): State<Arc<AppConfig>>,
    Path((_doctor_id, working_hour_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateWorkingHourRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ScheduleService::new(supabase(&state));
    let updated = service.update_working_hour(working_hour_id, request).await?;

    Ok(Json(json!(updated)))
}

#[axum::debug_handler]
pub async fn delete_working_hour(
    State(state): State<Arc<AppConfig>>,
    Path((_doctor_id, working_hour_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let service = ScheduleService::new(supabase(&state));
    service.delete_working_hour(working_hour_id).await?;

    Ok(Json(json!({ "deleted": true })))
}

#[axum::debug_handler]
pub async fn create_day_off(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<CreateDayOffRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ScheduleService::new(supabase(&state));
    let created = service.create_day_off(doctor_id, request).await?;

    Ok(Json(json!(created)))
}
