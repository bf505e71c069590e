use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Doctor, ScheduleError, Service};

/// Read-only lookups into the clinic/doctor/service catalog. The engine
/// never mutates catalog entities; they are owned elsewhere.
pub struct CatalogService {
    supabase: Arc<SupabaseClient>,
}

impl CatalogService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, ScheduleError> {
        debug!("Fetching doctor {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(ScheduleError::DoctorNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse doctor: {}", e)))
    }

    pub async fn get_service(&self, service_id: Uuid) -> Result<Service, ScheduleError> {
        debug!("Fetching service {}", service_id);

        let path = format!("/rest/v1/services?id=eq.{}&is_active=eq.true", service_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(ScheduleError::ServiceNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse service: {}", e)))
    }
}
