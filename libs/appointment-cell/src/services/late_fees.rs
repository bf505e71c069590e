// libs/appointment-cell/src/services/late_fees.rs
//
// The periodic late-fee sweep: recompute the late fee for every unpaid,
// overdue appointment and persist it only when it grew. Driven by cron or
// the admin endpoint.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{Appointment, AppointmentError};
use crate::services::lifecycle::AppointmentLifecycleService;

#[derive(Debug, Clone, Serialize)]
pub struct SweepOutcome {
    pub scanned: usize,
    pub updated: usize,
}

pub struct LateFeeSweepService {
    supabase: Arc<SupabaseClient>,
    lifecycle: AppointmentLifecycleService,
}

impl LateFeeSweepService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            lifecycle: AppointmentLifecycleService::new(config.fee_policy.clone()),
        }
    }

    /// Recompute late fees for everything unpaid past its due date. The fee
    /// is stored only when strictly greater than the current value, so a
    /// sweep can run any number of times without ever shrinking a fee.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepOutcome, AppointmentError> {
        let overdue = self.fetch_overdue(now).await?;
        let scanned = overdue.len();
        let mut updated = 0;

        for mut appointment in overdue {
            if self.lifecycle.apply_late_fee(&mut appointment, now).is_some() {
                self.persist_fee(&appointment).await?;
                updated += 1;
            }
        }

        info!("Late-fee sweep: {} scanned, {} updated", scanned, updated);
        Ok(SweepOutcome { scanned, updated })
    }

    async fn fetch_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?is_paid=eq.false&payment_due_date=lt.{}&status=in.(CONFIRMED,COMPLETED)",
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }

    async fn persist_fee(&self, appointment: &Appointment) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let body = json!({
            "late_payment_fee": appointment.late_payment_fee,
            "total_amount": appointment.total_amount,
            "updated_at": appointment.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        });

        self.supabase
            .execute(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
