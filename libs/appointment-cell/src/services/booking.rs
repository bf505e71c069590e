// libs/appointment-cell/src/services/booking.rs
use chrono::{SecondsFormat, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::models::{weekday_index, ScheduleError, Service, WorkingHour};
use doctor_cell::services::catalog::CatalogService;
use payment_cell::models::AppointmentCancellation;
use payment_cell::services::gateway::MockGateway;
use payment_cell::services::ledger::PaymentLedgerService;
use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};
use shared_models::events::{DomainEvent, EventPublisher, TracingEventPublisher};

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    BookAppointmentRequest, CancelAppointmentRequest, StatusTransition,
};
use crate::services::fees;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::validation;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    catalog: CatalogService,
    lifecycle: AppointmentLifecycleService,
    ledger: PaymentLedgerService,
    publisher: Arc<dyn EventPublisher>,
    config: AppConfig,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let publisher: Arc<dyn EventPublisher> = Arc::new(TracingEventPublisher);

        let catalog = CatalogService::new(Arc::clone(&supabase));
        let lifecycle = AppointmentLifecycleService::new(config.fee_policy.clone());
        let ledger = PaymentLedgerService::new(
            Arc::clone(&supabase),
            Arc::new(MockGateway),
            Arc::clone(&publisher),
        );

        Self {
            supabase,
            catalog,
            lifecycle,
            ledger,
            publisher,
            config: config.clone(),
        }
    }

    /// Book an appointment. The validator runs over freshly fetched schedule
    /// data; the insert itself re-checks the slot through the storage
    /// uniqueness constraint on (doctor, date, start time) over active
    /// statuses, so a lost race surfaces as "slot already booked" instead of
    /// a double booking.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment for patient {} with doctor {} on {} {}",
            request.patient_id, request.doctor_id, request.date, request.start_time
        );

        let doctor = self.catalog.get_doctor(request.doctor_id).await.map_err(map_catalog)?;

        let service = match request.service_id {
            Some(service_id) => Some(self.catalog.get_service(service_id).await.map_err(map_catalog)?),
            None => None,
        };

        let now = Utc::now();
        let today = now.date_naive();

        let working_hours = self
            .working_hours_for(request.doctor_id, weekday_index(request.date))
            .await?;
        let has_day_off = self.has_day_off(request.doctor_id, request.date).await?;
        let slot_taken = self
            .slot_is_taken(request.doctor_id, request.date, request.start_time, None)
            .await?;

        validation::validate_booking(
            request.date,
            request.start_time,
            today,
            self.config.fee_policy.max_advance_booking_days,
            &working_hours,
            has_day_off,
            slot_taken,
        )?;

        let mut appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            clinic_id: doctor.clinic_id,
            service_id: request.service_id,
            date: request.date,
            start_time: request.start_time,
            end_time: None,
            symptoms: request.symptoms.unwrap_or_default(),
            notes: request.notes.unwrap_or_default(),
            status: AppointmentStatus::Pending,
            base_price: Decimal::ZERO,
            cancellation_fee: Decimal::ZERO,
            late_payment_fee: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            is_paid: false,
            paid_at: None,
            payment_due_date: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            canceled_at: None,
            cancellation_reason: String::new(),
        };

        self.lifecycle.recompute_derived(
            &mut appointment,
            service.as_ref().map(|s: &Service| s.duration_minutes),
            service.as_ref().map(|s| s.price),
        );

        let created = self.insert_appointment(&appointment).await?;

        self.publisher
            .publish(DomainEvent::AppointmentCreated {
                appointment_id: created.id,
                patient_id: created.patient_id,
                doctor_id: created.doctor_id,
                date: created.date,
                start_time: created.start_time,
                base_price: created.base_price,
                payment_due_date: created.payment_due_date,
            })
            .await;

        info!("Appointment {} booked", created.id);
        Ok(created)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(map_db)?;

        let row = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut filters = Vec::new();

        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(from) = query.date_from {
            filters.push(format!("date=gte.{}", from));
        }
        if let Some(to) = query.date_to {
            filters.push(format!("date=lte.{}", to));
        }
        if let Some(is_paid) = query.is_paid {
            filters.push(format!("is_paid=eq.{}", is_paid));
        }

        filters.push(format!("limit={}", query.limit.unwrap_or(50)));
        filters.push(format!("offset={}", query.offset.unwrap_or(0)));

        let path = format!(
            "/rest/v1/appointments?{}&order=date.desc,start_time.desc",
            filters.join("&")
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(map_db)?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }

    pub async fn confirm_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.get_appointment(appointment_id).await?;

        let transition = self.lifecycle.confirm(&mut appointment, Utc::now())?;
        self.persist_state(&appointment).await?;
        self.publish_status_change(&appointment, transition).await;

        info!("Appointment {} confirmed", appointment_id);
        Ok(appointment)
    }

    pub async fn complete_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.get_appointment(appointment_id).await?;

        let transition = self.lifecycle.complete(&mut appointment, Utc::now())?;
        self.persist_state(&appointment).await?;
        self.publish_status_change(&appointment, transition).await;

        info!("Appointment {} completed", appointment_id);
        Ok(appointment)
    }

    pub async fn mark_no_show(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.get_appointment(appointment_id).await?;

        let transition = self.lifecycle.mark_no_show(&mut appointment, Utc::now())?;
        self.persist_state(&appointment).await?;
        self.publish_status_change(&appointment, transition).await;

        info!("Appointment {} marked as no-show", appointment_id);
        Ok(appointment)
    }

    /// Cancel an appointment. Inside the fee window the caller must have
    /// acknowledged the fee; a paid appointment additionally gets its
    /// partial refund executed and persisted atomically with the status
    /// change through the payment ledger.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.get_appointment(appointment_id).await?;
        let now = Utc::now();

        let fee_preview = fees::cancellation_fee(&appointment, now, &self.config.fee_policy);
        if fee_preview > Decimal::ZERO && !request.acknowledge_fee {
            return Err(AppointmentError::FeeNotAcknowledged);
        }

        let reason = request.reason.unwrap_or_default();
        let outcome = self.lifecycle.cancel(&mut appointment, &reason, now)?;

        match outcome.refund_due {
            Some(refund_amount) => {
                // Gateway refund first; on success the cancellation and the
                // refund record land in one storage transaction.
                self.ledger
                    .refund_for_cancellation(AppointmentCancellation {
                        appointment_id: appointment.id,
                        canceled_at: now,
                        cancellation_reason: appointment.cancellation_reason.clone(),
                        cancellation_fee: appointment.cancellation_fee,
                        total_amount: appointment.total_amount,
                        refund_amount,
                    })
                    .await
                    .map_err(|e| {
                        warn!("Cancellation refund failed for {}: {}", appointment_id, e);
                        AppointmentError::RefundFailed(e.to_string())
                    })?;
            }
            None => {
                self.persist_state(&appointment).await?;
            }
        }

        self.publish_status_change(&appointment, outcome.transition).await;

        info!(
            "Appointment {} canceled (fee: {})",
            appointment_id, outcome.cancellation_fee
        );
        Ok(appointment)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn working_hours_for(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<WorkingHour>, AppointmentError> {
        let path = format!(
            "/rest/v1/working_hours?doctor_id=eq.{}&day_of_week=eq.{}&order=start_time.asc",
            doctor_id, day_of_week
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(map_db)?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<WorkingHour>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse working hours: {}", e)))
    }

    async fn has_day_off(
        &self,
        doctor_id: Uuid,
        date: chrono::NaiveDate,
    ) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/days_off?doctor_id=eq.{}&date=eq.{}&select=id",
            doctor_id, date
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(map_db)?;

        Ok(!rows.is_empty())
    }

    async fn slot_is_taken(
        &self,
        doctor_id: Uuid,
        date: chrono::NaiveDate,
        start_time: chrono::NaiveTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&start_time=eq.{}&status=in.(PENDING,CONFIRMED)&select=id",
            doctor_id,
            date,
            start_time.format("%H:%M:%S")
        );

        if let Some(exclude_id) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", exclude_id));
        }

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(map_db)?;

        Ok(!rows.is_empty())
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(serde_json::to_value(appointment).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Failed to serialize appointment: {}", e))
                })?),
                Some(headers),
            )
            .await
            .map_err(|e| match e {
                // The partial unique index over active statuses: the second
                // concurrent writer lands here.
                DbError::Conflict(_) => {
                    warn!(
                        "Booking race lost for doctor {} on {} {}",
                        appointment.doctor_id, appointment.date, appointment.start_time
                    );
                    AppointmentError::SlotTaken
                }
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".into()))?;

        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    /// Persist the mutable state a transition touches.
    async fn persist_state(&self, appointment: &Appointment) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let body = json!({
            "status": appointment.status,
            "end_time": appointment.end_time,
            "cancellation_fee": appointment.cancellation_fee,
            "late_payment_fee": appointment.late_payment_fee,
            "total_amount": appointment.total_amount,
            "payment_due_date": appointment
                .payment_due_date
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            "confirmed_at": appointment
                .confirmed_at
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            "canceled_at": appointment
                .canceled_at
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            "cancellation_reason": appointment.cancellation_reason.clone(),
            "updated_at": appointment.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        });

        self.supabase
            .execute(Method::PATCH, &path, Some(body))
            .await
            .map_err(map_db)?;

        Ok(())
    }

    async fn publish_status_change(&self, appointment: &Appointment, transition: StatusTransition) {
        debug!(
            "Appointment {} status change {} -> {}",
            appointment.id, transition.from, transition.to
        );

        self.publisher
            .publish(DomainEvent::AppointmentStatusChanged {
                appointment_id: appointment.id,
                patient_id: appointment.patient_id,
                doctor_id: appointment.doctor_id,
                date: appointment.date,
                start_time: appointment.start_time,
                old_status: transition.from.to_string(),
                new_status: transition.to.to_string(),
                cancellation_reason: (transition.to == AppointmentStatus::Canceled)
                    .then(|| appointment.cancellation_reason.clone()),
                cancellation_fee: (transition.to == AppointmentStatus::Canceled)
                    .then_some(appointment.cancellation_fee),
            })
            .await;
    }
}

fn map_db(err: DbError) -> AppointmentError {
    AppointmentError::DatabaseError(err.to_string())
}

fn map_catalog(err: ScheduleError) -> AppointmentError {
    match err {
        ScheduleError::DoctorNotFound => AppointmentError::DoctorNotFound,
        ScheduleError::ServiceNotFound => AppointmentError::ServiceNotFound,
        other => AppointmentError::DatabaseError(other.to_string()),
    }
}
