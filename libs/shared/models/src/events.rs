use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Events the notification collaborator subscribes to. Each carries enough
/// denormalized data to render a notification without querying the engine
/// back synchronously.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    AppointmentCreated {
        appointment_id: Uuid,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        base_price: Decimal,
        payment_due_date: Option<DateTime<Utc>>,
    },
    AppointmentStatusChanged {
        appointment_id: Uuid,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        old_status: String,
        new_status: String,
        cancellation_reason: Option<String>,
        cancellation_fee: Option<Decimal>,
    },
    PaymentCompleted {
        payment_id: Uuid,
        appointment_id: Uuid,
        patient_id: Uuid,
        amount: Decimal,
        transaction_id: String,
    },
    PaymentFailed {
        payment_id: Uuid,
        appointment_id: Uuid,
        patient_id: Uuid,
        amount: Decimal,
        reason: String,
    },
}

/// Delivery is owned by the notification collaborator; the engine only
/// hands events over.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Default publisher: logs the event. Deployments swap in a real sink.
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: DomainEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(target: "domain_events", "{}", payload),
            Err(e) => tracing::error!("Failed to serialize domain event: {}", e),
        }
    }
}
