use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;
use shared_models::events::TracingEventPublisher;

use crate::models::{ChargeCardRequest, PaymentError, SavedCardChargeRequest, SetDefaultCardRequest};
use crate::services::cards::CardVaultService;
use crate::services::gateway::MockGateway;
use crate::services::ledger::PaymentLedgerService;

#[derive(Debug, Deserialize)]
pub struct PatientQuery {
    pub patient_id: Uuid,
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::AlreadySettled => AppError::Conflict(err.to_string()),
            PaymentError::AppointmentNotFound
            | PaymentError::PaymentNotFound
            | PaymentError::CardNotFound => AppError::NotFound(err.to_string()),
            PaymentError::InvalidCard(_) | PaymentError::CardExpired => {
                AppError::ValidationError(err.to_string())
            }
            PaymentError::PaymentFailed | PaymentError::RefundFailed(_) => {
                AppError::ExternalService(err.to_string())
            }
            PaymentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

fn ledger(state: &AppConfig) -> PaymentLedgerService {
    let supabase = Arc::new(SupabaseClient::new(state));
    PaymentLedgerService::new(supabase, Arc::new(MockGateway), Arc::new(TracingEventPublisher))
}

fn vault(state: &AppConfig) -> CardVaultService {
    CardVaultService::new(Arc::new(SupabaseClient::new(state)))
}

// ==============================================================================
// CHARGE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn charge_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<ChargeCardRequest>,
) -> Result<Json<Value>, AppError> {
    let payment = ledger(&state).charge_appointment(appointment_id, request).await?;
    let transaction_id = payment.transaction_id.clone();

    Ok(Json(json!({
        "payment": payment,
        "transaction_id": transaction_id,
    })))
}

#[axum::debug_handler]
pub async fn charge_with_saved_card(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<SavedCardChargeRequest>,
) -> Result<Json<Value>, AppError> {
    let payment = ledger(&state)
        .charge_with_saved_card(appointment_id, request)
        .await?;
    let transaction_id = payment.transaction_id.clone();

    Ok(Json(json!({
        "payment": payment,
        "transaction_id": transaction_id,
    })))
}

// ==============================================================================
// HISTORY AND CARD MANAGEMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn payment_history(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<Value>, AppError> {
    let payments = ledger(&state).payment_history(query.patient_id).await?;
    let total = payments.len();

    Ok(Json(json!({
        "payments": payments,
        "total": total,
    })))
}

#[axum::debug_handler]
pub async fn list_cards(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<Value>, AppError> {
    let cards = vault(&state).list_cards(query.patient_id).await?;

    Ok(Json(json!({ "cards": cards })))
}

#[axum::debug_handler]
pub async fn delete_card(
    State(state): State<Arc<AppConfig>>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    vault(&state).deactivate_card(card_id).await?;

    Ok(Json(json!({ "deleted": true })))
}

#[axum::debug_handler]
pub async fn set_default_card(
    State(state): State<Arc<AppConfig>>,
    Path(card_id): Path<Uuid>,
    Json(request): Json<SetDefaultCardRequest>,
) -> Result<Json<Value>, AppError> {
    vault(&state).set_default_card(request.patient_id, card_id).await?;

    Ok(Json(json!({ "default": true })))
}
