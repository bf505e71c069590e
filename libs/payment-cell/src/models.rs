// libs/payment-cell/src/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// PAYMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,

    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,

    #[serde(default)]
    pub card_last_four: String,
    #[serde(default)]
    pub card_brand: String,
    /// Generated once at initiation; immutable afterwards. The gateway's own
    /// reference lives inside `gateway_response`.
    pub transaction_id: String,
    pub gateway_response: Option<Value>,

    // Component amounts frozen at charge time
    pub base_amount: Decimal,
    pub cancellation_fee_amount: Decimal,
    pub late_fee_amount: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    pub is_refunded: bool,
    pub refund_amount: Decimal,
    pub refunded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refund_reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Visa,
    Mastercard,
    Cash,
}

impl PaymentMethod {
    pub fn from_card_brand(brand: &str) -> Self {
        match brand {
            "mastercard" => PaymentMethod::Mastercard,
            _ => PaymentMethod::Visa,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "PENDING"),
            PaymentStatus::Processing => write!(f, "PROCESSING"),
            PaymentStatus::Completed => write!(f, "COMPLETED"),
            PaymentStatus::Failed => write!(f, "FAILED"),
            PaymentStatus::Refunded => write!(f, "REFUNDED"),
        }
    }
}

pub fn generate_transaction_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("TXN-{}", hex[..12].to_uppercase())
}

// ==============================================================================
// SAVED CARD MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCard {
    pub id: Uuid,
    pub patient_id: Uuid,

    pub card_token: String,
    pub card_last_four: String,
    pub card_brand: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub cardholder_name: String,

    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Raw card input for a charge. Never persisted; only the token derived from
/// it is stored when the patient opts in.
#[derive(Debug, Clone, Deserialize)]
pub struct CardDetails {
    pub card_number: String,
    pub cardholder_name: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub cvv: String,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeCardRequest {
    #[serde(flatten)]
    pub card: CardDetails,
    #[serde(default)]
    pub save_card: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SavedCardChargeRequest {
    pub card_id: Uuid,
    pub cvv: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetDefaultCardRequest {
    pub patient_id: Uuid,
}

// ==============================================================================
// APPOINTMENT SNAPSHOTS (READ/WRITE-THROUGH VIEWS)
// ==============================================================================

/// The slice of an appointment the ledger needs to settle it.
#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentBilling {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub base_price: Decimal,
    pub cancellation_fee: Decimal,
    pub late_payment_fee: Decimal,
    pub total_amount: Decimal,
    pub is_paid: bool,
}

/// Everything a late cancellation needs persisted atomically alongside the
/// refund record.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentCancellation {
    pub appointment_id: Uuid,
    pub canceled_at: DateTime<Utc>,
    pub cancellation_reason: String,
    pub cancellation_fee: Decimal,
    pub total_amount: Decimal,
    pub refund_amount: Decimal,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Appointment is already settled")]
    AlreadySettled,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Saved card not found")]
    CardNotFound,

    #[error("Invalid card: {0}")]
    InvalidCard(String),

    #[error("Card has expired")]
    CardExpired,

    // User-visible message stays generic; the stored gateway response
    // retains the detail for support and audit.
    #[error("Payment failed, please retry")]
    PaymentFailed,

    #[error("Refund failed: {0}")]
    RefundFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
