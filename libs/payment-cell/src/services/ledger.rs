// libs/payment-cell/src/services/ledger.rs
use chrono::Utc;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_models::events::{DomainEvent, EventPublisher};

use crate::models::{
    generate_transaction_id, AppointmentBilling, AppointmentCancellation, CardDetails,
    ChargeCardRequest, Payment, PaymentError, PaymentMethod, PaymentStatus, SavedCardChargeRequest,
};
use crate::services::cards::{self, CardVaultService};
use crate::services::gateway::{GatewayCharge, PaymentGateway};

/// Single-currency deployment.
const CURRENCY: &str = "SAR";

/// Records monetary transactions against appointments. Exactly one payment
/// per appointment may ever reach Completed as the settling payment; the
/// check happens before initiating a new charge, and settlement itself goes
/// through a storage transaction so a Completed payment and an unpaid
/// appointment are never observable together.
pub struct PaymentLedgerService {
    supabase: Arc<SupabaseClient>,
    gateway: Arc<dyn PaymentGateway>,
    publisher: Arc<dyn EventPublisher>,
    vault: CardVaultService,
}

impl PaymentLedgerService {
    pub fn new(
        supabase: Arc<SupabaseClient>,
        gateway: Arc<dyn PaymentGateway>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let vault = CardVaultService::new(Arc::clone(&supabase));
        Self {
            supabase,
            gateway,
            publisher,
            vault,
        }
    }

    /// Charge a raw card for the appointment's current total.
    pub async fn charge_appointment(
        &self,
        appointment_id: Uuid,
        request: ChargeCardRequest,
    ) -> Result<Payment, PaymentError> {
        info!("Charging appointment {}", appointment_id);

        let billing = self.fetch_billing(appointment_id).await?;
        self.ensure_not_settled(&billing).await?;

        cards::validate_card(&request.card, Utc::now().date_naive())?;

        let payment = self.initiate(&billing).await?;

        match self
            .gateway
            .process_payment(&request.card, payment.amount, CURRENCY)
            .await
        {
            Ok(charge) => {
                let settled = self.settle(payment, &billing, &charge).await?;

                if request.save_card {
                    self.save_charged_card(&billing, &request.card, &charge).await?;
                }

                Ok(settled)
            }
            Err(decline) => self.record_failure(payment, &billing, decline.0).await,
        }
    }

    /// Charge a saved card; only a fresh CVV is collected.
    pub async fn charge_with_saved_card(
        &self,
        appointment_id: Uuid,
        request: SavedCardChargeRequest,
    ) -> Result<Payment, PaymentError> {
        info!("Charging appointment {} with saved card", appointment_id);

        let billing = self.fetch_billing(appointment_id).await?;
        self.ensure_not_settled(&billing).await?;

        let card = self.vault.get_card(request.card_id).await?;
        if card.patient_id != billing.patient_id {
            return Err(PaymentError::CardNotFound);
        }
        cards::validate_cvv(&request.cvv)?;

        let payment = self.initiate(&billing).await?;

        match self
            .gateway
            .charge_token(&card.card_token, payment.amount, CURRENCY)
            .await
        {
            Ok(mut charge) => {
                // The token reveals nothing; display data comes from the vault.
                charge.card_brand = card.card_brand.clone();
                charge.card_last_four = card.card_last_four.clone();
                self.settle(payment, &billing, &charge).await
            }
            Err(decline) => self.record_failure(payment, &billing, decline.0).await,
        }
    }

    /// Execute the partial refund of a paid appointment being canceled
    /// inside the fee window, then persist the cancellation and the refund
    /// record in one storage transaction.
    ///
    /// Fails closed: when the gateway declines the refund nothing is
    /// persisted and the appointment stays un-canceled.
    pub async fn refund_for_cancellation(
        &self,
        cancellation: AppointmentCancellation,
    ) -> Result<Payment, PaymentError> {
        info!(
            "Refunding {} for canceled appointment {}",
            cancellation.refund_amount, cancellation.appointment_id
        );

        let mut payment = self
            .find_settling_payment(cancellation.appointment_id)
            .await?
            .ok_or(PaymentError::PaymentNotFound)?;

        self.gateway
            .process_refund(&payment.transaction_id, cancellation.refund_amount)
            .await
            .map_err(|e| {
                warn!(
                    "Gateway refused refund for appointment {}: {}",
                    cancellation.appointment_id, e
                );
                PaymentError::RefundFailed(e.0)
            })?;

        let refunded_at = Utc::now();
        let refund_reason = format!(
            "Cancellation fee applied: {} {}",
            cancellation.cancellation_fee, CURRENCY
        );

        self.supabase
            .rpc(
                "cancel_with_refund",
                json!({
                    "p_appointment_id": cancellation.appointment_id,
                    "p_canceled_at": cancellation.canceled_at.to_rfc3339(),
                    "p_cancellation_reason": cancellation.cancellation_reason,
                    "p_cancellation_fee": cancellation.cancellation_fee,
                    "p_total_amount": cancellation.total_amount,
                    "p_payment_id": payment.id,
                    "p_refund_amount": cancellation.refund_amount,
                    "p_refund_reason": refund_reason.clone(),
                    "p_refunded_at": refunded_at.to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        payment.is_refunded = true;
        payment.refund_amount = cancellation.refund_amount;
        payment.refunded_at = Some(refunded_at);
        payment.refund_reason = refund_reason;

        Ok(payment)
    }

    /// The single Completed payment settling the appointment, if any.
    pub async fn find_settling_payment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<Payment>, PaymentError> {
        let path = format!(
            "/rest/v1/payments?appointment_id=eq.{}&status=eq.COMPLETED&limit=1",
            appointment_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| PaymentError::DatabaseError(format!("Failed to parse payment: {}", e)))
            })
            .transpose()
    }

    pub async fn payment_history(&self, patient_id: Uuid) -> Result<Vec<Payment>, PaymentError> {
        let path = format!(
            "/rest/v1/payments?patient_id=eq.{}&order=created_at.desc",
            patient_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Payment>, _>>()
            .map_err(|e| PaymentError::DatabaseError(format!("Failed to parse payments: {}", e)))
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn fetch_billing(&self, appointment_id: Uuid) -> Result<AppointmentBilling, PaymentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&select=id,patient_id,base_price,cancellation_fee,late_payment_fee,total_amount,is_paid",
            appointment_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(PaymentError::AppointmentNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| PaymentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    async fn ensure_not_settled(&self, billing: &AppointmentBilling) -> Result<(), PaymentError> {
        if billing.is_paid {
            return Err(PaymentError::AlreadySettled);
        }
        if self.find_settling_payment(billing.id).await?.is_some() {
            warn!("Duplicate charge attempt for appointment {}", billing.id);
            return Err(PaymentError::AlreadySettled);
        }
        Ok(())
    }

    /// Open a Processing payment carrying the component amounts frozen at
    /// charge time. The transaction id is generated here, once.
    async fn initiate(&self, billing: &AppointmentBilling) -> Result<Payment, PaymentError> {
        let now = Utc::now();
        let row = json!({
            "appointment_id": billing.id,
            "patient_id": billing.patient_id,
            "amount": billing.total_amount,
            "payment_method": "VISA",
            "status": PaymentStatus::Processing.to_string(),
            "transaction_id": generate_transaction_id(),
            "base_amount": billing.base_price,
            "cancellation_fee_amount": billing.cancellation_fee,
            "late_fee_amount": billing.late_payment_fee,
            "is_refunded": false,
            "refund_amount": Decimal::ZERO,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::POST, "/rest/v1/payments", Some(row), Some(headers))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        let created = result
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::DatabaseError("Failed to create payment".into()))?;

        debug!("Payment initiated for appointment {}", billing.id);

        serde_json::from_value(created)
            .map_err(|e| PaymentError::DatabaseError(format!("Failed to parse payment: {}", e)))
    }

    /// Mark the payment Completed and flip the appointment to paid in one
    /// storage transaction, then emit the completion event.
    async fn settle(
        &self,
        mut payment: Payment,
        billing: &AppointmentBilling,
        charge: &GatewayCharge,
    ) -> Result<Payment, PaymentError> {
        let paid_at = Utc::now();
        let method = PaymentMethod::from_card_brand(&charge.card_brand);
        let gateway_response = json!({
            "success": true,
            "gateway_reference": charge.gateway_reference.clone(),
            "card_brand": charge.card_brand.clone(),
            "card_last_four": charge.card_last_four.clone(),
        });

        self.supabase
            .rpc(
                "settle_payment",
                json!({
                    "p_payment_id": payment.id,
                    "p_appointment_id": billing.id,
                    "p_card_brand": charge.card_brand.clone(),
                    "p_card_last_four": charge.card_last_four.clone(),
                    "p_payment_method": method,
                    "p_gateway_response": gateway_response.clone(),
                    "p_paid_at": paid_at.to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        info!(
            "Payment {} settled appointment {} ({})",
            payment.id, billing.id, payment.transaction_id
        );

        payment.status = PaymentStatus::Completed;
        payment.completed_at = Some(paid_at);
        payment.card_brand = charge.card_brand.clone();
        payment.card_last_four = charge.card_last_four.clone();
        payment.payment_method = method;
        payment.gateway_response = Some(gateway_response);

        self.publisher
            .publish(DomainEvent::PaymentCompleted {
                payment_id: payment.id,
                appointment_id: billing.id,
                patient_id: billing.patient_id,
                amount: payment.amount,
                transaction_id: payment.transaction_id.clone(),
            })
            .await;

        Ok(payment)
    }

    /// Record the decline on the payment row; the appointment stays unpaid
    /// and the caller gets the generic failure.
    async fn record_failure(
        &self,
        payment: Payment,
        billing: &AppointmentBilling,
        reason: String,
    ) -> Result<Payment, PaymentError> {
        warn!("Payment {} failed: {}", payment.id, reason);

        let path = format!("/rest/v1/payments?id=eq.{}", payment.id);
        let body = json!({
            "status": PaymentStatus::Failed.to_string(),
            "gateway_response": { "success": false, "error": reason.clone() },
            "updated_at": Utc::now().to_rfc3339(),
        });

        self.supabase
            .execute(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        self.publisher
            .publish(DomainEvent::PaymentFailed {
                payment_id: payment.id,
                appointment_id: billing.id,
                patient_id: billing.patient_id,
                amount: payment.amount,
                reason,
            })
            .await;

        Err(PaymentError::PaymentFailed)
    }

    async fn save_charged_card(
        &self,
        billing: &AppointmentBilling,
        card: &CardDetails,
        charge: &GatewayCharge,
    ) -> Result<(), PaymentError> {
        let token = self.gateway.tokenize(card);

        self.vault
            .save_card(
                billing.patient_id,
                token,
                charge.card_brand.clone(),
                charge.card_last_four.clone(),
                card.expiry_month.clone(),
                card.expiry_year.clone(),
                card.cardholder_name.clone(),
                false,
            )
            .await?;

        Ok(())
    }
}
