// libs/payment-cell/src/services/gateway.rs
//
// The payment gateway seam. The engine only depends on the trait; the
// concrete processor (Stripe, PayTabs, Checkout.com, ...) is wired at
// deployment. The mock implementation mirrors a card-present happy path for
// local runs and tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::models::CardDetails;

#[derive(Debug, Clone)]
pub struct GatewayCharge {
    /// The gateway's own reference for the charge.
    pub gateway_reference: String,
    pub card_brand: String,
    pub card_last_four: String,
}

#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub refund_id: String,
}

/// A declined or failed gateway call. A timeout in a real implementation
/// maps here as well; the ledger records it and leaves the payment in
/// Processing for reconciliation.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct GatewayError(pub String);

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn process_payment(
        &self,
        card: &CardDetails,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewayCharge, GatewayError>;

    /// Charge a previously tokenized card.
    async fn charge_token(
        &self,
        token: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewayCharge, GatewayError>;

    async fn process_refund(
        &self,
        gateway_reference: &str,
        amount: Decimal,
    ) -> Result<GatewayRefund, GatewayError>;

    /// Derive a reusable token for the card. A real gateway returns its own
    /// vault token; nothing recoverable to the card number may leak out.
    fn tokenize(&self, card: &CardDetails) -> String;
}

pub fn detect_card_brand(card_number: &str) -> &'static str {
    let digits: String = card_number.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.starts_with('4') {
        "visa"
    } else if matches!(digits.get(..2), Some("51" | "52" | "53" | "54" | "55")) {
        "mastercard"
    } else if matches!(digits.get(..2), Some("34" | "37")) {
        "amex"
    } else {
        "unknown"
    }
}

fn last_four(card_number: &str) -> String {
    let digits: String = card_number.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect()
}

/// Stand-in gateway: every well-formed charge succeeds.
pub struct MockGateway;

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn process_payment(
        &self,
        card: &CardDetails,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewayCharge, GatewayError> {
        debug!("Mock gateway charging {} {}", amount, currency);

        Ok(GatewayCharge {
            gateway_reference: format!("GW-{}", Uuid::new_v4().simple()),
            card_brand: detect_card_brand(&card.card_number).to_string(),
            card_last_four: last_four(&card.card_number),
        })
    }

    async fn charge_token(
        &self,
        _token: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewayCharge, GatewayError> {
        debug!("Mock gateway charging token for {} {}", amount, currency);

        // Brand and last four come from the stored card record; the token
        // alone does not reveal them.
        Ok(GatewayCharge {
            gateway_reference: format!("GW-{}", Uuid::new_v4().simple()),
            card_brand: String::new(),
            card_last_four: String::new(),
        })
    }

    async fn process_refund(
        &self,
        gateway_reference: &str,
        amount: Decimal,
    ) -> Result<GatewayRefund, GatewayError> {
        debug!("Mock gateway refunding {} against {}", amount, gateway_reference);

        Ok(GatewayRefund {
            refund_id: format!("REF-{}", Uuid::new_v4().simple()),
        })
    }

    fn tokenize(&self, card: &CardDetails) -> String {
        let mut hasher = Sha256::new();
        hasher.update(card.card_number.as_bytes());
        hasher.update(card.expiry_month.as_bytes());
        hasher.update(card.expiry_year.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_detection_by_prefix() {
        assert_eq!(detect_card_brand("4242 4242 4242 4242"), "visa");
        assert_eq!(detect_card_brand("5555555555554444"), "mastercard");
        assert_eq!(detect_card_brand("371449635398431"), "amex");
        assert_eq!(detect_card_brand("6011111111111117"), "unknown");
    }

    #[test]
    fn tokenization_is_stable_and_opaque() {
        let card = CardDetails {
            card_number: "4242424242424242".into(),
            cardholder_name: "Jane Doe".into(),
            expiry_month: "04".into(),
            expiry_year: "2030".into(),
            cvv: "123".into(),
        };

        let gateway = MockGateway;
        let token = gateway.tokenize(&card);

        assert_eq!(token, gateway.tokenize(&card));
        assert_eq!(token.len(), 64);
        assert!(!token.contains("4242"));
    }
}
