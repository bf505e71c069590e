// libs/payment-cell/src/services/cards.rs
use chrono::{Datelike, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{CardDetails, PaymentCard, PaymentError};

// ==============================================================================
// CARD VALIDATION
// ==============================================================================

/// Luhn checksum over a digits-only card number.
pub fn luhn_check(card_number: &str) -> bool {
    let digits: Vec<u32> = card_number.chars().rev().filter_map(|c| c.to_digit(10)).collect();

    if digits.len() != card_number.len() {
        return false;
    }

    let checksum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();

    checksum % 10 == 0
}

/// Validate raw card input before it goes anywhere near the gateway.
/// Malformed input is a synchronous validation error; nothing is charged.
pub fn validate_card(card: &CardDetails, today: NaiveDate) -> Result<(), PaymentError> {
    let number: String = card
        .card_number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(PaymentError::InvalidCard("Card number must contain only digits".into()));
    }
    if !(13..=19).contains(&number.len()) {
        return Err(PaymentError::InvalidCard("Invalid card number length".into()));
    }
    if !luhn_check(&number) {
        return Err(PaymentError::InvalidCard("Invalid card number".into()));
    }

    let month: u32 = card
        .expiry_month
        .parse()
        .map_err(|_| PaymentError::InvalidCard("Month must be numeric".into()))?;
    if !(1..=12).contains(&month) {
        return Err(PaymentError::InvalidCard("Month must be between 01 and 12".into()));
    }

    if card.expiry_year.len() != 4 {
        return Err(PaymentError::InvalidCard("Year must be 4 digits".into()));
    }
    let year: i32 = card
        .expiry_year
        .parse()
        .map_err(|_| PaymentError::InvalidCard("Year must be numeric".into()))?;
    if year > today.year() + 20 {
        return Err(PaymentError::InvalidCard("Invalid expiry year".into()));
    }

    if year < today.year() || (year == today.year() && month < today.month()) {
        return Err(PaymentError::CardExpired);
    }

    validate_cvv(&card.cvv)?;

    Ok(())
}

pub fn validate_cvv(cvv: &str) -> Result<(), PaymentError> {
    if !cvv.chars().all(|c| c.is_ascii_digit()) {
        return Err(PaymentError::InvalidCard("CVV must contain only digits".into()));
    }
    if !(3..=4).contains(&cvv.len()) {
        return Err(PaymentError::InvalidCard("CVV must be 3 or 4 digits".into()));
    }
    Ok(())
}

// ==============================================================================
// SAVED-CARD VAULT
// ==============================================================================

/// Saved payment instruments. Cards are stored as gateway tokens plus
/// display data, soft-deleted via `is_active`, with at most one default per
/// patient (saving a default demotes the rest first).
pub struct CardVaultService {
    supabase: Arc<SupabaseClient>,
}

impl CardVaultService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn save_card(
        &self,
        patient_id: Uuid,
        card_token: String,
        card_brand: String,
        card_last_four: String,
        expiry_month: String,
        expiry_year: String,
        cardholder_name: String,
        make_default: bool,
    ) -> Result<PaymentCard, PaymentError> {
        debug!("Saving card for patient {}", patient_id);

        if make_default {
            self.demote_defaults(patient_id).await?;
        }

        let row = json!({
            "patient_id": patient_id,
            "card_token": card_token,
            "card_brand": card_brand,
            "card_last_four": card_last_four,
            "expiry_month": expiry_month,
            "expiry_year": expiry_year,
            "cardholder_name": cardholder_name,
            "is_default": make_default,
            "is_active": true,
            "created_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::POST, "/rest/v1/payment_cards", Some(row), Some(headers))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        let created = result
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::DatabaseError("Failed to save card".into()))?;

        serde_json::from_value(created)
            .map_err(|e| PaymentError::DatabaseError(format!("Failed to parse card: {}", e)))
    }

    pub async fn list_cards(&self, patient_id: Uuid) -> Result<Vec<PaymentCard>, PaymentError> {
        let path = format!(
            "/rest/v1/payment_cards?patient_id=eq.{}&is_active=eq.true&order=is_default.desc,created_at.desc",
            patient_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<PaymentCard>, _>>()
            .map_err(|e| PaymentError::DatabaseError(format!("Failed to parse cards: {}", e)))
    }

    pub async fn get_card(&self, card_id: Uuid) -> Result<PaymentCard, PaymentError> {
        let path = format!("/rest/v1/payment_cards?id=eq.{}&is_active=eq.true", card_id);

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(PaymentError::CardNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| PaymentError::DatabaseError(format!("Failed to parse card: {}", e)))
    }

    /// Soft delete; history keeps pointing at the row.
    pub async fn deactivate_card(&self, card_id: Uuid) -> Result<(), PaymentError> {
        debug!("Deactivating card {}", card_id);

        let path = format!("/rest/v1/payment_cards?id=eq.{}", card_id);
        let body = json!({ "is_active": false, "is_default": false });

        self.supabase
            .execute(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    pub async fn set_default_card(&self, patient_id: Uuid, card_id: Uuid) -> Result<(), PaymentError> {
        debug!("Setting default card {} for patient {}", card_id, patient_id);

        // The card must exist and belong to the patient.
        let card = self.get_card(card_id).await?;
        if card.patient_id != patient_id {
            return Err(PaymentError::CardNotFound);
        }

        self.demote_defaults(patient_id).await?;

        let path = format!("/rest/v1/payment_cards?id=eq.{}", card_id);
        self.supabase
            .execute(Method::PATCH, &path, Some(json!({ "is_default": true })))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn demote_defaults(&self, patient_id: Uuid) -> Result<(), PaymentError> {
        let path = format!(
            "/rest/v1/payment_cards?patient_id=eq.{}&is_default=eq.true",
            patient_id
        );
        self.supabase
            .execute(Method::PATCH, &path, Some(json!({ "is_default": false })))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn card(number: &str, month: &str, year: &str, cvv: &str) -> CardDetails {
        CardDetails {
            card_number: number.to_string(),
            cardholder_name: "Jane Doe".to_string(),
            expiry_month: month.to_string(),
            expiry_year: year.to_string(),
            cvv: cvv.to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn luhn_accepts_known_test_numbers() {
        assert!(luhn_check("4242424242424242"));
        assert!(luhn_check("5555555555554444"));
        assert!(luhn_check("371449635398431"));
    }

    #[test]
    fn luhn_rejects_off_by_one() {
        assert!(!luhn_check("4242424242424241"));
        assert!(!luhn_check("4242abcd42424242"));
    }

    #[test]
    fn valid_card_passes_with_spaces_and_dashes() {
        let card = card("4242 4242-4242 4242", "04", "2030", "123");
        assert!(validate_card(&card, today()).is_ok());
    }

    #[test]
    fn bad_checksum_is_a_validation_error() {
        let card = card("4242424242424241", "04", "2030", "123");
        assert_matches!(validate_card(&card, today()), Err(PaymentError::InvalidCard(_)));
    }

    #[test]
    fn wrong_length_is_rejected() {
        let card = card("42424242", "04", "2030", "123");
        assert_matches!(validate_card(&card, today()), Err(PaymentError::InvalidCard(_)));
    }

    #[test]
    fn expired_card_is_rejected() {
        // Same year, previous month
        let card = card("4242424242424242", "05", "2025", "123");
        assert_matches!(
            validate_card(&card, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            Err(PaymentError::CardExpired)
        );
    }

    #[test]
    fn current_month_is_still_valid() {
        let card = card("4242424242424242", "06", "2025", "123");
        assert!(validate_card(&card, today()).is_ok());
    }

    #[test]
    fn implausible_future_year_is_rejected() {
        let card = card("4242424242424242", "06", "2055", "123");
        assert_matches!(validate_card(&card, today()), Err(PaymentError::InvalidCard(_)));
    }

    #[test]
    fn cvv_must_be_three_or_four_digits() {
        assert!(validate_cvv("123").is_ok());
        assert!(validate_cvv("1234").is_ok());
        assert_matches!(validate_cvv("12"), Err(PaymentError::InvalidCard(_)));
        assert_matches!(validate_cvv("12a"), Err(PaymentError::InvalidCard(_)));
    }
}
