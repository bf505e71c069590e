// libs/appointment-cell/src/services/fees.rs
//
// Fee policy computations. Pure functions over the injected policy so unit
// tests can vary percentages without touching process state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use shared_config::FeePolicy;

use crate::models::Appointment;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Fee levied when a cancellation lands inside the 24-hour window before
/// the appointment. Zero outside the window or when there is nothing to
/// charge against.
pub fn cancellation_fee(appointment: &Appointment, now: DateTime<Utc>, policy: &FeePolicy) -> Decimal {
    if appointment.base_price.is_zero() {
        return Decimal::ZERO;
    }

    if appointment.hours_until(now) >= 24.0 {
        return Decimal::ZERO;
    }

    appointment.base_price * Decimal::from(policy.cancellation_fee_percent) / HUNDRED
}

/// Escalating weekly penalty once the payment due date has passed, capped at
/// `max_late_fee_percent` of the base price.
///
/// Always returns the correct fee for `now`; callers must apply the result
/// only when it exceeds the stored fee, so the persisted value never
/// decreases under clock skew.
pub fn late_payment_fee(appointment: &Appointment, now: DateTime<Utc>, policy: &FeePolicy) -> Decimal {
    if appointment.base_price.is_zero() || appointment.is_paid {
        return Decimal::ZERO;
    }

    let due_date = match appointment.payment_due_date {
        Some(due) => due,
        None => return Decimal::ZERO,
    };

    if now <= due_date {
        return Decimal::ZERO;
    }

    let days_overdue = (now - due_date).num_days();
    let weeks_overdue = std::cmp::max(1, days_overdue / 7 + 1) as u32;

    let percent = std::cmp::min(
        policy.weekly_late_fee_percent * weeks_overdue,
        policy.max_late_fee_percent,
    );

    appointment.base_price * Decimal::from(percent) / HUNDRED
}
