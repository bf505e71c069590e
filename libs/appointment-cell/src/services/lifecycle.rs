// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use shared_config::FeePolicy;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CancelOutcome, StatusTransition,
};
use crate::services::fees;

/// Drives an appointment's status machine and the derived-field recompute
/// contract. Transitions mutate the struct in memory and report the prior
/// and new status; persistence stays with the caller.
pub struct AppointmentLifecycleService {
    policy: FeePolicy,
}

impl AppointmentLifecycleService {
    pub fn new(policy: FeePolicy) -> Self {
        Self { policy }
    }

    /// Valid next statuses for a given current status.
    pub fn valid_transitions(&self, current: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Canceled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Canceled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states
            AppointmentStatus::Canceled
            | AppointmentStatus::Completed
            | AppointmentStatus::NoShow => vec![],
        }
    }

    pub fn validate_status_transition(
        &self,
        current: &AppointmentStatus,
        next: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current, next);

        if !self.valid_transitions(current).contains(next) {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            return Err(AppointmentError::InvalidStatusTransition(*current));
        }

        Ok(())
    }

    /// Recompute the derived fields in their contract order:
    ///
    /// 1. end_time from start + service duration (default when no service)
    /// 2. base_price from the service price, only when still unset
    /// 3. payment_due_date = start instant + policy due days, only when
    ///    unset — never touched again after the first computation
    /// 4. total_amount = base + cancellation fee + late fee
    ///
    /// Invoked explicitly by the transition functions and at creation, never
    /// as a hidden save hook.
    pub fn recompute_derived(
        &self,
        appointment: &mut Appointment,
        service_duration_minutes: Option<i32>,
        service_price: Option<Decimal>,
    ) {
        if appointment.end_time.is_none() {
            let duration = service_duration_minutes
                .map(i64::from)
                .unwrap_or(self.policy.default_slot_minutes);
            let end = appointment.date.and_time(appointment.start_time) + Duration::minutes(duration);
            appointment.end_time = Some(end.time());
        }

        if appointment.base_price.is_zero() {
            if let Some(price) = service_price {
                appointment.base_price = price;
            }
        }

        if appointment.payment_due_date.is_none() {
            appointment.payment_due_date =
                Some(appointment.appointment_datetime() + Duration::days(self.policy.payment_due_days));
        }

        appointment.total_amount =
            appointment.base_price + appointment.cancellation_fee + appointment.late_payment_fee;
    }

    /// Doctor accepts the booking. Only a pending appointment can be
    /// confirmed.
    pub fn confirm(
        &self,
        appointment: &mut Appointment,
        now: DateTime<Utc>,
    ) -> Result<StatusTransition, AppointmentError> {
        self.validate_status_transition(&appointment.status, &AppointmentStatus::Confirmed)?;

        let transition = StatusTransition {
            from: appointment.status,
            to: AppointmentStatus::Confirmed,
        };

        appointment.status = AppointmentStatus::Confirmed;
        appointment.confirmed_at = Some(now);
        appointment.updated_at = now;
        self.recompute_derived(appointment, None, None);

        Ok(transition)
    }

    /// Doctor closes out a held consultation. Only allowed from Confirmed.
    pub fn complete(
        &self,
        appointment: &mut Appointment,
        now: DateTime<Utc>,
    ) -> Result<StatusTransition, AppointmentError> {
        self.validate_status_transition(&appointment.status, &AppointmentStatus::Completed)?;

        let transition = StatusTransition {
            from: appointment.status,
            to: AppointmentStatus::Completed,
        };

        appointment.status = AppointmentStatus::Completed;
        appointment.updated_at = now;
        self.recompute_derived(appointment, None, None);

        Ok(transition)
    }

    /// Administrative no-show marking. Only allowed from Confirmed.
    pub fn mark_no_show(
        &self,
        appointment: &mut Appointment,
        now: DateTime<Utc>,
    ) -> Result<StatusTransition, AppointmentError> {
        self.validate_status_transition(&appointment.status, &AppointmentStatus::NoShow)?;

        let transition = StatusTransition {
            from: appointment.status,
            to: AppointmentStatus::NoShow,
        };

        appointment.status = AppointmentStatus::NoShow;
        appointment.updated_at = now;
        self.recompute_derived(appointment, None, None);

        Ok(transition)
    }

    /// Cancel a pending or confirmed future appointment. Inside the
    /// 24-hour window a cancellation fee is levied; when the appointment
    /// was already paid the outcome reports the partial refund owed
    /// (base price minus the fee) for the payment ledger to execute.
    pub fn cancel(
        &self,
        appointment: &mut Appointment,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CancelOutcome, AppointmentError> {
        self.validate_status_transition(&appointment.status, &AppointmentStatus::Canceled)?;

        if appointment.is_past(now) {
            warn!("Attempted to cancel past appointment {}", appointment.id);
            return Err(AppointmentError::CannotCancelPast);
        }

        let fee = fees::cancellation_fee(appointment, now, &self.policy);

        let transition = StatusTransition {
            from: appointment.status,
            to: AppointmentStatus::Canceled,
        };

        appointment.status = AppointmentStatus::Canceled;
        appointment.canceled_at = Some(now);
        appointment.cancellation_reason = reason.to_string();
        appointment.cancellation_fee = fee;
        appointment.updated_at = now;
        self.recompute_derived(appointment, None, None);

        // The partial refund belongs to the fee-charging path only; an early
        // (free) cancellation of a paid appointment is settled outside this
        // flow.
        let refund_due = if appointment.is_paid && fee > Decimal::ZERO {
            let refund = appointment.base_price - fee;
            (refund > Decimal::ZERO).then_some(refund)
        } else {
            None
        };

        Ok(CancelOutcome {
            transition,
            cancellation_fee: fee,
            refund_due,
        })
    }

    /// Recompute the late fee for `now` and apply it only when strictly
    /// greater than the stored value, so the persisted fee never decreases.
    /// Returns the new fee when one was applied.
    pub fn apply_late_fee(&self, appointment: &mut Appointment, now: DateTime<Utc>) -> Option<Decimal> {
        let fee = fees::late_payment_fee(appointment, now, &self.policy);

        if fee > appointment.late_payment_fee {
            appointment.late_payment_fee = fee;
            appointment.updated_at = now;
            self.recompute_derived(appointment, None, None);
            Some(fee)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::sample_appointment;
    use assert_matches::assert_matches;
    use chrono::{Duration, NaiveTime};
    use rust_decimal_macros::dec;

    fn service() -> AppointmentLifecycleService {
        AppointmentLifecycleService::new(FeePolicy::default())
    }

    fn before_start(appointment: &Appointment, hours: i64) -> DateTime<Utc> {
        appointment.appointment_datetime() - Duration::hours(hours)
    }

    #[test]
    fn recompute_sets_end_time_from_service_duration() {
        let mut appt = sample_appointment();
        service().recompute_derived(&mut appt, Some(45), None);

        assert_eq!(appt.end_time, Some(NaiveTime::from_hms_opt(10, 45, 0).unwrap()));
    }

    #[test]
    fn recompute_defaults_to_thirty_minutes_without_service() {
        let mut appt = sample_appointment();
        service().recompute_derived(&mut appt, None, None);

        assert_eq!(appt.end_time, Some(NaiveTime::from_hms_opt(10, 30, 0).unwrap()));
    }

    #[test]
    fn recompute_never_overwrites_an_explicit_end_time() {
        let mut appt = sample_appointment();
        appt.end_time = Some(NaiveTime::from_hms_opt(11, 15, 0).unwrap());
        service().recompute_derived(&mut appt, Some(30), None);

        assert_eq!(appt.end_time, Some(NaiveTime::from_hms_opt(11, 15, 0).unwrap()));
    }

    #[test]
    fn recompute_takes_service_price_only_when_unset() {
        let mut appt = sample_appointment();
        appt.base_price = Decimal::ZERO;
        service().recompute_derived(&mut appt, None, Some(dec!(150.00)));
        assert_eq!(appt.base_price, dec!(150.00));

        // A price already present is left as given.
        service().recompute_derived(&mut appt, None, Some(dec!(999.00)));
        assert_eq!(appt.base_price, dec!(150.00));
    }

    #[test]
    fn payment_due_date_is_set_once_and_never_recomputed() {
        let mut appt = sample_appointment();
        service().recompute_derived(&mut appt, None, None);

        let due = appt.payment_due_date.expect("due date set at creation");
        assert_eq!(due, appt.appointment_datetime() + Duration::days(25));

        // Shift the start; the due date must not move.
        appt.start_time = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
        service().recompute_derived(&mut appt, None, None);
        assert_eq!(appt.payment_due_date, Some(due));
    }

    #[test]
    fn total_always_equals_sum_of_components() {
        let mut appt = sample_appointment();
        appt.cancellation_fee = dec!(100.00);
        appt.late_payment_fee = dec!(30.00);
        service().recompute_derived(&mut appt, None, None);

        assert_eq!(appt.total_amount, dec!(330.00));
    }

    #[test]
    fn confirm_moves_pending_to_confirmed() {
        let mut appt = sample_appointment();
        let now = before_start(&appt, 48);

        let transition = service().confirm(&mut appt, now).unwrap();

        assert_eq!(transition.from, AppointmentStatus::Pending);
        assert_eq!(transition.to, AppointmentStatus::Confirmed);
        assert_eq!(appt.status, AppointmentStatus::Confirmed);
        assert_eq!(appt.confirmed_at, Some(now));
    }

    #[test]
    fn confirm_rejects_completed_without_mutation() {
        let mut appt = sample_appointment();
        appt.status = AppointmentStatus::Completed;
        let snapshot = appt.clone();
        let now = before_start(&appt, 48);

        let err = service().confirm(&mut appt, now).unwrap_err();

        assert_matches!(err, AppointmentError::InvalidStatusTransition(AppointmentStatus::Completed));
        assert_eq!(appt.status, snapshot.status);
        assert_eq!(appt.confirmed_at, snapshot.confirmed_at);
        assert_eq!(appt.updated_at, snapshot.updated_at);
    }

    #[test]
    fn complete_requires_confirmed() {
        let mut appt = sample_appointment();
        let now = before_start(&appt, 48);

        assert_matches!(
            service().complete(&mut appt, now),
            Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Pending))
        );

        service().confirm(&mut appt, now).unwrap();
        let transition = service().complete(&mut appt, now).unwrap();
        assert_eq!(transition.to, AppointmentStatus::Completed);
    }

    #[test]
    fn no_show_requires_confirmed() {
        let mut appt = sample_appointment();
        let now = before_start(&appt, 48);

        assert_matches!(
            service().mark_no_show(&mut appt, now),
            Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Pending))
        );
    }

    #[test]
    fn terminal_states_allow_no_transitions() {
        let lifecycle = service();
        for terminal in [
            AppointmentStatus::Canceled,
            AppointmentStatus::Completed,
            AppointmentStatus::NoShow,
        ] {
            assert!(lifecycle.valid_transitions(&terminal).is_empty());
        }
    }

    #[test]
    fn early_cancellation_is_free() {
        let mut appt = sample_appointment();
        let now = before_start(&appt, 48);

        let outcome = service().cancel(&mut appt, "travel", now).unwrap();

        assert_eq!(outcome.cancellation_fee, Decimal::ZERO);
        assert_eq!(outcome.refund_due, None);
        assert_eq!(appt.status, AppointmentStatus::Canceled);
        assert_eq!(appt.cancellation_reason, "travel");
        assert_eq!(appt.total_amount, dec!(200.00));
    }

    #[test]
    fn late_cancellation_levies_fee_and_updates_total() {
        let mut appt = sample_appointment();
        let now = before_start(&appt, 10);

        let outcome = service().cancel(&mut appt, "", now).unwrap();

        assert_eq!(outcome.cancellation_fee, dec!(100.00));
        assert_eq!(appt.cancellation_fee, dec!(100.00));
        assert_eq!(appt.total_amount, dec!(300.00));
    }

    #[test]
    fn late_cancellation_of_paid_appointment_reports_partial_refund() {
        let mut appt = sample_appointment();
        appt.is_paid = true;
        let now = before_start(&appt, 10);

        let outcome = service().cancel(&mut appt, "", now).unwrap();

        // Refund = base (200) - fee (100)
        assert_eq!(outcome.refund_due, Some(dec!(100.00)));
        // The settled flag is not reversed by cancellation.
        assert!(appt.is_paid);
    }

    #[test]
    fn cancel_rejects_past_appointments() {
        let mut appt = sample_appointment();
        let now = appt.appointment_datetime() + Duration::hours(1);

        assert_matches!(
            service().cancel(&mut appt, "", now),
            Err(AppointmentError::CannotCancelPast)
        );
        assert_eq!(appt.status, AppointmentStatus::Pending);
    }

    #[test]
    fn apply_late_fee_is_monotonic() {
        let mut appt = sample_appointment();
        let due = appt.appointment_datetime();
        appt.payment_due_date = Some(due);

        // 14 days overdue: 15% of 200
        let applied = service().apply_late_fee(&mut appt, due + Duration::days(14));
        assert_eq!(applied, Some(dec!(30.00)));
        assert_eq!(appt.total_amount, dec!(230.00));

        // A later recomputation with a smaller nominal value (clock skew)
        // must not lower the stored fee.
        let reapplied = service().apply_late_fee(&mut appt, due + Duration::days(3));
        assert_eq!(reapplied, None);
        assert_eq!(appt.late_payment_fee, dec!(30.00));
    }
}
