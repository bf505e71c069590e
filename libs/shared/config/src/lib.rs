use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub fee_policy: FeePolicy,
}

/// Monetary policy knobs for the fee engine. Always passed by reference into
/// the fee computations so tests can vary them without touching the process
/// environment.
#[derive(Debug, Clone, PartialEq)]
pub struct FeePolicy {
    /// Percent of the base price charged when cancelling inside the
    /// 24-hour window.
    pub cancellation_fee_percent: u32,
    /// Percent of the base price added per overdue week.
    pub weekly_late_fee_percent: u32,
    /// Ceiling for the accumulated late-fee percentage.
    pub max_late_fee_percent: u32,
    /// Days between the appointment start and the payment due date.
    pub payment_due_days: i64,
    /// Slot length used when an appointment has no service attached.
    pub default_slot_minutes: i64,
    /// How far ahead bookings are accepted.
    pub max_advance_booking_days: i64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            cancellation_fee_percent: 50,
            weekly_late_fee_percent: 5,
            max_late_fee_percent: 50,
            payment_due_days: 25,
            default_slot_minutes: 30,
            max_advance_booking_days: 90,
        }
    }
}

impl FeePolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cancellation_fee_percent: env_or("CANCELLATION_FEE_PERCENT", defaults.cancellation_fee_percent),
            weekly_late_fee_percent: env_or("WEEKLY_LATE_FEE_PERCENT", defaults.weekly_late_fee_percent),
            max_late_fee_percent: env_or("MAX_LATE_FEE_PERCENT", defaults.max_late_fee_percent),
            payment_due_days: env_or("PAYMENT_DUE_DAYS", defaults.payment_due_days),
            default_slot_minutes: env_or("DEFAULT_SLOT_MINUTES", defaults.default_slot_minutes),
            max_advance_booking_days: env_or("MAX_ADVANCE_BOOKING_DAYS", defaults.max_advance_booking_days),
        }
    }
}

fn env_or<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has a non-numeric value, using default", key);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            fee_policy: FeePolicy::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
    }
}
