use crate::model::Ms;

pub const MAX_TENANTS: usize = 10_000;
pub const MAX_TENANT_SLUG_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = 50;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_NOTES_LEN: usize = 1_000;

/// Two submissions by the same customer for the same professional whose
/// start times fall within this window count as one (retry/double-click).
pub const DUPLICATE_WINDOW_MS: Ms = 60_000;

/// Slot length when no service is supplied or the service is unknown.
pub const DEFAULT_SERVICE_DURATION_MIN: u32 = 30;

/// The slot cursor never advances by less than this, even for short services.
pub const MIN_SLOT_STEP_MIN: u32 = 30;

/// Booking transaction bound. Exceeding it surfaces `Unavailable`.
pub const DEFAULT_TXN_TIMEOUT_MS: u64 = 10_000;

/// Attempts per booking: the initial transaction plus one retry.
pub const TXN_ATTEMPTS: u32 = 2;
