use crate::model::{Ms, DAY_MS};

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

/// No single booking may occupy a salon for more than a day.
pub const MAX_BOOKING_SPAN_MS: Ms = DAY_MS;
pub const MAX_SERVICE_DURATION_MINUTES: i64 = 24 * 60;

/// Pending/confirmed intervals only. Terminal history is unbounded.
pub const MAX_INTERVALS_PER_SALON: usize = 100_000;
pub const MAX_SALONS: usize = 100_000;
