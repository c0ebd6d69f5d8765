//! Hard limits. Every externally-reachable collection and every
//! externally-supplied size is bounded by one of these.

use crate::model::Ms;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_CATALOG_ADDONS: usize = 10_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;
pub const MAX_ADDONS_PER_BOOKING: usize = 64;
pub const MAX_PAYMENTS_PER_BOOKING: usize = 1_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_ROOM_TYPE_LEN: usize = 64;
pub const MAX_RECEIPT_REF_LEN: usize = 512;

/// 2000-01-01T00:00:00Z — anything earlier is a client bug.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Longest bookable stay: 366 days.
pub const MAX_STAY_DURATION_MS: Ms = 366 * 86_400_000;
/// Widest availability query window: 2 years.
pub const MAX_QUERY_WINDOW_MS: Ms = 2 * 366 * 86_400_000;

/// Minimum notice before check-in for a cancellation to be accepted.
pub const CANCEL_NOTICE_MS: Ms = 24 * 3_600_000;

/// Longest accepted wire request line (bytes).
pub const MAX_REQUEST_LINE_LEN: usize = 64 * 1024;
