//! Hard limits guarding engine inputs.

/// Widest availability query window, in calendar days (inclusive range).
pub const MAX_QUERY_DAYS: i64 = 92;

/// Longest single session.
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// Longest student/tutor note attached to a booking.
pub const MAX_NOTE_LEN: usize = 2048;

/// Longest decline reason.
pub const MAX_REASON_LEN: usize = 512;

/// Bookings retained per tutor (terminal ones included).
pub const MAX_BOOKINGS_PER_TUTOR: usize = 100_000;
