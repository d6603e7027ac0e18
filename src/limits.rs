//! Engine-wide caps. Violations surface as `EngineError::LimitExceeded`
//! with the static reason.

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 10_000;
pub const MAX_ROOM_NUMBER_LEN: usize = 16;

/// Longest accepted stay, in nights.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Accepted check-in/check-out year window.
pub const MIN_VALID_YEAR: i32 = 1970;
pub const MAX_VALID_YEAR: i32 = 2200;
