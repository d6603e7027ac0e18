use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    DuplicateRoomNumber(String),
    InvalidRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    RoomUnavailable {
        room_id: Ulid,
        conflicting: Ulid,
    },
    InvalidGuestCount(u32),
    NegativePrice,
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::DuplicateRoomNumber(number) => {
                write!(f, "room number already in use: {number}")
            }
            EngineError::InvalidRange { check_in, check_out } => {
                write!(f, "invalid stay: check-out {check_out} must be after check-in {check_in}")
            }
            EngineError::RoomUnavailable { room_id, conflicting } => {
                write!(f, "room {room_id} unavailable: overlaps booking {conflicting}")
            }
            EngineError::InvalidGuestCount(n) => {
                write!(f, "guest count must be at least 1, got {n}")
            }
            EngineError::NegativePrice => write!(f, "nightly price must not be negative"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
