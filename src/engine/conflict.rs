use chrono::Datelike;

use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as Ms
}

pub(crate) fn validate_stay(stay: &Stay) -> Result<(), EngineError> {
    use crate::limits::*;
    if stay.check_out <= stay.check_in {
        return Err(EngineError::InvalidRange {
            check_in: stay.check_in,
            check_out: stay.check_out,
        });
    }
    if stay.check_in.year() < MIN_VALID_YEAR || stay.check_out.year() > MAX_VALID_YEAR {
        return Err(EngineError::LimitExceeded("stay date out of range"));
    }
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// Reject the stay if any existing booking on the room overlaps it under
/// the half-open test. Callers hold the room's write lock, which makes the
/// check + insert sequence atomic per room.
pub(crate) fn check_no_conflict(rs: &RoomState, stay: &Stay) -> Result<(), EngineError> {
    if let Some(existing) = rs.overlapping(stay).next() {
        return Err(EngineError::RoomUnavailable {
            room_id: rs.id,
            conflicting: existing.id,
        });
    }
    Ok(())
}
