use std::collections::HashMap;

use crate::model::*;

// ── Availability ──────────────────────────────────────────────────

/// True if no booking on the room overlaps the candidate stay under the
/// half-open test. A booking checking out on the stay's check-in day does
/// not block it (same-day turnover).
pub fn room_is_free(rs: &RoomState, stay: &Stay) -> bool {
    rs.is_free(stay)
}

/// Presentation policy applied on top of the raw availability result:
/// collapse to one representative room per class, keeping the cheapest,
/// and return the survivors sorted ascending by nightly price.
///
/// Ties on price resolve to the lower room number so the result is stable.
pub fn pick_cheapest_per_class(rooms: Vec<RoomInfo>) -> Vec<RoomInfo> {
    let mut best: HashMap<RoomClass, RoomInfo> = HashMap::new();
    for room in rooms {
        match best.get(&room.class) {
            Some(current)
                if (current.nightly_price, &current.number)
                    <= (room.nightly_price, &room.number) => {}
            _ => {
                best.insert(room.class, room);
            }
        }
    }
    let mut picked: Vec<RoomInfo> = best.into_values().collect();
    picked.sort_by(|a, b| {
        a.nightly_price
            .cmp(&b.nightly_price)
            .then_with(|| a.number.cmp(&b.number))
    });
    picked
}
