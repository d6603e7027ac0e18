use std::collections::BTreeMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

// ── Occupancy projection ──────────────────────────────────────────
//
// Occupancy is derived state: one row per calendar day a room is held,
// check-in through check-out inclusive. It exists so "is this room taken
// on day D" is a map lookup instead of a range scan. The booking list is
// the source of truth; the projection is rebuilt from it on replay, on
// cancellation and on reconcile.

/// Expand a booking into its occupancy days, check-in through check-out
/// inclusive. Pure — does not touch room state.
pub fn expand(room_id: Ulid, booking: &BookingRecord) -> Vec<OccupancyInfo> {
    booking
        .stay
        .days()
        .map(|day| OccupancyInfo {
            room_id,
            day,
            booking_id: booking.id,
        })
        .collect()
}

/// Apply a booking's expansion to the room's occupancy map with
/// get-or-create semantics: a day already claimed (by this booking or an
/// earlier one sharing a turnover day) is left untouched. Re-running for
/// the same booking inserts nothing new. Returns the number of days
/// actually inserted.
pub fn apply_expansion(rs: &mut RoomState, booking: &BookingRecord) -> usize {
    let mut inserted = 0;
    for day in booking.stay.days() {
        rs.occupancy.entry(day).or_insert_with(|| {
            inserted += 1;
            booking.id
        });
    }
    inserted
}

/// Recompute the full projection from the booking list. Deterministic:
/// bookings are walked in check-in order, so a turnover day shared by two
/// back-to-back stays always resolves to the earlier check-in. Returns
/// (days added, days removed) relative to the previous map.
pub fn rebuild(rs: &mut RoomState) -> (usize, usize) {
    let mut fresh: BTreeMap<NaiveDate, Ulid> = BTreeMap::new();
    for booking in &rs.bookings {
        for day in booking.stay.days() {
            fresh.entry(day).or_insert(booking.id);
        }
    }

    let added = fresh
        .iter()
        .filter(|(day, id)| rs.occupancy.get(day) != Some(id))
        .count();
    let removed = rs
        .occupancy
        .iter()
        .filter(|(day, id)| fresh.get(day) != Some(id))
        .count();

    rs.occupancy = fresh;
    (added, removed)
}
