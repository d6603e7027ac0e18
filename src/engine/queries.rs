use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

use crate::model::*;

use super::availability::{pick_cheapest_per_class, room_is_free};
use super::conflict::validate_stay;
use super::revenue::{aggregate_room_year, empty_year};
use super::{Engine, EngineError};

fn booking_info(room_id: Ulid, record: &BookingRecord) -> BookingInfo {
    BookingInfo {
        id: record.id,
        room_id,
        guest_id: record.guest_id,
        check_in: record.stay.check_in,
        check_out: record.stay.check_out,
        guests: record.guests,
        children: record.children,
        created_at: record.created_at,
    }
}

impl Engine {
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        // Writers hold the room lock across the WAL fsync, so never
        // try_read here; wait like every other query path.
        let arcs: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut rooms = Vec::with_capacity(arcs.len());
        for rs in arcs {
            let guard = rs.read().await;
            rooms.push(RoomInfo {
                id: guard.id,
                number: guard.number.clone(),
                class: guard.class,
                nightly_price: guard.nightly_price,
            });
        }
        rooms.sort_by(|a, b| a.number.cmp(&b.number));
        rooms
    }

    pub async fn get_room_info(&self, id: Ulid) -> Result<RoomInfo, EngineError> {
        let rs = self
            .get_room_state(&id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(RoomInfo {
            id: guard.id,
            number: guard.number.clone(),
            class: guard.class,
            nightly_price: guard.nightly_price,
        })
    }

    /// All rooms free for the whole stay, sorted by room number.
    pub async fn find_available_rooms(&self, stay: Stay) -> Result<Vec<RoomInfo>, EngineError> {
        validate_stay(&stay)?;
        let arcs: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut free = Vec::new();
        for rs in arcs {
            let guard = rs.read().await;
            if room_is_free(&guard, &stay) {
                free.push(RoomInfo {
                    id: guard.id,
                    number: guard.number.clone(),
                    class: guard.class,
                    nightly_price: guard.nightly_price,
                });
            }
        }
        free.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(free)
    }

    /// The availability result collapsed to the cheapest room per class,
    /// sorted ascending by price. What a booking page would show.
    pub async fn offered_rooms(&self, stay: Stay) -> Result<Vec<RoomInfo>, EngineError> {
        let free = self.find_available_rooms(stay).await?;
        Ok(pick_cheapest_per_class(free))
    }

    pub async fn get_bookings(&self, room_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let rs = match self.get_room_state(&room_id) {
            Some(rs) => rs,
            None => return Ok(vec![]),
        };
        let guard = rs.read().await;
        Ok(guard
            .bookings
            .iter()
            .map(|b| booking_info(room_id, b))
            .collect())
    }

    /// All bookings across rooms, optionally filtered by check-in year and
    /// month, newest created first.
    pub async fn list_bookings(
        &self,
        year: Option<i32>,
        month: Option<u32>,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        let arcs: Vec<(Ulid, _)> = self
            .state
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        let mut bookings = Vec::new();
        for (room_id, rs) in arcs {
            let guard = rs.read().await;
            for b in &guard.bookings {
                if let Some(y) = year
                    && b.stay.check_in.year() != y
                {
                    continue;
                }
                if let Some(m) = month
                    && b.stay.check_in.month() != m
                {
                    continue;
                }
                bookings.push(booking_info(room_id, b));
            }
        }
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }

    pub async fn bookings_for_guest(&self, guest_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let mut bookings = self.list_bookings(None, None).await?;
        bookings.retain(|b| b.guest_id == guest_id);
        Ok(bookings)
    }

    /// Day-level availability answered from the occupancy projection: a
    /// map lookup, not a range scan over the booking list.
    pub async fn is_free_on(&self, room_id: Ulid, day: NaiveDate) -> Result<bool, EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(!guard.occupancy.contains_key(&day))
    }

    /// The room's occupancy projection, one row per held calendar day,
    /// optionally narrowed to a single day.
    pub async fn occupancy(
        &self,
        room_id: Ulid,
        day: Option<NaiveDate>,
    ) -> Result<Vec<OccupancyInfo>, EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard
            .occupancy
            .iter()
            .filter(|(d, _)| day.is_none_or(|q| **d == q))
            .map(|(d, booking_id)| OccupancyInfo {
                room_id,
                day: *d,
                booking_id: *booking_id,
            })
            .collect())
    }

    /// Monthly revenue report for one year: always twelve buckets, a
    /// booking counted in its check-in month.
    pub async fn aggregate_year(&self, year: i32) -> Result<Vec<MonthRevenue>, EngineError> {
        let mut buckets = empty_year();
        let arcs: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        for rs in arcs {
            let guard = rs.read().await;
            aggregate_room_year(&mut buckets, &guard, year);
        }
        Ok(buckets)
    }
}
