use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_stay};
use super::occupancy::rebuild;
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_room(
        &self,
        id: Ulid,
        number: String,
        class: RoomClass,
        nightly_price: Decimal,
    ) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        if self.state.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if number.is_empty() || number.len() > MAX_ROOM_NUMBER_LEN {
            return Err(EngineError::LimitExceeded("room number length"));
        }
        if nightly_price < Decimal::ZERO {
            return Err(EngineError::NegativePrice);
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        // entry() makes number reservation atomic across concurrent creates
        match self.numbers.entry(number.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(EngineError::DuplicateRoomNumber(number));
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(id);
            }
        }

        let event = Event::RoomCreated {
            id,
            number: number.clone(),
            class,
            nightly_price,
        };
        if let Err(e) = self.wal_append(&event).await {
            self.numbers.remove(&number);
            return Err(e);
        }
        let rs = RoomState::new(id, number, class, nightly_price);
        self.state.insert(id, Arc::new(RwLock::new(rs)));
        Ok(())
    }

    pub async fn update_room(
        &self,
        id: Ulid,
        class: Option<RoomClass>,
        nightly_price: Option<Decimal>,
    ) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        if let Some(p) = nightly_price
            && p < Decimal::ZERO
        {
            return Err(EngineError::NegativePrice);
        }
        let rs = self
            .get_room_state(&id)
            .ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;

        // The event carries the full post-update values so replay never
        // needs to know which fields the client actually set.
        let event = Event::RoomUpdated {
            id,
            class: class.unwrap_or(guard.class),
            nightly_price: nightly_price.unwrap_or(guard.nightly_price),
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Delete a room and all bookings on it.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let rs = self
            .get_room_state(&id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = rs.write().await;

        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        self.numbers.remove(&guard.number);
        for booking in &guard.bookings {
            self.booking_to_room.remove(&booking.id);
        }
        drop(guard);
        self.state.remove(&id);
        Ok(())
    }

    pub async fn create_booking(
        &self,
        id: Ulid,
        room_id: Ulid,
        guest_id: Ulid,
        stay: Stay,
        guests: u32,
        children: u32,
    ) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        validate_stay(&stay)?;
        if guests == 0 {
            return Err(EngineError::InvalidGuestCount(guests));
        }
        if self.booking_to_room.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }

        // Conflict check and insert happen under the same write lock, so
        // two concurrent requests for the same dates cannot both pass.
        check_no_conflict(&guard, &stay)?;

        let event = Event::BookingCreated {
            id,
            room_id,
            guest_id,
            stay,
            guests,
            children,
            created_at: now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let (room_id, mut guard) = self.resolve_booking_write(&id).await?;
        let event = Event::BookingCancelled { id, room_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(room_id)
    }

    /// Rebuild a room's occupancy projection from its booking list.
    /// Derived state only — no WAL event is written. Returns
    /// (days added, days removed).
    pub async fn reconcile_occupancy(&self, room_id: Ulid) -> Result<(usize, usize), EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        Ok(rebuild(&mut guard))
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Exclusive gate: no append may be acknowledged between taking
        // the snapshot and swapping the compacted file in, or the rename
        // would erase it.
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();

        let room_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in room_ids {
            let entry = match self.state.get(&id) {
                Some(e) => e,
                None => continue,
            };
            let rs = entry.value().clone();
            drop(entry);
            let guard = rs.read().await;

            events.push(Event::RoomCreated {
                id: guard.id,
                number: guard.number.clone(),
                class: guard.class,
                nightly_price: guard.nightly_price,
            });
            // Occupancy is not emitted: replay re-derives it from the
            // booking events.
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: booking.id,
                    room_id: guard.id,
                    guest_id: booking.guest_id,
                    stay: booking.stay,
                    guests: booking.guests,
                    children: booking.children,
                    created_at: booking.created_at,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
