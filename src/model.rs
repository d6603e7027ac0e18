use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — used for record timestamps only. Stay boundaries
/// are calendar dates, never instants.
pub type Ms = i64;

/// A guest stay: check-in and check-out calendar dates, check-in strictly
/// before check-out.
///
/// Two stays overlap under the half-open test: a stay ending on day X and
/// a stay starting on day X do NOT overlap (same-day turnover). Occupancy
/// expansion is inclusive on both ends — the two conventions intentionally
/// differ, see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        debug_assert!(check_in < check_out, "Stay check_in must be before check_out");
        Self { check_in, check_out }
    }

    /// Number of nights, always >= 1 for a valid stay.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    /// Every calendar day of the stay, check-in through check-out INCLUSIVE.
    /// This is the occupancy convention: the checkout day is also held.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.check_out;
        self.check_in.iter_days().take_while(move |d| *d <= last)
    }
}

/// Room classes offered by the property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomClass {
    Comfort,
    ComfortPlus,
    Apartment,
}

impl RoomClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomClass::Comfort => "comfort",
            RoomClass::ComfortPlus => "comfort-plus",
            RoomClass::Apartment => "apartment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "comfort" => Some(RoomClass::Comfort),
            "comfort-plus" => Some(RoomClass::ComfortPlus),
            "apartment" => Some(RoomClass::Apartment),
            _ => None,
        }
    }
}

impl std::fmt::Display for RoomClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is driving the connection. Derived once from the login user and
/// consumed at a single dispatch point in the wire layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Guest,
    Staff,
}

/// A confirmed reservation on a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: Ulid,
    pub guest_id: Ulid,
    pub stay: Stay,
    pub guests: u32,
    pub children: u32,
    pub created_at: Ms,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    /// Human-readable room number, unique across the catalog.
    pub number: String,
    pub class: RoomClass,
    pub nightly_price: Decimal,
    /// All bookings, sorted by `stay.check_in`.
    pub bookings: Vec<BookingRecord>,
    /// Derived day-level index: calendar day → owning booking. Rebuilt
    /// from `bookings`; never the source of truth.
    pub occupancy: BTreeMap<NaiveDate, Ulid>,
}

impl RoomState {
    pub fn new(id: Ulid, number: String, class: RoomClass, nightly_price: Decimal) -> Self {
        Self {
            id,
            number,
            class,
            nightly_price,
            bookings: Vec::new(),
            occupancy: BTreeMap::new(),
        }
    }

    /// Insert booking maintaining sort order by check-in.
    pub fn insert_booking(&mut self, booking: BookingRecord) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.stay.check_in, |b| b.stay.check_in)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<BookingRecord> {
        if let Some(pos) = self.bookings.iter().position(|b| b.id == id) {
            Some(self.bookings.remove(pos))
        } else {
            None
        }
    }

    /// Bookings whose stay overlaps the query under the half-open test.
    /// Uses binary search to skip bookings checking in at or after the
    /// query's check-out.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &BookingRecord> {
        // Everything at index >= right_bound checks in at or after
        // query.check_out → can't overlap.
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in < query.check_out);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out > query.check_in)
    }

    pub fn is_free(&self, query: &Stay) -> bool {
        self.overlapping(query).next().is_none()
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        number: String,
        class: RoomClass,
        // Decimal's default Deserialize needs a self-describing format;
        // bincode is not one, so prices go through the string codec.
        #[serde(with = "rust_decimal::serde::str")]
        nightly_price: Decimal,
    },
    RoomUpdated {
        id: Ulid,
        class: RoomClass,
        #[serde(with = "rust_decimal::serde::str")]
        nightly_price: Decimal,
    },
    RoomDeleted {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        room_id: Ulid,
        guest_id: Ulid,
        stay: Stay,
        guests: u32,
        children: u32,
        created_at: Ms,
    },
    BookingCancelled {
        id: Ulid,
        room_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub number: String,
    pub class: RoomClass,
    pub nightly_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub guest_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub children: u32,
    pub created_at: Ms,
}

/// One calendar day a given room is held by a given booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyInfo {
    pub room_id: Ulid,
    pub day: NaiveDate,
    pub booking_id: Ulid,
}

/// One month's bucket of the yearly revenue report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthRevenue {
    pub month: u32,
    pub nights: i64,
    pub revenue: Decimal,
}
