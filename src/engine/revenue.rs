use chrono::Datelike;
use rust_decimal::Decimal;

use crate::model::*;

// ── Revenue aggregation ───────────────────────────────────────────

/// Twelve zero-filled buckets, months 1..=12. The report always has all
/// twelve entries regardless of data sparsity.
pub fn empty_year() -> Vec<MonthRevenue> {
    (1..=12)
        .map(|month| MonthRevenue {
            month,
            nights: 0,
            revenue: Decimal::ZERO,
        })
        .collect()
}

/// Fold one room's bookings into the yearly buckets. A booking counts iff
/// its check-in falls in `year`; nights × nightly price are attributed
/// wholly to the check-in month, even when the stay spans a month or year
/// boundary.
pub fn aggregate_room_year(buckets: &mut [MonthRevenue], rs: &RoomState, year: i32) {
    for booking in &rs.bookings {
        if booking.stay.check_in.year() != year {
            continue;
        }
        let nights = booking.stay.nights();
        let bucket = &mut buckets[booking.stay.check_in.month0() as usize];
        bucket.nights += nights;
        bucket.revenue += Decimal::from(nights) * rs.nightly_price;
    }
}

pub fn total_revenue(buckets: &[MonthRevenue]) -> Decimal {
    buckets.iter().map(|b| b.revenue).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn room_with_price(price: i64, stays: Vec<Stay>) -> RoomState {
        let mut rs = RoomState::new(
            Ulid::new(),
            "101".into(),
            RoomClass::Comfort,
            Decimal::from(price),
        );
        for stay in stays {
            rs.insert_booking(BookingRecord {
                id: Ulid::new(),
                guest_id: Ulid::new(),
                stay,
                guests: 1,
                children: 0,
                created_at: 0,
            });
        }
        rs
    }

    #[test]
    fn empty_year_has_twelve_zero_buckets() {
        let buckets = empty_year();
        assert_eq!(buckets.len(), 12);
        for (i, b) in buckets.iter().enumerate() {
            assert_eq!(b.month, i as u32 + 1);
            assert_eq!(b.nights, 0);
            assert_eq!(b.revenue, Decimal::ZERO);
        }
    }

    #[test]
    fn aggregates_two_bookings_same_month() {
        let mut buckets = empty_year();
        let room_a = room_with_price(100, vec![Stay::new(d(2024, 1, 10), d(2024, 1, 12))]);
        let room_b = room_with_price(50, vec![Stay::new(d(2024, 1, 20), d(2024, 1, 21))]);
        aggregate_room_year(&mut buckets, &room_a, 2024);
        aggregate_room_year(&mut buckets, &room_b, 2024);

        assert_eq!(buckets[0].nights, 3);
        assert_eq!(buckets[0].revenue, Decimal::from(250));
        for b in &buckets[1..] {
            assert_eq!(b.nights, 0);
            assert_eq!(b.revenue, Decimal::ZERO);
        }
        assert_eq!(total_revenue(&buckets), Decimal::from(250));
    }

    #[test]
    fn month_spanning_stay_attributed_to_check_in_month() {
        let mut buckets = empty_year();
        let room = room_with_price(100, vec![Stay::new(d(2024, 1, 30), d(2024, 2, 2))]);
        aggregate_room_year(&mut buckets, &room, 2024);

        assert_eq!(buckets[0].nights, 3);
        assert_eq!(buckets[0].revenue, Decimal::from(300));
        assert_eq!(buckets[1].nights, 0);
    }

    #[test]
    fn other_years_excluded() {
        let mut buckets = empty_year();
        let room = room_with_price(
            100,
            vec![
                Stay::new(d(2023, 12, 30), d(2024, 1, 2)),
                Stay::new(d(2024, 5, 1), d(2024, 5, 3)),
                Stay::new(d(2025, 1, 1), d(2025, 1, 2)),
            ],
        );
        aggregate_room_year(&mut buckets, &room, 2024);

        // Only the May stay counts; the December one belongs to 2023 by
        // check-in even though it ends in 2024.
        assert_eq!(buckets[4].nights, 2);
        assert_eq!(total_revenue(&buckets), Decimal::from(200));
    }

    #[test]
    fn fractional_prices_accumulate_exactly() {
        let mut buckets = empty_year();
        let mut rs = room_with_price(0, vec![Stay::new(d(2024, 3, 1), d(2024, 3, 4))]);
        rs.nightly_price = Decimal::new(9950, 2); // 99.50
        aggregate_room_year(&mut buckets, &rs, 2024);
        assert_eq!(buckets[2].revenue, Decimal::new(29850, 2)); // 3 × 99.50
    }
}
