use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::room::RoomType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Pending is the only state that moves; every other state is final.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        self == BookingStatus::Pending && next != BookingStatus::Pending
    }
}

/// A validated date range, check-out strictly after check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct Stay {
    #[sqlx(rename = "check_in_date")]
    pub check_in: NaiveDate,
    #[sqlx(rename = "check_out_date")]
    pub check_out: NaiveDate,
}

impl Stay {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> AppResult<Self> {
        if check_out <= check_in {
            return Err(AppError::bad_request(
                "Check-out date must be after check-in date",
            ));
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Inclusive on both ends: a stay ending on the day another begins conflicts.
    pub fn overlaps(&self, other: &Stay) -> bool {
        other.check_in <= self.check_out && other.check_out >= self.check_in
    }

    pub fn total_for(&self, nightly_price: Decimal) -> Decimal {
        nightly_price * Decimal::from(self.nights())
    }
}

pub const BOOKING_COLUMNS: &str = "id, user_id, room_id, check_in_date, check_out_date, \
     number_of_guests, total_amount, status, special_requests, admin_notes, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub room_id: i64,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub number_of_guests: i32,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub special_requests: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking joined with its guest and room, used by every listing.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookingWithDetails {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub user_email: String,
    pub room_id: i64,
    pub room_name: String,
    pub room_type: RoomType,
    pub room_price: Decimal,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub number_of_guests: i32,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub special_requests: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const BOOKING_DETAILS_SELECT: &str = "SELECT b.id, b.user_id, u.name AS user_name, \
     u.email AS user_email, b.room_id, r.name AS room_name, r.type AS room_type, \
     r.price AS room_price, b.check_in_date, b.check_out_date, b.number_of_guests, \
     b.total_amount, b.status, b.special_requests, b.admin_notes, b.created_at, b.updated_at \
     FROM bookings b JOIN users u ON u.id = b.user_id JOIN rooms r ON r.id = b.room_id";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub room_id: i64,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    #[validate(range(min = 1, message = "Number of guests must be at least 1"))]
    pub number_of_guests: i32,
    #[validate(length(max = 1000, message = "Special requests must be less than 1000 characters"))]
    pub special_requests: Option<String>,
}

impl BookingRequest {
    pub fn stay(&self) -> AppResult<Stay> {
        Stay::new(self.check_in_date, self.check_out_date)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingStatusUpdate {
    pub status: BookingStatus,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub room_id: i64,
    pub available: bool,
    pub nights: i64,
    pub total_amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn stay(check_in: &str, check_out: &str) -> Stay {
        Stay::new(date(check_in), date(check_out)).unwrap()
    }

    #[test]
    fn two_nights_at_100_costs_200() {
        let s = stay("2024-06-01", "2024-06-03");
        assert_eq!(s.nights(), 2);
        assert_eq!(s.total_for(Decimal::from(100)), Decimal::from(200));
    }

    #[test]
    fn overlapping_request_conflicts() {
        let existing = stay("2024-06-01", "2024-06-03");
        assert!(existing.overlaps(&stay("2024-06-02", "2024-06-04")));
        assert!(stay("2024-06-02", "2024-06-04").overlaps(&existing));
    }

    #[test]
    fn touching_boundaries_conflict() {
        let existing = stay("2024-06-01", "2024-06-03");
        assert!(existing.overlaps(&stay("2024-06-03", "2024-06-05")));
        assert!(existing.overlaps(&stay("2024-05-28", "2024-06-01")));
        assert!(!existing.overlaps(&stay("2024-06-04", "2024-06-06")));
        assert!(!existing.overlaps(&stay("2024-05-25", "2024-05-31")));
    }

    #[test]
    fn enclosing_range_conflicts() {
        let existing = stay("2024-06-10", "2024-06-12");
        assert!(existing.overlaps(&stay("2024-06-01", "2024-06-30")));
    }

    #[test]
    fn check_out_must_follow_check_in() {
        assert!(Stay::new(date("2024-06-03"), date("2024-06-03")).is_err());
        assert!(Stay::new(date("2024-06-03"), date("2024-06-01")).is_err());
    }

    #[test]
    fn only_pending_bookings_move() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Pending));
        for terminal in [Approved, Rejected, Cancelled] {
            assert!(!terminal.can_transition_to(Cancelled));
            assert!(!terminal.can_transition_to(Pending));
        }
    }

    #[test]
    fn request_parses_iso_dates() {
        let req: BookingRequest = serde_json::from_value(serde_json::json!({
            "roomId": 1,
            "checkInDate": "2024-06-01",
            "checkOutDate": "2024-06-03",
            "numberOfGuests": 0
        }))
        .unwrap();

        assert!(req.validate().is_err());
        assert_eq!(req.stay().unwrap().nights(), 2);
    }
}
