use marquee_core::seats::{self, collect_occupied};
use marquee_core::{Booking, BookingRepository, BookingStatus};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::BookingError;

/// Answers "which seats are taken" for a showtime.
///
/// Nothing is reserved when a booking is created; overlapping bookings are
/// only caught when an admin approves one of them.
#[derive(Clone)]
pub struct SeatConflictResolver {
    bookings: Arc<dyn BookingRepository>,
}

impl SeatConflictResolver {
    pub fn new(bookings: Arc<dyn BookingRepository>) -> Self {
        Self { bookings }
    }

    /// Union of seats held by confirmed bookings and, when asked, by
    /// bookings whose proof is still under review.
    pub async fn compute_occupied_seats(
        &self,
        showtime_id: i64,
        movie_title: &str,
        include_pending_verification: bool,
    ) -> Result<BTreeSet<String>, BookingError> {
        let mut statuses = vec![BookingStatus::Confirmed];
        if include_pending_verification {
            statuses.push(BookingStatus::PendingVerification);
        }

        let rows = self
            .bookings
            .seat_lists(showtime_id, movie_title.trim(), &statuses)
            .await?;
        Ok(collect_occupied(&rows))
    }

    pub fn detect_conflict(candidate: &[String], occupied: &BTreeSet<String>) -> Vec<String> {
        seats::detect_conflict(candidate, occupied)
    }

    /// Seats of `booking` already confirmed for someone else. Advisory only:
    /// the authoritative check runs inside the approval transaction.
    pub async fn preview_conflicts(&self, booking: &Booking) -> Result<Vec<String>, BookingError> {
        let rows = self
            .bookings
            .seat_lists(booking.showtime_id, &booking.movie_title, &[BookingStatus::Confirmed])
            .await?;
        let others: Vec<_> = rows.into_iter().filter(|row| row.booking_id != booking.id).collect();
        Ok(Self::detect_conflict(&booking.seat_numbers, &collect_occupied(&others)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBookingRepository;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn booking(showtime_id: i64, movie: &str, status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            booking_reference: Some(format!("BK{}", Uuid::new_v4().simple())),
            verification_code: Some("123456".into()),
            showtime_id,
            movie_title: movie.into(),
            seat_numbers: Vec::new(),
            customer_name: "Jane".into(),
            customer_email: "jane@example.com".into(),
            customer_phone: None,
            total_amount: Decimal::ZERO,
            status,
            payment_proof: None,
            is_verified: false,
            verified_at: None,
            verified_by: None,
            admin_notes: None,
            booking_date: now,
            payment_date: None,
            updated_at: now,
        }
    }

    async fn seeded() -> SeatConflictResolver {
        let repo = Arc::new(InMemoryBookingRepository::new());
        repo.insert_raw(booking(1, "Dune", BookingStatus::Confirmed), r#"["A1","A2"]"#).await;
        repo.insert_raw(booking(1, "Dune", BookingStatus::Confirmed), "B1, B2").await;
        repo.insert_raw(booking(1, "Dune", BookingStatus::Confirmed), r#"{"broken":1}"#).await;
        repo.insert_raw(booking(1, "Dune", BookingStatus::PendingVerification), "[C1, C2]").await;
        repo.insert_raw(booking(1, "Dune", BookingStatus::Pending), r#"["D1"]"#).await;
        repo.insert_raw(booking(1, "Dune", BookingStatus::PaymentRejected), r#"["D2"]"#).await;
        repo.insert_raw(booking(1, "Dune", BookingStatus::Cancelled), r#"["D3"]"#).await;
        repo.insert_raw(booking(2, "Dune", BookingStatus::Confirmed), r#"["E1"]"#).await;
        repo.insert_raw(booking(1, "Arrival", BookingStatus::Confirmed), r#"["E2"]"#).await;
        SeatConflictResolver::new(repo)
    }

    fn labels(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn test_confirmed_only() {
        let occupied = seeded().await.compute_occupied_seats(1, "Dune", false).await.unwrap();
        assert_eq!(labels(&occupied), vec!["A1", "A2", "B1", "B2"]);
    }

    #[tokio::test]
    async fn test_includes_seats_under_review() {
        let occupied = seeded().await.compute_occupied_seats(1, "Dune", true).await.unwrap();
        assert_eq!(labels(&occupied), vec!["A1", "A2", "B1", "B2", "C1", "C2"]);
    }

    #[tokio::test]
    async fn test_unknown_showtime_is_empty() {
        let occupied = seeded().await.compute_occupied_seats(99, "Dune", true).await.unwrap();
        assert!(occupied.is_empty());
    }

    #[tokio::test]
    async fn test_preview_ignores_own_booking() {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let mut mine = booking(1, "Dune", BookingStatus::PendingVerification);
        mine.seat_numbers = vec!["A1".into(), "A3".into()];
        repo.insert_raw(mine.clone(), r#"["A1","A3"]"#).await;
        repo.insert_raw(booking(1, "Dune", BookingStatus::Confirmed), r#"["A3"]"#).await;

        let resolver = SeatConflictResolver::new(repo);
        assert_eq!(resolver.preview_conflicts(&mine).await.unwrap(), vec!["A3"]);
    }
}
