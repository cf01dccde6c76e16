//! In-process repositories and proof storage. Used when no database is
//! configured and throughout the test suites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::repository::{PaymentReview, ProofAttachment, ReviewDecision, ReviewOutcome};
use marquee_core::seats::{collect_occupied, detect_conflict, encode_seat_list, parse_seat_list, StoredSeatList};
use marquee_core::{
    Booking, BookingFilter, BookingRepository, BookingStatus, BundleOrder, BundleOrderRepository, ProofArtifact,
    ProofStorage, RepositoryError, StorageError,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

struct StoredBooking {
    booking: Booking,
    /// Seat list as it would sit in the text column.
    seat_text: String,
}

impl StoredBooking {
    fn materialize(&self) -> Booking {
        let mut booking = self.booking.clone();
        booking.seat_numbers = parse_seat_list(&self.seat_text).unwrap_or_else(|e| {
            warn!(booking_id = %booking.id, error = %e, "Stored booking has malformed seats");
            Vec::new()
        });
        booking
    }

    fn seat_row(&self) -> StoredSeatList {
        StoredSeatList {
            booking_id: self.booking.id,
            booking_reference: self.booking.booking_reference.clone(),
            raw: self.seat_text.clone(),
        }
    }
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    rows: RwLock<HashMap<Uuid, StoredBooking>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row with a raw seat column, e.g. data written by older clients.
    pub async fn insert_raw(&self, booking: Booking, seat_text: &str) {
        self.rows.write().await.insert(
            booking.id,
            StoredBooking {
                booking,
                seat_text: seat_text.to_string(),
            },
        );
    }

    fn reference_taken(rows: &HashMap<Uuid, StoredBooking>, reference: &str) -> bool {
        rows.values()
            .any(|row| row.booking.booking_reference.as_deref() == Some(reference))
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, booking: &Booking) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write().await;
        if let Some(reference) = booking.booking_reference.as_deref() {
            if Self::reference_taken(&rows, reference) {
                return Err(RepositoryError::DuplicateReference(reference.to_string()));
            }
        }
        rows.insert(
            booking.id,
            StoredBooking {
                booking: booking.clone(),
                seat_text: encode_seat_list(&booking.seat_numbers),
            },
        );
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|row| row.booking.booking_reference.as_deref() == Some(reference))
            .map(StoredBooking::materialize))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.rows.read().await.get(&id).map(StoredBooking::materialize))
    }

    async fn list(&self, filter: &BookingFilter) -> Result<Vec<Booking>, RepositoryError> {
        let rows = self.rows.read().await;
        let mut bookings: Vec<Booking> = rows
            .values()
            .filter(|row| {
                let b = &row.booking;
                filter.matches(b.status, &b.customer_name, &b.customer_email)
            })
            .map(StoredBooking::materialize)
            .collect();
        bookings.sort_by(|a, b| b.booking_date.cmp(&a.booking_date));
        Ok(bookings)
    }

    async fn seat_lists(
        &self,
        showtime_id: i64,
        movie_title: &str,
        statuses: &[BookingStatus],
    ) -> Result<Vec<StoredSeatList>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| {
                let b = &row.booking;
                b.showtime_id == showtime_id && b.movie_title == movie_title && statuses.contains(&b.status)
            })
            .map(StoredBooking::seat_row)
            .collect())
    }

    async fn attach_proof(
        &self,
        id: Uuid,
        attachment: &ProofAttachment,
    ) -> Result<Option<Booking>, RepositoryError> {
        let mut rows = self.rows.write().await;
        if let Some(assign) = &attachment.assign {
            if Self::reference_taken(&rows, &assign.booking_reference) {
                return Err(RepositoryError::DuplicateReference(assign.booking_reference.clone()));
            }
        }

        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.booking.status != BookingStatus::Pending {
            return Ok(None);
        }

        let b = &mut row.booking;
        if b.booking_reference.is_none() {
            if let Some(assign) = &attachment.assign {
                b.booking_reference = Some(assign.booking_reference.clone());
                b.verification_code = Some(assign.verification_code.clone());
            }
        }
        b.payment_proof = Some(attachment.proof.clone());
        b.payment_date = Some(attachment.paid_at);
        b.status = BookingStatus::PendingVerification;
        b.updated_at = attachment.paid_at;
        Ok(Some(row.materialize()))
    }

    async fn apply_review(&self, id: Uuid, review: &PaymentReview) -> Result<ReviewOutcome, RepositoryError> {
        // The write lock is held from the seat check through the status write.
        let mut rows = self.rows.write().await;
        let Some(target) = rows.get(&id) else {
            return Ok(ReviewOutcome::NotPending(None));
        };
        if target.booking.status != BookingStatus::PendingVerification {
            return Ok(ReviewOutcome::NotPending(Some(target.booking.status)));
        }

        if review.decision == ReviewDecision::Approve {
            let candidate = target.materialize();
            let confirmed: Vec<StoredSeatList> = rows
                .values()
                .filter(|row| {
                    let b = &row.booking;
                    b.id != id
                        && b.status == BookingStatus::Confirmed
                        && b.showtime_id == candidate.showtime_id
                        && b.movie_title == candidate.movie_title
                })
                .map(StoredBooking::seat_row)
                .collect();
            let conflicts = detect_conflict(&candidate.seat_numbers, &collect_occupied(&confirmed));
            if !conflicts.is_empty() {
                return Ok(ReviewOutcome::SeatConflict(conflicts));
            }
        }

        let Some(row) = rows.get_mut(&id) else {
            return Ok(ReviewOutcome::NotPending(None));
        };
        let b = &mut row.booking;
        b.status = review.decision.target();
        b.verified_by = Some(review.reviewer.clone());
        if review.decision == ReviewDecision::Approve {
            b.verified_at = Some(review.reviewed_at);
        }
        if review.notes.is_some() {
            b.admin_notes = review.notes.clone();
        }
        b.updated_at = review.reviewed_at;
        Ok(ReviewOutcome::Applied(row.materialize()))
    }

    async fn mark_scanned(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Booking>, RepositoryError> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        let b = &mut row.booking;
        if b.status != BookingStatus::Confirmed || b.is_verified {
            return Ok(None);
        }
        b.is_verified = true;
        b.verified_at = Some(at);
        b.updated_at = at;
        Ok(Some(row.materialize()))
    }

    async fn cancel(
        &self,
        id: Uuid,
        expected: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>, RepositoryError> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        let b = &mut row.booking;
        if b.status != expected || b.is_verified {
            return Ok(None);
        }
        b.status = BookingStatus::Cancelled;
        b.updated_at = at;
        Ok(Some(row.materialize()))
    }

    async fn expire_unverified(
        &self,
        paid_before: DateTime<Utc>,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let mut rows = self.rows.write().await;
        let mut expired = Vec::new();
        for row in rows.values_mut() {
            let b = &mut row.booking;
            let paid = b.payment_date.unwrap_or(b.updated_at);
            if b.status == BookingStatus::PendingVerification && paid < paid_before {
                b.status = BookingStatus::PaymentRejected;
                b.admin_notes = Some(note.to_string());
                b.updated_at = at;
                expired.push(row.materialize());
            }
        }
        Ok(expired)
    }
}

#[derive(Default)]
pub struct InMemoryBundleOrderRepository {
    rows: RwLock<HashMap<Uuid, BundleOrder>>,
}

impl InMemoryBundleOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BundleOrderRepository for InMemoryBundleOrderRepository {
    async fn insert(&self, order: &BundleOrder) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write().await;
        if rows.values().any(|o| o.order_reference == order.order_reference) {
            return Err(RepositoryError::DuplicateReference(order.order_reference.clone()));
        }
        rows.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<BundleOrder>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows.values().find(|o| o.order_reference == reference).cloned())
    }

    async fn list(&self, filter: &BookingFilter) -> Result<Vec<BundleOrder>, RepositoryError> {
        let rows = self.rows.read().await;
        let mut orders: Vec<BundleOrder> = rows
            .values()
            .filter(|o| filter.matches(o.status, &o.customer_name, &o.customer_email))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        Ok(orders)
    }

    async fn attach_proof(
        &self,
        id: Uuid,
        attachment: &ProofAttachment,
    ) -> Result<Option<BundleOrder>, RepositoryError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(order) if order.status == BookingStatus::Pending => {
                order.payment_proof = Some(attachment.proof.clone());
                order.payment_date = Some(attachment.paid_at);
                order.status = BookingStatus::PendingVerification;
                order.updated_at = attachment.paid_at;
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn apply_review(&self, id: Uuid, review: &PaymentReview) -> Result<Option<BundleOrder>, RepositoryError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(order) if order.status == BookingStatus::PendingVerification => {
                order.status = review.decision.target();
                order.verified_by = Some(review.reviewer.clone());
                order.verified_at = Some(review.reviewed_at);
                if review.notes.is_some() {
                    order.admin_notes = review.notes.clone();
                }
                order.updated_at = review.reviewed_at;
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn expire_unverified(
        &self,
        paid_before: DateTime<Utc>,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<BundleOrder>, RepositoryError> {
        let mut rows = self.rows.write().await;
        let mut expired = Vec::new();
        for order in rows.values_mut() {
            let paid = order.payment_date.unwrap_or(order.updated_at);
            if order.status == BookingStatus::PendingVerification && paid < paid_before {
                order.status = BookingStatus::PaymentRejected;
                order.admin_notes = Some(note.to_string());
                order.updated_at = at;
                expired.push(order.clone());
            }
        }
        Ok(expired)
    }
}

/// Proof blobs kept in a map, addressed as `memory://<key>`.
#[derive(Default)]
pub struct InMemoryProofStorage {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    reject_writes: bool,
}

impl InMemoryProofStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail.
    pub fn unavailable() -> Self {
        Self {
            blobs: RwLock::default(),
            reject_writes: true,
        }
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ProofStorage for InMemoryProofStorage {
    async fn store(&self, key: &str, artifact: &ProofArtifact) -> Result<String, StorageError> {
        if self.reject_writes {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        let location = format!("memory://{}", key);
        self.blobs
            .write()
            .await
            .insert(location.clone(), artifact.bytes.clone());
        Ok(location)
    }

    async fn fetch(&self, location: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.read().await.get(location).cloned())
    }

    async fn remove(&self, location: &str) -> Result<(), StorageError> {
        self.blobs.write().await.remove(location);
        Ok(())
    }
}
