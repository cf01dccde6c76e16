use chrono::Utc;
use marquee_core::repository::{PaymentReview, ProofAttachment, ReferenceAssignment, ReviewDecision, ReviewOutcome};
use marquee_core::{
    Booking, BookingFilter, BookingRepository, BookingStatus, PaymentProof, ProofArtifact, ProofStorage,
    RepositoryError, SeatEventSink,
};
use marquee_shared::models::events::{SeatAction, SeatUpdateEvent};
use marquee_shared::Masked;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codes;
use crate::error::BookingError;
use crate::resolver::SeatConflictResolver;
use crate::ticket::{ScanOutcome, TicketInfo, TicketPayload};
use crate::validation::{BookingDraft, ValidBooking};

const MAX_REFERENCE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub max_proof_bytes: usize,
    /// Issue a reference at upload time to legacy rows that never got one.
    pub backfill_missing_references: bool,
    /// Whether seats under payment review count as occupied by default.
    pub hold_seats_pending_verification: bool,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            max_proof_bytes: 5 * 1024 * 1024,
            backfill_missing_references: false,
            hold_seats_pending_verification: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum BookingLookup {
    Reference(String),
    Id(Uuid),
}

impl BookingLookup {
    fn describe(&self) -> String {
        match self {
            BookingLookup::Reference(reference) => reference.clone(),
            BookingLookup::Id(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProofReceipt {
    pub booking: Booking,
    /// The reference was issued by this upload (legacy backfill).
    pub reference_issued: bool,
}

pub(crate) fn check_artifact(artifact: &ProofArtifact, max_bytes: usize) -> Result<(), BookingError> {
    if artifact.bytes.is_empty() {
        return Err(BookingError::invalid("payment_proof", "Payment proof file is empty"));
    }
    if !artifact.is_image() {
        return Err(BookingError::invalid("payment_proof", "Only image files are allowed"));
    }
    if artifact.bytes.len() > max_bytes {
        return Err(BookingError::invalid(
            "payment_proof",
            format!("Payment proof exceeds {} bytes", max_bytes),
        ));
    }
    Ok(())
}

/// Drives a seat booking from creation to admission at the door.
#[derive(Clone)]
pub struct BookingService {
    bookings: Arc<dyn BookingRepository>,
    storage: Arc<dyn ProofStorage>,
    events: Arc<dyn SeatEventSink>,
    policy: BookingPolicy,
}

impl BookingService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        storage: Arc<dyn ProofStorage>,
        events: Arc<dyn SeatEventSink>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            bookings,
            storage,
            events,
            policy,
        }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn resolver(&self) -> SeatConflictResolver {
        SeatConflictResolver::new(self.bookings.clone())
    }

    fn publish(&self, booking: &Booking, action: SeatAction) {
        self.events.publish(SeatUpdateEvent::new(
            booking.showtime_id,
            &booking.movie_title,
            &booking.label(),
            action,
            &booking.seat_numbers,
        ));
    }

    fn build(valid: &ValidBooking) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            booking_reference: Some(codes::booking_reference()),
            verification_code: Some(codes::verification_code()),
            showtime_id: valid.showtime_id,
            movie_title: valid.movie_title.clone(),
            seat_numbers: valid.seat_numbers.clone(),
            customer_name: valid.customer.name.clone(),
            customer_email: valid.customer.email.clone(),
            customer_phone: valid.customer.phone.clone(),
            total_amount: valid.total_amount,
            status: BookingStatus::Pending,
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

    /// Creates a `pending` booking. Seat availability is not checked here.
    pub async fn create_booking(&self, draft: BookingDraft) -> Result<Booking, BookingError> {
        let valid = draft.validate()?;

        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let booking = Self::build(&valid);
            match self.bookings.insert(&booking).await {
                Ok(()) => {
                    info!(
                        booking_reference = %booking.label(),
                        showtime_id = booking.showtime_id,
                        seats = ?booking.seat_numbers,
                        email = ?Masked(&booking.customer_email),
                        "Booking created"
                    );
                    return Ok(booking);
                }
                Err(RepositoryError::DuplicateReference(reference)) => {
                    warn!(attempt, reference = %reference, "Booking reference collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RepositoryError::Backend("could not allocate a unique booking reference".to_string()).into())
    }

    pub async fn find(&self, lookup: &BookingLookup) -> Result<Booking, BookingError> {
        let found = match lookup {
            BookingLookup::Reference(reference) => self.bookings.find_by_reference(reference.trim()).await?,
            BookingLookup::Id(id) => self.bookings.find_by_id(*id).await?,
        };
        found.ok_or_else(|| BookingError::not_found("booking", lookup.describe()))
    }

    pub async fn get_booking(&self, reference: &str) -> Result<Booking, BookingError> {
        self.find(&BookingLookup::Reference(reference.to_string())).await
    }

    pub async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, BookingError> {
        Ok(self.bookings.list(filter).await?)
    }

    pub async fn pending_verifications(&self) -> Result<Vec<Booking>, BookingError> {
        self.list_bookings(&BookingFilter::with_status(BookingStatus::PendingVerification))
            .await
    }

    /// `pending -> pending_verification`. The artifact is stored before the
    /// status moves; a failed write leaves the booking untouched.
    pub async fn attach_payment_proof(
        &self,
        lookup: BookingLookup,
        artifact: ProofArtifact,
    ) -> Result<ProofReceipt, BookingError> {
        check_artifact(&artifact, self.policy.max_proof_bytes)?;

        let booking = self.find(&lookup).await?;
        if booking.status != BookingStatus::Pending {
            return Err(BookingError::not_in_state("booking", lookup.describe(), BookingStatus::Pending));
        }

        let assign = match booking.booking_reference {
            Some(_) => None,
            None if self.policy.backfill_missing_references => Some(ReferenceAssignment {
                booking_reference: codes::booking_reference(),
                verification_code: codes::verification_code(),
            }),
            None => {
                return Err(BookingError::invalid(
                    "booking_reference",
                    "Booking has no reference and reference backfill is disabled",
                ))
            }
        };

        let now = Utc::now();
        let key = format!("bookings/{}-{}.{}", booking.id, now.timestamp_millis(), artifact.extension());
        let location = self.storage.store(&key, &artifact).await?;

        let attachment = ProofAttachment {
            proof: PaymentProof {
                location: location.clone(),
                filename: artifact.filename.clone(),
                mimetype: artifact.mimetype.clone(),
            },
            paid_at: now,
            assign,
        };

        let updated = match self.bookings.attach_proof(booking.id, &attachment).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                warn!(booking_id = %booking.id, "Booking left pending before proof was attached");
                self.discard(&location).await;
                return Err(BookingError::not_in_state("booking", lookup.describe(), BookingStatus::Pending));
            }
            Err(e) => {
                self.discard(&location).await;
                return Err(e.into());
            }
        };

        info!(
            booking_reference = %updated.label(),
            filename = %artifact.filename,
            size = artifact.bytes.len(),
            "Payment proof attached"
        );
        self.publish(&updated, SeatAction::Held);

        Ok(ProofReceipt {
            reference_issued: booking.booking_reference.is_none(),
            booking: updated,
        })
    }

    async fn discard(&self, location: &str) {
        if let Err(e) = self.storage.remove(location).await {
            warn!(location, error = %e, "Failed to remove orphaned payment proof");
        }
    }

    /// Admin review of an uploaded proof.
    ///
    /// Approval needs the customer's verification code; a rejection checks
    /// it only when one is supplied.
    pub async fn verify_payment(
        &self,
        reference: &str,
        verification_code: Option<&str>,
        reviewer: &str,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .bookings
            .find_by_reference(reference.trim())
            .await?
            .filter(|b| b.status == BookingStatus::PendingVerification)
            .ok_or_else(|| BookingError::not_in_state("booking", reference, BookingStatus::PendingVerification))?;

        if !booking.has_payment() {
            return Err(BookingError::invalid("payment_proof", "Booking has no payment proof"));
        }

        match (&decision, verification_code) {
            (ReviewDecision::Approve, None) => {
                return Err(BookingError::missing_fields(vec!["verification_code"]));
            }
            (_, Some(code)) if booking.verification_code.as_deref() != Some(code) => {
                warn!(booking_reference = reference, reviewer, "Verification code mismatch");
                return Err(BookingError::InvalidCode);
            }
            _ => {}
        }

        let review = PaymentReview {
            decision: decision.clone(),
            reviewer: reviewer.to_string(),
            notes: notes.filter(|n| !n.trim().is_empty()),
            reviewed_at: Utc::now(),
        };

        match self.bookings.apply_review(booking.id, &review).await? {
            ReviewOutcome::Applied(updated) => {
                info!(
                    booking_reference = reference,
                    reviewer,
                    status = %updated.status,
                    "Payment reviewed"
                );
                let action = match decision {
                    ReviewDecision::Approve => SeatAction::Confirmed,
                    ReviewDecision::Reject => SeatAction::Released,
                };
                self.publish(&updated, action);
                Ok(updated)
            }
            ReviewOutcome::SeatConflict(seats) => {
                warn!(booking_reference = reference, conflicting = ?seats, "Approval blocked by seat conflict");
                Err(BookingError::SeatConflict(seats))
            }
            ReviewOutcome::NotPending(current) => {
                warn!(booking_reference = reference, current = ?current, "Booking changed state during review");
                Err(BookingError::not_in_state(
                    "booking",
                    reference,
                    BookingStatus::PendingVerification,
                ))
            }
        }
    }

    /// Door scan. A second scan of the same ticket reports it as used and
    /// changes nothing.
    pub async fn scan_ticket(&self, qr_payload: &str) -> Result<ScanOutcome, BookingError> {
        let ticket = TicketPayload::parse(qr_payload)?;
        let reference = ticket.booking_reference.trim();

        let booking = self
            .bookings
            .find_by_reference(reference)
            .await?
            .filter(|b| b.status == BookingStatus::Confirmed)
            .ok_or_else(|| BookingError::not_in_state("ticket", reference, BookingStatus::Confirmed))?;

        if booking.verification_code.as_deref() != Some(ticket.verification_code.trim()) {
            warn!(booking_reference = reference, "Ticket scanned with wrong code");
            return Err(BookingError::InvalidCode);
        }

        if booking.is_verified {
            return Ok(ScanOutcome::AlreadyUsed {
                booking_reference: booking.label(),
                used_at: booking.verified_at,
            });
        }

        match self.bookings.mark_scanned(booking.id, Utc::now()).await? {
            Some(admitted) => {
                info!(booking_reference = reference, seats = ?admitted.seat_numbers, "Ticket validated");
                self.publish(&admitted, SeatAction::TicketValidated);
                Ok(ScanOutcome::Admitted(TicketInfo::from(&admitted)))
            }
            None => {
                // Lost a race with another scanner.
                let current = self.find(&BookingLookup::Id(booking.id)).await?;
                if current.is_verified {
                    Ok(ScanOutcome::AlreadyUsed {
                        booking_reference: current.label(),
                        used_at: current.verified_at,
                    })
                } else {
                    Err(BookingError::not_in_state("ticket", reference, BookingStatus::Confirmed))
                }
            }
        }
    }

    /// Moves any booking to `cancelled` unless its ticket was already used.
    /// Cancelling twice returns the cancelled booking.
    pub async fn cancel_booking(&self, reference: &str) -> Result<Booking, BookingError> {
        let booking = self.get_booking(reference).await?;
        if booking.status == BookingStatus::Cancelled {
            return Ok(booking);
        }
        if booking.is_verified || !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(BookingError::InvalidTransition {
                reference: booking.label(),
                from: booking.status,
                to: BookingStatus::Cancelled,
            });
        }

        match self.bookings.cancel(booking.id, booking.status, Utc::now()).await? {
            Some(cancelled) => {
                info!(booking_reference = reference, from = %booking.status, "Booking cancelled");
                if matches!(booking.status, BookingStatus::PendingVerification | BookingStatus::Confirmed) {
                    self.publish(&cancelled, SeatAction::Released);
                }
                Ok(cancelled)
            }
            None => {
                let current = self.get_booking(reference).await?;
                if current.status == BookingStatus::Cancelled {
                    Ok(current)
                } else {
                    Err(BookingError::InvalidTransition {
                        reference: current.label(),
                        from: current.status,
                        to: BookingStatus::Cancelled,
                    })
                }
            }
        }
    }

    /// Raw proof image for the admin console.
    pub async fn payment_proof(&self, reference: &str) -> Result<(PaymentProof, Vec<u8>), BookingError> {
        let booking = self.get_booking(reference).await?;
        let proof = booking
            .payment_proof
            .ok_or_else(|| BookingError::not_found("payment proof", reference))?;
        let bytes = self
            .storage
            .fetch(&proof.location)
            .await?
            .ok_or_else(|| BookingError::not_found("payment proof", reference))?;
        Ok((proof, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryBookingRepository, InMemoryProofStorage};
    use marquee_core::seats::SeatSelection;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;
    use tokio::sync::broadcast;

    struct Harness {
        service: BookingService,
        repo: Arc<InMemoryBookingRepository>,
        storage: Arc<InMemoryProofStorage>,
        events: broadcast::Receiver<SeatUpdateEvent>,
    }

    fn harness_with(storage: InMemoryProofStorage, policy: BookingPolicy) -> Harness {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let storage = Arc::new(storage);
        let (tx, events) = broadcast::channel(64);
        let service = BookingService::new(repo.clone(), storage.clone(), Arc::new(tx), policy);
        Harness {
            service,
            repo,
            storage,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(InMemoryProofStorage::new(), BookingPolicy::default())
    }

    fn draft(seats: &[&str]) -> BookingDraft {
        BookingDraft {
            showtime_id: Some(7),
            movie_title: Some("Dune".into()),
            customer_name: Some("Jane Doe".into()),
            customer_email: Some("jane@example.com".into()),
            customer_phone: None,
            seat_numbers: Some(SeatSelection::List(seats.iter().map(|s| serde_json::json!(s)).collect())),
            total_amount: Some(dec!(100000)),
        }
    }

    fn image() -> ProofArtifact {
        ProofArtifact::new(vec![0x89, 0x50, 0x4e, 0x47], "transfer.png", "image/png")
    }

    async fn uploaded(h: &Harness, seats: &[&str]) -> Booking {
        let booking = h.service.create_booking(draft(seats)).await.unwrap();
        h.service
            .attach_payment_proof(BookingLookup::Id(booking.id), image())
            .await
            .unwrap()
            .booking
    }

    async fn approve(h: &Harness, booking: &Booking) -> Result<Booking, BookingError> {
        h.service
            .verify_payment(
                booking.booking_reference.as_deref().unwrap(),
                booking.verification_code.as_deref(),
                "admin@cinema",
                ReviewDecision::Approve,
                None,
            )
            .await
    }

    fn qr(booking: &Booking) -> String {
        serde_json::json!({
            "booking_reference": booking.booking_reference,
            "verification_code": booking.verification_code,
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_create_booking_is_pending_with_codes() {
        let h = harness();
        let booking = h.service.create_booking(draft(&["A1", "A2"])).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.seat_numbers, vec!["A1", "A2"]);
        assert!(booking.booking_reference.as_deref().unwrap().starts_with("BK"));
        let code = booking.verification_code.as_deref().unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert!(!booking.is_verified);
    }

    #[tokio::test]
    async fn test_create_rejects_missing_fields_without_persisting() {
        let h = harness();
        let mut d = draft(&["A1"]);
        d.customer_email = None;
        let err = h.service.create_booking(d).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation { ref fields, .. } if fields == &vec!["customer_email".to_string()]));
        assert!(h.service.list_bookings(&BookingFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_creations_get_distinct_references() {
        let h = harness();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let service = h.service.clone();
            handles.push(tokio::spawn(async move { service.create_booking(draft(&["B1"])).await }));
        }

        let mut refs = HashSet::new();
        for handle in handles {
            let booking = handle.await.unwrap().unwrap();
            refs.insert(booking.booking_reference.unwrap());
        }
        assert_eq!(refs.len(), 50);
    }

    #[tokio::test]
    async fn test_overlapping_bookings_are_both_accepted_at_creation() {
        let h = harness();
        h.service.create_booking(draft(&["A1"])).await.unwrap();
        h.service.create_booking(draft(&["A1"])).await.unwrap();
        assert_eq!(h.service.list_bookings(&BookingFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upload_moves_to_pending_verification() {
        let mut h = harness();
        let booking = uploaded(&h, &["A1"]).await;

        assert_eq!(booking.status, BookingStatus::PendingVerification);
        assert!(booking.has_payment());
        assert!(booking.payment_date.is_some());
        assert_eq!(h.storage.len().await, 1);

        let event = h.events.try_recv().unwrap();
        assert_eq!(event.action, SeatAction::Held);
    }

    #[tokio::test]
    async fn test_upload_twice_is_not_found() {
        let h = harness();
        let booking = uploaded(&h, &["A1"]).await;
        let err = h
            .service
            .attach_payment_proof(BookingLookup::Id(booking.id), image())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_upload_rejects_non_images_and_oversized_files() {
        let h = harness_with(
            InMemoryProofStorage::new(),
            BookingPolicy {
                max_proof_bytes: 3,
                ..BookingPolicy::default()
            },
        );
        let booking = h.service.create_booking(draft(&["A1"])).await.unwrap();
        let lookup = BookingLookup::Id(booking.id);

        let pdf = ProofArtifact::new(vec![1], "receipt.pdf", "application/pdf");
        assert!(matches!(
            h.service.attach_payment_proof(lookup.clone(), pdf).await,
            Err(BookingError::Validation { .. })
        ));
        assert!(matches!(
            h.service.attach_payment_proof(lookup, image()).await,
            Err(BookingError::Validation { .. })
        ));
        assert_eq!(h.service.get_booking(booking.booking_reference.as_deref().unwrap()).await.unwrap().status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_booking_pending() {
        let h = harness_with(InMemoryProofStorage::unavailable(), BookingPolicy::default());
        let booking = h.service.create_booking(draft(&["A1"])).await.unwrap();

        let err = h
            .service
            .attach_payment_proof(BookingLookup::Id(booking.id), image())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Storage(_)));

        let current = h.service.find(&BookingLookup::Id(booking.id)).await.unwrap();
        assert_eq!(current.status, BookingStatus::Pending);
        assert!(!current.has_payment());
    }

    #[tokio::test]
    async fn test_legacy_booking_without_reference() {
        let mut legacy = BookingService::build(&draft(&["C1"]).validate().unwrap());
        legacy.booking_reference = None;
        legacy.verification_code = None;

        let h = harness();
        h.repo.insert(&legacy).await.unwrap();
        let err = h
            .service
            .attach_payment_proof(BookingLookup::Id(legacy.id), image())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation { .. }));

        let backfill = harness_with(
            InMemoryProofStorage::new(),
            BookingPolicy {
                backfill_missing_references: true,
                ..BookingPolicy::default()
            },
        );
        backfill.repo.insert(&legacy).await.unwrap();
        let receipt = backfill
            .service
            .attach_payment_proof(BookingLookup::Id(legacy.id), image())
            .await
            .unwrap();
        assert!(receipt.reference_issued);
        assert!(receipt.booking.booking_reference.unwrap().starts_with("BK"));
        assert_eq!(receipt.booking.verification_code.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_verify_requires_uploaded_proof() {
        let h = harness();
        let booking = h.service.create_booking(draft(&["A1"])).await.unwrap();
        let err = approve(&h, &booking).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_verify_checks_code() {
        let h = harness();
        let booking = uploaded(&h, &["A1"]).await;
        let reference = booking.booking_reference.clone().unwrap();
        let wrong = if booking.verification_code.as_deref() == Some("000000") { "111111" } else { "000000" };

        let err = h
            .service
            .verify_payment(&reference, Some(wrong), "admin", ReviewDecision::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidCode));

        let err = h
            .service
            .verify_payment(&reference, None, "admin", ReviewDecision::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation { .. }));

        assert_eq!(h.service.get_booking(&reference).await.unwrap().status, BookingStatus::PendingVerification);
    }

    #[tokio::test]
    async fn test_approve_sets_confirmed_and_reviewer() {
        let h = harness();
        let booking = uploaded(&h, &["A1"]).await;
        let confirmed = approve(&h, &booking).await.unwrap();

        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert!(confirmed.verified_at.is_some());
        assert_eq!(confirmed.verified_by.as_deref(), Some("admin@cinema"));
        assert!(!confirmed.is_verified);

        let err = approve(&h, &booking).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reject_records_notes_without_code() {
        let h = harness();
        let booking = uploaded(&h, &["A1"]).await;
        let rejected = h
            .service
            .verify_payment(
                booking.booking_reference.as_deref().unwrap(),
                None,
                "admin",
                ReviewDecision::Reject,
                Some("Transfer amount does not match".into()),
            )
            .await
            .unwrap();

        assert_eq!(rejected.status, BookingStatus::PaymentRejected);
        assert_eq!(rejected.admin_notes.as_deref(), Some("Transfer amount does not match"));
        assert_eq!(rejected.verified_by.as_deref(), Some("admin"));

        let err = approve(&h, &booking).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_seat_conflict_blocks_second_approval() {
        let h = harness();
        let first = uploaded(&h, &["A1", "A2"]).await;
        let second = uploaded(&h, &["A2", "A3"]).await;

        approve(&h, &first).await.unwrap();
        let err = approve(&h, &second).await.unwrap_err();
        match err {
            BookingError::SeatConflict(seats) => assert_eq!(seats, vec!["A2"]),
            other => panic!("expected seat conflict, got {:?}", other),
        }

        let still = h.service.get_booking(second.booking_reference.as_deref().unwrap()).await.unwrap();
        assert_eq!(still.status, BookingStatus::PendingVerification);
    }

    #[tokio::test]
    async fn test_concurrent_approvals_of_overlapping_bookings() {
        let h = harness();
        let first = uploaded(&h, &["D5"]).await;
        let second = uploaded(&h, &["D5", "D6"]).await;

        let (a, b) = tokio::join!(approve(&h, &first), approve(&h, &second));
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        assert!(matches!(a.err().or(b.err()), Some(BookingError::SeatConflict(_))));
    }

    #[tokio::test]
    async fn test_other_showtime_does_not_conflict() {
        let h = harness();
        let first = uploaded(&h, &["A1"]).await;
        approve(&h, &first).await.unwrap();

        let mut other = draft(&["A1"]);
        other.showtime_id = Some(8);
        let booking = h.service.create_booking(other).await.unwrap();
        let booking = h
            .service
            .attach_payment_proof(BookingLookup::Id(booking.id), image())
            .await
            .unwrap()
            .booking;
        assert!(approve(&h, &booking).await.is_ok());
    }

    #[tokio::test]
    async fn test_scan_admits_once() {
        let mut h = harness();
        let booking = uploaded(&h, &["A1", "A2"]).await;
        approve(&h, &booking).await.unwrap();
        while h.events.try_recv().is_ok() {}

        let first = h.service.scan_ticket(&qr(&booking)).await.unwrap();
        let admitted_at = match first {
            ScanOutcome::Admitted(info) => {
                assert_eq!(info.seats, vec!["A1", "A2"]);
                assert_eq!(info.status, "VERIFIED");
                info.verified_at
            }
            other => panic!("expected admission, got {:?}", other),
        };

        let event = h.events.try_recv().unwrap();
        assert_eq!(event.action, SeatAction::TicketValidated);
        assert_eq!(event.seats.len(), 2);

        let second = h.service.scan_ticket(&qr(&booking)).await.unwrap();
        match second {
            ScanOutcome::AlreadyUsed { used_at, .. } => assert_eq!(used_at, admitted_at),
            other => panic!("expected already used, got {:?}", other),
        }
        assert!(h.events.try_recv().is_err());

        let stored = h.service.get_booking(booking.booking_reference.as_deref().unwrap()).await.unwrap();
        assert!(stored.is_verified);
        assert_eq!(stored.verified_at, admitted_at);
    }

    #[tokio::test]
    async fn test_scan_failures() {
        let h = harness();
        let booking = uploaded(&h, &["A1"]).await;

        assert!(matches!(h.service.scan_ticket("{oops").await, Err(BookingError::InvalidFormat(_))));
        // Not yet confirmed.
        assert!(matches!(h.service.scan_ticket(&qr(&booking)).await, Err(BookingError::NotFound { .. })));

        approve(&h, &booking).await.unwrap();
        let forged = serde_json::json!({
            "booking_reference": booking.booking_reference,
            "verification_code": "not-it",
        })
        .to_string();
        assert!(matches!(h.service.scan_ticket(&forged).await, Err(BookingError::InvalidCode)));
    }

    #[tokio::test]
    async fn test_cancel_paths() {
        let h = harness();
        let pending = h.service.create_booking(draft(&["A1"])).await.unwrap();
        let reference = pending.booking_reference.clone().unwrap();

        let cancelled = h.service.cancel_booking(&reference).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        let again = h.service.cancel_booking(&reference).await.unwrap();
        assert_eq!(again.status, BookingStatus::Cancelled);

        let err = h
            .service
            .attach_payment_proof(BookingLookup::Reference(reference), image())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound { .. }));

        let used = uploaded(&h, &["B1"]).await;
        approve(&h, &used).await.unwrap();
        h.service.scan_ticket(&qr(&used)).await.unwrap();
        let err = h
            .service
            .cancel_booking(used.booking_reference.as_deref().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_confirmation_frees_seats() {
        let h = harness();
        let first = uploaded(&h, &["E1"]).await;
        approve(&h, &first).await.unwrap();
        h.service.cancel_booking(first.booking_reference.as_deref().unwrap()).await.unwrap();

        let second = uploaded(&h, &["E1"]).await;
        assert!(approve(&h, &second).await.is_ok());
    }

    #[tokio::test]
    async fn test_payment_proof_round_trip() {
        let h = harness();
        let booking = uploaded(&h, &["A1"]).await;
        let (proof, bytes) = h
            .service
            .payment_proof(booking.booking_reference.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(proof.mimetype, "image/png");
        assert_eq!(proof.filename, "transfer.png");
        assert_eq!(bytes, image().bytes);

        let fresh = h.service.create_booking(draft(&["A2"])).await.unwrap();
        assert!(matches!(
            h.service.payment_proof(fresh.booking_reference.as_deref().unwrap()).await,
            Err(BookingError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let h = harness();
        let created = h.service.create_booking(draft(&["A1", "A2"])).await.unwrap();
        let reference = created.booking_reference.clone().unwrap();

        let receipt = h
            .service
            .attach_payment_proof(BookingLookup::Reference(reference.clone()), image())
            .await
            .unwrap();
        assert_eq!(receipt.booking.status, BookingStatus::PendingVerification);
        assert!(!receipt.reference_issued);

        let confirmed = approve(&h, &created).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);

        let occupied = h.service.resolver().compute_occupied_seats(7, "Dune", false).await.unwrap();
        assert!(occupied.contains("A1") && occupied.contains("A2"));

        assert!(matches!(h.service.scan_ticket(&qr(&created)).await.unwrap(), ScanOutcome::Admitted(_)));
        assert!(matches!(
            h.service.scan_ticket(&qr(&created)).await.unwrap(),
            ScanOutcome::AlreadyUsed { .. }
        ));
    }
}
