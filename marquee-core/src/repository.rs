use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Booking, BookingFilter, BookingStatus, BundleOrder, PaymentProof};
use crate::seats::StoredSeatList;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Reference already exists: {0}")]
    DuplicateReference(String),
    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("Database error: {0}")]
    Backend(String),
}

/// Reference and door code issued to a legacy booking at upload time.
#[derive(Debug, Clone)]
pub struct ReferenceAssignment {
    pub booking_reference: String,
    pub verification_code: String,
}

#[derive(Debug, Clone)]
pub struct ProofAttachment {
    pub proof: PaymentProof,
    pub paid_at: DateTime<Utc>,
    pub assign: Option<ReferenceAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn target(&self) -> BookingStatus {
        match self {
            ReviewDecision::Approve => BookingStatus::Confirmed,
            ReviewDecision::Reject => BookingStatus::PaymentRejected,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentReview {
    pub decision: ReviewDecision,
    pub reviewer: String,
    pub notes: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum ReviewOutcome {
    Applied(Booking),
    /// The booking left `pending_verification` (or vanished) before the write.
    NotPending(Option<BookingStatus>),
    SeatConflict(Vec<String>),
}

/// Persistence for seat bookings.
///
/// Every state-changing method is a conditional write: it only applies when
/// the row is still in the state the caller expects, and returns `None` (or
/// `NotPending`) otherwise.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), RepositoryError>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError>;

    /// Newest first.
    async fn list(&self, filter: &BookingFilter) -> Result<Vec<Booking>, RepositoryError>;

    async fn seat_lists(
        &self,
        showtime_id: i64,
        movie_title: &str,
        statuses: &[BookingStatus],
    ) -> Result<Vec<StoredSeatList>, RepositoryError>;

    /// `pending -> pending_verification`.
    async fn attach_proof(
        &self,
        id: Uuid,
        attachment: &ProofAttachment,
    ) -> Result<Option<Booking>, RepositoryError>;

    /// Applies an admin decision to a `pending_verification` booking.
    ///
    /// Approval must re-check the booking's seats against other confirmed
    /// bookings of the same showtime and commit in the same serialized unit
    /// of work, so two overlapping approvals can never both succeed.
    async fn apply_review(
        &self,
        id: Uuid,
        review: &PaymentReview,
    ) -> Result<ReviewOutcome, RepositoryError>;

    /// Flags a confirmed, unscanned ticket as used.
    async fn mark_scanned(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Booking>, RepositoryError>;

    /// Cancels if the booking is still `expected` and its ticket unscanned.
    async fn cancel(
        &self,
        id: Uuid,
        expected: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>, RepositoryError>;

    /// Rejects `pending_verification` bookings whose proof is older than `paid_before`.
    async fn expire_unverified(
        &self,
        paid_before: DateTime<Utc>,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepositoryError>;
}

/// Persistence for bundle orders. Same conditional-write contract as bookings.
#[async_trait]
pub trait BundleOrderRepository: Send + Sync {
    async fn insert(&self, order: &BundleOrder) -> Result<(), RepositoryError>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<BundleOrder>, RepositoryError>;

    async fn list(&self, filter: &BookingFilter) -> Result<Vec<BundleOrder>, RepositoryError>;

    async fn attach_proof(
        &self,
        id: Uuid,
        attachment: &ProofAttachment,
    ) -> Result<Option<BundleOrder>, RepositoryError>;

    async fn apply_review(
        &self,
        id: Uuid,
        review: &PaymentReview,
    ) -> Result<Option<BundleOrder>, RepositoryError>;

    async fn expire_unverified(
        &self,
        paid_before: DateTime<Utc>,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<BundleOrder>, RepositoryError>;
}
