use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::repository::{PaymentReview, ProofAttachment, ReviewDecision, ReviewOutcome};
use marquee_core::seats::{collect_occupied, detect_conflict, encode_seat_list, parse_seat_list, StoredSeatList};
use marquee_core::{Booking, BookingFilter, BookingRepository, BookingStatus, PaymentProof, RepositoryError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::{db_err, insert_err, parse_status, stored_names};

const BOOKING_COLUMNS: &str = "id, booking_reference, verification_code, showtime_id, movie_title, seat_numbers, \
     customer_name, customer_email, customer_phone, total_amount, status, payment_proof, payment_filename, \
     payment_mimetype, is_verified, verified_at, verified_by, admin_notes, booking_date, payment_date, updated_at";

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    booking_reference: Option<String>,
    verification_code: Option<String>,
    showtime_id: i64,
    movie_title: String,
    seat_numbers: String,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    total_amount: Decimal,
    status: String,
    payment_proof: Option<String>,
    payment_filename: Option<String>,
    payment_mimetype: Option<String>,
    is_verified: bool,
    verified_at: Option<DateTime<Utc>>,
    verified_by: Option<String>,
    admin_notes: Option<String>,
    booking_date: DateTime<Utc>,
    payment_date: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = RepositoryError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let seat_numbers = parse_seat_list(&row.seat_numbers).unwrap_or_else(|e| {
            warn!(booking_id = %row.id, error = %e, "Booking row has malformed seats");
            Vec::new()
        });
        let payment_proof = row.payment_proof.map(|location| PaymentProof {
            location,
            filename: row.payment_filename.unwrap_or_else(|| "payment-proof".to_string()),
            mimetype: row.payment_mimetype.unwrap_or_else(|| "image/jpeg".to_string()),
        });

        Ok(Booking {
            id: row.id,
            booking_reference: row.booking_reference,
            verification_code: row.verification_code,
            showtime_id: row.showtime_id,
            movie_title: row.movie_title,
            seat_numbers,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            total_amount: row.total_amount,
            status: parse_status(&row.status)?,
            payment_proof,
            is_verified: row.is_verified,
            verified_at: row.verified_at,
            verified_by: row.verified_by,
            admin_notes: row.admin_notes,
            booking_date: row.booking_date,
            payment_date: row.payment_date,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    booking_reference: Option<String>,
    seat_numbers: String,
}

impl From<SeatRow> for StoredSeatList {
    fn from(row: SeatRow) -> Self {
        StoredSeatList {
            booking_id: row.id,
            booking_reference: row.booking_reference,
            raw: row.seat_numbers,
        }
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, RepositoryError> {
    rows.into_iter().map(Booking::try_from).collect()
}

fn names(statuses: &[BookingStatus]) -> Vec<String> {
    statuses.iter().flat_map(|s| stored_names(*s)).collect()
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert(&self, booking: &Booking) -> Result<(), RepositoryError> {
        let proof = booking.payment_proof.as_ref();
        sqlx::query(&format!(
            "INSERT INTO bookings ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)",
            BOOKING_COLUMNS
        ))
        .bind(booking.id)
        .bind(&booking.booking_reference)
        .bind(&booking.verification_code)
        .bind(booking.showtime_id)
        .bind(&booking.movie_title)
        .bind(encode_seat_list(&booking.seat_numbers))
        .bind(&booking.customer_name)
        .bind(&booking.customer_email)
        .bind(&booking.customer_phone)
        .bind(booking.total_amount)
        .bind(booking.status.as_str())
        .bind(proof.map(|p| p.location.clone()))
        .bind(proof.map(|p| p.filename.clone()))
        .bind(proof.map(|p| p.mimetype.clone()))
        .bind(booking.is_verified)
        .bind(booking.verified_at)
        .bind(&booking.verified_by)
        .bind(&booking.admin_notes)
        .bind(booking.booking_date)
        .bind(booking.payment_date)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_err(e, booking.booking_reference.as_deref().unwrap_or_default()))?;
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>, RepositoryError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE booking_reference = $1",
            BOOKING_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list(&self, filter: &BookingFilter) -> Result<Vec<Booking>, RepositoryError> {
        let statuses = filter.status.map(stored_names);
        let customer = filter.customer.as_ref().map(|c| c.to_lowercase());

        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings \
             WHERE ($1::text[] IS NULL OR status = ANY($1)) \
               AND ($2::text IS NULL OR LOWER(customer_email) = $2 OR LOWER(customer_name) = $2) \
             ORDER BY booking_date DESC",
            BOOKING_COLUMNS
        ))
        .bind(statuses)
        .bind(customer)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_bookings(rows)
    }

    async fn seat_lists(
        &self,
        showtime_id: i64,
        movie_title: &str,
        statuses: &[BookingStatus],
    ) -> Result<Vec<StoredSeatList>, RepositoryError> {
        let rows: Vec<SeatRow> = sqlx::query_as(
            "SELECT id, booking_reference, seat_numbers FROM bookings \
             WHERE showtime_id = $1 AND movie_title = $2 AND status = ANY($3)",
        )
        .bind(showtime_id)
        .bind(movie_title)
        .bind(names(statuses))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(StoredSeatList::from).collect())
    }

    async fn attach_proof(
        &self,
        id: Uuid,
        attachment: &ProofAttachment,
    ) -> Result<Option<Booking>, RepositoryError> {
        let assigned_reference = attachment.assign.as_ref().map(|a| a.booking_reference.clone());
        let assigned_code = attachment.assign.as_ref().map(|a| a.verification_code.clone());

        // SET expressions see the old row, so the CASE tests the pre-update reference.
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "UPDATE bookings SET \
                payment_proof = $2, payment_filename = $3, payment_mimetype = $4, \
                payment_date = $5, updated_at = $5, status = 'pending_verification', \
                verification_code = CASE WHEN booking_reference IS NULL THEN $7 ELSE verification_code END, \
                booking_reference = COALESCE(booking_reference, $6) \
             WHERE id = $1 AND status = ANY($8) \
             RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(&attachment.proof.location)
        .bind(&attachment.proof.filename)
        .bind(&attachment.proof.mimetype)
        .bind(attachment.paid_at)
        .bind(assigned_reference.clone())
        .bind(assigned_code)
        .bind(stored_names(BookingStatus::Pending))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| insert_err(e, assigned_reference.as_deref().unwrap_or_default()))?;
        row.map(Booking::try_from).transpose()
    }

    async fn apply_review(&self, id: Uuid, review: &PaymentReview) -> Result<ReviewOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let key: Option<(i64, String)> = sqlx::query_as("SELECT showtime_id, movie_title FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let Some((showtime_id, movie_title)) = key else {
            return Ok(ReviewOutcome::NotPending(None));
        };

        // Serializes every review for this showtime until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{}:{}", showtime_id, movie_title))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let row: BookingRow = sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1 FOR UPDATE", BOOKING_COLUMNS))
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        let booking = Booking::try_from(row)?;
        if booking.status != BookingStatus::PendingVerification {
            return Ok(ReviewOutcome::NotPending(Some(booking.status)));
        }

        if review.decision == ReviewDecision::Approve {
            let confirmed: Vec<SeatRow> = sqlx::query_as(
                "SELECT id, booking_reference, seat_numbers FROM bookings \
                 WHERE showtime_id = $1 AND movie_title = $2 AND status = 'confirmed' AND id <> $3",
            )
            .bind(showtime_id)
            .bind(&movie_title)
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?;

            let occupied: Vec<StoredSeatList> = confirmed.into_iter().map(StoredSeatList::from).collect();
            let conflicts = detect_conflict(&booking.seat_numbers, &collect_occupied(&occupied));
            if !conflicts.is_empty() {
                return Ok(ReviewOutcome::SeatConflict(conflicts));
            }
        }

        let verified_at = match review.decision {
            ReviewDecision::Approve => Some(review.reviewed_at),
            ReviewDecision::Reject => booking.verified_at,
        };
        let row: BookingRow = sqlx::query_as(&format!(
            "UPDATE bookings SET status = $2, verified_by = $3, verified_at = $4, \
                admin_notes = COALESCE($5, admin_notes), updated_at = $6 \
             WHERE id = $1 RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(review.decision.target().as_str())
        .bind(&review.reviewer)
        .bind(verified_at)
        .bind(&review.notes)
        .bind(review.reviewed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(ReviewOutcome::Applied(Booking::try_from(row)?))
    }

    async fn mark_scanned(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Booking>, RepositoryError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "UPDATE bookings SET is_verified = TRUE, verified_at = $2, updated_at = $2 \
             WHERE id = $1 AND status = 'confirmed' AND is_verified = FALSE \
             RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn cancel(
        &self,
        id: Uuid,
        expected: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>, RepositoryError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "UPDATE bookings SET status = 'cancelled', updated_at = $2 \
             WHERE id = $1 AND status = ANY($3) AND is_verified = FALSE \
             RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .bind(stored_names(expected))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn expire_unverified(
        &self,
        paid_before: DateTime<Utc>,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "UPDATE bookings SET status = 'payment_rejected', admin_notes = $2, updated_at = $3 \
             WHERE status = ANY($4) AND COALESCE(payment_date, updated_at) < $1 \
             RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(paid_before)
        .bind(note)
        .bind(at)
        .bind(stored_names(BookingStatus::PendingVerification))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_bookings(rows)
    }
}
