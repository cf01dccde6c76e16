use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::repository::{PaymentReview, ProofAttachment};
use marquee_core::{BookingFilter, BookingStatus, BundleOrder, BundleOrderRepository, PaymentProof, RepositoryError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db_err, insert_err, parse_status, stored_names};

const ORDER_COLUMNS: &str = "id, order_reference, bundle_id, bundle_name, bundle_description, bundle_price, \
     original_price, savings, quantity, total_price, customer_name, customer_email, customer_phone, status, \
     payment_proof, payment_filename, payment_mimetype, admin_notes, verified_by, verified_at, order_date, \
     payment_date, updated_at";

pub struct PgBundleOrderRepository {
    pool: PgPool,
}

impl PgBundleOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_reference: String,
    bundle_id: i64,
    bundle_name: String,
    bundle_description: Option<String>,
    bundle_price: Decimal,
    original_price: Option<Decimal>,
    savings: Option<Decimal>,
    quantity: i32,
    total_price: Decimal,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    status: String,
    payment_proof: Option<String>,
    payment_filename: Option<String>,
    payment_mimetype: Option<String>,
    admin_notes: Option<String>,
    verified_by: Option<String>,
    verified_at: Option<DateTime<Utc>>,
    order_date: DateTime<Utc>,
    payment_date: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for BundleOrder {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let payment_proof = row.payment_proof.map(|location| PaymentProof {
            location,
            filename: row.payment_filename.unwrap_or_else(|| "payment-proof".to_string()),
            mimetype: row.payment_mimetype.unwrap_or_else(|| "image/jpeg".to_string()),
        });

        Ok(BundleOrder {
            id: row.id,
            order_reference: row.order_reference,
            bundle_id: row.bundle_id,
            bundle_name: row.bundle_name,
            bundle_description: row.bundle_description,
            bundle_price: row.bundle_price,
            original_price: row.original_price,
            savings: row.savings,
            quantity: row.quantity,
            total_price: row.total_price,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            status: parse_status(&row.status)?,
            payment_proof,
            admin_notes: row.admin_notes,
            verified_by: row.verified_by,
            verified_at: row.verified_at,
            order_date: row.order_date,
            payment_date: row.payment_date,
            updated_at: row.updated_at,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<BundleOrder>, RepositoryError> {
    rows.into_iter().map(BundleOrder::try_from).collect()
}

#[async_trait]
impl BundleOrderRepository for PgBundleOrderRepository {
    async fn insert(&self, order: &BundleOrder) -> Result<(), RepositoryError> {
        let proof = order.payment_proof.as_ref();
        sqlx::query(&format!(
            "INSERT INTO bundle_orders ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)",
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(&order.order_reference)
        .bind(order.bundle_id)
        .bind(&order.bundle_name)
        .bind(&order.bundle_description)
        .bind(order.bundle_price)
        .bind(order.original_price)
        .bind(order.savings)
        .bind(order.quantity)
        .bind(order.total_price)
        .bind(&order.customer_name)
        .bind(&order.customer_email)
        .bind(&order.customer_phone)
        .bind(order.status.as_str())
        .bind(proof.map(|p| p.location.clone()))
        .bind(proof.map(|p| p.filename.clone()))
        .bind(proof.map(|p| p.mimetype.clone()))
        .bind(&order.admin_notes)
        .bind(&order.verified_by)
        .bind(order.verified_at)
        .bind(order.order_date)
        .bind(order.payment_date)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_err(e, &order.order_reference))?;
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<BundleOrder>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bundle_orders WHERE order_reference = $1",
            ORDER_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(BundleOrder::try_from).transpose()
    }

    async fn list(&self, filter: &BookingFilter) -> Result<Vec<BundleOrder>, RepositoryError> {
        let statuses = filter.status.map(stored_names);
        let customer = filter.customer.as_ref().map(|c| c.to_lowercase());

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bundle_orders \
             WHERE ($1::text[] IS NULL OR status = ANY($1)) \
               AND ($2::text IS NULL OR LOWER(customer_email) = $2 OR LOWER(customer_name) = $2) \
             ORDER BY order_date DESC",
            ORDER_COLUMNS
        ))
        .bind(statuses)
        .bind(customer)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_orders(rows)
    }

    async fn attach_proof(
        &self,
        id: Uuid,
        attachment: &ProofAttachment,
    ) -> Result<Option<BundleOrder>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "UPDATE bundle_orders SET \
                payment_proof = $2, payment_filename = $3, payment_mimetype = $4, \
                payment_date = $5, updated_at = $5, status = 'pending_verification' \
             WHERE id = $1 AND status = ANY($6) \
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(&attachment.proof.location)
        .bind(&attachment.proof.filename)
        .bind(&attachment.proof.mimetype)
        .bind(attachment.paid_at)
        .bind(stored_names(BookingStatus::Pending))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(BundleOrder::try_from).transpose()
    }

    async fn apply_review(&self, id: Uuid, review: &PaymentReview) -> Result<Option<BundleOrder>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "UPDATE bundle_orders SET status = $2, verified_by = $3, verified_at = $4, \
                admin_notes = COALESCE($5, admin_notes), updated_at = $4 \
             WHERE id = $1 AND status = ANY($6) \
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(review.decision.target().as_str())
        .bind(&review.reviewer)
        .bind(review.reviewed_at)
        .bind(&review.notes)
        .bind(stored_names(BookingStatus::PendingVerification))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(BundleOrder::try_from).transpose()
    }

    async fn expire_unverified(
        &self,
        paid_before: DateTime<Utc>,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<BundleOrder>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "UPDATE bundle_orders SET status = 'payment_rejected', admin_notes = $2, updated_at = $3 \
             WHERE status = ANY($4) AND COALESCE(payment_date, updated_at) < $1 \
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(paid_before)
        .bind(note)
        .bind(at)
        .bind(stored_names(BookingStatus::PendingVerification))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_orders(rows)
    }
}
