use chrono::Utc;
use marquee_core::repository::{PaymentReview, ProofAttachment, ReviewDecision};
use marquee_core::{
    BookingFilter, BookingStatus, BundleOrder, BundleOrderRepository, PaymentProof, ProofArtifact, ProofStorage,
    RepositoryError,
};
use marquee_shared::Masked;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codes;
use crate::error::BookingError;
use crate::lifecycle::check_artifact;
use crate::validation::{BundleDraft, ValidBundle};

const MAX_REFERENCE_ATTEMPTS: usize = 5;

/// Concession bundle orders: the booking lifecycle without seats or door codes.
#[derive(Clone)]
pub struct BundleService {
    orders: Arc<dyn BundleOrderRepository>,
    storage: Arc<dyn ProofStorage>,
    max_proof_bytes: usize,
}

impl BundleService {
    pub fn new(orders: Arc<dyn BundleOrderRepository>, storage: Arc<dyn ProofStorage>, max_proof_bytes: usize) -> Self {
        Self {
            orders,
            storage,
            max_proof_bytes,
        }
    }

    fn build(valid: &ValidBundle) -> BundleOrder {
        let now = Utc::now();
        BundleOrder {
            id: Uuid::new_v4(),
            order_reference: codes::bundle_reference(),
            bundle_id: valid.bundle_id,
            bundle_name: valid.bundle_name.clone(),
            bundle_description: valid.bundle_description.clone(),
            bundle_price: valid.bundle_price,
            original_price: valid.original_price,
            savings: valid.savings,
            quantity: valid.quantity,
            total_price: valid.total_price,
            customer_name: valid.customer.name.clone(),
            customer_email: valid.customer.email.clone(),
            customer_phone: valid.customer.phone.clone(),
            status: BookingStatus::Pending,
            payment_proof: None,
            admin_notes: None,
            verified_by: None,
            verified_at: None,
            order_date: now,
            payment_date: None,
            updated_at: now,
        }
    }

    pub async fn create_order(&self, draft: BundleDraft) -> Result<BundleOrder, BookingError> {
        let valid = draft.validate()?;

        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let order = Self::build(&valid);
            match self.orders.insert(&order).await {
                Ok(()) => {
                    info!(
                        order_reference = %order.order_reference,
                        bundle_id = order.bundle_id,
                        quantity = order.quantity,
                        email = ?Masked(&order.customer_email),
                        "Bundle order created"
                    );
                    return Ok(order);
                }
                Err(RepositoryError::DuplicateReference(reference)) => {
                    warn!(attempt, reference = %reference, "Bundle reference collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RepositoryError::Backend("could not allocate a unique order reference".to_string()).into())
    }

    pub async fn get_order(&self, reference: &str) -> Result<BundleOrder, BookingError> {
        self.orders
            .find_by_reference(reference.trim())
            .await?
            .ok_or_else(|| BookingError::not_found("bundle order", reference))
    }

    pub async fn list_orders(&self, filter: &BookingFilter) -> Result<Vec<BundleOrder>, BookingError> {
        Ok(self.orders.list(filter).await?)
    }

    pub async fn pending_verifications(&self) -> Result<Vec<BundleOrder>, BookingError> {
        self.list_orders(&BookingFilter::with_status(BookingStatus::PendingVerification))
            .await
    }

    pub async fn attach_payment_proof(
        &self,
        reference: &str,
        artifact: ProofArtifact,
    ) -> Result<BundleOrder, BookingError> {
        check_artifact(&artifact, self.max_proof_bytes)?;

        let order = self.get_order(reference).await?;
        if order.status != BookingStatus::Pending {
            return Err(BookingError::not_in_state("bundle order", reference, BookingStatus::Pending));
        }

        let now = Utc::now();
        let key = format!("bundles/{}-{}.{}", order.id, now.timestamp_millis(), artifact.extension());
        let location = self.storage.store(&key, &artifact).await?;
        let attachment = ProofAttachment {
            proof: PaymentProof {
                location: location.clone(),
                filename: artifact.filename.clone(),
                mimetype: artifact.mimetype.clone(),
            },
            paid_at: now,
            assign: None,
        };

        match self.orders.attach_proof(order.id, &attachment).await {
            Ok(Some(updated)) => {
                info!(order_reference = %updated.order_reference, "Bundle payment proof attached");
                Ok(updated)
            }
            Ok(None) => {
                self.discard(&location).await;
                Err(BookingError::not_in_state("bundle order", reference, BookingStatus::Pending))
            }
            Err(e) => {
                self.discard(&location).await;
                Err(e.into())
            }
        }
    }

    async fn discard(&self, location: &str) {
        if let Err(e) = self.storage.remove(location).await {
            warn!(location, error = %e, "Failed to remove orphaned bundle payment proof");
        }
    }

    pub async fn verify_order(
        &self,
        reference: &str,
        reviewer: &str,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<BundleOrder, BookingError> {
        let order = self.get_order(reference).await?;
        if order.status != BookingStatus::PendingVerification {
            return Err(BookingError::not_in_state(
                "bundle order",
                reference,
                BookingStatus::PendingVerification,
            ));
        }

        let review = PaymentReview {
            decision,
            reviewer: reviewer.to_string(),
            notes: notes.filter(|n| !n.trim().is_empty()),
            reviewed_at: Utc::now(),
        };
        let updated = self
            .orders
            .apply_review(order.id, &review)
            .await?
            .ok_or_else(|| BookingError::not_in_state("bundle order", reference, BookingStatus::PendingVerification))?;

        info!(order_reference = reference, reviewer, status = %updated.status, "Bundle order reviewed");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryBundleOrderRepository, InMemoryProofStorage};
    use rust_decimal_macros::dec;

    fn service() -> BundleService {
        BundleService::new(
            Arc::new(InMemoryBundleOrderRepository::new()),
            Arc::new(InMemoryProofStorage::new()),
            1024,
        )
    }

    fn draft() -> BundleDraft {
        BundleDraft {
            bundle_id: Some(2),
            bundle_name: Some("Family Pack".into()),
            bundle_description: Some("4 popcorn + 4 drinks".into()),
            bundle_price: Some(dec!(120000)),
            original_price: Some(dec!(150000)),
            savings: Some(dec!(30000)),
            quantity: Some(1),
            total_price: None,
            customer_name: Some("Budi".into()),
            customer_email: Some("budi@example.com".into()),
            customer_phone: Some("0812000000".into()),
        }
    }

    fn receipt() -> ProofArtifact {
        ProofArtifact::new(vec![1, 2, 3], "receipt.jpg", "image/jpeg")
    }

    #[tokio::test]
    async fn test_bundle_lifecycle() {
        let service = service();
        let order = service.create_order(draft()).await.unwrap();
        assert_eq!(order.status, BookingStatus::Pending);
        assert!(order.order_reference.starts_with("BUNDLE-"));
        assert_eq!(order.total_price, dec!(120000));

        let paid = service.attach_payment_proof(&order.order_reference, receipt()).await.unwrap();
        assert_eq!(paid.status, BookingStatus::PendingVerification);
        assert!(paid.has_payment());

        let pending = service.pending_verifications().await.unwrap();
        assert_eq!(pending.len(), 1);

        let confirmed = service
            .verify_order(&order.order_reference, "admin", ReviewDecision::Approve, None)
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.verified_by.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_bundle_verify_requires_proof() {
        let service = service();
        let order = service.create_order(draft()).await.unwrap();
        let err = service
            .verify_order(&order.order_reference, "admin", ReviewDecision::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_bundle_reject_is_final() {
        let service = service();
        let order = service.create_order(draft()).await.unwrap();
        service.attach_payment_proof(&order.order_reference, receipt()).await.unwrap();

        let rejected = service
            .verify_order(&order.order_reference, "admin", ReviewDecision::Reject, Some("Blurry receipt".into()))
            .await
            .unwrap();
        assert_eq!(rejected.status, BookingStatus::PaymentRejected);
        assert_eq!(rejected.admin_notes.as_deref(), Some("Blurry receipt"));

        assert!(service
            .verify_order(&order.order_reference, "admin", ReviewDecision::Approve, None)
            .await
            .is_err());
        assert!(service
            .attach_payment_proof(&order.order_reference, receipt())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_customer_listing() {
        let service = service();
        service.create_order(draft()).await.unwrap();
        let mut other = draft();
        other.customer_email = Some("someone@example.com".into());
        other.customer_name = Some("Someone".into());
        service.create_order(other).await.unwrap();

        let mine = service.list_orders(&BookingFilter::for_customer("BUDI@example.com")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(matches!(service.get_order("BUNDLE-0-NOPE").await, Err(BookingError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_discard_removes_orphaned_proof_and_survives_failures() {
        let storage = Arc::new(InMemoryProofStorage::new());
        let service = BundleService::new(Arc::new(InMemoryBundleOrderRepository::new()), storage.clone(), 1024);
        let location = storage.store("bundles/orphan.jpg", &receipt()).await.unwrap();
        assert_eq!(storage.len().await, 1);

        service.discard(&location).await;
        assert_eq!(storage.len().await, 0);

        use marquee_core::StorageError;

        struct StuckStorage;

        #[async_trait::async_trait]
        impl ProofStorage for StuckStorage {
            async fn store(&self, key: &str, _artifact: &ProofArtifact) -> Result<String, StorageError> {
                Ok(key.to_string())
            }
            async fn fetch(&self, _location: &str) -> Result<Option<Vec<u8>>, StorageError> {
                Ok(None)
            }
            async fn remove(&self, _location: &str) -> Result<(), StorageError> {
                Err(StorageError::Unavailable("disk detached".into()))
            }
        }

        let service = BundleService::new(Arc::new(InMemoryBundleOrderRepository::new()), Arc::new(StuckStorage), 1024);
        service.discard("bundles/orphan.jpg").await;
    }
}
