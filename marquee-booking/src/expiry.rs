use chrono::{DateTime, Duration, Utc};
use marquee_core::{BookingRepository, BundleOrderRepository, SeatEventSink};
use marquee_shared::models::events::{SeatAction, SeatUpdateEvent};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::BookingError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub bookings: usize,
    pub bundle_orders: usize,
}

/// Rejects payment proofs nobody reviewed within the TTL so their seats are
/// released.
pub struct ExpirySweeper {
    bookings: Arc<dyn BookingRepository>,
    bundles: Arc<dyn BundleOrderRepository>,
    events: Arc<dyn SeatEventSink>,
    ttl: Duration,
}

impl ExpirySweeper {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        bundles: Arc<dyn BundleOrderRepository>,
        events: Arc<dyn SeatEventSink>,
        ttl: Duration,
    ) -> Self {
        Self {
            bookings,
            bundles,
            events,
            ttl,
        }
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, BookingError> {
        let cutoff = now - self.ttl;
        let note = format!("Payment not verified within {} minutes", self.ttl.num_minutes());

        let bookings = self.bookings.expire_unverified(cutoff, &note, now).await?;
        for booking in &bookings {
            self.events.publish(SeatUpdateEvent::new(
                booking.showtime_id,
                &booking.movie_title,
                &booking.label(),
                SeatAction::Released,
                &booking.seat_numbers,
            ));
        }
        let bundles = self.bundles.expire_unverified(cutoff, &note, now).await?;

        Ok(SweepReport {
            bookings: bookings.len(),
            bundle_orders: bundles.len(),
        })
    }

    /// Sweeps forever on a fixed interval. Failures are logged and retried
    /// on the next tick.
    pub async fn run(self, every: std::time::Duration) {
        info!(every_secs = every.as_secs(), ttl_minutes = self.ttl.num_minutes(), "Expiry sweeper started");
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match self.sweep_once(Utc::now()).await {
                Ok(report) if report != SweepReport::default() => {
                    info!(
                        bookings = report.bookings,
                        bundle_orders = report.bundle_orders,
                        "Expired unverified payments"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Expiry sweep failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleService;
    use crate::lifecycle::{BookingLookup, BookingPolicy, BookingService};
    use crate::memory::{InMemoryBookingRepository, InMemoryBundleOrderRepository, InMemoryProofStorage};
    use crate::validation::{BookingDraft, BundleDraft};
    use marquee_core::repository::{PaymentReview, ProofAttachment, ReviewDecision};
    use marquee_core::seats::SeatSelection;
    use marquee_core::{BookingStatus, NoopSeatEvents, PaymentProof, ProofArtifact};
    use rust_decimal_macros::dec;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_sweep_releases_stale_proofs_only() {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let bundles = Arc::new(InMemoryBundleOrderRepository::new());
        let (tx, mut rx) = broadcast::channel(16);
        let tx = Arc::new(tx);
        let service = BookingService::new(
            repo.clone(),
            Arc::new(InMemoryProofStorage::new()),
            tx.clone(),
            BookingPolicy::default(),
        );

        let draft = BookingDraft {
            showtime_id: Some(1),
            movie_title: Some("Dune".into()),
            customer_name: Some("Jane".into()),
            customer_email: Some("jane@example.com".into()),
            customer_phone: None,
            seat_numbers: Some(SeatSelection::Text("F1,F2".into())),
            total_amount: Some(dec!(50000)),
        };
        let untouched = service.create_booking(draft.clone()).await.unwrap();
        let stale = service.create_booking(draft).await.unwrap();
        service
            .attach_payment_proof(
                BookingLookup::Id(stale.id),
                ProofArtifact::new(vec![1], "p.png", "image/png"),
            )
            .await
            .unwrap();
        while rx.try_recv().is_ok() {}

        let sweeper = ExpirySweeper::new(repo.clone(), bundles, tx, Duration::minutes(30));

        let early = sweeper.sweep_once(Utc::now()).await.unwrap();
        assert_eq!(early, SweepReport::default());

        let late = sweeper.sweep_once(Utc::now() + Duration::minutes(31)).await.unwrap();
        assert_eq!(late.bookings, 1);

        let expired = repo.find_by_id(stale.id).await.unwrap().unwrap();
        assert_eq!(expired.status, BookingStatus::PaymentRejected);
        assert!(expired.admin_notes.unwrap().contains("30 minutes"));
        assert_eq!(rx.try_recv().unwrap().action, SeatAction::Released);

        let pending = repo.find_by_id(untouched.id).await.unwrap().unwrap();
        assert_eq!(pending.status, BookingStatus::Pending);
    }

    fn paid_at(at: DateTime<Utc>) -> ProofAttachment {
        ProofAttachment {
            proof: PaymentProof {
                location: "memory://receipt".into(),
                filename: "receipt.jpg".into(),
                mimetype: "image/jpeg".into(),
            },
            paid_at: at,
            assign: None,
        }
    }

    #[tokio::test]
    async fn test_sweep_rejects_stale_bundle_orders() {
        let bundles = Arc::new(InMemoryBundleOrderRepository::new());
        let service = BundleService::new(bundles.clone(), Arc::new(InMemoryProofStorage::new()), 1024);
        let draft = BundleDraft {
            bundle_id: Some(4),
            bundle_name: Some("Couple Combo".into()),
            bundle_price: Some(dec!(45000)),
            customer_name: Some("Budi".into()),
            customer_email: Some("budi@example.com".into()),
            ..Default::default()
        };
        let stale = service.create_order(draft.clone()).await.unwrap();
        let fresh = service.create_order(draft.clone()).await.unwrap();
        let confirmed = service.create_order(draft).await.unwrap();

        let now = Utc::now();
        let old = now - Duration::minutes(45);
        bundles.attach_proof(stale.id, &paid_at(old)).await.unwrap().unwrap();
        bundles.attach_proof(fresh.id, &paid_at(now - Duration::minutes(5))).await.unwrap().unwrap();
        bundles.attach_proof(confirmed.id, &paid_at(old)).await.unwrap().unwrap();
        let review = PaymentReview {
            decision: ReviewDecision::Approve,
            reviewer: "admin".into(),
            notes: None,
            reviewed_at: old,
        };
        bundles.apply_review(confirmed.id, &review).await.unwrap().unwrap();

        let sweeper = ExpirySweeper::new(
            Arc::new(InMemoryBookingRepository::new()),
            bundles.clone(),
            Arc::new(NoopSeatEvents),
            Duration::minutes(30),
        );
        let report = sweeper.sweep_once(now).await.unwrap();
        assert_eq!(report, SweepReport { bookings: 0, bundle_orders: 1 });

        let stale = service.get_order(&stale.order_reference).await.unwrap();
        assert_eq!(stale.status, BookingStatus::PaymentRejected);
        assert_eq!(stale.admin_notes.as_deref(), Some("Payment not verified within 30 minutes"));

        let fresh = service.get_order(&fresh.order_reference).await.unwrap();
        assert_eq!(fresh.status, BookingStatus::PendingVerification);
        let confirmed = service.get_order(&confirmed.order_reference).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);

        // nothing left to expire
        assert_eq!(sweeper.sweep_once(now).await.unwrap(), SweepReport::default());
    }
}
