use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Status shared by seat bookings and bundle orders.
///
/// Older rows may carry `waiting_verification` or `rejected`; both are
/// accepted when parsing and normalized to the canonical variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    #[serde(alias = "waiting_verification")]
    PendingVerification,
    Confirmed,
    #[serde(alias = "rejected")]
    PaymentRejected,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::PendingVerification,
        BookingStatus::Confirmed,
        BookingStatus::PaymentRejected,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::PendingVerification => "pending_verification",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::PaymentRejected => "payment_rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Forward edges of the lifecycle. Cancellation is reachable from every
    /// state except itself; nothing moves backwards.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        match (self, next) {
            (Pending, PendingVerification) => true,
            (PendingVerification, Confirmed) | (PendingVerification, PaymentRejected) => true,
            (Cancelled, _) => false,
            (_, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown booking status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "pending_verification" | "waiting_verification" => Ok(BookingStatus::PendingVerification),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "payment_rejected" | "rejected" => Ok(BookingStatus::PaymentRejected),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Where an uploaded payment proof lives and how to serve it back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentProof {
    pub location: String,
    pub filename: String,
    pub mimetype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    /// Absent only on rows written before references were issued at creation.
    pub booking_reference: Option<String>,
    pub verification_code: Option<String>,
    pub showtime_id: i64,
    pub movie_title: String,
    pub seat_numbers: Vec<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    #[serde(skip_serializing)]
    pub payment_proof: Option<PaymentProof>,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub admin_notes: Option<String>,
    pub booking_date: DateTime<Utc>,
    pub payment_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn has_payment(&self) -> bool {
        self.payment_proof.is_some()
    }

    /// Reference for logs and events; falls back to the row id for legacy rows.
    pub fn label(&self) -> String {
        self.booking_reference
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleOrder {
    pub id: Uuid,
    pub order_reference: String,
    pub bundle_id: i64,
    pub bundle_name: String,
    pub bundle_description: Option<String>,
    pub bundle_price: Decimal,
    pub original_price: Option<Decimal>,
    pub savings: Option<Decimal>,
    pub quantity: i32,
    pub total_price: Decimal,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub status: BookingStatus,
    #[serde(skip_serializing)]
    pub payment_proof: Option<PaymentProof>,
    pub admin_notes: Option<String>,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub order_date: DateTime<Utc>,
    pub payment_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl BundleOrder {
    pub fn has_payment(&self) -> bool {
        self.payment_proof.is_some()
    }
}

/// Listing filter. `customer` matches name or e-mail, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub customer: Option<String>,
}

impl BookingFilter {
    pub fn with_status(status: BookingStatus) -> Self {
        Self {
            status: Some(status),
            customer: None,
        }
    }

    pub fn for_customer(customer: &str) -> Self {
        Self {
            status: None,
            customer: Some(customer.trim().to_lowercase()),
        }
    }

    pub fn matches(&self, status: BookingStatus, name: &str, email: &str) -> bool {
        if let Some(wanted) = self.status {
            if wanted != status {
                return false;
            }
        }
        match &self.customer {
            Some(needle) => {
                let needle = needle.to_lowercase();
                name.to_lowercase() == needle || email.to_lowercase() == needle
            }
            None => true,
        }
    }
}
