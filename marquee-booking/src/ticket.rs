use chrono::{DateTime, Utc};
use marquee_core::{Booking, BookingStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

pub const TICKET_KIND: &str = "CINEMA_TICKET";

fn ticket_kind() -> String {
    TICKET_KIND.to_string()
}

/// Content of the QR code printed on a confirmed ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketPayload {
    #[serde(rename = "type", default = "ticket_kind")]
    pub kind: String,
    pub booking_reference: String,
    pub verification_code: String,
    #[serde(default)]
    pub movie: Option<String>,
    #[serde(default)]
    pub showtime_id: Option<i64>,
    #[serde(default)]
    pub seats: Vec<String>,
    #[serde(default)]
    pub total: Option<Decimal>,
}

impl TicketPayload {
    /// Only confirmed bookings with an issued reference get a ticket.
    pub fn for_booking(booking: &Booking) -> Option<Self> {
        if booking.status != BookingStatus::Confirmed {
            return None;
        }
        Some(Self {
            kind: ticket_kind(),
            booking_reference: booking.booking_reference.clone()?,
            verification_code: booking.verification_code.clone()?,
            movie: Some(booking.movie_title.clone()),
            showtime_id: Some(booking.showtime_id),
            seats: booking.seat_numbers.clone(),
            total: Some(booking.total_amount),
        })
    }

    pub fn parse(raw: &str) -> Result<Self, BookingError> {
        let payload: TicketPayload = serde_json::from_str(raw.trim())
            .map_err(|e| BookingError::InvalidFormat(e.to_string()))?;

        if payload.booking_reference.trim().is_empty() || payload.verification_code.trim().is_empty() {
            return Err(BookingError::InvalidFormat(
                "booking_reference and verification_code are required".to_string(),
            ));
        }
        Ok(payload)
    }
}

/// Shown to door staff after a successful scan.
#[derive(Debug, Clone, Serialize)]
pub struct TicketInfo {
    pub movie: String,
    pub booking_reference: String,
    pub showtime_id: i64,
    pub seats: Vec<String>,
    pub customer: String,
    pub total_paid: Decimal,
    pub status: &'static str,
    pub verification_code: String,
    pub verified_at: Option<DateTime<Utc>>,
}

impl From<&Booking> for TicketInfo {
    fn from(booking: &Booking) -> Self {
        Self {
            movie: booking.movie_title.clone(),
            booking_reference: booking.label(),
            showtime_id: booking.showtime_id,
            seats: booking.seat_numbers.clone(),
            customer: booking.customer_name.clone(),
            total_paid: booking.total_amount,
            status: "VERIFIED",
            verification_code: booking.verification_code.clone().unwrap_or_default(),
            verified_at: booking.verified_at,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Admitted(TicketInfo),
    /// Scanned before; nothing changed.
    AlreadyUsed {
        booking_reference: String,
        used_at: Option<DateTime<Utc>>,
    },
}
