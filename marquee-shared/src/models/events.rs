use serde::{Deserialize, Serialize};

/// What happened to a group of seats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatAction {
    /// Proof uploaded, seats held while the payment is reviewed.
    Held,
    Confirmed,
    /// Booking rejected, cancelled or expired.
    Released,
    TicketValidated,
}

impl SeatAction {
    /// Seat state a live seat map should render after this action.
    pub fn seat_status(&self) -> &'static str {
        match self {
            SeatAction::Released => "available",
            _ => "occupied",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeatUpdate {
    pub seat_number: String,
    pub status: String,
}

/// Published for every seat-affecting change, one event per booking.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeatUpdateEvent {
    pub showtime_id: i64,
    pub movie_title: String,
    pub booking_reference: String,
    pub action: SeatAction,
    pub seats: Vec<SeatUpdate>,
    pub timestamp: i64,
}

impl SeatUpdateEvent {
    pub fn new(
        showtime_id: i64,
        movie_title: &str,
        booking_reference: &str,
        action: SeatAction,
        seat_numbers: &[String],
    ) -> Self {
        let status = action.seat_status();
        Self {
            showtime_id,
            movie_title: movie_title.to_string(),
            booking_reference: booking_reference.to_string(),
            action,
            seats: seat_numbers
                .iter()
                .map(|seat| SeatUpdate {
                    seat_number: seat.clone(),
                    status: status.to_string(),
                })
                .collect(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_validation_marks_seats_occupied() {
        let seats = vec!["A1".to_string(), "A2".to_string()];
        let event = SeatUpdateEvent::new(7, "Dune", "BK1", SeatAction::TicketValidated, &seats);

        assert_eq!(event.seats.len(), 2);
        assert!(event.seats.iter().all(|s| s.status == "occupied"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "ticket_validated");
        assert_eq!(json["seats"][0]["seat_number"], "A1");
    }

    #[test]
    fn test_release_marks_seats_available() {
        let event = SeatUpdateEvent::new(7, "Dune", "BK1", SeatAction::Released, &["B4".to_string()]);
        assert_eq!(event.seats[0].status, "available");
    }
}
