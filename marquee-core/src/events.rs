use marquee_shared::models::events::SeatUpdateEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Receives seat changes for live seat maps. Injected into the booking
/// services; the server wires it to a broadcast channel feeding SSE streams.
pub trait SeatEventSink: Send + Sync {
    fn publish(&self, event: SeatUpdateEvent);
}

impl SeatEventSink for broadcast::Sender<SeatUpdateEvent> {
    fn publish(&self, event: SeatUpdateEvent) {
        // An error only means nobody is subscribed right now.
        if self.send(event).is_err() {
            trace!("No seat update subscribers");
        }
    }
}

pub struct NoopSeatEvents;

impl SeatEventSink for NoopSeatEvents {
    fn publish(&self, _event: SeatUpdateEvent) {}
}
