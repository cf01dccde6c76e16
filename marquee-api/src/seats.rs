use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/showtimes/{showtime_id}/seats/stream", get(seat_stream))
}

/// Live seat changes for one showtime.
async fn seat_stream(
    State(state): State<AppState>,
    Path(showtime_id): Path<i64>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(showtime_id, "Seat stream subscriber connected");
    let rx = state.sse_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.showtime_id == showtime_id => {
                match Event::default().event("seat_update").json_data(&event) {
                    Ok(sse) => Some(Ok(sse)),
                    Err(e) => {
                        warn!("Failed to encode seat event: {}", e);
                        None
                    }
                }
            }
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(showtime_id, skipped, "Seat stream subscriber lagged");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
