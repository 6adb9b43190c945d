use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/schedules/{id}/stream", get(seat_stream))
}

/// GET /v1/schedules/{id}/stream
/// Seat availability changes for one schedule as server-sent events.
async fn seat_stream(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.seat_events.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.schedule_id == schedule_id => {
                let kind = match event.change {
                    rail_shared::SeatChange::Booked => "seat_booked",
                    rail_shared::SeatChange::Cancelled => "seat_cancelled",
                    rail_shared::SeatChange::Expired => "seat_expired",
                };
                match Event::default().event(kind).json_data(&event) {
                    Ok(sse) => Some(Ok(sse)),
                    Err(e) => {
                        tracing::warn!("Dropping unserializable seat event: {}", e);
                        None
                    }
                }
            }
            Ok(_) => None,
            // Slow subscriber; the missed events are gone.
            Err(e) => {
                tracing::debug!("Seat stream lagged: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
