//! SSE channel: `GET /api/events?task_id=...` subscribes to
//! `task.<id>.*` and streams every event until `completed` fires or a
//! 30-second idle keepalive window elapses.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub task_id: String,
}

pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = mpsc::channel::<(String, serde_json::Value)>(32);
    let pattern = format!("task.{}.*", query.task_id);

    let handle: sentinel_bus::Handler = std::sync::Arc::new(move |topic: String, data: serde_json::Value| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send((topic, data)).await;
            Ok::<(), sentinel_bus::HandlerError>(())
        })
    });
    state.bus.subscribe(&pattern, handle.clone()).await;

    let bus = state.bus.clone();
    let stream = async_stream::stream! {
        loop {
            match &mut rx.recv().await {
                Some((topic, data)) => {
                    let completed = topic.ends_with(".completed");
                    yield Ok(Event::default()
                        .event(topic.clone())
                        .json_data(data.clone())
                        .unwrap_or_else(|_| Event::default()));
                    if completed {
                        break;
                    }
                }
                None => break,
            }
        }
        bus.unsubscribe(&pattern, &handle).await;
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)))
}
