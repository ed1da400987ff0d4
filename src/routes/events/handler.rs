use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    stop_id: Option<String>,
}

/// SSE 订阅变更事件流。事件只说明"哪张表、哪个站点变了"，
/// 订阅方收到后重新拉取数据；不承诺恰好一次，也不承诺顺序
pub async fn subscribe_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();

    let stream = futures_util::stream::unfold((rx, query.stop_id), |(mut rx, filter)| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    // 按站点过滤；不带站点ID的事件对所有订阅者可见
                    if let (Some(want), Some(got)) = (filter.as_deref(), event.stop_id.as_deref()) {
                        if want != got {
                            continue;
                        }
                    }
                    let payload =
                        serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                    return Some((Ok(Event::default().event("change").data(payload)), (rx, filter)));
                }
                // 消费落后丢了事件时让客户端整体重新拉取
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event subscriber lagged, skipped {} events", skipped);
                    return Some((Ok(Event::default().event("resync").data("{}")), (rx, filter)));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
