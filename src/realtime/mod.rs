use std::time::Duration;

use serde::Serialize;
use sqlx::{PgPool, postgres::PgListener};
use tokio::sync::broadcast;

// Postgres 触发器写入的通知通道名，见 migrations/0001_init.sql
pub const CHANNEL_STOP_WAITING: &str = "stop_waiting_changed";
pub const CHANNEL_STOP_POSTS: &str = "stop_posts_changed";

/// 行级变更事件。只携带"哪张表、哪个站点变了"，
/// 订阅方收到后自行重查当前状态，不能把事件当作可信的增量
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub stop_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    StopWaiting,
    StopPosts,
}

fn event_from_notification(channel: &str, payload: &str) -> Option<ChangeEvent> {
    let table = match channel {
        CHANNEL_STOP_WAITING => ChangeTable::StopWaiting,
        CHANNEL_STOP_POSTS => ChangeTable::StopPosts,
        _ => return None,
    };
    let stop_id = if payload.is_empty() {
        None
    } else {
        Some(payload.to_string())
    };
    Some(ChangeEvent { table, stop_id })
}

/// 监听存储层的 NOTIFY 并转发到进程内广播通道。
/// 通道观察的是数据库本身，写入方不直接推送事件；
/// 连接断开后带间隔重连，投递语义为至少一次、不保序
pub async fn run_listener(pool: PgPool, tx: broadcast::Sender<ChangeEvent>) {
    loop {
        let mut listener = match PgListener::connect_with(&pool).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("Failed to connect realtime listener: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        if let Err(e) = listener
            .listen_all([CHANNEL_STOP_WAITING, CHANNEL_STOP_POSTS])
            .await
        {
            tracing::error!("Failed to listen on change channels: {}", e);
            tokio::time::sleep(Duration::from_secs(5)).await;
            continue;
        }

        tracing::info!("Realtime listener connected");

        loop {
            match listener.recv().await {
                Ok(notification) => {
                    if let Some(event) =
                        event_from_notification(notification.channel(), notification.payload())
                    {
                        // 没有订阅者时发送会失败，属于正常情况
                        let _ = tx.send(event);
                    }
                }
                Err(e) => {
                    tracing::error!("Realtime listener lost connection: {}", e);
                    break;
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_channels_to_events() {
        let event = event_from_notification(CHANNEL_STOP_WAITING, "stop-1").unwrap();
        assert_eq!(
            event,
            ChangeEvent {
                table: ChangeTable::StopWaiting,
                stop_id: Some("stop-1".to_string()),
            }
        );

        let event = event_from_notification(CHANNEL_STOP_POSTS, "").unwrap();
        assert_eq!(event.table, ChangeTable::StopPosts);
        assert_eq!(event.stop_id, None);
    }

    #[test]
    fn ignores_unknown_channels() {
        assert!(event_from_notification("something_else", "stop-1").is_none());
    }

    #[test]
    fn event_serializes_with_table_names() {
        let event = ChangeEvent {
            table: ChangeTable::StopWaiting,
            stop_id: Some("stop-1".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["table"], "stop_waiting");
        assert_eq!(json["stop_id"], "stop-1");
    }
}
