use std::sync::Arc;

use config::Config;
use realtime::ChangeEvent;
use redis::Client as RedisClient;
use sqlx::PgPool;
use tokio::sync::broadcast;

pub mod config;
pub mod geo;
pub mod middleware;
pub mod realtime;
pub mod routes;
pub mod sweeper;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    /// 变更事件扇出通道，所有订阅者共用同一个发送端
    pub events: broadcast::Sender<ChangeEvent>,
}
