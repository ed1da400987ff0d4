use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::routes::presence::model::TransportType;

/// 站点留言。没有生存时长和围栏语义，
/// 只是与候车记录共用同一条变更通知通道
#[derive(Debug, Serialize)]
pub struct StopPost {
    pub post_id: String,
    pub stop_id: String,
    pub user_id: String,
    pub content: String,
    pub transport_waiting_for: Option<TransportType>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RawStopPost {
    post_id: String,
    stop_id: String,
    user_id: String,
    content: String,
    transport_waiting_for: Option<String>,
    created_at: DateTime<Utc>,
}

impl RawStopPost {
    fn into_post(self) -> StopPost {
        StopPost {
            post_id: self.post_id,
            stop_id: self.stop_id,
            user_id: self.user_id,
            content: self.content,
            transport_waiting_for: self
                .transport_waiting_for
                .as_deref()
                .and_then(TransportType::parse),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub stop_id: String,
    pub content: String,
    pub transport_waiting_for: Option<TransportType>,
}

impl StopPost {
    pub async fn create(
        pool: &PgPool,
        req: CreatePostRequest,
        user_id: String,
    ) -> Result<Self, sqlx::Error> {
        let post_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO stop_posts
                (post_id, stop_id, user_id, content, transport_waiting_for, created_at)
            VALUES
                ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&post_id)
        .bind(&req.stop_id)
        .bind(&user_id)
        .bind(&req.content)
        .bind(req.transport_waiting_for.map(|t| t.as_str()))
        .bind(now)
        .execute(pool)
        .await?;

        Ok(StopPost {
            post_id,
            stop_id: req.stop_id,
            user_id,
            content: req.content,
            transport_waiting_for: req.transport_waiting_for,
            created_at: now,
        })
    }

    pub async fn find_by_stop(
        pool: &PgPool,
        stop_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let limit = limit.unwrap_or(20).min(50); // 最多返回50条记录

        let posts = sqlx::query_as::<_, RawStopPost>(
            r#"
            SELECT post_id, stop_id, user_id, content, transport_waiting_for, created_at
            FROM stop_posts
            WHERE stop_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(stop_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(posts.into_iter().map(RawStopPost::into_post).collect())
    }
}
