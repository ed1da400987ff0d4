use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum::Json;
use serde::Deserialize;

use super::model::{CreatePostRequest, StopPost};
use crate::{
    AppState,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

#[derive(Debug, Deserialize)]
pub struct PostsByStopQuery {
    stop_id: String,
    limit: Option<i64>,
}

#[axum::debug_handler]
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> impl IntoResponse {
    if req.content.trim().is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "留言内容不能为空".to_string()),
        );
    }

    match StopPost::create(&state.pool, req, claims.sub).await {
        Ok(post) => (StatusCode::CREATED, success_to_api_response(post)),
        Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => (
            StatusCode::OK,
            error_to_api_response(error_codes::NOT_FOUND, "站点不存在".to_string()),
        ),
        Err(e) => {
            tracing::error!("Failed to create stop post: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::STORE_UNAVAILABLE, "发布留言失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn find_posts_by_stop(
    State(state): State<AppState>,
    Query(query): Query<PostsByStopQuery>,
) -> impl IntoResponse {
    match StopPost::find_by_stop(&state.pool, &query.stop_id, query.limit).await {
        Ok(posts) => (StatusCode::OK, success_to_api_response(posts)),
        Err(e) => {
            tracing::error!("Failed to get posts for stop {}: {}", query.stop_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::STORE_UNAVAILABLE, "获取留言失败".to_string()),
            )
        }
    }
}
