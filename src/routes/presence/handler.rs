use axum::{
    Json,
    extract::{Extension, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::model::{
    CreatePresenceRequest, PresenceError, PresenceRecord, RevalidateOutcome, WaitingSummary,
};
use crate::{
    AppState,
    utils::{ApiResponse, Claims, error_to_api_response, success_to_api_response},
};

#[derive(Debug, Serialize)]
pub struct CreatePresenceResponse {
    pub record: PresenceRecord,
    /// 派生的倒计时秒数，仅用于展示
    pub expires_in_secs: i64,
    /// 客户端围栏复检的建议间隔
    pub revalidate_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct RemovePresenceRequest {
    pub stop_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RevalidateRequest {
    pub stop_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub stop_id: String,
}

// 统一把领域错误翻译成响应信封；存储类错误记日志并返回5xx
fn presence_error_response<T>(e: PresenceError) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = match &e {
        PresenceError::StoreUnavailable(detail) => {
            tracing::error!("Presence store error: {}", detail);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::OK,
    };

    (status, error_to_api_response(e.code(), e.message()))
}

#[axum::debug_handler]
pub async fn create_presence(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePresenceRequest>,
) -> (StatusCode, Json<ApiResponse<CreatePresenceResponse>>) {
    match PresenceRecord::create(&state.pool, &state.redis, &state.config, req, claims.sub).await {
        Ok(record) => {
            let expires_in_secs = record.remaining_secs(Utc::now());
            (
                StatusCode::CREATED,
                success_to_api_response(CreatePresenceResponse {
                    record,
                    expires_in_secs,
                    revalidate_interval_secs: state.config.revalidate_interval_secs,
                }),
            )
        }
        Err(e) => presence_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn remove_presence(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RemovePresenceRequest>,
) -> (StatusCode, Json<ApiResponse<()>>) {
    match PresenceRecord::remove(&state.pool, &req.stop_id, &claims.sub).await {
        Ok(()) => (StatusCode::OK, success_to_api_response(())),
        Err(e) => presence_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn revalidate_presence(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RevalidateRequest>,
) -> (StatusCode, Json<ApiResponse<RevalidateOutcome>>) {
    match PresenceRecord::revalidate(
        &state.pool,
        &state.redis,
        &state.config,
        &req.stop_id,
        &claims.sub,
        req.latitude,
        req.longitude,
    )
    .await
    {
        Ok(outcome) => (StatusCode::OK, success_to_api_response(outcome)),
        Err(e) => presence_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn waiting_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> (StatusCode, Json<ApiResponse<WaitingSummary>>) {
    match WaitingSummary::for_stop(&state.pool, &query.stop_id).await {
        Ok(summary) => (StatusCode::OK, success_to_api_response(summary)),
        Err(e) => presence_error_response(e),
    }
}
