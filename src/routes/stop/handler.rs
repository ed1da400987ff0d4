use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::model::Stop;
use crate::{
    AppState,
    utils::{error_codes, error_to_api_response, success_to_api_response},
};

#[derive(Debug, Deserialize)]
pub struct ListStopsQuery {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StopByIdQuery {
    stop_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    latitude: Option<f64>,
    longitude: Option<f64>,
    radius: Option<f64>,
}

#[axum::debug_handler]
pub async fn list_stops(
    State(state): State<AppState>,
    Query(query): Query<ListStopsQuery>,
) -> impl IntoResponse {
    match Stop::list(&state.pool, &state.redis, query.name.as_deref()).await {
        Ok(stops) => (StatusCode::OK, success_to_api_response(stops)),
        Err(e) => {
            tracing::error!("Failed to list stops: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::STORE_UNAVAILABLE, "获取站点列表失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn find_stop_by_id(
    State(state): State<AppState>,
    Query(query): Query<StopByIdQuery>,
) -> impl IntoResponse {
    match Stop::find_by_id(&state.pool, &state.redis, &query.stop_id).await {
        Ok(Some(stop)) => (StatusCode::OK, success_to_api_response(stop)),
        Ok(None) => (
            StatusCode::OK,
            error_to_api_response(error_codes::NOT_FOUND, "站点不存在".to_string()),
        ),
        Err(e) => {
            tracing::error!("Failed to find stop {}: {}", query.stop_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::STORE_UNAVAILABLE, "获取站点失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn find_stops_by_location(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> impl IntoResponse {
    // 检查必需的位置参数
    let latitude = match query.latitude {
        Some(lat) => lat,
        None => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::VALIDATION_ERROR, "缺少latitude参数".to_string()),
            );
        }
    };

    let longitude = match query.longitude {
        Some(lng) => lng,
        None => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::VALIDATION_ERROR, "缺少longitude参数".to_string()),
            );
        }
    };

    // 半径上限50公里，防止全表扫描式查询
    let radius_m = query
        .radius
        .unwrap_or(state.config.default_search_radius_m)
        .min(50_000.0);

    match Stop::find_by_location(&state.pool, &state.redis, latitude, longitude, radius_m).await {
        Ok(stops) => (StatusCode::OK, success_to_api_response(stops)),
        Err(e) => {
            tracing::error!("Failed to find stops by location: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::STORE_UNAVAILABLE, "获取附近站点失败".to_string()),
            )
        }
    }
}
