use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{
    AppState,
    utils::{error_codes, error_to_api_response, verify_token},
};

// 校验 Bearer 令牌并把 Claims 注入请求扩展，后续 handler 通过 Extension 取用户身份
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let claims =
        bearer.and_then(|TypedHeader(auth)| verify_token(auth.token(), &state.config).ok());

    match claims {
        Some(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            error_to_api_response::<()>(error_codes::AUTH_FAILED, "未授权访问".to_string()),
        )
            .into_response(),
    }
}
