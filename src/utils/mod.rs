use axum::Json;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_data: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // 用户ID
    pub exp: i64,      // 过期时间
    pub iat: i64,      // 签发时间
    pub is_temp: bool, // 临时标识
}

// 身份由外部认证服务签发，这里只做校验
pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const AUTH_FAILED: i32 = 1002;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    // 候车相关错误码
    pub const OUTSIDE_GEOFENCE: i32 = 2001;
    pub const ALREADY_WAITING: i32 = 2002;
    pub const ROUTE_NOT_SELECTED: i32 = 2003;
    pub const STORE_UNAVAILABLE: i32 = 2004;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://localhost".into(),
            jwt_secret: "test-secret".into(),
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            geofence_radius_km: 0.5,
            presence_lifetime_secs: 600,
            revalidate_interval_secs: 30,
            sweep_interval_secs: 300,
            default_search_radius_m: 5000.0,
        }
    }

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn verify_token_accepts_valid_token() {
        let config = test_config();
        let now = Utc::now();
        let claims = Claims {
            sub: "user-1".into(),
            exp: now.timestamp() + 3600,
            iat: now.timestamp(),
            is_temp: false,
        };

        let token = sign(&claims, &config.jwt_secret);
        let verified = verify_token(&token, &config).unwrap();
        assert_eq!(verified.sub, "user-1");
    }

    #[test]
    fn verify_token_rejects_expired_and_foreign_tokens() {
        let config = test_config();
        let now = Utc::now();
        let expired = Claims {
            sub: "user-1".into(),
            exp: now.timestamp() - 3600,
            iat: now.timestamp() - 7200,
            is_temp: false,
        };
        assert!(verify_token(&sign(&expired, &config.jwt_secret), &config).is_err());

        let valid = Claims {
            sub: "user-1".into(),
            exp: now.timestamp() + 3600,
            iat: now.timestamp(),
            is_temp: false,
        };
        assert!(verify_token(&sign(&valid, "other-secret"), &config).is_err());
    }
}
