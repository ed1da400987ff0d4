use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    /// 候车打卡的地理围栏半径，单位公里
    pub geofence_radius_km: f64,
    /// 候车记录的固定生存时长，到期后不可续期
    pub presence_lifetime_secs: u64,
    /// 客户端围栏复检的建议间隔
    pub revalidate_interval_secs: u64,
    /// 后台清扫过期记录的周期
    pub sweep_interval_secs: u64,
    /// 附近站点查询的默认半径，单位米
    pub default_search_radius_m: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".to_string()),
            rate_limit_window_secs: read_or("RATE_LIMIT_WINDOW", 60),
            rate_limit_requests: read_or("RATE_LIMIT_REQUESTS", 100),
            geofence_radius_km: read_or("GEOFENCE_RADIUS_KM", 0.5),
            presence_lifetime_secs: read_or("PRESENCE_LIFETIME_SECS", 600),
            revalidate_interval_secs: read_or("REVALIDATE_INTERVAL_SECS", 30),
            sweep_interval_secs: read_or("SWEEP_INTERVAL_SECS", 300),
            default_search_radius_m: read_or("DEFAULT_SEARCH_RADIUS_M", 5000.0),
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn presence_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.presence_lifetime_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// 可选配置项：缺失或解析失败时回退到默认值
fn read_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
