use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

use crate::geo::calculate_distance;

// 缓存相关常量
const STOP_CACHE_EXPIRE: u64 = 600; // 站点缓存过期时间，单位秒
const STOP_ID_CACHE_PREFIX: &str = "stop:id:"; // 站点ID缓存前缀
const STOP_NAME_CACHE_PREFIX: &str = "stop:name:"; // 站点名称缓存前缀
const STOP_LOCATION_CACHE_PREFIX: &str = "stop:loc:"; // 站点位置缓存前缀

/// 站点目录条目。目录由外部系统维护，本服务只读，
/// 站点坐标在候车围栏判定中作为圆心使用
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stop {
    pub stop_id: String,
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NearbyStop {
    pub stop_id: String,
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// 与查询位置的距离，单位米
    pub distance_m: f64,
}

impl Stop {
    pub async fn find_by_id(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        stop_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        // 尝试从缓存读取
        let cache_key = format!("{}{}", STOP_ID_CACHE_PREFIX, stop_id);

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;

            if let Ok(json_str) = cached {
                if let Ok(stop) = serde_json::from_str::<Stop>(&json_str) {
                    tracing::debug!("Get stop from cache: {}", cache_key);
                    return Ok(Some(stop));
                }
            }
        }

        // 从数据库查询
        let stop = sqlx::query_as::<_, Stop>(
            r#"
            SELECT stop_id, name, description, latitude, longitude, created_at
            FROM stops
            WHERE stop_id = $1
            "#,
        )
        .bind(stop_id)
        .fetch_optional(pool)
        .await?;

        // 站点不可变，缓存结果
        if let Some(ref s) = stop {
            if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                if let Ok(json_str) = serde_json::to_string(s) {
                    let _: Result<(), redis::RedisError> =
                        conn.set_ex(&cache_key, json_str, STOP_CACHE_EXPIRE).await;
                    tracing::debug!("Set stop to cache: {}", cache_key);
                }
            }
        }

        Ok(stop)
    }

    pub async fn list(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        name: Option<&str>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        // 对于模糊查询，只在名称足够具体（至少5个字符）时使用缓存
        let cache_key = name
            .filter(|n| n.len() >= 5)
            .map(|n| format!("{}{}", STOP_NAME_CACHE_PREFIX, n));

        if let Some(ref key) = cache_key {
            if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                let cached: redis::RedisResult<String> = conn.get(key).await;

                if let Ok(json_str) = cached {
                    if let Ok(stops) = serde_json::from_str::<Vec<Stop>>(&json_str) {
                        tracing::debug!("Get stops by name from cache: {}", key);
                        return Ok(stops);
                    }
                }
            }
        }

        let stops = match name {
            Some(name) => {
                sqlx::query_as::<_, Stop>(
                    r#"
                    SELECT stop_id, name, description, latitude, longitude, created_at
                    FROM stops
                    WHERE name ILIKE $1
                    ORDER BY name
                    "#,
                )
                .bind(format!("%{}%", name))
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Stop>(
                    r#"
                    SELECT stop_id, name, description, latitude, longitude, created_at
                    FROM stops
                    ORDER BY name
                    "#,
                )
                .fetch_all(pool)
                .await?
            }
        };

        if let Some(ref key) = cache_key {
            if stops.len() < 50 {
                if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                    if let Ok(json_str) = serde_json::to_string(&stops) {
                        let _: Result<(), redis::RedisError> =
                            conn.set_ex(key, json_str, STOP_CACHE_EXPIRE).await;
                        tracing::debug!("Set stops by name to cache: {}", key);
                    }
                }
            }
        }

        Ok(stops)
    }

    pub async fn find_by_location(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
    ) -> Result<Vec<NearbyStop>, sqlx::Error> {
        // 位置查询的缓存key：坐标精确到小数点后两位
        let lat_rounded = (latitude * 100.0).round() / 100.0;
        let lon_rounded = (longitude * 100.0).round() / 100.0;
        let cache_key = format!(
            "{}{}:{}:{}",
            STOP_LOCATION_CACHE_PREFIX, lat_rounded, lon_rounded, radius_m
        );

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;

            if let Ok(json_str) = cached {
                if let Ok(stops) = serde_json::from_str::<Vec<NearbyStop>>(&json_str) {
                    tracing::debug!("Get stops by location from cache: {}", cache_key);
                    return Ok(stops);
                }
            }
        }

        // 先用经纬度范围粗筛，再用球面距离精确过滤
        let lat_range = radius_m / 111000.0; // 1度纬度约111km
        let lon_range = radius_m / (111000.0 * latitude.to_radians().cos());

        let stops = sqlx::query_as::<_, Stop>(
            r#"
            SELECT stop_id, name, description, latitude, longitude, created_at
            FROM stops
            WHERE
                latitude BETWEEN ($1::DOUBLE PRECISION - $3::DOUBLE PRECISION)
                AND ($1::DOUBLE PRECISION + $3::DOUBLE PRECISION)
                AND longitude BETWEEN ($2::DOUBLE PRECISION - $4::DOUBLE PRECISION)
                AND ($2::DOUBLE PRECISION + $4::DOUBLE PRECISION)
            "#,
        )
        .bind(latitude)
        .bind(longitude)
        .bind(lat_range)
        .bind(lon_range)
        .fetch_all(pool)
        .await?;

        let mut nearby: Vec<NearbyStop> = stops
            .into_iter()
            .filter_map(|stop| {
                let distance_m =
                    calculate_distance(latitude, longitude, stop.latitude, stop.longitude) * 1000.0;
                (distance_m <= radius_m).then_some(NearbyStop {
                    stop_id: stop.stop_id,
                    name: stop.name,
                    description: stop.description,
                    latitude: stop.latitude,
                    longitude: stop.longitude,
                    distance_m,
                })
            })
            .collect();

        // 按距离排序
        nearby.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));

        // 缓存时间较短，位置查询的结果变化较快
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            if let Ok(json_str) = serde_json::to_string(&nearby) {
                let _: Result<(), redis::RedisError> = conn.set_ex(&cache_key, json_str, 120).await;
                tracing::debug!("Set stops by location to cache: {}", cache_key);
            }
        }

        Ok(nearby)
    }
}
