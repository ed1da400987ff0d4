use chrono::{DateTime, Utc};
use redis::Client as RedisClient;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::geo;
use crate::routes::stop::model::Stop;
use crate::utils::error_codes;

// 候车人数分级阈值，固定常量，不随站点配置
const LEVEL_LOW_MAX: i64 = 3;
const LEVEL_MODERATE_MAX: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Bus,
    Train,
    Taxi,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Bus => "bus",
            TransportType::Train => "train",
            TransportType::Taxi => "taxi",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bus" => Some(TransportType::Bus),
            "train" => Some(TransportType::Train),
            "taxi" => Some(TransportType::Taxi),
            _ => None,
        }
    }
}

/// 候车记录。expires_at 在创建时一次性确定，不支持续期；
/// 想继续等车的用户需要删除后重新创建
#[derive(Debug, Clone, Serialize)]
pub struct PresenceRecord {
    pub id: String,
    pub stop_id: String,
    pub user_id: String,
    pub route_id: String,
    pub transport_type: TransportType,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// 倒计时是派生值，客户端只用于展示，不作为记录是否存活的依据
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

// 从数据库读出的原始行，transport_type 还是文本
#[derive(sqlx::FromRow)]
struct RawPresence {
    id: String,
    stop_id: String,
    user_id: String,
    route_id: String,
    transport_type: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl RawPresence {
    fn into_record(self) -> Result<PresenceRecord, PresenceError> {
        let transport_type = TransportType::parse(&self.transport_type).ok_or_else(|| {
            tracing::error!(
                "Unknown transport type '{}' on record {}",
                self.transport_type,
                self.id
            );
            PresenceError::StoreUnavailable(format!("未知的交通类型: {}", self.transport_type))
        })?;

        Ok(PresenceRecord {
            id: self.id,
            stop_id: self.stop_id,
            user_id: self.user_id,
            route_id: self.route_id,
            transport_type,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

#[derive(Debug, PartialEq)]
pub enum PresenceError {
    /// 设备位置在站点围栏之外
    OutsideGeofence { distance_km: f64 },
    /// 该用户已在别处持有存活的候车记录
    AlreadyWaitingElsewhere,
    /// 未选择线路，入库前即拒绝
    RouteNotSelected,
    StopNotFound,
    Validation(String),
    StoreUnavailable(String),
}

impl From<sqlx::Error> for PresenceError {
    fn from(e: sqlx::Error) -> Self {
        PresenceError::StoreUnavailable(e.to_string())
    }
}

impl PresenceError {
    pub fn code(&self) -> i32 {
        match self {
            PresenceError::OutsideGeofence { .. } => error_codes::OUTSIDE_GEOFENCE,
            PresenceError::AlreadyWaitingElsewhere => error_codes::ALREADY_WAITING,
            PresenceError::RouteNotSelected => error_codes::ROUTE_NOT_SELECTED,
            PresenceError::StopNotFound => error_codes::NOT_FOUND,
            PresenceError::Validation(_) => error_codes::VALIDATION_ERROR,
            PresenceError::StoreUnavailable(_) => error_codes::STORE_UNAVAILABLE,
        }
    }

    pub fn message(&self) -> String {
        match self {
            PresenceError::OutsideGeofence { distance_km } => {
                format!("距离站点{:.0}米，超出打卡范围", distance_km * 1000.0)
            }
            PresenceError::AlreadyWaitingElsewhere => {
                "已在其他站点候车，请先结束当前候车".to_string()
            }
            PresenceError::RouteNotSelected => "请先选择候车线路".to_string(),
            PresenceError::StopNotFound => "站点不存在".to_string(),
            PresenceError::Validation(msg) => msg.clone(),
            PresenceError::StoreUnavailable(_) => "服务暂时不可用，请稍后重试".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePresenceRequest {
    pub stop_id: String,
    pub route_id: String,
    pub transport_type: TransportType,
    pub latitude: f64,
    pub longitude: f64,
}

impl CreatePresenceRequest {
    // 纯输入校验，不触达存储
    pub fn validate(&self) -> Result<(), PresenceError> {
        if self.stop_id.trim().is_empty() {
            return Err(PresenceError::Validation("站点ID不能为空".to_string()));
        }
        if self.route_id.trim().is_empty() {
            return Err(PresenceError::RouteNotSelected);
        }
        validate_coordinates(self.latitude, self.longitude)
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), PresenceError> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(PresenceError::Validation("经纬度超出有效范围".to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevalidateStatus {
    /// 仍在围栏内，继续候车
    Waiting,
    /// 已离开围栏，记录被删除
    LeftArea,
    /// 没有存活记录（已过期或已被并发删除）
    Idle,
}

#[derive(Debug, Serialize)]
pub struct RevalidateOutcome {
    pub status: RevalidateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,
}

impl PresenceRecord {
    /// 创建候车记录。围栏校验用设备当前位置对比站点固定坐标；
    /// 全局唯一性由存储层的唯一约束兜底，而不是这里的先查后写
    pub async fn create(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        config: &Config,
        req: CreatePresenceRequest,
        user_id: String,
    ) -> Result<Self, PresenceError> {
        req.validate()?;

        let stop = Stop::find_by_id(pool, redis, &req.stop_id)
            .await?
            .ok_or(PresenceError::StopNotFound)?;

        let distance_km =
            geo::calculate_distance(req.latitude, req.longitude, stop.latitude, stop.longitude);
        if distance_km > config.geofence_radius_km {
            return Err(PresenceError::OutsideGeofence { distance_km });
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + config.presence_lifetime();

        // 同一事务内先清掉本人已到期但未被清扫的行，再插入；
        // 并发的第二次创建会撞上 user_id 唯一约束
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM stop_waiting WHERE user_id = $1 AND expires_at <= NOW()")
            .bind(&user_id)
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO stop_waiting
                (id, stop_id, user_id, route_id, transport_type, created_at, expires_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&id)
        .bind(&req.stop_id)
        .bind(&user_id)
        .bind(&req.route_id)
        .bind(req.transport_type.as_str())
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(PresenceError::AlreadyWaitingElsewhere);
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;

        Ok(PresenceRecord {
            id,
            stop_id: req.stop_id,
            user_id,
            route_id: req.route_id,
            transport_type: req.transport_type,
            created_at: now,
            expires_at,
        })
    }

    /// 结束候车（上车）。幂等删除：记录已过期、已被清扫
    /// 或已被并发删除时同样视为成功
    pub async fn remove(pool: &PgPool, stop_id: &str, user_id: &str) -> Result<(), PresenceError> {
        sqlx::query("DELETE FROM stop_waiting WHERE stop_id = $1 AND user_id = $2")
            .bind(stop_id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// 围栏复检。客户端按固定间隔带着最新设备位置调用；
    /// 复检永远用当前位置对比站点固定坐标，与创建时的位置无关
    pub async fn revalidate(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        config: &Config,
        stop_id: &str,
        user_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<RevalidateOutcome, PresenceError> {
        validate_coordinates(latitude, longitude)?;

        let raw = sqlx::query_as::<_, RawPresence>(
            r#"
            SELECT id, stop_id, user_id, route_id, transport_type, created_at, expires_at
            FROM stop_waiting
            WHERE stop_id = $1 AND user_id = $2 AND expires_at > NOW()
            "#,
        )
        .bind(stop_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        let Some(raw) = raw else {
            return Ok(RevalidateOutcome {
                status: RevalidateStatus::Idle,
                expires_in_secs: None,
            });
        };
        let record = raw.into_record()?;

        let stop = Stop::find_by_id(pool, redis, stop_id)
            .await?
            .ok_or(PresenceError::StopNotFound)?;

        if geo::is_within_radius(
            latitude,
            longitude,
            stop.latitude,
            stop.longitude,
            config.geofence_radius_km,
        ) {
            Ok(RevalidateOutcome {
                status: RevalidateStatus::Waiting,
                expires_in_secs: Some(record.remaining_secs(Utc::now())),
            })
        } else {
            // 出围栏后与主动上车走同一条删除路径
            Self::remove(pool, stop_id, user_id).await?;
            tracing::info!("User {} left the geofenced area of stop {}", user_id, stop_id);
            Ok(RevalidateOutcome {
                status: RevalidateStatus::LeftArea,
                expires_in_secs: None,
            })
        }
    }
}

/// 分交通类型的候车人数
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub bus: i64,
    pub train: i64,
    pub taxi: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitingLevel {
    Low,
    Moderate,
    High,
}

impl WaitingLevel {
    pub fn from_count(count: i64) -> Self {
        if count <= LEVEL_LOW_MAX {
            WaitingLevel::Low
        } else if count <= LEVEL_MODERATE_MAX {
            WaitingLevel::Moderate
        } else {
            WaitingLevel::High
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct WaitingSummary {
    pub total: i64,
    pub by_type: TypeCounts,
    pub level: WaitingLevel,
}

impl WaitingSummary {
    pub fn from_counts(counts: &[(TransportType, i64)]) -> Self {
        let mut by_type = TypeCounts::default();
        for (transport_type, count) in counts {
            match transport_type {
                TransportType::Bus => by_type.bus += count,
                TransportType::Train => by_type.train += count,
                TransportType::Taxi => by_type.taxi += count,
            }
        }
        let total = by_type.bus + by_type.train + by_type.taxi;

        WaitingSummary {
            total,
            by_type,
            level: WaitingLevel::from_count(total),
        }
    }

    /// 站点当前的候车统计。只统计存活行：已到期但还没被
    /// 后台清扫的行一律排除，正确性不依赖清扫任务的调度
    pub async fn for_stop(pool: &PgPool, stop_id: &str) -> Result<Self, PresenceError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT transport_type, COUNT(*)
            FROM stop_waiting
            WHERE stop_id = $1 AND expires_at > NOW()
            GROUP BY transport_type
            "#,
        )
        .bind(stop_id)
        .fetch_all(pool)
        .await?;

        let counts: Vec<(TransportType, i64)> = rows
            .iter()
            .filter_map(|(name, count)| TransportType::parse(name).map(|t| (t, *count)))
            .collect();

        Ok(WaitingSummary::from_counts(&counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_at: DateTime<Utc>) -> PresenceRecord {
        PresenceRecord {
            id: "rec-1".to_string(),
            stop_id: "stop-1".to_string(),
            user_id: "user-1".to_string(),
            route_id: "route-9".to_string(),
            transport_type: TransportType::Bus,
            created_at: expires_at - Duration::seconds(600),
            expires_at,
        }
    }

    #[test]
    fn record_is_live_strictly_before_expiry() {
        let now = Utc::now();
        let r = record(now + Duration::seconds(600));

        assert!(r.is_live(now));
        assert!(r.is_live(r.expires_at - Duration::seconds(1)));
        // 到期时刻整点即不再存活，与清扫任务是否跑过无关
        assert!(!r.is_live(r.expires_at));
        assert!(!r.is_live(r.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn remaining_secs_is_derived_and_never_negative() {
        let now = Utc::now();
        let r = record(now + Duration::seconds(600));

        assert_eq!(r.remaining_secs(now), 600);
        assert_eq!(r.remaining_secs(r.expires_at), 0);
        assert_eq!(r.remaining_secs(r.expires_at + Duration::seconds(30)), 0);
    }

    #[test]
    fn create_request_requires_route() {
        let req = CreatePresenceRequest {
            stop_id: "stop-1".to_string(),
            route_id: "  ".to_string(),
            transport_type: TransportType::Bus,
            latitude: 0.0,
            longitude: 0.0,
        };
        assert_eq!(req.validate(), Err(PresenceError::RouteNotSelected));
    }

    #[test]
    fn create_request_rejects_bad_input_before_store_access() {
        let req = CreatePresenceRequest {
            stop_id: "".to_string(),
            route_id: "route-9".to_string(),
            transport_type: TransportType::Bus,
            latitude: 0.0,
            longitude: 0.0,
        };
        assert!(matches!(req.validate(), Err(PresenceError::Validation(_))));

        let req = CreatePresenceRequest {
            stop_id: "stop-1".to_string(),
            route_id: "route-9".to_string(),
            transport_type: TransportType::Bus,
            latitude: 91.0,
            longitude: 0.0,
        };
        assert!(matches!(req.validate(), Err(PresenceError::Validation(_))));
    }

    #[test]
    fn transport_type_round_trips_through_storage_text() {
        for t in [TransportType::Bus, TransportType::Train, TransportType::Taxi] {
            assert_eq!(TransportType::parse(t.as_str()), Some(t));
        }
        assert_eq!(TransportType::parse("tram"), None);
    }

    #[test]
    fn waiting_level_thresholds() {
        assert_eq!(WaitingLevel::from_count(0), WaitingLevel::Low);
        assert_eq!(WaitingLevel::from_count(3), WaitingLevel::Low);
        assert_eq!(WaitingLevel::from_count(4), WaitingLevel::Moderate);
        assert_eq!(WaitingLevel::from_count(7), WaitingLevel::Moderate);
        assert_eq!(WaitingLevel::from_count(8), WaitingLevel::High);
    }

    #[test]
    fn summary_partitions_by_type_and_buckets_total() {
        // 一个站点8条混合类型的存活记录 → high
        let counts = [
            (TransportType::Bus, 4),
            (TransportType::Train, 3),
            (TransportType::Taxi, 1),
        ];
        let summary = WaitingSummary::from_counts(&counts);

        assert_eq!(summary.total, 8);
        assert_eq!(
            summary.by_type,
            TypeCounts {
                bus: 4,
                train: 3,
                taxi: 1
            }
        );
        assert_eq!(summary.level, WaitingLevel::High);
    }

    #[test]
    fn empty_stop_summarizes_to_low() {
        let summary = WaitingSummary::from_counts(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.level, WaitingLevel::Low);
    }

    #[test]
    fn error_codes_are_distinct_per_variant() {
        let errors = [
            PresenceError::OutsideGeofence { distance_km: 2.0 },
            PresenceError::AlreadyWaitingElsewhere,
            PresenceError::RouteNotSelected,
            PresenceError::StopNotFound,
            PresenceError::Validation("bad".to_string()),
            PresenceError::StoreUnavailable("down".to_string()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
