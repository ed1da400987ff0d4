use sqlx::PgPool;
use tokio::time::MissedTickBehavior;

use crate::AppState;

/// 后台清扫：周期性删除已到期的候车记录，只负责回收存储。
/// 活跃集合的查询一律自行按 expires_at 过滤，正确性不依赖这里的调度
pub async fn run(state: AppState) {
    let mut ticker = tokio::time::interval(state.config.sweep_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        "Eviction sweeper started, interval {}s",
        state.config.sweep_interval_secs
    );

    loop {
        ticker.tick().await;

        match sweep_expired(&state.pool).await {
            Ok(0) => {}
            Ok(swept) => tracing::info!("Swept {} expired waiting records", swept),
            Err(e) => tracing::error!("Failed to sweep expired waiting records: {}", e),
        }
    }
}

// 删除已删除的行是空操作，多实例并发执行安全
pub async fn sweep_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM stop_waiting WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
