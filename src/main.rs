use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use stopwait::{
    AppState,
    config::Config,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    realtime, routes, sweeper,
};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'stopwait_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis_arc = Arc::new(redis_client.clone());

    // 变更事件扇出通道
    let (events_tx, _) = broadcast::channel(256);

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        redis: redis_arc,
        events: events_tx.clone(),
    };

    // 后台任务：监听存储层变更通知、周期清扫过期候车记录
    tokio::spawn(realtime::run_listener(state.pool.clone(), events_tx));
    tokio::spawn(sweeper::run(state.clone()));

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new().route("/ping", get(routes::ping));

    let protected_routes = Router::new()
        // 候车在场路由
        .route("/presence/create", post(routes::presence::create_presence))
        .route("/presence/remove", post(routes::presence::remove_presence))
        .route(
            "/presence/revalidate",
            post(routes::presence::revalidate_presence),
        )
        .route("/presence/summary", get(routes::presence::waiting_summary))
        // 站点目录路由
        .route("/stops/list", get(routes::stop::list_stops))
        .route("/stops/by-id", get(routes::stop::find_stop_by_id))
        .route(
            "/stops/by-location",
            get(routes::stop::find_stops_by_location),
        )
        // 变更事件订阅
        .route("/stops/events", get(routes::events::subscribe_events))
        // 站点留言路由
        .route("/posts/create", post(routes::post::create_post))
        .route("/posts/by-stop", get(routes::post::find_posts_by_stop))
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 创建基础路由
    let router = Router::new().nest(
        &config.api_base_uri.clone(),
        Router::new().merge(public_routes).merge(protected_routes),
    );

    // 添加日志中间件和限流中间件
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        let cors = tower_http::cors::CorsLayer::permissive();
        router.layer(cors)
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
