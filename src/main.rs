use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use backend::{
    AppState,
    ai::AiClient,
    config::Config,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit, require_admin},
    routes,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
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
                conn.execute("SET application_name = 'onboarding_backend';")
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

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        redis: redis_arc,
        ai: AiClient::new(config.ai_service_url.clone(), config.ai_api_key.clone()),
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        // 用户公开路由
        .route("/users/register", post(routes::user::register))
        .route("/users/login", post(routes::user::login));

    // 登录即可访问的员工端路由
    let protected_routes = Router::new()
        .route("/users/me", get(routes::user::me))
        .route("/users/update-profile", put(routes::user::update_profile))
        .route("/documents/download", get(routes::document::download))
        .route("/quizzes/assigned", get(routes::quiz::assigned_quizzes))
        .route("/quizzes/{id}", get(routes::quiz::quiz_detail))
        .route("/attempts/start", post(routes::attempt::start_attempt))
        .route("/attempts/submit", post(routes::attempt::submit_attempt))
        .route("/attempts/mine", get(routes::attempt::my_attempts));

    // 管理端路由，角色守卫在认证之后执行
    let admin_routes = Router::new()
        // 成员管理
        .route("/users/members", get(routes::user::list_members))
        .route("/users/update-role", put(routes::user::update_role))
        // 文档管理
        .route("/documents/upload", post(routes::document::upload))
        .route("/documents", get(routes::document::list_documents))
        .route("/documents/delete", post(routes::document::delete_document))
        .route(
            "/documents/generate-quiz",
            post(routes::document::generate_quiz),
        )
        // 分类
        .route("/categories", get(routes::category::list_categories))
        .route("/categories/create", post(routes::category::create_category))
        // 测验管理与分配
        .route("/quizzes", get(routes::quiz::list_quizzes))
        .route("/quizzes/assignable-members", get(routes::quiz::assignable_members))
        .route("/quizzes/assign", post(routes::quiz::assign_quiz))
        // 出题向导
        .route("/quizzes/wizard/start", post(routes::quiz::start_wizard))
        .route("/quizzes/wizard/state", get(routes::quiz::wizard_state))
        .route("/quizzes/wizard/text", put(routes::quiz::update_text))
        .route("/quizzes/wizard/generate", post(routes::quiz::generate_questions))
        .route("/quizzes/wizard/question", put(routes::quiz::update_question))
        .route("/quizzes/wizard/mark-correct", put(routes::quiz::mark_correct))
        .route(
            "/quizzes/wizard/question/delete",
            post(routes::quiz::delete_question),
        )
        .route(
            "/quizzes/wizard/confirm-questions",
            post(routes::quiz::confirm_questions),
        )
        .route(
            "/quizzes/wizard/suggest-categories",
            post(routes::quiz::suggest_categories),
        )
        .route("/quizzes/wizard/save", post(routes::quiz::save_wizard))
        .route("/quizzes/wizard/cancel", post(routes::quiz::cancel_wizard))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    let authenticated = Router::new()
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 创建基础路由
    let router = Router::new().nest(
        "/api",
        Router::new().merge(public_routes).merge(authenticated),
    );

    // 添加日志中间件和限流中间件
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        // 设置开发环境的CORS，允许所有来源
        let cors = CorsLayer::permissive();
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
