//! 桌面客户端后端桥接服务
//!
//! 界面进程通过本机回环地址调用以下操作：
//! - 代发任意 HTTP 请求并规整响应（send-api-request）
//! - 维护唯一的 Postgres 会话（connect / disconnect / query / tables）
//!
//! 每个请求恰好产生一个回复，回复在与操作同名的通道上返回。

mod dispatcher;
mod handlers;
mod http_client;
mod pg_driver;
mod routes;
mod session;
mod state;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::{AppConfig, LogFormat};
use common::middleware::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "bridge-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "桥接服务 API",
        version = "0.1.0",
        description = "桌面 API/SQL 客户端的后端桥接：HTTP 代发与 Postgres 会话"
    ),
    paths(
        handlers::invoke_operation,
        handlers::session_status,
        handlers::health_check,
    ),
    components(schemas(
        common::models::api_request::KeyValue,
        common::models::api_request::OutboundRequestSpec,
        common::models::api_request::ResponseEnvelope,
        common::models::session::ConnectRequest,
        common::models::session::SessionScope,
        common::models::session::SessionStatus,
        common::models::query::DbQueryRequest,
        common::models::query::QueryResult,
        common::models::query::FieldInfo,
        common::models::bridge::BridgeOperation,
        common::models::bridge::BridgeReply,
        common::models::bridge::ChannelReply,
        handlers::HealthResponse,
    )),
    tags(
        (name = "bridge", description = "桥接操作端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (if present) before anything else
    load_dotenv();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME);

    // 初始化日志追踪
    init_tracing(config.log_format);

    // 创建应用状态（此时没有数据库会话）
    let state = AppState::new(config.clone()).context("初始化 HTTP 客户端失败")?;

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = config.bind_addr();
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;
    axum::serve(listener, app).await.context("服务启动失败")?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let (text, json) = match format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(text)
        .with(json)
        .with(filter)
        .init();
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Load .env file from the working directory (best-effort, no error if missing).
fn load_dotenv() {
    let Ok(content) = std::fs::read_to_string(".env") else {
        return;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            // Only set if not already set by the environment
            if std::env::var_os(key).is_none() {
                std::env::set_var(key, value.trim().trim_matches('"'));
            }
        }
    }
}
