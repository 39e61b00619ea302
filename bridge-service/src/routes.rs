//! 路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// 创建桥接服务路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/bridge/{operation}", post(handlers::invoke_operation))
        .route("/api/session", get(handlers::session_status))
        .route("/api/health", get(handlers::health_check))
}
