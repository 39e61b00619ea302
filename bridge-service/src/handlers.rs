//! Handler模块

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use common::errors::AppError;
use common::middleware::RequestId;
use common::models::bridge::{BridgeOperation, ChannelReply};
use common::models::session::{SessionState, SessionStatus};
use common::response::ApiResponse;
use crate::state::AppState;

/// 调用一个桥接操作，回复在与操作同名的通道上返回
#[utoipa::path(
    post,
    path = "/api/bridge/{operation}",
    tag = "bridge",
    params(
        ("operation" = String, Path, description = "操作名：send-api-request / connect-to-db / disconnect-from-db / send-db-query / get-db-tables")
    ),
    request_body(
        content = Object,
        description = "操作参数，字段随操作而定；无参数的操作可以为空",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "操作回复（数据库失败同样在此返回）", body = ApiResponse<ChannelReply>),
        (status = 400, description = "请求体无法解析或校验失败"),
        (status = 404, description = "未知操作")
    )
)]
pub async fn invoke_operation(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<ApiResponse<ChannelReply>>, AppError> {
    let operation: BridgeOperation = operation.parse()?;
    let payload = parse_payload(&body)?;

    let started = Instant::now();
    let reply = state.dispatcher.dispatch(operation, payload).await?;
    let duration_ms = started.elapsed().as_millis() as u64;

    Ok(Json(
        ApiResponse::ok_with_service(
            ChannelReply {
                channel: operation,
                reply,
            },
            state.config.service_name.clone(),
        )
        .with_request_id(request_id.as_str())
        .with_duration(duration_ms),
    ))
}

/// 当前数据库会话状态
#[utoipa::path(
    get,
    path = "/api/session",
    tag = "bridge",
    responses(
        (status = 200, description = "会话快照", body = ApiResponse<SessionStatus>)
    )
)]
pub async fn session_status(
    State(state): State<AppState>,
) -> Json<ApiResponse<SessionStatus>> {
    let status = state.dispatcher.session_status().await;
    Json(ApiResponse::ok_with_service(status, state.config.service_name.clone()))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        session: state.dispatcher.session_status().await.state,
    })
}

/// 空请求体视为无参数
fn parse_payload(body: &[u8]) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("请求体不是合法 JSON: {}", e)))
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 数据库会话状态
    pub session: SessionState,
}
