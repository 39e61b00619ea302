//! 桥接调度模块
//!
//! 把操作名路由到 API 代发或数据库会话，并保证每个请求恰好产生一个回复。
//! 数据库错误在这里折叠成 `BridgeReply::Failure`，不会越过进程边界。

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::Validate;

use common::errors::{AppError, AppResult};
use common::models::api_request::{OutboundRequestSpec, ResponseEnvelope};
use common::models::bridge::{BridgeOperation, BridgeReply};
use common::models::query::{DbQueryRequest, QueryResult};
use common::models::session::{ConnectRequest, SessionScope, SessionStatus};

use crate::http_client::EnvelopeClient;
use crate::session::{DatabaseDriver, SessionManager};

/// Bridge dispatcher. Owns the HTTP client and the database session.
pub struct Dispatcher<D: DatabaseDriver> {
    http: EnvelopeClient,
    sessions: Arc<SessionManager<D>>,
}

impl<D: DatabaseDriver> Clone for Dispatcher<D> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

impl<D: DatabaseDriver> Dispatcher<D> {
    pub fn new(http: EnvelopeClient, driver: D) -> Self {
        Self {
            http,
            sessions: Arc::new(SessionManager::new(driver)),
        }
    }

    /// Decodes `payload` for `operation` and runs it.
    ///
    /// A payload that does not match the operation is an `Err`; every other
    /// outcome, failures included, is the single `BridgeReply`.
    pub async fn dispatch(&self, operation: BridgeOperation, payload: Value) -> AppResult<BridgeReply> {
        tracing::info!(operation = %operation, "分发桥接请求");
        let reply: BridgeReply = match operation {
            BridgeOperation::SendApiRequest => {
                let spec: OutboundRequestSpec = decode(operation, payload)?;
                self.send_api_request(&spec).await.into()
            }
            BridgeOperation::ConnectToDb => {
                let request: ConnectRequest = decode(operation, payload)?;
                request.validate()?;
                self.connect(&request).await
            }
            BridgeOperation::DisconnectFromDb => {
                let scope: SessionScope = decode(operation, payload)?;
                self.disconnect(&scope).await
            }
            BridgeOperation::SendDbQuery => {
                let request: DbQueryRequest = decode(operation, payload)?;
                self.query(&request).await
            }
            BridgeOperation::GetDbTables => {
                let scope: SessionScope = decode(operation, payload)?;
                self.list_tables(&scope).await
            }
        };

        if let BridgeReply::Failure(failure) = &reply {
            tracing::warn!(operation = %operation, code = %failure.code, error = %failure.message, "桥接请求失败");
        }
        Ok(reply)
    }

    /// `send-api-request`. Never fails; see [`EnvelopeClient::execute`].
    pub async fn send_api_request(&self, spec: &OutboundRequestSpec) -> ResponseEnvelope {
        self.http.execute(spec).await
    }

    /// `connect-to-db`. Runs to completion even if the caller goes away.
    pub async fn connect(&self, request: &ConnectRequest) -> BridgeReply {
        let sessions = self.sessions.clone();
        let request = request.clone();
        let outcome = run_detached(async move { sessions.connect(&request).await }).await;
        match outcome {
            Ok(token) => BridgeReply::ack().for_session(token),
            Err(e) => e.into(),
        }
    }

    /// `disconnect-from-db`. Runs to completion even if the caller goes away.
    pub async fn disconnect(&self, scope: &SessionScope) -> BridgeReply {
        let sessions = self.sessions.clone();
        let expected = scope.session_token;
        let outcome = run_detached(async move { sessions.disconnect(expected).await }).await;
        match outcome {
            Ok(()) => BridgeReply::ack(),
            Err(e) => e.into(),
        }
    }

    /// `send-db-query`.
    pub async fn query(&self, request: &DbQueryRequest) -> BridgeReply {
        rows_reply(self.sessions.query(&request.query, request.session_token).await)
    }

    /// `get-db-tables`.
    pub async fn list_tables(&self, scope: &SessionScope) -> BridgeReply {
        rows_reply(self.sessions.list_tables(scope.session_token).await)
    }

    /// Current session snapshot.
    pub async fn session_status(&self) -> SessionStatus {
        self.sessions.status().await
    }
}

/// Session transitions hold the slot across awaits; dropping them halfway
/// would strand it in `connecting`.
async fn run_detached<T, F>(work: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work)
        .await
        .unwrap_or_else(|e| Err(AppError::Internal(format!("session task failed: {}", e))))
}

fn rows_reply(outcome: AppResult<(u64, QueryResult)>) -> BridgeReply {
    let serialized = outcome.and_then(|(token, result)| Ok((token, result.to_blob()?)));
    match serialized {
        Ok((token, blob)) => BridgeReply::with_response(blob).for_session(token),
        Err(e) => e.into(),
    }
}

/// Operations without fields accept an empty body.
fn decode<T: DeserializeOwned>(operation: BridgeOperation, payload: Value) -> AppResult<T> {
    let payload = match payload {
        Value::Null if operation.payload_optional() => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(payload)
        .map_err(|e| AppError::BadRequest(format!("invalid payload for {}: {}", operation, e)))
}
