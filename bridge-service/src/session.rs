//! 数据库会话管理
//!
//! 同一时刻最多持有一个活动会话。每次 connect / disconnect 都从单调递增的
//! 代数计数器取一个新令牌：
//! - connect 完成时若已有更新的请求发出，则丢弃自己打开的连接池；
//! - query / disconnect 可携带令牌，不匹配时拒绝执行。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use common::errors::{AppError, AppResult};
use common::models::query::QueryResult;
use common::models::session::{
    redact_connection_uri, ConnectRequest, PoolStats, SessionState, SessionStatus,
};

/// Catalog introspection: table names of the default schema.
pub const LIST_TABLES_SQL: &str =
    "SELECT table_name FROM information_schema.tables WHERE table_schema='public'";

/// Database driver seam. The production implementation wraps a Postgres
/// pool; tests plug in an in-memory double.
#[async_trait]
pub trait DatabaseDriver: Send + Sync + 'static {
    /// Live connection resource. Cloning must be cheap and share the resource.
    type Handle: Clone + Send + Sync + 'static;

    /// Opens a handle for the request's URI.
    async fn open(&self, request: &ConnectRequest) -> AppResult<Self::Handle>;

    /// Trivial round trip proving the handle is usable.
    async fn ping(&self, handle: &Self::Handle) -> AppResult<()>;

    /// Runs SQL verbatim.
    async fn execute(&self, handle: &Self::Handle, sql: &str) -> AppResult<QueryResult>;

    /// Drains and closes the handle.
    async fn close(&self, handle: Self::Handle);

    /// Pool statistics, when the driver has any.
    fn stats(&self, handle: &Self::Handle) -> Option<PoolStats>;
}

struct ActiveSession<H> {
    token: u64,
    target: String,
    connected_at: DateTime<Utc>,
    handle: H,
}

struct Slot<H> {
    /// Last token handed out.
    generation: u64,
    /// Token of the connect currently in flight, if it is still the newest request.
    connecting: Option<u64>,
    active: Option<ActiveSession<H>>,
}

/// Owns the single database session.
pub struct SessionManager<D: DatabaseDriver> {
    driver: D,
    slot: RwLock<Slot<D::Handle>>,
}

impl<D: DatabaseDriver> SessionManager<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            slot: RwLock::new(Slot {
                generation: 0,
                connecting: None,
                active: None,
            }),
        }
    }

    /// Opens a new session, replacing any existing one. Returns its token.
    ///
    /// Not cancellation safe: dropping the future before it resolves leaves
    /// the slot in `connecting`. [`Dispatcher`](crate::dispatcher::Dispatcher)
    /// runs it on a spawned task.
    pub async fn connect(&self, request: &ConnectRequest) -> AppResult<u64> {
        let token = {
            let mut slot = self.slot.write().await;
            slot.generation += 1;
            slot.connecting = Some(slot.generation);
            slot.generation
        };
        let target = redact_connection_uri(&request.connection_uri);
        tracing::info!(session_token = token, target = %target, "正在建立数据库会话");

        let opened = self.open_verified(request).await;

        let mut slot = self.slot.write().await;
        if slot.generation != token {
            drop(slot);
            return match opened {
                Ok(handle) => {
                    tracing::warn!(session_token = token, "连接已被更新的请求取代，关闭新建连接池");
                    self.driver.close(handle).await;
                    Err(AppError::SessionSuperseded)
                }
                Err(e) => Err(e),
            };
        }
        slot.connecting = None;

        match opened {
            Ok(handle) => {
                let previous = slot.active.replace(ActiveSession {
                    token,
                    target: target.clone(),
                    connected_at: Utc::now(),
                    handle,
                });
                drop(slot);
                if let Some(previous) = previous {
                    tracing::info!(session_token = previous.token, "关闭被替换的会话");
                    self.driver.close(previous.handle).await;
                }
                tracing::info!(session_token = token, target = %target, "数据库会话已建立");
                Ok(token)
            }
            Err(e) => {
                // 失败的 connect 不能留下可查询的旧句柄
                let previous = slot.active.take();
                drop(slot);
                if let Some(previous) = previous {
                    self.driver.close(previous.handle).await;
                }
                tracing::warn!(session_token = token, target = %target, error = %e, "数据库连接失败");
                Err(e)
            }
        }
    }

    async fn open_verified(&self, request: &ConnectRequest) -> AppResult<D::Handle> {
        let handle = self.driver.open(request).await?;
        if let Err(e) = self.driver.ping(&handle).await {
            self.driver.close(handle).await;
            return Err(e);
        }
        Ok(handle)
    }

    /// Closes the live session. A pending connect is cancelled instead when
    /// no session is live yet.
    pub async fn disconnect(&self, expected: Option<u64>) -> AppResult<()> {
        let closed = {
            let mut slot = self.slot.write().await;
            match slot.active.as_ref() {
                Some(active) => check_token(expected, active.token)?,
                None if slot.connecting.is_some() && expected.is_none() => {}
                None => return Err(AppError::NoActiveSession),
            }
            slot.generation += 1;
            slot.connecting = None;
            slot.active.take()
        };

        match closed {
            Some(session) => {
                tracing::info!(session_token = session.token, "断开数据库会话");
                self.driver.close(session.handle).await;
            }
            None => tracing::info!("取消进行中的数据库连接"),
        }
        Ok(())
    }

    /// Runs SQL against the live session. Returns the session token used.
    pub async fn query(&self, sql: &str, expected: Option<u64>) -> AppResult<(u64, QueryResult)> {
        let (token, handle) = self.resolve(expected).await?;
        tracing::debug!(session_token = token, sql_len = sql.len(), "执行 SQL");
        let result = self.driver.execute(&handle, sql).await?;
        Ok((token, result))
    }

    /// Lists tables of the default schema.
    pub async fn list_tables(&self, expected: Option<u64>) -> AppResult<(u64, QueryResult)> {
        self.query(LIST_TABLES_SQL, expected).await
    }

    /// Snapshot for status endpoints.
    pub async fn status(&self) -> SessionStatus {
        let slot = self.slot.read().await;
        match (&slot.active, slot.connecting) {
            (_, Some(token)) => SessionStatus {
                state: SessionState::Connecting,
                session_token: Some(token),
                ..SessionStatus::disconnected()
            },
            (Some(active), None) => SessionStatus {
                state: SessionState::Connected,
                session_token: Some(active.token),
                connected_at: Some(active.connected_at),
                target: Some(active.target.clone()),
                pool: self.driver.stats(&active.handle),
            },
            (None, None) => SessionStatus::disconnected(),
        }
    }

    async fn resolve(&self, expected: Option<u64>) -> AppResult<(u64, D::Handle)> {
        let slot = self.slot.read().await;
        let active = slot.active.as_ref().ok_or(AppError::NoActiveSession)?;
        check_token(expected, active.token)?;
        Ok((active.token, active.handle.clone()))
    }
}

fn check_token(expected: Option<u64>, current: u64) -> AppResult<()> {
    match expected {
        Some(supplied) if supplied != current => Err(AppError::StaleSession { supplied, current }),
        _ => Ok(()),
    }
}
