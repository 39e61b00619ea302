//! In-memory `DatabaseDriver` for unit tests.
//!
//! URI conventions:
//! - contains `refused`: open fails
//! - contains `unresponsive`: open succeeds, ping fails
//! - contains `slow`: open blocks until `release_pending_open`
//!
//! `execute` fails for statements starting with `SELEC `, answers the
//! catalog query with the tables `users` and `orders`, and otherwise echoes
//! the statement back as a single row.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use common::errors::{AppError, AppResult};
use common::models::query::{FieldInfo, QueryResult};
use common::models::session::{ConnectRequest, PoolStats};

use crate::session::{DatabaseDriver, LIST_TABLES_SQL};

#[derive(Default)]
struct Inner {
    opened: AtomicU64,
    closed: Mutex<Vec<u64>>,
    executed: Mutex<Vec<String>>,
    entered: Notify,
    release: Notify,
}

#[derive(Clone, Default)]
pub struct FakeDriver {
    inner: Arc<Inner>,
}

impl FakeDriver {
    pub fn opened(&self) -> u64 {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> Vec<u64> {
        self.inner.closed.lock().unwrap().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.inner.executed.lock().unwrap().clone()
    }

    pub async fn wait_for_pending_open(&self) {
        self.inner.entered.notified().await;
    }

    pub fn release_pending_open(&self) {
        self.inner.release.notify_one();
    }
}

#[async_trait]
impl DatabaseDriver for FakeDriver {
    type Handle = u64;

    async fn open(&self, request: &ConnectRequest) -> AppResult<u64> {
        let uri = &request.connection_uri;
        if uri.contains("refused") {
            return Err(AppError::DatabaseConnection(
                "connection refused (os error 111)".into(),
            ));
        }
        if uri.contains("slow") {
            self.inner.entered.notify_one();
            self.inner.release.notified().await;
        }
        let id = self.inner.opened.fetch_add(1, Ordering::SeqCst) + 1;
        // 句柄编号的高位标记 ping 失败
        if uri.contains("unresponsive") {
            return Ok(id | 1 << 63);
        }
        Ok(id)
    }

    async fn ping(&self, handle: &u64) -> AppResult<()> {
        if handle & (1 << 63) != 0 {
            return Err(AppError::DatabaseConnection("server closed the connection".into()));
        }
        Ok(())
    }

    async fn execute(&self, _handle: &u64, sql: &str) -> AppResult<QueryResult> {
        self.inner.executed.lock().unwrap().push(sql.to_string());
        if sql.trim_start().starts_with("SELEC ") {
            return Err(AppError::DatabaseQuery(
                "syntax error at or near \"SELEC\"".into(),
            ));
        }
        if sql == LIST_TABLES_SQL {
            let rows = ["users", "orders"]
                .into_iter()
                .map(|name| {
                    let mut row = serde_json::Map::new();
                    row.insert("table_name".into(), serde_json::Value::String(name.into()));
                    row
                })
                .collect();
            return Ok(QueryResult::with_rows(
                vec![FieldInfo {
                    name: "table_name".into(),
                    data_type_id: Some(19),
                    data_type: "NAME".into(),
                }],
                rows,
            ));
        }
        let mut row = serde_json::Map::new();
        row.insert("sql".into(), serde_json::Value::String(sql.to_string()));
        Ok(QueryResult::with_rows(
            vec![FieldInfo {
                name: "sql".into(),
                data_type_id: Some(25),
                data_type: "TEXT".into(),
            }],
            vec![row],
        ))
    }

    async fn close(&self, handle: u64) {
        self.inner.closed.lock().unwrap().push(handle);
    }

    fn stats(&self, _handle: &u64) -> Option<PoolStats> {
        Some(PoolStats {
            size: 1,
            idle: 1,
            max_size: 1,
        })
    }
}
