//! PostgreSQL driver.
//!
//! Wraps a sqlx `PgPool` per session. Statements go through the simple query
//! protocol so the operator's SQL is sent exactly as typed (several
//! statements allowed, nothing prepared), and every value comes back as text.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Connection, Either, Row, TypeInfo, ValueRef};

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::query::{FieldInfo, QueryResult};
use common::models::session::{ConnectRequest, PoolStats};

use crate::session::DatabaseDriver;

/// Liveness probe run right after the pool is created.
const PING_SQL: &str = "SELECT NOW()";

/// Postgres implementation of [`DatabaseDriver`].
#[derive(Debug, Clone)]
pub struct PgDriver {
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgDriver {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            acquire_timeout: config.connect_timeout(),
        }
    }

    fn connect_options(&self, request: &ConnectRequest) -> AppResult<PgConnectOptions> {
        let mut options = PgConnectOptions::from_str(&request.connection_uri)
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;
        if let Some(ca) = request.ca_pem() {
            options = options.ssl_root_cert_from_pem(ca.as_bytes().to_vec());
        }
        Ok(options)
    }
}

#[async_trait]
impl DatabaseDriver for PgDriver {
    type Handle = PgPool;

    async fn open(&self, request: &ConnectRequest) -> AppResult<PgPool> {
        let options = self.connect_options(request)?;
        // 惰性建池：连通性由 ping 在独立连接上验证
        Ok(PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_lazy_with(options))
    }

    /// Runs on a dedicated connection rather than through the pool, so a
    /// refused or rejected login reports the driver's own error instead of
    /// an acquire timeout.
    async fn ping(&self, pool: &PgPool) -> AppResult<()> {
        let options = pool.connect_options();
        let probe = async {
            let mut conn = PgConnection::connect_with(&options).await?;
            sqlx::Executor::execute(&mut conn, sqlx::raw_sql(PING_SQL)).await?;
            conn.close().await
        };

        match tokio::time::timeout(self.acquire_timeout, probe).await {
            Ok(result) => result.map_err(|e| AppError::DatabaseConnection(driver_message(&e))),
            Err(_) => Err(AppError::DatabaseConnection(format!(
                "connection timed out after {}s",
                self.acquire_timeout.as_secs()
            ))),
        }
    }

    async fn execute(&self, pool: &PgPool, sql: &str) -> AppResult<QueryResult> {
        let mut stream = sqlx::raw_sql(sql).fetch_many(pool);

        let mut rows: Vec<PgRow> = Vec::new();
        let mut last: Option<QueryResult> = None;
        while let Some(step) = stream
            .try_next()
            .await
            .map_err(|e| AppError::DatabaseQuery(driver_message(&e)))?
        {
            match step {
                Either::Right(row) => rows.push(row),
                // 每条语句结束时收到一次；只保留最后一条语句的结果
                Either::Left(done) => {
                    let finished = std::mem::take(&mut rows);
                    last = Some(if finished.is_empty() {
                        QueryResult::affected(done.rows_affected())
                    } else {
                        shape_rows(&finished)?
                    });
                }
            }
        }

        match last {
            Some(result) => Ok(result),
            None if !rows.is_empty() => shape_rows(&rows),
            None => Ok(QueryResult::default()),
        }
    }

    async fn close(&self, pool: PgPool) {
        pool.close().await;
    }

    fn stats(&self, pool: &PgPool) -> Option<PoolStats> {
        Some(PoolStats {
            size: pool.size(),
            idle: pool.num_idle() as u32,
            max_size: self.max_connections,
        })
    }
}

/// Driver text for the reply. Server errors carry only the server message,
/// the way the UI's Postgres client reported them.
fn driver_message(e: &sqlx::Error) -> String {
    match e {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

fn shape_rows(rows: &[PgRow]) -> AppResult<QueryResult> {
    let fields = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|column| {
                    let type_info = column.type_info();
                    FieldInfo {
                        name: column.name().to_string(),
                        data_type_id: type_info.oid().map(|oid| oid.0),
                        data_type: type_info.name().to_string(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let shaped = rows.iter().map(row_to_json).collect::<AppResult<Vec<_>>>()?;
    Ok(QueryResult::with_rows(fields, shaped))
}

fn row_to_json(row: &PgRow) -> AppResult<Map<String, Value>> {
    let mut cells = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row
            .try_get_raw(index)
            .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;
        let text: Option<&str> = if raw.is_null() {
            None
        } else {
            Some(
                row.try_get_unchecked(index)
                    .map_err(|e| AppError::DatabaseQuery(e.to_string()))?,
            )
        };
        cells.push((column.name(), column.type_info().name(), text));
    }
    Ok(text_row(&cells))
}

/// One row of `(column, type name, text value)` cells, in column order.
pub(crate) fn text_row(cells: &[(&str, &str, Option<&str>)]) -> Map<String, Value> {
    cells
        .iter()
        .map(|(name, type_name, text)| {
            let value = text.map_or(Value::Null, |text| text_to_json(type_name, text));
            (name.to_string(), value)
        })
        .collect()
}

/// Maps a text-protocol value to JSON. Integers wider than 32 bits and
/// numerics stay strings.
pub(crate) fn text_to_json(type_name: &str, text: &str) -> Value {
    match type_name {
        "BOOL" => match text {
            "t" | "true" => Value::Bool(true),
            "f" | "false" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        "INT2" | "INT4" | "OID" => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        "FLOAT4" | "FLOAT8" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        "JSON" | "JSONB" => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        _ => Value::String(text.to_string()),
    }
}
