//! SQL query result models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Payload of `send-db-query`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DbQueryRequest {
    /// SQL text, passed to the driver verbatim.
    pub query: String,

    /// Session the caller believes is live.
    #[serde(rename = "sessionToken", default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<u64>,
}

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldInfo {
    /// Column name.
    pub name: String,

    /// Postgres type OID, when the driver reports one.
    #[serde(rename = "dataTypeID", skip_serializing_if = "Option::is_none")]
    pub data_type_id: Option<u32>,

    /// Postgres type name (e.g. `INT4`, `TEXT`).
    #[serde(rename = "dataType")]
    pub data_type: String,
}

/// Result of one statement, serialized into the `response` string of a
/// bridge reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Statement tag. The text protocol path does not report it.
    pub command: Option<String>,

    /// Rows returned, or rows affected for statements without output.
    pub row_count: u64,

    /// Rows in server order, each mapping column name to value in column order.
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,

    /// Column metadata.
    pub fields: Vec<FieldInfo>,
}

impl QueryResult {
    /// Result for a statement that returned rows.
    pub fn with_rows(
        fields: Vec<FieldInfo>,
        rows: Vec<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        Self {
            command: None,
            row_count: rows.len() as u64,
            rows,
            fields,
        }
    }

    /// Result for a statement that only affected rows.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            row_count: rows_affected,
            ..Default::default()
        }
    }

    /// Serializes to the opaque string blob carried across the bridge.
    pub fn to_blob(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
