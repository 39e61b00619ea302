//! Database session models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use utoipa::ToSchema;
use validator::Validate;

/// Payload of `connect-to-db`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ConnectRequest {
    /// Postgres connection URI.
    #[serde(rename = "connectionUri")]
    #[validate(length(min = 1, message = "connectionUri is required"))]
    pub connection_uri: String,

    /// PEM encoded CA certificate used to verify the server, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
}

impl ConnectRequest {
    pub fn new(connection_uri: impl Into<String>) -> Self {
        Self {
            connection_uri: connection_uri.into(),
            ca: None,
        }
    }

    /// CA certificate, ignoring blank input from an empty form field.
    pub fn ca_pem(&self) -> Option<&str> {
        self.ca.as_deref().filter(|ca| !ca.trim().is_empty())
    }
}

/// Optional session pin for operations without other fields
/// (`disconnect-from-db`, `get-db-tables`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SessionScope {
    #[serde(rename = "sessionToken", default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<u64>,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Pool statistics for the live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Open connections.
    pub size: u32,
    /// Idle connections.
    pub idle: u32,
    /// Configured upper bound.
    pub max_size: u32,
}

/// Snapshot returned by `GET /api/session`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,

    /// Connection URI with the password masked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStats>,
}

impl SessionStatus {
    pub fn disconnected() -> Self {
        Self {
            state: SessionState::Disconnected,
            session_token: None,
            connected_at: None,
            target: None,
            pool: None,
        }
    }
}

/// Masks the password of a connection URI for logs and status output, both
/// the `user:password@` userinfo form and a `password=` query pair.
/// Anything without a password is returned unchanged.
pub fn redact_connection_uri(uri: &str) -> String {
    let masked = redact_userinfo(uri);
    match masked.split_once('?') {
        Some((base, query)) => format!("{}?{}", base, redact_query_password(query)),
        None => masked,
    }
}

fn redact_userinfo(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let authority_start = scheme_end + 3;
    let rest = &uri[authority_start..];
    let authority_len = rest.find(['/', '?']).unwrap_or(rest.len());
    let authority = &rest[..authority_len];

    let Some(at) = authority.rfind('@') else {
        return uri.to_string();
    };
    let userinfo = &authority[..at];
    let Some(colon) = userinfo.find(':') else {
        return uri.to_string();
    };

    format!(
        "{}{}:***{}",
        &uri[..authority_start],
        &userinfo[..colon],
        &uri[authority_start + at..]
    )
}

/// Rewrites only the `password` pair so the other parameters keep their
/// original encoding.
fn redact_query_password(query: &str) -> String {
    query
        .split('&')
        .map(|pair| {
            let is_password = form_urlencoded::parse(pair.as_bytes())
                .next()
                .is_some_and(|(key, _)| key == "password");
            match pair.split_once('=') {
                Some((key, _)) if is_password => format!("{}=***", key),
                _ => pair.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}
