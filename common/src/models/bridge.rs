//! Bridge operation names and reply shapes.
//!
//! Reply field names are the ones the UI already consumes:
//! `{ success: true, response? }` or `{ error: true, message }`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::api_request::ResponseEnvelope;
use crate::errors::AppError;

/// The addressable bridge operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeOperation {
    SendApiRequest,
    ConnectToDb,
    DisconnectFromDb,
    SendDbQuery,
    GetDbTables,
}

impl BridgeOperation {
    pub const ALL: [BridgeOperation; 5] = [
        BridgeOperation::SendApiRequest,
        BridgeOperation::ConnectToDb,
        BridgeOperation::DisconnectFromDb,
        BridgeOperation::SendDbQuery,
        BridgeOperation::GetDbTables,
    ];

    /// Wire name, also the name of the reply channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeOperation::SendApiRequest => "send-api-request",
            BridgeOperation::ConnectToDb => "connect-to-db",
            BridgeOperation::DisconnectFromDb => "disconnect-from-db",
            BridgeOperation::SendDbQuery => "send-db-query",
            BridgeOperation::GetDbTables => "get-db-tables",
        }
    }

    /// Whether the operation may be invoked without a payload.
    pub fn payload_optional(&self) -> bool {
        matches!(
            self,
            BridgeOperation::DisconnectFromDb | BridgeOperation::GetDbTables
        )
    }
}

impl fmt::Display for BridgeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BridgeOperation {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BridgeOperation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| AppError::UnknownOperation(s.to_string()))
    }
}

/// Successful database acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Ack {
    /// Always `true`.
    pub success: bool,

    /// Serialized `QueryResult` for query operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// Token of the session this reply refers to.
    #[serde(rename = "sessionToken", default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<u64>,
}

/// Structured failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Failure {
    /// Always `true`.
    pub error: bool,

    /// Machine readable kind, see `AppError::code`.
    pub code: String,

    /// Driver or bridge message, verbatim.
    pub message: String,
}

/// Exactly one of these is produced per bridge request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum BridgeReply {
    /// `send-api-request` result. Never a failure.
    Envelope(ResponseEnvelope),
    /// Database success.
    Ack(Ack),
    /// Database failure.
    Failure(Failure),
}

impl BridgeReply {
    /// Plain `{ success: true }`.
    pub fn ack() -> Self {
        BridgeReply::Ack(Ack {
            success: true,
            response: None,
            session_token: None,
        })
    }

    /// `{ success: true, response }`.
    pub fn with_response(response: String) -> Self {
        BridgeReply::Ack(Ack {
            success: true,
            response: Some(response),
            session_token: None,
        })
    }

    /// Attaches the session token to an `Ack`; other variants are untouched.
    pub fn for_session(mut self, token: u64) -> Self {
        if let BridgeReply::Ack(ack) = &mut self {
            ack.session_token = Some(token);
        }
        self
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, BridgeReply::Failure(_))
    }
}

impl From<AppError> for BridgeReply {
    fn from(e: AppError) -> Self {
        BridgeReply::Failure(Failure {
            error: true,
            code: e.code().to_string(),
            message: e.to_string(),
        })
    }
}

impl From<ResponseEnvelope> for BridgeReply {
    fn from(envelope: ResponseEnvelope) -> Self {
        BridgeReply::Envelope(envelope)
    }
}

/// A reply together with the channel it answers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChannelReply {
    pub channel: BridgeOperation,
    pub reply: BridgeReply,
}
