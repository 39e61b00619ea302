//! Outbound API request and normalized response envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Status code reported when the request never produced a usable response.
pub const TRANSPORT_FAILURE_STATUS: u16 = 404;

/// Status text paired with [`TRANSPORT_FAILURE_STATUS`].
pub const TRANSPORT_FAILURE_STATUS_TEXT: &str = "Not Found";

/// A single `{key, value}` row from the request editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Payload of `send-api-request`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OutboundRequestSpec {
    /// Target URL; the encoded query string is appended to it verbatim.
    #[serde(rename = "reqUrl")]
    pub target_url: String,

    /// HTTP verb, any case.
    #[serde(rename = "reqType")]
    pub method: String,

    /// Ordered header rows; later duplicates win.
    #[serde(default)]
    pub headers: Vec<KeyValue>,

    /// Ordered query parameter rows; later duplicates win.
    #[serde(rename = "params", default)]
    pub query_params: Vec<KeyValue>,

    /// Raw request body. Ignored for GET and HEAD.
    #[serde(default)]
    pub body: Option<String>,

    /// Bearer token injected as `Authorization` when non-blank.
    #[serde(rename = "bearerToken", default)]
    pub bearer_token: Option<String>,
}

impl OutboundRequestSpec {
    /// Convenience constructor for a bare request.
    pub fn new(method: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            method: method.into(),
            headers: Vec::new(),
            query_params: Vec::new(),
            body: None,
            bearer_token: None,
        }
    }

    /// True when the verb never carries a body.
    pub fn is_bodiless_method(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET") || self.method.eq_ignore_ascii_case("HEAD")
    }

    /// Body to send, if any.
    pub fn effective_body(&self) -> Option<&str> {
        if self.is_bodiless_method() {
            return None;
        }
        self.body.as_deref().filter(|b| !b.is_empty())
    }

    /// Bearer token to inject, if any.
    pub fn effective_bearer(&self) -> Option<&str> {
        self.bearer_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

/// Normalized response handed back to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResponseEnvelope {
    /// Parsed JSON, raw HTML text, or null for every other content type.
    #[serde(rename = "responseData")]
    pub data: serde_json::Value,

    /// Response headers, lower-cased names.
    #[serde(rename = "responseHeaders")]
    pub headers: BTreeMap<String, String>,

    /// Cookies taken from `Set-Cookie` headers.
    #[serde(rename = "responseCookies")]
    pub cookies: BTreeMap<String, String>,

    #[serde(rename = "responseCode")]
    pub status_code: u16,

    #[serde(rename = "responseStatusText")]
    pub status_text: String,

    /// The target URL as supplied, without the appended query string.
    #[serde(rename = "requestUrl")]
    pub request_url: String,

    /// Set only on the synthetic envelope produced when sending or reading
    /// the response failed; a real 404 never carries it.
    #[serde(
        rename = "transportFailure",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub transport_failure: bool,
}

impl ResponseEnvelope {
    /// The canned envelope used when the request could not be completed.
    pub fn transport_failure(request_url: impl Into<String>) -> Self {
        Self {
            data: serde_json::Value::Null,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            status_code: TRANSPORT_FAILURE_STATUS,
            status_text: TRANSPORT_FAILURE_STATUS_TEXT.to_string(),
            request_url: request_url.into(),
            transport_failure: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserializes_ui_payload() {
        let spec: OutboundRequestSpec = serde_json::from_value(json!({
            "reqUrl": "https://api.example.com/users?",
            "reqType": "post",
            "headers": [{ "key": "X-Trace", "value": "1" }],
            "params": [{ "key": "page", "value": "2" }],
            "body": "{\"name\":\"ada\"}",
            "bearerToken": "tok"
        }))
        .unwrap();
        assert_eq!(spec.method, "post");
        assert_eq!(spec.query_params, vec![KeyValue::new("page", "2")]);
        assert_eq!(spec.effective_body(), Some("{\"name\":\"ada\"}"));
        assert_eq!(spec.effective_bearer(), Some("tok"));
    }

    #[test]
    fn test_missing_lists_default_to_empty() {
        let spec: OutboundRequestSpec =
            serde_json::from_value(json!({ "reqUrl": "http://x", "reqType": "GET" })).unwrap();
        assert!(spec.headers.is_empty());
        assert!(spec.query_params.is_empty());
        assert!(spec.effective_bearer().is_none());
    }

    #[test]
    fn test_get_and_head_never_carry_a_body() {
        for method in ["GET", "get", "HEAD", "Head"] {
            let mut spec = OutboundRequestSpec::new(method, "http://x");
            spec.body = Some("payload".into());
            assert_eq!(spec.effective_body(), None, "{method}");
        }
        let mut spec = OutboundRequestSpec::new("DELETE", "http://x");
        spec.body = Some(String::new());
        assert_eq!(spec.effective_body(), None);
    }

    #[test]
    fn test_blank_bearer_is_ignored() {
        let mut spec = OutboundRequestSpec::new("GET", "http://x");
        spec.bearer_token = Some("   ".into());
        assert!(spec.effective_bearer().is_none());
    }

    #[test]
    fn test_transport_failure_envelope_shape() {
        let json = serde_json::to_value(ResponseEnvelope::transport_failure("http://down")).unwrap();
        assert_eq!(json["responseCode"], 404);
        assert_eq!(json["responseStatusText"], "Not Found");
        assert_eq!(json["responseData"], serde_json::Value::Null);
        assert_eq!(json["responseHeaders"], json!({}));
        assert_eq!(json["responseCookies"], json!({}));
        assert_eq!(json["requestUrl"], "http://down");
        assert_eq!(json["transportFailure"], true);
    }
}
