//! API 请求代发与响应归一化
//!
//! 根据界面传入的参数构造请求，并把任意响应折叠成固定的 `ResponseEnvelope`。
//! 发送或读取失败时返回固定的 404 信封，真实原因只写日志。

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, SET_COOKIE};
use hyper::ext::ReasonPhrase;
use reqwest::Method;
use serde_json::Value;
use url::form_urlencoded;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::api_request::{KeyValue, OutboundRequestSpec, ResponseEnvelope};

/// 未指定 Content-Type 时字符串请求体使用的类型
const DEFAULT_BODY_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// 带 Cookie 存储的共享 HTTP 客户端。
///
/// 同一个实例内，先前响应设置的 Cookie 会在后续同站请求中自动带上。
#[derive(Clone)]
pub struct EnvelopeClient {
    client: reqwest::Client,
}

impl EnvelopeClient {
    /// 创建客户端
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder().cookie_store(true);
        if let Some(timeout) = config.http_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// 执行请求；永远返回一个信封
    pub async fn execute(&self, spec: &OutboundRequestSpec) -> ResponseEnvelope {
        match self.try_execute(spec).await {
            Ok(envelope) => {
                tracing::info!(
                    method = %spec.method,
                    url = %spec.target_url,
                    status = envelope.status_code,
                    "API 请求完成"
                );
                envelope
            }
            Err(e) => {
                tracing::warn!(
                    method = %spec.method,
                    url = %spec.target_url,
                    error = %e,
                    "API 请求失败，返回 404 信封"
                );
                ResponseEnvelope::transport_failure(spec.target_url.clone())
            }
        }
    }

    async fn try_execute(&self, spec: &OutboundRequestSpec) -> AppResult<ResponseEnvelope> {
        let method = parse_method(&spec.method)?;
        let url = build_url(&spec.target_url, &spec.query_params);
        let headers = build_headers(spec)?;

        let mut request = self.client.request(method, url.as_str()).headers(headers);
        if let Some(body) = spec.effective_body() {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        normalize(response, &spec.target_url).await
    }
}

fn parse_method(method: &str) -> AppResult<Method> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| AppError::Transport(format!("invalid HTTP method: {:?}", method)))
}

/// 拼接查询串：重复的键后者覆盖前者但保留首次出现的位置，
/// 直接追加在 `target` 之后，不补 `?`。
pub(crate) fn build_url(target: &str, params: &[KeyValue]) -> String {
    let mut folded: Vec<(&str, &str)> = Vec::with_capacity(params.len());
    for param in params {
        match folded.iter_mut().find(|(key, _)| *key == param.key) {
            Some(slot) => slot.1 = &param.value,
            None => folded.push((&param.key, &param.value)),
        }
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(folded)
        .finish();
    format!("{}{}", target, query)
}

/// 按顺序写入请求头，随后注入 Bearer 令牌（覆盖已有的 Authorization）。
pub(crate) fn build_headers(spec: &OutboundRequestSpec) -> AppResult<HeaderMap> {
    let mut headers = HeaderMap::new();

    // 空行来自编辑器里未填写的条目
    for header in spec.headers.iter().filter(|h| !h.key.is_empty()) {
        let name = HeaderName::from_bytes(header.key.as_bytes())
            .map_err(|e| AppError::Transport(format!("invalid header name {:?}: {}", header.key, e)))?;
        let value = HeaderValue::from_str(header.value.trim())
            .map_err(|e| AppError::Transport(format!("invalid value for header {}: {}", header.key, e)))?;
        headers.insert(name, value);
    }

    // 与浏览器 fetch 一致：字符串请求体默认按纯文本发送
    if spec.effective_body().is_some() && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_BODY_CONTENT_TYPE));
    }

    if let Some(token) = spec.effective_bearer() {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| AppError::Transport(format!("invalid bearer token: {}", e)))?;
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

async fn normalize(response: reqwest::Response, request_url: &str) -> AppResult<ResponseEnvelope> {
    let status = response.status();
    let status_text = status_text(&response);
    let headers = collect_headers(response.headers());
    let cookies = collect_cookies(response.headers());
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    let data = match content_type.as_deref() {
        Some(ct) if ct.contains("application/json") => response.json::<Value>().await?,
        Some(ct) if ct.contains("text/html") => Value::String(response.text().await?),
        _ => Value::Null,
    };

    Ok(ResponseEnvelope {
        data,
        headers,
        cookies,
        status_code: status.as_u16(),
        status_text,
        request_url: request_url.to_string(),
        transport_failure: false,
    })
}

/// 服务器给出的原因短语；与标准短语相同时 hyper 不保留，回退到标准短语。
fn status_text(response: &reqwest::Response) -> String {
    match response.extensions().get::<ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
    }
}

/// 重复的响应头以 `", "` 合并；`set-cookie` 只保留最后一个值。
pub(crate) fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let values = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
            let joined = if name == SET_COOKIE {
                values.last().unwrap_or_default()
            } else {
                values.collect::<Vec<_>>().join(", ")
            };
            (name.as_str().to_string(), joined)
        })
        .collect()
}

pub(crate) fn collect_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| parse_set_cookie(&String::from_utf8_lossy(v.as_bytes())))
        .collect()
}

/// 取第一个 `;` 之前的片段，并在第一个 `=` 处切分。
pub(crate) fn parse_set_cookie(raw: &str) -> (String, String) {
    let pair = raw.split(';').next().unwrap_or_default();
    match pair.split_once('=') {
        Some((name, value)) => (name.to_string(), value.to_string()),
        None => (pair.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap as AxumHeaderMap, Method as AxumMethod, StatusCode, Uri},
        response::{AppendHeaders, Html, IntoResponse},
        routing::{any, get},
        Json, Router,
    };
    use serde_json::json;

    async fn echo(method: AxumMethod, headers: AxumHeaderMap, uri: Uri, body: String) -> Json<Value> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        Json(json!({
            "method": method.as_str(),
            "query": uri.query(),
            "authorization": header("authorization"),
            "custom": header("x-custom"),
            "cookie": header("cookie"),
            "contentType": header("content-type"),
            "body": body,
        }))
    }

    async fn spawn_server() -> String {
        let app = Router::new()
            .route("/echo", any(echo))
            .route("/html", get(|| async { Html("<h1>hello</h1>") }))
            .route("/text", get(|| async { "plain text" }))
            .route(
                "/missing",
                get(|| async { (StatusCode::NOT_FOUND, Json(json!({ "detail": "gone" }))) }),
            )
            .route(
                "/broken-json",
                get(|| async { ([("content-type", "application/json")], "{not json") }),
            )
            .route(
                "/cookies",
                get(|| async {
                    (
                        AppendHeaders([
                            ("set-cookie", "sid=abc123; Path=/; HttpOnly"),
                            ("set-cookie", "theme=dark=mode; Max-Age=60"),
                            ("x-multi", "a"),
                            ("x-multi", "b"),
                        ]),
                        Json(json!({ "ok": true })),
                    )
                        .into_response()
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client() -> EnvelopeClient {
        EnvelopeClient::new(&AppConfig::default()).unwrap()
    }

    #[test]
    fn test_build_url_appends_without_question_mark() {
        let params = vec![
            KeyValue::new("q", "rust lang"),
            KeyValue::new("page", "1"),
            KeyValue::new("q", "tokio"),
        ];
        assert_eq!(
            build_url("https://x.test/search?", &params),
            "https://x.test/search?q=tokio&page=1"
        );
        assert_eq!(build_url("https://x.test/a", &[]), "https://x.test/a");
        assert_eq!(
            build_url("https://x.test/a", &[KeyValue::new("k", "v")]),
            "https://x.test/ak=v"
        );
    }

    #[test]
    fn test_bearer_overrides_user_authorization() {
        let mut spec = OutboundRequestSpec::new("GET", "http://x");
        spec.headers = vec![
            KeyValue::new("Authorization", "Basic dXNlcjpwYXNz"),
            KeyValue::new("X-Custom", "first"),
            KeyValue::new("x-custom", "second"),
        ];
        spec.bearer_token = Some("tok-1".into());

        let headers = build_headers(&spec).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer tok-1");
        assert_eq!(headers.get_all("x-custom").iter().count(), 1);
        assert_eq!(headers["x-custom"], "second");
    }

    #[test]
    fn test_invalid_header_name_is_an_error() {
        let mut spec = OutboundRequestSpec::new("GET", "http://x");
        spec.headers = vec![KeyValue::new("bad header", "v")];
        assert!(build_headers(&spec).is_err());
    }

    #[test]
    fn test_parse_set_cookie() {
        assert_eq!(
            parse_set_cookie("sid=abc; Path=/"),
            ("sid".to_string(), "abc".to_string())
        );
        assert_eq!(
            parse_set_cookie("token=a=b; Secure"),
            ("token".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_set_cookie("flag"), ("flag".to_string(), String::new()));
    }

    #[tokio::test]
    async fn test_json_response_is_parsed() {
        let base = spawn_server().await;
        let mut spec = OutboundRequestSpec::new("post", format!("{}/echo?", base));
        spec.query_params = vec![KeyValue::new("a", "1 2")];
        spec.headers = vec![KeyValue::new("X-Custom", "yes")];
        spec.body = Some("hello".into());
        spec.bearer_token = Some("secret".into());

        let envelope = client().execute(&spec).await;
        assert_eq!(envelope.status_code, 200);
        assert_eq!(envelope.status_text, "OK");
        assert_eq!(envelope.request_url, format!("{}/echo?", base));
        assert!(!envelope.transport_failure);
        assert_eq!(envelope.data["method"], "POST");
        assert_eq!(envelope.data["query"], "a=1+2");
        assert_eq!(envelope.data["authorization"], "Bearer secret");
        assert_eq!(envelope.data["custom"], "yes");
        assert_eq!(envelope.data["body"], "hello");
        assert_eq!(envelope.data["contentType"], "text/plain;charset=UTF-8");
        assert!(envelope.headers["content-type"].contains("application/json"));
    }

    #[tokio::test]
    async fn test_get_never_sends_body() {
        let base = spawn_server().await;
        let mut spec = OutboundRequestSpec::new("GET", format!("{}/echo", base));
        spec.body = Some("ignored".into());

        let envelope = client().execute(&spec).await;
        assert_eq!(envelope.data["body"], "");
        assert_eq!(envelope.data["contentType"], Value::Null);
    }

    #[test]
    fn test_body_content_type_defaults_to_plain_text() {
        let mut spec = OutboundRequestSpec::new("PUT", "http://x");
        spec.body = Some("{\"a\":1}".into());
        assert_eq!(build_headers(&spec).unwrap()[CONTENT_TYPE], "text/plain;charset=UTF-8");

        spec.headers = vec![KeyValue::new("Content-Type", "application/json")];
        assert_eq!(build_headers(&spec).unwrap()[CONTENT_TYPE], "application/json");

        let bodiless = OutboundRequestSpec::new("POST", "http://x");
        assert!(!build_headers(&bodiless).unwrap().contains_key(CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_server_reason_phrase_is_kept() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 Everything Fine\r\ncontent-type: text/html\r\n\
                      content-length: 2\r\nconnection: close\r\n\r\nhi",
                )
                .await
                .unwrap();
        });

        let envelope = client()
            .execute(&OutboundRequestSpec::new("GET", format!("http://{}/", addr)))
            .await;
        assert_eq!(envelope.status_code, 200);
        assert_eq!(envelope.status_text, "Everything Fine");
        assert_eq!(envelope.data, json!("hi"));
    }

    #[tokio::test]
    async fn test_html_is_raw_text_and_plain_text_is_null() {
        let base = spawn_server().await;
        let client = client();

        let html = client
            .execute(&OutboundRequestSpec::new("GET", format!("{}/html", base)))
            .await;
        assert_eq!(html.data, json!("<h1>hello</h1>"));

        let text = client
            .execute(&OutboundRequestSpec::new("GET", format!("{}/text", base)))
            .await;
        assert_eq!(text.status_code, 200);
        assert_eq!(text.data, Value::Null);
    }

    #[tokio::test]
    async fn test_real_404_is_not_a_transport_failure() {
        let base = spawn_server().await;
        let envelope = client()
            .execute(&OutboundRequestSpec::new("GET", format!("{}/missing", base)))
            .await;
        assert_eq!(envelope.status_code, 404);
        assert_eq!(envelope.data, json!({ "detail": "gone" }));
        assert!(!envelope.transport_failure);
    }

    #[tokio::test]
    async fn test_cookies_and_repeated_headers() {
        let base = spawn_server().await;
        let envelope = client()
            .execute(&OutboundRequestSpec::new("GET", format!("{}/cookies", base)))
            .await;

        assert_eq!(envelope.cookies.len(), 2);
        assert_eq!(envelope.cookies["sid"], "abc123");
        assert_eq!(envelope.cookies["theme"], "dark=mode");
        assert_eq!(envelope.headers["x-multi"], "a, b");
        assert_eq!(envelope.headers["set-cookie"], "theme=dark=mode; Max-Age=60");
    }

    #[tokio::test]
    async fn test_cookies_are_sent_on_later_requests() {
        let base = spawn_server().await;
        let client = client();
        client
            .execute(&OutboundRequestSpec::new("GET", format!("{}/cookies", base)))
            .await;

        let envelope = client
            .execute(&OutboundRequestSpec::new("GET", format!("{}/echo", base)))
            .await;
        let cookie = envelope.data["cookie"].as_str().unwrap_or_default();
        assert!(cookie.contains("sid=abc123"), "cookie header was {:?}", cookie);
    }

    #[tokio::test]
    async fn test_malformed_json_collapses_to_canned_envelope() {
        let base = spawn_server().await;
        let url = format!("{}/broken-json", base);
        let envelope = client().execute(&OutboundRequestSpec::new("GET", url.clone())).await;
        assert_eq!(envelope, ResponseEnvelope::transport_failure(url));
    }

    #[tokio::test]
    async fn test_connection_refused_collapses_to_canned_envelope() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}/anything", addr);
        let envelope = client().execute(&OutboundRequestSpec::new("GET", url.clone())).await;
        assert_eq!(envelope.status_code, 404);
        assert_eq!(envelope.status_text, "Not Found");
        assert_eq!(envelope.data, Value::Null);
        assert!(envelope.headers.is_empty());
        assert!(envelope.cookies.is_empty());
        assert!(envelope.transport_failure);
        assert_eq!(envelope.request_url, url);
    }

    #[tokio::test]
    async fn test_invalid_url_and_method_collapse_to_canned_envelope() {
        let client = client();
        let bad_url = client
            .execute(&OutboundRequestSpec::new("GET", "not a url"))
            .await;
        assert!(bad_url.transport_failure);

        let bad_method = client
            .execute(&OutboundRequestSpec::new("GE T", "http://127.0.0.1:1/"))
            .await;
        assert!(bad_method.transport_failure);
    }
}
