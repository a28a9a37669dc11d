use crate::request::{OutboundRequest, RequestBody};
use crate::response::{ApiResponse, ResponseBody};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use skillbridge_core::{NetworkError, SkillBridgeError, SkillBridgeResult, TransportError};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_ACCEPT: &str = "application/json, text/plain, */*";
const DEFAULT_USER_AGENT: &str = concat!("skillbridge/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024; // 16MB
const MAX_REDIRECTS: usize = 5;

/// Transport settings shared by every skill.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Timeout for calls that do not set their own.
    pub timeout: Duration,
    /// `User-Agent` sent unless a call overrides it.
    pub user_agent: String,
    /// Successful responses larger than this are rejected; error bodies are cut.
    pub max_response_bytes: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// Builds and sends HTTP requests and normalizes their outcome.
///
/// 2xx responses become [`ApiResponse`]; any other status becomes a
/// [`TransportError`] carrying the raw provider body, cut to
/// `max_response_bytes` when longer; failures without a response become a
/// [`NetworkError`]. Nothing is retried here.
pub struct RequestDispatcher {
    client: reqwest::Client,
    config: DispatcherConfig,
}

impl RequestDispatcher {
    /// Create a dispatcher with its own connection pool.
    pub fn new(config: DispatcherConfig) -> SkillBridgeResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| SkillBridgeError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Create a dispatcher around an existing client.
    pub fn with_client(client: reqwest::Client, config: DispatcherConfig) -> Self {
        Self { client, config }
    }

    /// The active transport settings.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Resolve the final URL of `request`, query string included.
    ///
    /// An absolute `url` wins. Otherwise `path` is appended to `base_url`,
    /// keeping any path prefix of the base (`https://api.trello.com/1` +
    /// `/boards` is `https://api.trello.com/1/boards`). A `path` that is
    /// itself an absolute URL is used as is.
    pub fn resolve_url(base_url: Option<&str>, request: &OutboundRequest) -> SkillBridgeResult<Url> {
        let raw = match &request.url {
            Some(url) => url.clone(),
            None if is_absolute(&request.path) => request.path.clone(),
            None => {
                let base = base_url
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| {
                        SkillBridgeError::Request(
                            "no base URL configured and no absolute URL given".into(),
                        )
                    })?;
                join(base, &request.path)
            }
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| SkillBridgeError::Request(format!("invalid URL '{raw}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SkillBridgeError::Request(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in request.query.iter() {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Send `request` and normalize the outcome.
    pub async fn send(
        &self,
        base_url: Option<&str>,
        request: OutboundRequest,
    ) -> SkillBridgeResult<ApiResponse> {
        let url = Self::resolve_url(base_url, &request)?;
        let headers = build_headers(&request)?;
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let method = request.method;
        let body = encode_body(request.body)?;

        debug!(
            method = %method,
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            "Dispatching request"
        );

        let mut builder = self
            .client
            .request(method, url)
            .headers(headers)
            .timeout(timeout);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let headers = collect_headers(response.headers());
        let limit = self.config.max_response_bytes;

        if status.is_success() {
            if response.content_length().is_some_and(|len| len > limit as u64) {
                return Err(too_large(limit));
            }
            let (bytes, truncated) = read_capped(response, limit).await?;
            if truncated {
                return Err(too_large(limit));
            }
            let content_type = headers.get("content-type").map(String::as_str).unwrap_or("");
            let body = decode_success(status, content_type, bytes);
            debug!(status = status.as_u16(), "Request succeeded");
            Ok(ApiResponse {
                status: status.as_u16(),
                headers,
                body,
            })
        } else {
            // Error bodies past the cap are cut, never turned into a different error.
            let (bytes, truncated) = read_capped(response, limit).await?;
            debug!(status = status.as_u16(), truncated, "Request failed");
            let data = if truncated {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            } else {
                decode_error(&bytes)
            };
            Err(TransportError::new(status.as_u16(), data, headers).into())
        }
    }
}

/// Read at most `limit` bytes of the body. The flag is set when more was sent.
async fn read_capped(response: reqwest::Response, limit: usize) -> SkillBridgeResult<(Vec<u8>, bool)> {
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(network_error)?;
        let room = limit - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}

fn is_absolute(path: &str) -> bool {
    let lower = path.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn join(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

fn build_headers(request: &OutboundRequest) -> SkillBridgeResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));

    match &request.body {
        RequestBody::Empty => {}
        RequestBody::Json(_) => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        RequestBody::Form(_) => {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            );
        }
        RequestBody::Raw { content_type, .. } => {
            let value = HeaderValue::from_str(content_type).map_err(|_| {
                SkillBridgeError::Request(format!("invalid content type '{content_type}'"))
            })?;
            headers.insert(CONTENT_TYPE, value);
        }
    }

    // Values are never echoed into errors: they may carry credentials.
    for (name, value) in &request.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| SkillBridgeError::Request(format!("invalid header name '{name}'")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| SkillBridgeError::Request(format!("invalid value for header '{name}'")))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

fn encode_body(body: RequestBody) -> SkillBridgeResult<Option<Vec<u8>>> {
    Ok(match body {
        RequestBody::Empty => None,
        RequestBody::Json(value) => Some(serde_json::to_vec(&value)?),
        RequestBody::Form(fields) => Some(
            url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields.iter())
                .finish()
                .into_bytes(),
        ),
        RequestBody::Raw { bytes, .. } => Some(bytes),
    })
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(essence: &str) -> bool {
    essence == "application/json" || essence.ends_with("+json")
}

fn is_text(essence: &str) -> bool {
    essence.starts_with("text/")
        || essence.ends_with("+xml")
        || matches!(
            essence,
            "application/xml" | "application/javascript" | "application/x-www-form-urlencoded"
        )
}

fn decode_success(status: StatusCode, content_type: &str, bytes: Vec<u8>) -> ResponseBody {
    if status == StatusCode::NO_CONTENT || bytes.is_empty() {
        return ResponseBody::Empty;
    }

    let essence = essence(content_type);
    if is_json(&essence) {
        return match serde_json::from_slice(&bytes) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned()),
        };
    }
    if is_text(&essence) {
        return ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned());
    }
    if essence.is_empty() {
        // Untyped bodies: sniff JSON, then UTF-8 text.
        if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
            return ResponseBody::Json(value);
        }
        return match String::from_utf8(bytes) {
            Ok(text) => ResponseBody::Text(text),
            Err(e) => ResponseBody::Bytes(e.into_bytes()),
        };
    }
    ResponseBody::Bytes(bytes)
}

/// Error bodies are kept as sent: JSON when it parses, raw text otherwise.
fn decode_error(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn network_error(mut err: reqwest::Error) -> SkillBridgeError {
    if err.is_builder() {
        return SkillBridgeError::Request(err.to_string());
    }
    // Query strings may hold API keys.
    if let Some(url) = err.url_mut() {
        url.set_query(None);
    }
    let mut network = NetworkError::new(err.to_string());
    network.timed_out = err.is_timeout();
    network.connect = err.is_connect();
    network.into()
}

fn too_large(limit: usize) -> SkillBridgeError {
    SkillBridgeError::Request(format!("response body exceeds {limit} bytes"))
}
