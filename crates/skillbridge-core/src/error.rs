use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

const MAX_SUMMARY_CHARS: usize = 200;

/// A convenience `Result` alias using [`SkillBridgeError`].
pub type SkillBridgeResult<T> = Result<T, SkillBridgeError>;

/// A non-2xx HTTP response.
///
/// `data` holds the provider's response body exactly as received: parsed JSON
/// when the body is valid JSON, the raw text otherwise, and `null` for an
/// empty body. Adapters decode provider-specific error shapes (GraphQL
/// `errors[]`, Salesforce arrays, Dropbox `.tag` unions, ...) from it.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("HTTP {status}: {message}")]
pub struct TransportError {
    /// HTTP status code.
    pub status: u16,
    /// Short human-readable summary.
    pub message: String,
    /// Raw response body.
    pub data: Value,
    /// Response headers, names lowercased.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl TransportError {
    /// Build a transport error, deriving `message` from the body.
    pub fn new(status: u16, data: Value, headers: HashMap<String, String>) -> Self {
        let message = summarize(&data).unwrap_or_else(|| format!("request failed with status {status}"));
        Self {
            status,
            message,
            data,
            headers,
        }
    }

    /// Look up a response header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// `true` for HTTP 429.
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// `true` for 5xx responses.
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// The delay requested by a `Retry-After` header given in seconds.
    ///
    /// HTTP-date values are not interpreted and yield `None`.
    pub fn retry_after(&self) -> Option<Duration> {
        let raw = self.header("retry-after")?.trim();
        let secs: f64 = raw.parse().ok()?;
        Duration::try_from_secs_f64(secs).ok()
    }
}

/// Pick a short message out of a provider error body without altering it.
fn summarize(data: &Value) -> Option<String> {
    match data {
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.chars().take(MAX_SUMMARY_CHARS).collect())
            }
        }
        Value::Object(map) => {
            for key in ["message", "error_description", "error", "detail", "title", "err"] {
                match map.get(key) {
                    Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                    Some(nested @ Value::Object(_)) => {
                        if let Some(found) = summarize(nested) {
                            return Some(found);
                        }
                    }
                    _ => {}
                }
            }
            map.get("errors").and_then(summarize)
        }
        Value::Array(items) => items.first().and_then(summarize),
        _ => None,
    }
}

/// A call that never produced an HTTP response (DNS, connect, timeout, reset).
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct NetworkError {
    /// Description of the failure.
    pub message: String,
    /// The request hit its timeout.
    pub timed_out: bool,
    /// The connection could not be established.
    pub connect: bool,
}

impl NetworkError {
    /// Create a network error with no classification flags set.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
            connect: false,
        }
    }
}

/// Top-level error type for skillbridge.
#[derive(Debug, thiserror::Error)]
pub enum SkillBridgeError {
    /// A required credential field is missing or empty. Never retried.
    #[error("Auth error: {0}")]
    Auth(String),

    /// The provider answered with a non-2xx status.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// No response was received.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// The caller cancelled the call or its deadline passed.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A failure raised while calling a skill's API, tagged with the skill.
    #[error("skill '{skill_id}': {source}")]
    Api {
        /// The skill whose call failed.
        skill_id: String,
        /// The original failure.
        #[source]
        source: Box<SkillBridgeError>,
    },

    /// The outbound request could not be built (bad URL, header, method).
    #[error("Request error: {0}")]
    Request(String),

    /// Invalid configuration or adapter declaration.
    #[error("Config error: {0}")]
    Config(String),

    /// An error raised by a skill or the skill registry.
    #[error("Skill error: {0}")]
    Skill(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SkillBridgeError {
    /// Tag `source` with the skill it came from. Already-tagged errors are kept as is.
    pub fn api(skill_id: impl Into<String>, source: SkillBridgeError) -> Self {
        match source {
            already @ SkillBridgeError::Api { .. } => already,
            source => SkillBridgeError::Api {
                skill_id: skill_id.into(),
                source: Box::new(source),
            },
        }
    }

    /// The underlying error with any [`SkillBridgeError::Api`] wrapper removed.
    pub fn root(&self) -> &SkillBridgeError {
        match self {
            SkillBridgeError::Api { source, .. } => source.root(),
            other => other,
        }
    }

    /// Skill identity attached by the executor, if any.
    pub fn skill_id(&self) -> Option<&str> {
        match self {
            SkillBridgeError::Api { skill_id, .. } => Some(skill_id),
            _ => None,
        }
    }

    /// The transport error, if this is a non-2xx response.
    pub fn transport(&self) -> Option<&TransportError> {
        match self.root() {
            SkillBridgeError::Transport(err) => Some(err),
            _ => None,
        }
    }

    /// HTTP status of a transport failure.
    pub fn status(&self) -> Option<u16> {
        self.transport().map(|t| t.status)
    }

    /// Raw provider response body of a transport failure.
    pub fn data(&self) -> Option<&Value> {
        self.transport().map(|t| &t.data)
    }

    /// `true` when the failure is a missing or invalid credential.
    pub fn is_auth(&self) -> bool {
        matches!(self.root(), SkillBridgeError::Auth(_))
    }

    /// `true` when no response was received.
    pub fn is_network(&self) -> bool {
        matches!(self.root(), SkillBridgeError::Network(_))
    }

    /// `true` when the caller aborted the call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), SkillBridgeError::Cancelled(_))
    }

    /// Short machine-readable category of the root error.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            SkillBridgeError::Auth(_) => "auth",
            SkillBridgeError::Transport(_) => "transport",
            SkillBridgeError::Network(_) => "network",
            SkillBridgeError::Cancelled(_) => "cancelled",
            SkillBridgeError::Api { .. } => "api",
            SkillBridgeError::Request(_) => "request",
            SkillBridgeError::Config(_) => "config",
            SkillBridgeError::Skill(_) => "skill",
            SkillBridgeError::Json(_) => "json",
            SkillBridgeError::Io(_) => "io",
        }
    }
}
