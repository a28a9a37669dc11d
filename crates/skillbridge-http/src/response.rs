use base64::Engine;
use serde_json::Value;
use std::collections::HashMap;

/// Decoded body of a 2xx response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `204 No Content` or a zero-length body.
    Empty,
    /// Parsed JSON.
    Json(Value),
    /// Textual content (or JSON that failed to parse).
    Text(String),
    /// Binary content, e.g. a Dropbox download.
    Bytes(Vec<u8>),
}

impl ResponseBody {
    /// Collapse into a JSON value.
    ///
    /// `Empty` becomes `null`, text becomes a string and bytes become a
    /// standard base64 string.
    pub fn into_value(self) -> Value {
        match self {
            ResponseBody::Empty => Value::Null,
            ResponseBody::Json(v) => v,
            ResponseBody::Text(t) => Value::String(t),
            ResponseBody::Bytes(b) => {
                Value::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
        }
    }

    /// The parsed JSON, if any.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(v) => Some(v),
            _ => None,
        }
    }

    /// `true` for [`ResponseBody::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code (2xx).
    pub status: u16,
    /// Response headers, names lowercased.
    pub headers: HashMap<String, String>,
    /// Decoded body.
    pub body: ResponseBody,
}

impl ApiResponse {
    /// Look up a response header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Collapse the body into a JSON value. See [`ResponseBody::into_value`].
    pub fn into_value(self) -> Value {
        self.body.into_value()
    }
}
