use crate::query::QueryParams;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

/// Body of an outbound request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// Serialized as JSON with `Content-Type: application/json`.
    Json(Value),
    /// `application/x-www-form-urlencoded` pairs.
    Form(QueryParams),
    /// Bytes sent verbatim, e.g. a Dropbox upload.
    Raw {
        /// Payload.
        bytes: Vec<u8>,
        /// Value for the `Content-Type` header.
        content_type: String,
    },
}

impl RequestBody {
    /// `true` for [`RequestBody::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

/// A fully described outbound call, before auth and defaults are merged in.
///
/// `url`, when set, is an absolute URL that replaces `base_url + path`
/// (Salesforce instance URLs, Dropbox content hosts, pagination links).
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL override.
    pub url: Option<String>,
    /// Path relative to the skill's base URL.
    pub path: String,
    /// Query parameters, possibly with repeated keys.
    pub query: QueryParams,
    /// Call-specific headers. Later entries win on name collisions.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: RequestBody,
    /// Per-call timeout overriding the dispatcher default.
    pub timeout: Option<Duration>,
}

impl OutboundRequest {
    /// A request for `path` with no query, headers or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            url: None,
            path: path.into(),
            query: QueryParams::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path`.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT path`.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `PATCH path`.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// `DELETE path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Send to this absolute URL instead of `base_url + path`.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Append one query pair.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push(key, value);
        self
    }

    /// Append every pair of `params`.
    pub fn query_params(mut self, params: impl Into<QueryParams>) -> Self {
        let params: QueryParams = params.into();
        self.query.extend(params);
        self
    }

    /// Add a call-specific header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// JSON body. `null` means no body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = if body.is_null() {
            RequestBody::Empty
        } else {
            RequestBody::Json(body)
        };
        self
    }

    /// Form-encoded body.
    pub fn form(mut self, fields: impl Into<QueryParams>) -> Self {
        self.body = RequestBody::Form(fields.into());
        self
    }

    /// Raw body with an explicit content type.
    pub fn raw(mut self, bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        self.body = RequestBody::Raw {
            bytes: bytes.into(),
            content_type: content_type.into(),
        };
        self
    }

    /// Per-call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_collects_parts() {
        let req = OutboundRequest::post("/files/upload")
            .url("https://content.dropboxapi.com/2/files/upload")
            .header("Dropbox-API-Arg", r#"{"path":"/a.txt"}"#)
            .raw(b"hello".to_vec(), "application/octet-stream")
            .timeout(Duration::from_secs(120));

        assert_eq!(req.method, Method::POST);
        assert_eq!(req.headers.len(), 1);
        assert!(matches!(req.body, RequestBody::Raw { ref content_type, .. } if content_type == "application/octet-stream"));
        assert_eq!(req.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_null_json_means_no_body() {
        let req = OutboundRequest::post("/x").json(Value::Null);
        assert!(req.body.is_empty());
        let req = OutboundRequest::post("/x").json(json!({"a": 1}));
        assert!(!req.body.is_empty());
    }

    #[test]
    fn test_query_params_append() {
        let req = OutboundRequest::get("/team/1/task")
            .query("page", "0")
            .query_params([("statuses[]", "open"), ("statuses[]", "done")]);
        assert_eq!(req.query.len(), 3);
    }
}
