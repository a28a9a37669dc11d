use crate::dispatcher::RequestDispatcher;
use crate::query::QueryParams;
use crate::request::OutboundRequest;
use crate::response::ApiResponse;
use reqwest::Method;
use serde_json::{json, Value};
use skillbridge_core::{SkillBridgeError, SkillBridgeResult};
use skillbridge_security::{AuthInjector, AuthKind, Credentials, RateLimiter, Redactor};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Where and how a skill talks to its provider.
#[derive(Debug, Clone)]
pub struct SkillEndpoint {
    /// Owning skill.
    pub skill_id: String,
    /// Root URL that relative paths are appended to.
    pub base_url: String,
    /// How credentials are attached.
    pub auth: AuthKind,
    /// Headers sent on every call unless auth or the call overrides them.
    pub default_headers: BTreeMap<String, String>,
}

impl SkillEndpoint {
    /// An endpoint with no default headers.
    pub fn new(skill_id: impl Into<String>, base_url: impl Into<String>, auth: AuthKind) -> Self {
        Self {
            skill_id: skill_id.into(),
            base_url: base_url.into(),
            auth,
            default_headers: BTreeMap::new(),
        }
    }

    /// Add a default header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }
}

/// Caller-side controls for a call: cooperative cancellation and a deadline.
///
/// Both cover the rate-limit wait as well as the HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Token that aborts the call when cancelled.
    pub cancel: Option<CancellationToken>,
    /// Instant after which the call is abandoned.
    pub deadline: Option<Instant>,
}

impl CallOptions {
    /// Abort when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Abandon the call at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Abandon the call `timeout` from now.
    pub fn with_timeout(self, timeout: std::time::Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

/// The authenticated, rate-limited HTTP facade handed to tool handlers.
///
/// Every call runs the same pipeline: render auth from the credentials,
/// wait for a rate-limit token, merge headers (defaults, then auth, then
/// call-specific), dispatch, and tag any failure with the skill id. Calls are
/// made exactly once; retry policy belongs to the caller.
#[derive(Clone)]
pub struct ApiExecutor {
    endpoint: Arc<SkillEndpoint>,
    credentials: Arc<Credentials>,
    limiter: Arc<RateLimiter>,
    dispatcher: Arc<RequestDispatcher>,
    redactor: Arc<Redactor>,
    options: CallOptions,
}

impl ApiExecutor {
    /// Bind an executor to one skill, one credential bundle and one budget.
    pub fn new(
        endpoint: Arc<SkillEndpoint>,
        credentials: Credentials,
        limiter: Arc<RateLimiter>,
        dispatcher: Arc<RequestDispatcher>,
    ) -> Self {
        let redactor = Arc::new(Redactor::from_credentials(&credentials));
        Self {
            endpoint,
            credentials: Arc::new(credentials),
            limiter,
            dispatcher,
            redactor,
            options: CallOptions::default(),
        }
    }

    /// A copy of this executor whose calls honor `options`.
    pub fn with_options(&self, options: CallOptions) -> Self {
        Self {
            options,
            ..self.clone()
        }
    }

    /// The skill this executor calls on behalf of.
    pub fn skill_id(&self) -> &str {
        &self.endpoint.skill_id
    }

    /// The endpoint description.
    pub fn endpoint(&self) -> &SkillEndpoint {
        &self.endpoint
    }

    /// The bound credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The rate limiter guarding this skill's budget.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// `GET path`. An empty query and a `null` body send neither.
    pub async fn get(
        &self,
        path: &str,
        query: impl Into<QueryParams>,
        body: Value,
    ) -> SkillBridgeResult<Value> {
        self.verb(Method::GET, path, query.into(), body).await
    }

    /// `POST path` with a query string and a JSON body.
    pub async fn post(
        &self,
        path: &str,
        query: impl Into<QueryParams>,
        body: Value,
    ) -> SkillBridgeResult<Value> {
        self.verb(Method::POST, path, query.into(), body).await
    }

    /// `PUT path` with a query string and a JSON body.
    pub async fn put(
        &self,
        path: &str,
        query: impl Into<QueryParams>,
        body: Value,
    ) -> SkillBridgeResult<Value> {
        self.verb(Method::PUT, path, query.into(), body).await
    }

    /// `PATCH path` with a query string and a JSON body.
    pub async fn patch(
        &self,
        path: &str,
        query: impl Into<QueryParams>,
        body: Value,
    ) -> SkillBridgeResult<Value> {
        self.verb(Method::PATCH, path, query.into(), body).await
    }

    /// `DELETE path` with a query string and an optional JSON body.
    pub async fn delete(
        &self,
        path: &str,
        query: impl Into<QueryParams>,
        body: Value,
    ) -> SkillBridgeResult<Value> {
        self.verb(Method::DELETE, path, query.into(), body).await
    }

    /// POST a GraphQL document. `null` variables are omitted.
    ///
    /// GraphQL-level `errors[]` in a 200 response are returned untouched.
    pub async fn graphql(&self, path: &str, query: &str, variables: Value) -> SkillBridgeResult<Value> {
        let mut body = json!({ "query": query });
        if !variables.is_null() {
            body["variables"] = variables;
        }
        self.post(path, QueryParams::new(), body).await
    }

    /// Run a fully described request and return the whole response.
    pub async fn request(&self, request: OutboundRequest) -> SkillBridgeResult<ApiResponse> {
        self.guarded(self.run(request))
            .await
            .map_err(|e| SkillBridgeError::api(self.skill_id(), e))
    }

    async fn verb(
        &self,
        method: Method,
        path: &str,
        query: QueryParams,
        body: Value,
    ) -> SkillBridgeResult<Value> {
        let request = OutboundRequest::new(method, path).query_params(query).json(body);
        self.request(request).await.map(ApiResponse::into_value)
    }

    async fn run(&self, mut request: OutboundRequest) -> SkillBridgeResult<ApiResponse> {
        let endpoint = &self.endpoint;

        // A bad credential fails here, before any budget is spent.
        let injection = AuthInjector::inject(&endpoint.auth, &self.credentials)?;

        self.limiter.acquire().await;

        let mut headers: Vec<(String, String)> = endpoint
            .default_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.extend(injection.headers);
        headers.append(&mut request.headers);
        request.headers = headers;
        request.query.extend(injection.query);

        let method = request.method.clone();
        debug!(
            skill = %endpoint.skill_id,
            method = %method,
            path = %request.path,
            absolute = request.url.is_some(),
            "Calling skill API"
        );

        match self.dispatcher.send(Some(&endpoint.base_url), request).await {
            Ok(response) => Ok(response),
            Err(SkillBridgeError::Transport(err)) => {
                warn!(
                    skill = %endpoint.skill_id,
                    method = %method,
                    status = err.status,
                    "Skill API returned an error status"
                );
                Err(SkillBridgeError::Transport(err))
            }
            Err(SkillBridgeError::Network(mut err)) => {
                err.message = self.redactor.redact(&err.message);
                warn!(
                    skill = %endpoint.skill_id,
                    method = %method,
                    timed_out = err.timed_out,
                    error = %err.message,
                    "Skill API unreachable"
                );
                Err(SkillBridgeError::Network(err))
            }
            Err(SkillBridgeError::Request(message)) => {
                Err(SkillBridgeError::Request(self.redactor.redact(&message)))
            }
            Err(other) => Err(other),
        }
    }

    async fn guarded<T>(&self, call: impl Future<Output = SkillBridgeResult<T>>) -> SkillBridgeResult<T> {
        let cancel = self.options.cancel.clone();
        let deadline = self.options.deadline;

        let cancelled = async move {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => {
                debug!(skill = %self.endpoint.skill_id, "Call cancelled");
                Err(SkillBridgeError::Cancelled("call cancelled by caller".into()))
            }
            _ = expired => {
                debug!(skill = %self.endpoint.skill_id, "Call deadline exceeded");
                Err(SkillBridgeError::Cancelled("deadline exceeded".into()))
            }
            result = call => result,
        }
    }
}

impl std::fmt::Debug for ApiExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiExecutor")
            .field("skill_id", &self.endpoint.skill_id)
            .field("base_url", &self.endpoint.base_url)
            .field("auth", &self.endpoint.auth.name())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatcherConfig;
    use skillbridge_security::RateLimits;
    use std::time::Duration;

    fn executor(auth: AuthKind, credentials: Credentials, limits: RateLimits) -> ApiExecutor {
        let endpoint = Arc::new(SkillEndpoint::new("trello", "http://127.0.0.1:9", auth));
        let limiter = Arc::new(RateLimiter::new("trello", &limits).unwrap());
        let dispatcher = Arc::new(RequestDispatcher::new(DispatcherConfig::default()).unwrap());
        ApiExecutor::new(endpoint, credentials, limiter, dispatcher)
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_spending_budget() {
        let exec = executor(
            AuthKind::Token { header_prefix: None },
            Credentials::new(),
            RateLimits::per_second(1.0, 1),
        );
        let err = exec.get("/members/me", QueryParams::new(), Value::Null).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(err.skill_id(), Some("trello"));
        assert!(exec.limiter().try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_covers_rate_limit_wait() {
        let exec = executor(
            AuthKind::Token { header_prefix: None },
            Credentials::from_fields([("token", "t0k3n")]),
            RateLimits::per_second(0.001, 1),
        );
        assert!(exec.limiter().try_acquire());

        let bounded = exec.with_options(CallOptions::default().with_timeout(Duration::from_millis(50)));
        let err = bounded.get("/boards", QueryParams::new(), Value::Null).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.transport().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_immediately() {
        let exec = executor(
            AuthKind::Token { header_prefix: None },
            Credentials::from_fields([("token", "t0k3n")]),
            RateLimits::per_second(0.001, 1),
        );
        let token = CancellationToken::new();
        token.cancel();
        let err = exec
            .with_options(CallOptions::default().with_cancel(token))
            .post("/cards", QueryParams::new(), json!({"name": "x"}))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        // The pre-cancelled call never took a token.
        assert!(exec.limiter().try_acquire());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let exec = executor(
            AuthKind::Token { header_prefix: None },
            Credentials::from_fields([("token", "very-secret-token")]),
            RateLimits::per_second(1.0, 1),
        );
        let printed = format!("{exec:?}");
        assert!(printed.contains("trello"));
        assert!(!printed.contains("very-secret-token"));
    }
}
