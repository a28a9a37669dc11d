use serde_json::Value;
use skillbridge_core::{SkillBridgeError, ToolResult};
use skillbridge_http::{ApiExecutor, CallOptions};
use skillbridge_security::Credentials;

/// Everything one tool invocation may use.
///
/// Built per call by the registry. The executor inside is already bound to
/// the skill, its credentials and its rate-limit bucket.
#[derive(Debug, Clone)]
pub struct ToolExecutionContext {
    call_id: String,
    api: ApiExecutor,
    skill_config: Value,
}

impl ToolExecutionContext {
    /// Bind a call id, an executor and the per-install config.
    pub fn new(call_id: impl Into<String>, api: ApiExecutor, skill_config: Value) -> Self {
        Self {
            call_id: call_id.into(),
            api,
            skill_config,
        }
    }

    /// Id of the tool call being served, for building [`ToolResult`]s.
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// The skill this call belongs to.
    pub fn skill_id(&self) -> &str {
        self.api.skill_id()
    }

    /// The authenticated, rate-limited HTTP facade.
    pub fn api(&self) -> &ApiExecutor {
        &self.api
    }

    /// Resolved credential bundle, for adapters that splice fields manually.
    pub fn credentials(&self) -> &Credentials {
        self.api.credentials()
    }

    /// Per-install configuration of the skill (workspace ids, defaults, ...).
    pub fn skill_config(&self) -> &Value {
        &self.skill_config
    }

    /// One top-level entry of the skill config.
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.skill_config.get(key)
    }

    /// A string entry of the skill config, ignoring empty strings.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config_value(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// A copy whose API calls honor `options`.
    pub fn with_options(&self, options: CallOptions) -> Self {
        Self {
            call_id: self.call_id.clone(),
            api: self.api.with_options(options),
            skill_config: self.skill_config.clone(),
        }
    }

    /// A successful result for this call.
    pub fn success(&self, content: impl Into<String>) -> ToolResult {
        ToolResult::success(&self.call_id, content)
    }

    /// A success result carrying `value` serialized as JSON.
    pub fn json(&self, value: &Value) -> ToolResult {
        ToolResult::success(&self.call_id, value.to_string())
    }

    /// An error result for this call.
    pub fn error(&self, content: impl Into<String>) -> ToolResult {
        ToolResult::error(&self.call_id, content)
    }
}

/// Turn a failed invocation into an error [`ToolResult`].
///
/// The provider's raw body, status and error category travel in `metadata`
/// so callers can inspect them without parsing `content`.
pub fn error_result(call_id: &str, err: &SkillBridgeError) -> ToolResult {
    let mut result = ToolResult::error(call_id, err.to_string())
        .with_metadata("error_kind", Value::from(err.kind()));
    if let Some(skill_id) = err.skill_id() {
        result = result.with_metadata("skill_id", Value::from(skill_id));
    }
    if let Some(transport) = err.transport() {
        result = result
            .with_metadata("status", Value::from(transport.status))
            .with_metadata("data", transport.data.clone());
    }
    result
}
