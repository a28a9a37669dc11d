use crate::config::SkillManifest;
use crate::context::ToolExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skillbridge_core::{SkillBridgeError, SkillBridgeResult, ToolResult};
use skillbridge_http::SkillEndpoint;
use skillbridge_security::{AuthKind, RateLimits};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Metadata describing one tool's interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, unique within its skill.
    pub name: String,
    /// Human-readable summary.
    pub description: String,
    /// JSON Schema of the parameters.
    pub parameters_schema: Value,
}

/// One callable operation of a skill.
///
/// Handlers receive already-validated parameters and reach the provider only
/// through [`ToolExecutionContext::api`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name, description and parameter schema.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Run the tool. Errors are turned into error results by the registry.
    async fn execute(&self, params: Value, ctx: &ToolExecutionContext) -> SkillBridgeResult<ToolResult>;
}

/// Static description of one third-party integration plus its tools.
///
/// Immutable once built; the registry shares it as `Arc<SkillAdapter>`.
pub struct SkillAdapter {
    endpoint: Arc<SkillEndpoint>,
    description: String,
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    rate_limits: RateLimits,
    config_schema: Option<Value>,
}

impl SkillAdapter {
    /// Start describing a skill.
    pub fn builder(
        skill_id: impl Into<String>,
        base_url: impl Into<String>,
        auth: AuthKind,
        rate_limits: RateLimits,
    ) -> SkillAdapterBuilder {
        SkillAdapterBuilder {
            skill_id: skill_id.into(),
            base_url: base_url.into(),
            auth,
            rate_limits,
            description: String::new(),
            default_headers: BTreeMap::new(),
            config_schema: None,
            tools: Vec::new(),
        }
    }

    /// Start from a declarative manifest; tools are attached afterwards.
    pub fn from_manifest(manifest: SkillManifest) -> SkillAdapterBuilder {
        SkillAdapterBuilder {
            skill_id: manifest.skill_id,
            base_url: manifest.base_url,
            auth: manifest.auth,
            rate_limits: manifest.rate_limits,
            description: manifest.description,
            default_headers: manifest.default_headers,
            config_schema: manifest.config_schema,
            tools: Vec::new(),
        }
    }

    /// Unique skill id.
    pub fn skill_id(&self) -> &str {
        &self.endpoint.skill_id
    }

    /// Human-readable summary.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Root URL of the provider API.
    pub fn base_url(&self) -> &str {
        &self.endpoint.base_url
    }

    /// How credentials are attached.
    pub fn auth(&self) -> &AuthKind {
        &self.endpoint.auth
    }

    /// Traffic budget of this skill.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Headers sent on every call.
    pub fn default_headers(&self) -> &BTreeMap<String, String> {
        &self.endpoint.default_headers
    }

    /// JSON Schema of the per-install configuration, if any.
    pub fn config_schema(&self) -> Option<&Value> {
        self.config_schema.as_ref()
    }

    /// Shared endpoint description handed to every executor of this skill.
    pub fn endpoint(&self) -> &Arc<SkillEndpoint> {
        &self.endpoint
    }

    /// Look up a tool by name.
    pub fn tool(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.tools.get(name)
    }

    /// Descriptors of every tool, sorted by name.
    pub fn tool_descriptors(&self) -> Vec<&ToolDescriptor> {
        let mut descriptors: Vec<&ToolDescriptor> =
            self.tools.values().map(|t| t.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Number of tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

impl std::fmt::Debug for SkillAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tools: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        tools.sort_unstable();
        f.debug_struct("SkillAdapter")
            .field("skill_id", &self.endpoint.skill_id)
            .field("base_url", &self.endpoint.base_url)
            .field("auth", &self.endpoint.auth.name())
            .field("rate_limits", &self.rate_limits)
            .field("tools", &tools)
            .finish()
    }
}

/// Builder for [`SkillAdapter`].
pub struct SkillAdapterBuilder {
    skill_id: String,
    base_url: String,
    auth: AuthKind,
    rate_limits: RateLimits,
    description: String,
    default_headers: BTreeMap<String, String>,
    config_schema: Option<Value>,
    tools: Vec<Arc<dyn ToolHandler>>,
}

impl SkillAdapterBuilder {
    /// Human-readable summary.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Header sent on every call of this skill.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// JSON schema of the per-install `skill_config`.
    pub fn config_schema(mut self, schema: Value) -> Self {
        self.config_schema = Some(schema);
        self
    }

    /// Attach a tool. Names must be unique.
    pub fn tool(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.tools.push(handler);
        self
    }

    /// Validate and freeze the adapter.
    pub fn build(self) -> SkillBridgeResult<SkillAdapter> {
        let skill_id = self.skill_id.trim().to_string();
        if skill_id.is_empty() {
            return Err(SkillBridgeError::Config("skill_id must not be empty".into()));
        }
        validate_base_url(&skill_id, &self.base_url)?;
        self.rate_limits.validate().map_err(|e| match e {
            SkillBridgeError::Config(msg) => {
                SkillBridgeError::Config(format!("skill '{skill_id}': {msg}"))
            }
            other => other,
        })?;

        let mut tools: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        for handler in self.tools {
            let name = handler.descriptor().name.clone();
            if tools.insert(name.clone(), handler).is_some() {
                return Err(SkillBridgeError::Config(format!(
                    "skill '{skill_id}' declares tool '{name}' twice"
                )));
            }
        }

        let endpoint = SkillEndpoint {
            skill_id,
            base_url: self.base_url,
            auth: self.auth,
            default_headers: self.default_headers,
        };
        Ok(SkillAdapter {
            endpoint: Arc::new(endpoint),
            description: self.description,
            tools,
            rate_limits: self.rate_limits,
            config_schema: self.config_schema,
        })
    }
}

fn validate_base_url(skill_id: &str, base_url: &str) -> SkillBridgeResult<()> {
    let lower = base_url.trim().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(SkillBridgeError::Config(format!(
            "skill '{skill_id}': base_url must be an http(s) URL, got '{base_url}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo {
        descriptor: ToolDescriptor,
    }

    impl Echo {
        fn named(name: &str) -> Arc<dyn ToolHandler> {
            Arc::new(Self {
                descriptor: ToolDescriptor {
                    name: name.to_string(),
                    description: "echo".to_string(),
                    parameters_schema: json!({"type": "object"}),
                },
            })
        }
    }

    #[async_trait]
    impl ToolHandler for Echo {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(&self, params: Value, ctx: &ToolExecutionContext) -> SkillBridgeResult<ToolResult> {
            Ok(ToolResult::success(ctx.call_id(), params.to_string()))
        }
    }

    fn token() -> AuthKind {
        AuthKind::Token { header_prefix: None }
    }

    #[test]
    fn test_builder_collects_tools() {
        let adapter = SkillAdapter::builder("sentry", "https://sentry.io/api/0", token(), RateLimits::per_second(5.0, 10))
            .description("Sentry issues")
            .default_header("Accept", "application/json")
            .tool(Echo::named("list_issues"))
            .tool(Echo::named("get_issue"))
            .build()
            .unwrap();

        assert_eq!(adapter.skill_id(), "sentry");
        assert_eq!(adapter.tool_count(), 2);
        let names: Vec<&str> = adapter.tool_descriptors().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["get_issue", "list_issues"]);
        assert!(adapter.tool("missing").is_none());
        assert_eq!(adapter.default_headers().get("Accept").map(String::as_str), Some("application/json"));
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let err = SkillAdapter::builder("sentry", "https://sentry.io/api/0", token(), RateLimits::per_second(5.0, 10))
            .tool(Echo::named("list_issues"))
            .tool(Echo::named("list_issues"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_invalid_declarations_rejected() {
        let zero_burst = RateLimits::per_second(5.0, 0);
        assert!(SkillAdapter::builder("s", "https://x.io", token(), zero_burst).build().is_err());
        let limits = RateLimits::per_second(5.0, 1);
        assert!(SkillAdapter::builder("s", "ftp://x.io", token(), limits).build().is_err());
        assert!(SkillAdapter::builder(" ", "https://x.io", token(), limits).build().is_err());
    }
}
