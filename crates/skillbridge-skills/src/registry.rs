use crate::adapter::{SkillAdapter, ToolDescriptor};
use crate::config::SkillBridgeConfig;
use crate::context::{error_result, ToolExecutionContext};
use parking_lot::RwLock;
use serde_json::Value;
use skillbridge_core::{SkillBridgeError, SkillBridgeResult, ToolCall, ToolResult};
use skillbridge_http::{ApiExecutor, CallOptions, CancellationToken, RequestDispatcher};
use skillbridge_security::{BucketScope, CredentialProvider, Credentials, RateLimiterRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One tool call addressed to a skill.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Target skill.
    pub skill_id: String,
    /// Tool name, call id and arguments.
    pub call: ToolCall,
    /// Per-install configuration handed to the handler.
    pub skill_config: Value,
    /// Cancellation and deadline for the provider calls.
    pub options: CallOptions,
}

impl ToolInvocation {
    /// An invocation with no skill config and default options.
    pub fn new(skill_id: impl Into<String>, call: ToolCall) -> Self {
        Self {
            skill_id: skill_id.into(),
            call,
            skill_config: Value::Null,
            options: CallOptions::default(),
        }
    }

    /// Attach per-install configuration.
    pub fn with_config(mut self, skill_config: Value) -> Self {
        self.skill_config = skill_config;
        self
    }

    /// Attach cancellation and deadline.
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }
}

/// Central registry of skill adapters.
///
/// Owns the shared dispatcher and every rate-limit bucket, builds the
/// per-call [`ToolExecutionContext`] and runs tools.
pub struct SkillRegistry {
    skills: RwLock<HashMap<String, Arc<SkillAdapter>>>,
    limiters: Arc<RateLimiterRegistry>,
    dispatcher: Arc<RequestDispatcher>,
    credential_provider: Option<Arc<dyn CredentialProvider>>,
    bucket_idle: Duration,
}

impl SkillRegistry {
    /// Build a registry from executor-wide settings.
    ///
    /// Manifests in `config.skills` carry no tools, so they are not
    /// registered here; pass them to [`SkillAdapter::from_manifest`].
    pub fn new(config: &SkillBridgeConfig) -> SkillBridgeResult<Self> {
        let dispatcher = RequestDispatcher::new(config.dispatcher_config())?;
        Ok(Self::with_dispatcher(Arc::new(dispatcher), config.bucket_scope)
            .with_bucket_idle(config.bucket_idle()))
    }

    /// Build a registry around an existing dispatcher, with the default idle window.
    pub fn with_dispatcher(dispatcher: Arc<RequestDispatcher>, scope: BucketScope) -> Self {
        Self {
            skills: RwLock::new(HashMap::new()),
            limiters: Arc::new(RateLimiterRegistry::new(scope)),
            dispatcher,
            credential_provider: None,
            bucket_idle: SkillBridgeConfig::default().bucket_idle(),
        }
    }

    /// How long a full bucket may sit unused before the janitor drops it.
    pub fn with_bucket_idle(mut self, bucket_idle: Duration) -> Self {
        self.bucket_idle = bucket_idle;
        self
    }

    /// The idle window used by [`spawn_bucket_janitor`](Self::spawn_bucket_janitor).
    pub fn bucket_idle(&self) -> Duration {
        self.bucket_idle
    }

    /// Resolve credentials through `provider` in [`invoke`](Self::invoke).
    pub fn with_credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credential_provider = Some(provider);
        self
    }

    /// Register an adapter. Returns `false`, keeping the existing adapter,
    /// when the skill id is already taken.
    pub fn register(&self, adapter: SkillAdapter) -> bool {
        let mut skills = self.skills.write();
        if skills.contains_key(adapter.skill_id()) {
            warn!(skill = %adapter.skill_id(), "Skill already registered, keeping the first");
            return false;
        }
        info!(
            skill = %adapter.skill_id(),
            auth = adapter.auth().name(),
            tools = adapter.tool_count(),
            "Registered skill"
        );
        skills.insert(adapter.skill_id().to_string(), Arc::new(adapter));
        true
    }

    /// Look up an adapter by skill id.
    pub fn get(&self, skill_id: &str) -> Option<Arc<SkillAdapter>> {
        self.skills.read().get(skill_id).cloned()
    }

    /// Every registered adapter, sorted by skill id.
    pub fn list(&self) -> Vec<Arc<SkillAdapter>> {
        let mut adapters: Vec<Arc<SkillAdapter>> = self.skills.read().values().cloned().collect();
        adapters.sort_by(|a, b| a.skill_id().cmp(b.skill_id()));
        adapters
    }

    /// `(skill_id, descriptor)` for every tool of every skill.
    pub fn list_tools(&self) -> Vec<(String, ToolDescriptor)> {
        self.list()
            .iter()
            .flat_map(|adapter| {
                adapter
                    .tool_descriptors()
                    .into_iter()
                    .map(|d| (adapter.skill_id().to_string(), d.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Number of registered skills.
    pub fn skill_count(&self) -> usize {
        self.skills.read().len()
    }

    /// The bucket registry shared by every executor.
    pub fn limiters(&self) -> &Arc<RateLimiterRegistry> {
        &self.limiters
    }

    /// An executor for `skill_id` bound to `credentials`.
    pub fn executor(&self, skill_id: &str, credentials: Credentials) -> SkillBridgeResult<ApiExecutor> {
        let adapter = self.require(skill_id)?;
        self.executor_for(&adapter, credentials)
    }

    /// The context a tool of `skill_id` runs with.
    pub fn context(
        &self,
        skill_id: &str,
        call_id: &str,
        credentials: Credentials,
        skill_config: Value,
    ) -> SkillBridgeResult<ToolExecutionContext> {
        let api = self.executor(skill_id, credentials)?;
        Ok(ToolExecutionContext::new(call_id, api, skill_config))
    }

    /// Run one tool call with explicit credentials.
    ///
    /// Unknown skills or tools are errors. Any failure of the handler itself,
    /// including auth, transport, network and cancellation errors, comes back
    /// as an error [`ToolResult`] whose metadata carries the provider data.
    pub async fn execute(
        &self,
        invocation: ToolInvocation,
        credentials: Credentials,
    ) -> SkillBridgeResult<ToolResult> {
        let ToolInvocation {
            skill_id,
            call,
            skill_config,
            options,
        } = invocation;

        let adapter = self.require(&skill_id)?;
        let handler = adapter.tool(&call.name).cloned().ok_or_else(|| {
            SkillBridgeError::Skill(format!("Unknown tool '{}' for skill '{skill_id}'", call.name))
        })?;

        let api = self.executor_for(&adapter, credentials)?.with_options(options);
        let ctx = ToolExecutionContext::new(&call.id, api, skill_config);

        debug!(skill = %skill_id, tool = %call.name, call_id = %call.id, "Executing tool");
        match handler.execute(call.arguments, &ctx).await {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(
                    skill = %skill_id,
                    tool = %call.name,
                    kind = err.kind(),
                    status = ?err.status(),
                    "Tool execution failed"
                );
                Ok(error_result(&call.id, &err))
            }
        }
    }

    /// Run one tool call, resolving credentials through the configured
    /// [`CredentialProvider`].
    pub async fn invoke(
        &self,
        invocation: ToolInvocation,
        owner: Option<&str>,
    ) -> SkillBridgeResult<ToolResult> {
        let provider = self.credential_provider.as_ref().ok_or_else(|| {
            SkillBridgeError::Config("no credential provider configured".into())
        })?;
        let credentials = match provider.credentials(&invocation.skill_id, owner).await? {
            Some(credentials) => credentials,
            None => {
                let err = SkillBridgeError::api(
                    &invocation.skill_id,
                    SkillBridgeError::Auth(format!(
                        "no credentials stored for skill '{}'",
                        invocation.skill_id
                    )),
                );
                return Ok(error_result(&invocation.call.id, &err));
            }
        };
        let credentials = match (owner, credentials.owner.is_none()) {
            (Some(owner), true) => credentials.with_owner(owner),
            _ => credentials,
        };
        self.execute(invocation, credentials).await
    }

    /// Drop rate-limit buckets that sat idle and full for `max_idle`.
    pub fn cleanup_idle_buckets(&self, max_idle: Duration) -> usize {
        let removed = self.limiters.cleanup(max_idle);
        if removed > 0 {
            debug!(removed, "Dropped idle rate limit buckets");
        }
        removed
    }

    /// Every `every`, drop buckets idle for [`bucket_idle`](Self::bucket_idle),
    /// until `shutdown` is cancelled.
    pub fn spawn_bucket_janitor(&self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let limiters = self.limiters.clone();
        let max_idle = self.bucket_idle;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Bucket janitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = limiters.cleanup(max_idle);
                        if removed > 0 {
                            debug!(removed, "Dropped idle rate limit buckets");
                        }
                    }
                }
            }
        })
    }

    fn require(&self, skill_id: &str) -> SkillBridgeResult<Arc<SkillAdapter>> {
        self.get(skill_id)
            .ok_or_else(|| SkillBridgeError::Skill(format!("Unknown skill: {skill_id}")))
    }

    fn executor_for(
        &self,
        adapter: &SkillAdapter,
        credentials: Credentials,
    ) -> SkillBridgeResult<ApiExecutor> {
        let limiter = self.limiters.limiter(
            adapter.skill_id(),
            credentials.owner.as_deref(),
            adapter.rate_limits(),
        )?;
        Ok(ApiExecutor::new(
            adapter.endpoint().clone(),
            credentials,
            limiter,
            self.dispatcher.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ToolHandler;
    use async_trait::async_trait;
    use serde_json::json;
    use skillbridge_security::{AuthKind, RateLimits};

    struct Static {
        descriptor: ToolDescriptor,
    }

    #[async_trait]
    impl ToolHandler for Static {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(&self, params: Value, ctx: &ToolExecutionContext) -> SkillBridgeResult<ToolResult> {
            Ok(ctx.json(&json!({"skill": ctx.skill_id(), "params": params})))
        }
    }

    fn adapter(skill_id: &str, description: &str) -> SkillAdapter {
        SkillAdapter::builder(
            skill_id,
            "https://api.example.com",
            AuthKind::Token { header_prefix: None },
            RateLimits::per_second(2.0, 2),
        )
        .description(description)
        .tool(Arc::new(Static {
            descriptor: ToolDescriptor {
                name: "ping".into(),
                description: "ping".into(),
                parameters_schema: json!({"type": "object"}),
            },
        }))
        .build()
        .unwrap()
    }

    fn registry() -> SkillRegistry {
        SkillRegistry::new(&SkillBridgeConfig::default()).unwrap()
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = registry();
        assert!(registry.register(adapter("sentry", "first")));
        assert!(!registry.register(adapter("sentry", "second")));
        assert_eq!(registry.skill_count(), 1);
        assert_eq!(registry.get("sentry").unwrap().description(), "first");
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = registry();
        registry.register(adapter("trello", ""));
        registry.register(adapter("clickup", ""));
        let ids: Vec<String> = registry.list().iter().map(|a| a.skill_id().to_string()).collect();
        assert_eq!(ids, vec!["clickup", "trello"]);
        assert_eq!(registry.list_tools().len(), 2);
    }

    #[tokio::test]
    async fn test_execute_runs_handler_with_context() {
        let registry = registry();
        registry.register(adapter("sentry", ""));
        let call = ToolCall {
            id: "c1".into(),
            name: "ping".into(),
            arguments: json!({"n": 1}),
        };
        let result = registry
            .execute(ToolInvocation::new("sentry", call), Credentials::from_fields([("token", "t")]))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.call_id, "c1");
        let body: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(body["skill"], "sentry");
        assert_eq!(body["params"]["n"], 1);
    }

    #[tokio::test]
    async fn test_unknown_skill_and_tool_are_errors() {
        let registry = registry();
        registry.register(adapter("sentry", ""));
        let call = |name: &str| ToolCall {
            id: "c".into(),
            name: name.into(),
            arguments: Value::Null,
        };
        assert!(registry
            .execute(ToolInvocation::new("nope", call("ping")), Credentials::new())
            .await
            .is_err());
        let err = registry
            .execute(ToolInvocation::new("sentry", call("nope")), Credentials::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown tool"));
    }

    #[test]
    fn test_executor_shares_bucket_per_skill() {
        let registry = registry();
        registry.register(adapter("sentry", ""));
        let a = registry
            .executor("sentry", Credentials::from_fields([("token", "a")]).with_owner("alice"))
            .unwrap();
        let b = registry
            .executor("sentry", Credentials::from_fields([("token", "b")]).with_owner("bob"))
            .unwrap();
        assert!(Arc::ptr_eq(a.limiter(), b.limiter()));
        assert_eq!(registry.limiters().len(), 1);
    }
}
