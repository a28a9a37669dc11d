use serde::{Deserialize, Serialize};
use serde_json::Value;
use skillbridge_core::{SkillBridgeError, SkillBridgeResult};
use skillbridge_http::DispatcherConfig;
use skillbridge_security::{AuthKind, BucketScope, RateLimits};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Declarative part of a skill adapter, as found in a `[[skills]]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillManifest {
    /// Unique skill id.
    #[serde(alias = "id", alias = "skillId")]
    pub skill_id: String,
    /// Human-readable summary.
    #[serde(default)]
    pub description: String,
    /// Root URL of the provider API.
    #[serde(alias = "baseUrl")]
    pub base_url: String,
    /// How credentials are attached.
    pub auth: AuthKind,
    /// Traffic budget.
    #[serde(alias = "rateLimits")]
    pub rate_limits: RateLimits,
    /// Headers sent on every call.
    #[serde(default, alias = "defaultHeaders")]
    pub default_headers: BTreeMap<String, String>,
    /// JSON Schema of the per-install configuration.
    #[serde(default, alias = "configSchema", skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<Value>,
}

/// Executor-wide settings plus the skills to declare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillBridgeConfig {
    /// Share one bucket per skill, or split it per credential owner.
    #[serde(default)]
    pub bucket_scope: BucketScope,
    /// Default HTTP timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// `User-Agent` header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// 2xx bodies larger than this are rejected; error bodies are cut.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Idle time after which an unused, full bucket may be dropped.
    #[serde(default = "default_bucket_idle_secs")]
    pub bucket_idle_secs: u64,
    /// `[[skills]]` manifests.
    #[serde(default)]
    pub skills: Vec<SkillManifest>,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    concat!("skillbridge/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_response_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_bucket_idle_secs() -> u64 {
    600
}

impl Default for SkillBridgeConfig {
    fn default() -> Self {
        Self {
            bucket_scope: BucketScope::default(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: default_user_agent(),
            max_response_bytes: default_max_response_bytes(),
            bucket_idle_secs: default_bucket_idle_secs(),
            skills: Vec::new(),
        }
    }
}

impl SkillBridgeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> SkillBridgeResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| SkillBridgeError::Config(format!("invalid skillbridge config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> SkillBridgeResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject zero timeouts, invalid budgets and duplicate skill ids.
    pub fn validate(&self) -> SkillBridgeResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(SkillBridgeError::Config(
                "request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.max_response_bytes == 0 {
            return Err(SkillBridgeError::Config(
                "max_response_bytes must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for manifest in &self.skills {
            if !seen.insert(manifest.skill_id.as_str()) {
                return Err(SkillBridgeError::Config(format!(
                    "skill '{}' is declared twice",
                    manifest.skill_id
                )));
            }
            manifest.rate_limits.validate().map_err(|e| match e {
                SkillBridgeError::Config(msg) => {
                    SkillBridgeError::Config(format!("skill '{}': {msg}", manifest.skill_id))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Transport settings for the shared dispatcher.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            timeout: Duration::from_millis(self.request_timeout_ms),
            user_agent: self.user_agent.clone(),
            max_response_bytes: self.max_response_bytes,
        }
    }

    /// `bucket_idle_secs` as a `Duration`.
    pub fn bucket_idle(&self) -> Duration {
        Duration::from_secs(self.bucket_idle_secs)
    }

    /// The manifest declared for `skill_id`.
    pub fn manifest(&self, skill_id: &str) -> Option<&SkillManifest> {
        self.skills.iter().find(|m| m.skill_id == skill_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillbridge_security::KeyPlacement;

    #[test]
    fn test_defaults_when_empty() {
        let config = SkillBridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, SkillBridgeConfig::default());
        assert_eq!(config.dispatcher_config().timeout, Duration::from_secs(30));
        assert_eq!(config.bucket_scope, BucketScope::PerSkill);
    }

    #[test]
    fn test_parse_skills() {
        let config = SkillBridgeConfig::from_toml_str(
            r#"
            bucket_scope = "per_credential"
            request_timeout_ms = 5000

            [[skills]]
            skill_id = "calendly"
            base_url = "https://api.calendly.com"
            rate_limits = { requests_per_minute = 60, burst_limit = 5 }
            auth = { type = "api_key", header_name = "api_key", placement = "query" }

            [skills.default_headers]
            Accept = "application/json"
            "#,
        )
        .unwrap();

        assert_eq!(config.bucket_scope, BucketScope::PerCredential);
        let calendly = config.manifest("calendly").unwrap();
        assert_eq!(calendly.rate_limits.refill_per_second(), 1.0);
        assert_eq!(
            calendly.auth,
            AuthKind::ApiKey {
                header_name: "api_key".into(),
                placement: KeyPlacement::Query,
            }
        );
        assert_eq!(calendly.default_headers.len(), 1);
    }

    #[test]
    fn test_duplicate_skill_rejected() {
        let err = SkillBridgeConfig::from_toml_str(
            r#"
            [[skills]]
            skill_id = "x"
            base_url = "https://x.io"
            rate_limits = { requests_per_second = 1, burst_limit = 1 }
            auth = { type = "token" }

            [[skills]]
            skill_id = "x"
            base_url = "https://x.io"
            rate_limits = { requests_per_second = 1, burst_limit = 1 }
            auth = { type = "token" }
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_zero_burst_rejected() {
        let err = SkillBridgeConfig::from_toml_str(
            r#"
            [[skills]]
            skill_id = "x"
            base_url = "https://x.io"
            rate_limits = { requests_per_second = 1, burst_limit = 0 }
            auth = { type = "token" }
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("burst_limit"));
    }
}
