use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use skillbridge_core::{SkillBridgeError, SkillBridgeResult};
use std::collections::HashMap;
use std::fmt;

/// A per-user or per-install secret bundle (`apiKey`, `token`, `instanceUrl`, ...).
///
/// Owned by an external credential store; skillbridge only reads it.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Secret values by field name.
    #[serde(default)]
    pub fields: HashMap<String, String>,
    /// Identity of the user or installation the bundle belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl Credentials {
    /// An empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bundle from `(field, value)` pairs.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            owner: None,
        }
    }

    /// Add or replace one field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Tag the bundle with its owner.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// A field's value. Empty or whitespace-only values count as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// A field's value, or an auth error naming the missing field.
    pub fn require(&self, name: &str) -> SkillBridgeResult<&str> {
        self.get(name).ok_or_else(|| {
            SkillBridgeError::Auth(format!("missing or empty credential field '{name}'"))
        })
    }

    /// Every non-empty secret value, for redaction.
    pub fn secret_values(&self) -> impl Iterator<Item = &str> {
        self.fields
            .values()
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Credentials")
            .field("fields", &names)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Read-only seam to the external credential store.
///
/// Token refresh, storage and rotation happen behind this trait.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve the bundle for `skill_id`, optionally for a specific owner.
    async fn credentials(
        &self,
        skill_id: &str,
        owner: Option<&str>,
    ) -> SkillBridgeResult<Option<Credentials>>;
}

/// Process-local [`CredentialProvider`] used by tests and embedders.
///
/// Lookups for an owner fall back to the skill's owner-less bundle.
#[derive(Default)]
pub struct InMemoryCredentialProvider {
    entries: RwLock<HashMap<(String, Option<String>), Credentials>>,
}

impl InMemoryCredentialProvider {
    /// An empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `credentials` for `skill_id`, keyed by the bundle's owner.
    pub fn insert(&self, skill_id: impl Into<String>, credentials: Credentials) {
        let key = (skill_id.into(), credentials.owner.clone());
        self.entries.write().insert(key, credentials);
    }

    /// Drop a stored bundle. Returns whether one existed.
    pub fn remove(&self, skill_id: &str, owner: Option<&str>) -> bool {
        self.entries
            .write()
            .remove(&(skill_id.to_string(), owner.map(str::to_string)))
            .is_some()
    }
}

#[async_trait]
impl CredentialProvider for InMemoryCredentialProvider {
    async fn credentials(
        &self,
        skill_id: &str,
        owner: Option<&str>,
    ) -> SkillBridgeResult<Option<Credentials>> {
        let entries = self.entries.read();
        let exact = entries.get(&(skill_id.to_string(), owner.map(str::to_string)));
        let found = match exact {
            Some(c) => Some(c),
            None if owner.is_some() => entries.get(&(skill_id.to_string(), None)),
            None => None,
        };
        Ok(found.cloned())
    }
}
