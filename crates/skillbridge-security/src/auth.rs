use crate::credentials::Credentials;
use base64::Engine;
use serde::{Deserialize, Serialize};
use skillbridge_core::{SkillBridgeError, SkillBridgeResult};
use std::collections::BTreeMap;

/// Credential field carrying the bearer token for `oauth2` and `token` auth.
pub const TOKEN_FIELD: &str = "token";
/// Credential field carrying the key for `api_key` auth.
pub const API_KEY_FIELD: &str = "apiKey";

const DEFAULT_HEADER_PREFIX: &str = "Bearer";
const AUTHORIZATION: &str = "Authorization";

/// Where an `api_key` credential is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPlacement {
    /// As a request header named `header_name`.
    #[default]
    Header,
    /// As a query parameter named `header_name`.
    Query,
}

/// What happens to the fields of `credentials` auth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPlacement {
    /// The adapter reads the fields and splices them itself.
    #[default]
    Manual,
    /// Every declared field is appended to the query string.
    Query,
}

/// The auth scheme a skill declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthKind {
    /// OAuth2 access token obtained by an external provider.
    #[serde(rename = "oauth2")]
    OAuth2 {
        /// Identity provider name (informational).
        provider: String,
        /// Authorization scheme, `Bearer` when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header_prefix: Option<String>,
    },
    /// Static personal/integration token.
    Token {
        /// Authorization scheme, `Bearer` when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header_prefix: Option<String>,
    },
    /// A raw API key sent without prefix.
    ApiKey {
        /// Header (or query parameter) name.
        header_name: String,
        /// Header or query string.
        #[serde(default)]
        placement: KeyPlacement,
    },
    /// HTTP basic auth built from two credential fields.
    Basic {
        /// Field holding the user name.
        #[serde(default = "default_username_field")]
        username_field: String,
        /// Field holding the password.
        #[serde(default = "default_password_field")]
        password_field: String,
    },
    /// Several named fields with no single bearer token (e.g. `apiKey` + `token`).
    Credentials {
        /// Required field names.
        fields: Vec<String>,
        /// Manual splicing by the adapter, or automatic query parameters.
        #[serde(default)]
        placement: FieldPlacement,
    },
}

fn default_username_field() -> String {
    "username".to_string()
}

fn default_password_field() -> String {
    "password".to_string()
}

impl AuthKind {
    /// Short scheme name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            AuthKind::OAuth2 { .. } => "oauth2",
            AuthKind::Token { .. } => "token",
            AuthKind::ApiKey { .. } => "api_key",
            AuthKind::Basic { .. } => "basic",
            AuthKind::Credentials { .. } => "credentials",
        }
    }

    /// Credential fields this scheme cannot work without.
    pub fn required_fields(&self) -> Vec<&str> {
        match self {
            AuthKind::OAuth2 { .. } | AuthKind::Token { .. } => vec![TOKEN_FIELD],
            AuthKind::ApiKey { .. } => vec![API_KEY_FIELD],
            AuthKind::Basic {
                username_field,
                password_field,
            } => vec![username_field.as_str(), password_field.as_str()],
            AuthKind::Credentials { fields, .. } => fields.iter().map(String::as_str).collect(),
        }
    }
}

/// Headers and query parameters produced for one outbound call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInjection {
    /// Headers to set, in order.
    pub headers: Vec<(String, String)>,
    /// Query parameters to append, in order.
    pub query: Vec<(String, String)>,
}

/// Renders an [`AuthKind`] and a [`Credentials`] bundle onto a request.
///
/// Every function is pure. Any missing or empty required field fails with
/// [`SkillBridgeError::Auth`] before anything is sent.
pub struct AuthInjector;

impl AuthInjector {
    /// Both channels at once.
    pub fn inject(auth: &AuthKind, credentials: &Credentials) -> SkillBridgeResult<AuthInjection> {
        Ok(AuthInjection {
            headers: Self::headers(auth, credentials)?,
            query: Self::query_params(auth, credentials)?,
        })
    }

    /// The header-producing path.
    pub fn headers(
        auth: &AuthKind,
        credentials: &Credentials,
    ) -> SkillBridgeResult<Vec<(String, String)>> {
        Self::validate(auth, credentials)?;
        let headers = match auth {
            AuthKind::OAuth2 { header_prefix, .. } | AuthKind::Token { header_prefix } => {
                let token = credentials.require(TOKEN_FIELD)?;
                vec![(
                    AUTHORIZATION.to_string(),
                    authorization_value(header_prefix.as_deref(), token),
                )]
            }
            AuthKind::ApiKey {
                header_name,
                placement: KeyPlacement::Header,
            } => vec![(
                header_name.clone(),
                credentials.require(API_KEY_FIELD)?.to_string(),
            )],
            AuthKind::Basic {
                username_field,
                password_field,
            } => {
                let user = credentials.require(username_field)?;
                let pass = credentials.require(password_field)?;
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
                vec![(AUTHORIZATION.to_string(), format!("Basic {encoded}"))]
            }
            AuthKind::ApiKey { .. } | AuthKind::Credentials { .. } => Vec::new(),
        };
        Ok(headers)
    }

    /// The query-param-producing path.
    pub fn query_params(
        auth: &AuthKind,
        credentials: &Credentials,
    ) -> SkillBridgeResult<Vec<(String, String)>> {
        Self::validate(auth, credentials)?;
        let params = match auth {
            AuthKind::ApiKey {
                header_name,
                placement: KeyPlacement::Query,
            } => vec![(
                header_name.clone(),
                credentials.require(API_KEY_FIELD)?.to_string(),
            )],
            AuthKind::Credentials {
                fields,
                placement: FieldPlacement::Query,
            } => fields
                .iter()
                .map(|name| Ok((name.clone(), credentials.require(name)?.to_string())))
                .collect::<SkillBridgeResult<Vec<_>>>()?,
            _ => Vec::new(),
        };
        Ok(params)
    }

    /// All required fields as a flat map, for adapters that splice them into
    /// a query string or body themselves.
    pub fn fields(
        auth: &AuthKind,
        credentials: &Credentials,
    ) -> SkillBridgeResult<BTreeMap<String, String>> {
        auth.required_fields()
            .into_iter()
            .map(|name| Ok((name.to_string(), credentials.require(name)?.to_string())))
            .collect()
    }

    fn validate(auth: &AuthKind, credentials: &Credentials) -> SkillBridgeResult<()> {
        for name in auth.required_fields() {
            credentials.require(name)?;
        }
        Ok(())
    }
}

fn authorization_value(prefix: Option<&str>, token: &str) -> String {
    match prefix.map(str::trim) {
        Some("") => token.to_string(),
        Some(prefix) => format!("{prefix} {token}"),
        None => format!("{DEFAULT_HEADER_PREFIX} {token}"),
    }
}
