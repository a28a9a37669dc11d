//! Security primitives for skillbridge.
//!
//! Provides credential bundles, auth injection, per-skill rate limiting and
//! log redaction used by the HTTP executor.
//!
//! # Main types
//!
//! - [`AuthKind`] — The closed set of auth schemes a skill can declare.
//! - [`AuthInjector`] — Renders an [`AuthKind`] plus [`Credentials`] onto a request.
//! - [`Credentials`] — A per-user/per-install secret bundle.
//! - [`CredentialProvider`] — Read-only access to an external credential store.
//! - [`RateLimiter`] — Token-bucket limiter with FIFO waiters, one per skill identity.
//! - [`RateLimiterRegistry`] — Owns every bucket, keyed by skill (and optionally owner).
//! - [`Redactor`] — Strips credential values out of log lines and error messages.

/// Auth schemes and injection.
pub mod auth;
/// Credential bundles and providers.
pub mod credentials;
/// Token-bucket rate limiting.
pub mod rate_limit;
/// Secret redaction for logs.
pub mod redact;

pub use auth::{AuthInjection, AuthInjector, AuthKind, FieldPlacement, KeyPlacement};
pub use credentials::{CredentialProvider, Credentials, InMemoryCredentialProvider};
pub use rate_limit::{BucketScope, BudgetKey, RateLimiter, RateLimiterRegistry, RateLimits};
pub use redact::Redactor;
