//! Outbound HTTP for skillbridge.
//!
//! [`RequestDispatcher`] turns an [`OutboundRequest`] into a normalized
//! [`ApiResponse`] or a typed error. [`ApiExecutor`] wraps it with auth
//! injection, rate limiting, cancellation and skill attribution, and is the
//! only HTTP surface tool handlers see.
//!
//! # Main types
//!
//! - [`ApiExecutor`] — Authenticated, rate-limited facade bound to one skill.
//! - [`SkillEndpoint`] — Base URL, auth scheme and default headers of a skill.
//! - [`CallOptions`] — Cancellation token and deadline for a call.
//! - [`RequestDispatcher`] — URL resolution, header/body encoding, response decoding.
//! - [`QueryParams`] — Ordered multi-map of query parameters.

/// Request dispatching and response normalization.
pub mod dispatcher;
/// The per-skill API executor.
pub mod executor;
/// Query-string parameters.
pub mod query;
/// Outbound request description.
pub mod request;
/// Successful response types.
pub mod response;

pub use dispatcher::{DispatcherConfig, RequestDispatcher};
pub use executor::{ApiExecutor, CallOptions, SkillEndpoint};
pub use query::QueryParams;
pub use request::{OutboundRequest, RequestBody};
pub use response::{ApiResponse, ResponseBody};

pub use reqwest::Method;
pub use tokio_util::sync::CancellationToken;
