//! Core types and error definitions for skillbridge.
//!
//! This crate provides the foundational types shared across all skillbridge
//! crates: the error taxonomy every outbound API call can produce, and the
//! tool call / tool result pair exchanged between the host and skill adapters.
//!
//! # Main types
//!
//! - [`SkillBridgeError`] — Unified error enum for auth, transport, network and cancellation failures.
//! - [`SkillBridgeResult`] — Convenience alias for `Result<T, SkillBridgeError>`.
//! - [`TransportError`] — A non-2xx response, carrying the provider's raw body.
//! - [`NetworkError`] — A call that never received a response.
//! - [`ToolCall`] — A request to invoke one tool of a skill.
//! - [`ToolResult`] — The result returned after executing a tool call.

/// Error taxonomy.
pub mod error;
/// Tool call and tool result types.
pub mod tool;

pub use error::{NetworkError, SkillBridgeError, SkillBridgeResult, TransportError};
pub use tool::{ToolCall, ToolResult};
