//! Skill adapters and tool execution for skillbridge.
//!
//! A [`SkillAdapter`] declares one integration (base URL, auth scheme, rate
//! limits, default headers) and its [`ToolHandler`]s. The [`SkillRegistry`]
//! holds adapters, builds a [`ToolExecutionContext`] per call and turns
//! handler failures into error [`ToolResult`](skillbridge_core::ToolResult)s.
//!
//! # Main types
//!
//! - [`SkillAdapter`] — One integration: endpoint, auth, budget and tools.
//! - [`ToolHandler`] — A callable operation of a skill.
//! - [`ToolExecutionContext`] — What a handler gets for one call.
//! - [`SkillRegistry`] — Holds adapters and runs tool calls.
//! - [`SkillBridgeConfig`] — Executor-wide settings loaded from TOML.

/// Skill adapters and the tool handler trait.
pub mod adapter;
/// TOML configuration and skill manifests.
pub mod config;
/// The per-call tool execution context.
pub mod context;
/// The skill registry and tool invocation.
pub mod registry;

pub use adapter::{SkillAdapter, SkillAdapterBuilder, ToolDescriptor, ToolHandler};
pub use config::{SkillBridgeConfig, SkillManifest};
pub use context::{error_result, ToolExecutionContext};
pub use registry::{SkillRegistry, ToolInvocation};
