#![allow(clippy::unwrap_used, clippy::expect_used)]

use skillbridge_core::*;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// 1. ToolCall -> ToolResult flow
// ---------------------------------------------------------------------------

#[test]
fn tool_call_to_tool_result_flow() {
    let tool_call = ToolCall {
        id: "call_abc123".to_string(),
        name: "list_boards".to_string(),
        arguments: serde_json::json!({"member": "me"}),
    };

    let ok = ToolResult::success(&tool_call.id, "Found 3 boards");
    assert_eq!(ok.call_id, tool_call.id);
    assert!(!ok.is_error);

    let failed = ToolResult::error(&tool_call.id, "Trello API error: invalid key");
    assert_eq!(failed.call_id, tool_call.id);
    assert!(failed.is_error);
}

#[test]
fn tool_result_roundtrip_keeps_metadata() {
    let result = ToolResult::success("c1", "done").with_metadata("page", serde_json::json!(2));
    let json = serde_json::to_string(&result).unwrap();
    let back: ToolResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.metadata.unwrap()["page"], 2);
}

// ---------------------------------------------------------------------------
// 2. Error accessors see through the skill wrapper
// ---------------------------------------------------------------------------

#[test]
fn transport_data_reachable_through_api_wrapper() {
    let body = serde_json::json!({"err": "Team not authorized", "ECODE": "OAUTH_027"});
    let transport = TransportError::new(401, body.clone(), HashMap::new());
    let err = SkillBridgeError::api("clickup", SkillBridgeError::Transport(transport));

    assert_eq!(err.skill_id(), Some("clickup"));
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.data(), Some(&body));
    assert_eq!(err.data().unwrap()["ECODE"], "OAUTH_027");
    assert!(!err.is_network());
    assert!(err.to_string().contains("clickup"));
}

#[test]
fn raw_text_body_is_kept_verbatim() {
    let transport = TransportError::new(
        500,
        serde_json::Value::String("<html>Internal Error</html>".into()),
        HashMap::new(),
    );
    assert_eq!(transport.data, serde_json::json!("<html>Internal Error</html>"));
    assert!(transport.is_server_error());
}

#[test]
fn network_and_cancelled_have_no_data() {
    let net = SkillBridgeError::api("buffer", NetworkError::new("connection reset").into());
    assert!(net.is_network());
    assert!(net.data().is_none());
    assert!(net.status().is_none());

    let cancelled = SkillBridgeError::api("buffer", SkillBridgeError::Cancelled("deadline".into()));
    assert!(cancelled.is_cancelled());
    assert!(cancelled.transport().is_none());
}

#[test]
fn error_source_chain_exposes_original() {
    use std::error::Error;

    let err = SkillBridgeError::api("sentry", SkillBridgeError::Auth("token missing".into()));
    let source = err.source().expect("api errors carry a source");
    assert_eq!(source.to_string(), "Auth error: token missing");
}
