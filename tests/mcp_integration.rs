//! Integration tests for MCP protocol handling.
//!
//! These tests verify the MCP server's JSON-RPC 2.0 protocol implementation,
//! including request/response handling, error responses, and lifecycle management.

use serde_json::json;

use apim_mcp::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use apim_mcp::mcp::tools::{DispatchError, ToolName, ToolRegistry};

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_tools_list_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/list",
        "params": {}
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "tools/list");
        assert_eq!(req.id, RequestId::Number(2));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Notification(notif) = result.unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_parse_invalid_json() {
    let json = "not valid json";

    let result = parse_message(json);
    assert!(result.is_err());
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    let result = parse_message(json);
    assert!(result.is_err());
}

#[test]
fn test_parse_string_id_tool_call() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": "call-1",
        "method": "tools/call",
        "params": {"name": "get_api", "arguments": {"apiId": "echo-api"}}
    }"#;

    let IncomingMessage::Request(req) = parse_message(json).unwrap() else {
        panic!("Expected Request");
    };
    assert_eq!(req.id, RequestId::String("call-1".to_string()));

    let invocation = ToolRegistry::new().prepare(req.params.as_ref()).unwrap();
    assert_eq!(invocation.tool(), ToolName::GetApi);
}

// =============================================================================
// Tool Validation Tests
// =============================================================================

#[test]
fn test_every_definition_is_a_known_tool() {
    let registry = ToolRegistry::new();
    for definition in registry.definitions() {
        assert!(definition.name.parse::<ToolName>().is_ok(), "{}", definition.name);
        assert!(definition.description.is_some());
    }
}

#[test]
fn test_required_arguments_follow_the_schema() {
    let registry = ToolRegistry::new();

    for definition in registry.definitions() {
        let Some(required) = definition.input_schema["required"].as_array() else {
            continue;
        };
        if required.is_empty() {
            continue;
        }

        let params = json!({"name": definition.name, "arguments": {}});
        let err = registry.prepare(Some(&params)).unwrap_err();
        let DispatchError::MissingArguments { missing, .. } = err else {
            panic!("expected missing arguments for {}", definition.name);
        };
        let expected: Vec<String> = required
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert_eq!(missing, expected);
    }
}

#[test]
fn test_create_api_revision_accepts_numeric_revision() {
    let params = json!({
        "name": "create_api_revision",
        "arguments": {"apiId": "echo-api", "apiRevision": 3}
    });
    let invocation = ToolRegistry::new().prepare(Some(&params)).unwrap();
    assert_eq!(invocation.tool(), ToolName::CreateApiRevision);
}

#[test]
fn test_invalid_enum_value_is_rejected() {
    let params = json!({
        "name": "create_product",
        "arguments": {"productId": "p", "displayName": "P", "state": "archived"}
    });
    let err = ToolRegistry::new().prepare(Some(&params)).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidArguments { .. }));
}
