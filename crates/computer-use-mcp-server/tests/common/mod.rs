//! Shared helpers for MCP integration tests

use computer_use_mcp_server::mcp::ComputerUseMcpServer;
use rmcp::model::CallToolResult;
use serde_json::Value;

/// Server on the scripted mock host
pub fn mock_server() -> ComputerUseMcpServer {
    ComputerUseMcpServer::new_with_mock()
}

/// JSON payload of a tool result (always the last content block)
pub fn json_payload(result: &CallToolResult) -> Value {
    let text = result
        .content
        .last()
        .and_then(|c| c.as_text())
        .expect("tool result should end with a text block");
    serde_json::from_str(&text.text).expect("text block should be JSON")
}
