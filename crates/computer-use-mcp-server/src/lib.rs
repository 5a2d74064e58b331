//! computer-use-mcp-server: MCP server for desktop automation
//!
//! Thin protocol layer that wraps computer-use-core with MCP tool routing
//! and response formatting.

pub mod mcp;
pub mod mcp_content;
