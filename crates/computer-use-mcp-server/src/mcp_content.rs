//! MCP content builders for tool results
//!
//! Every tool answers with a JSON text block. Screenshots returned inline
//! additionally carry the PNG as base64 image content ahead of the metadata.
//!
//! # Examples
//!
//! ```
//! use computer_use_core::ToolOutput;
//! use computer_use_mcp_server::mcp_content::build_tool_result;
//!
//! let output = ToolOutput {
//!     data: serde_json::json!({"method_used": "x11", "placeholder": false}),
//!     image: Some(vec![137, 80, 78, 71, 13, 10, 26, 10]),
//! };
//!
//! let result = build_tool_result(&output);
//! assert_eq!(result.content.len(), 2); // Image + metadata
//! ```

use base64::{Engine, engine::general_purpose::STANDARD};
use computer_use_core::ToolOutput;
use rmcp::model::{CallToolResult, Content};
use serde_json::Value;

/// MIME type of every capture payload, placeholder included
pub const PNG_MIME_TYPE: &str = "image/png";

/// Builds MCP image content from raw image bytes
///
/// # Examples
///
/// ```
/// use computer_use_mcp_server::mcp_content::build_image_content;
///
/// let png_data = vec![137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13];
/// let content = build_image_content(&png_data, "image/png");
///
/// assert!(content.as_image().is_some());
/// ```
pub fn build_image_content(data: &[u8], mime_type: &str) -> Content {
    Content::image(STANDARD.encode(data), mime_type)
}

/// Serializes `data` as a single text block
pub fn build_json_content(data: &Value) -> Content {
    let text = serde_json::to_string(data)
        .unwrap_or_else(|_| r#"{"error": "Failed to serialize tool output"}"#.to_string());
    Content::text(text)
}

/// Builds the tool-call result for a dispatcher output
///
/// Inline images come first so clients that only render the first block
/// still show the capture.
pub fn build_tool_result(output: &ToolOutput) -> CallToolResult {
    let mut content = Vec::with_capacity(2);
    if let Some(image) = &output.image {
        content.push(build_image_content(image, PNG_MIME_TYPE));
    }
    content.push(build_json_content(&output.data));
    CallToolResult::success(content)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_build_image_content_base64_encoding() {
        let data = b"test data";
        let content = build_image_content(data, PNG_MIME_TYPE);

        let image = content.as_image().unwrap();
        assert_eq!(STANDARD.decode(&image.data).unwrap(), data);
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn test_build_image_content_empty_data() {
        let content = build_image_content(&[], PNG_MIME_TYPE);
        assert!(content.as_image().is_some());
    }

    #[test]
    fn test_json_only_result() {
        let output = ToolOutput::json(json!({"x": 10, "y": 20}));

        let result = build_tool_result(&output);

        assert!(!result.is_error.unwrap_or(false));
        assert_eq!(result.content.len(), 1);
        let text = result.content[0].as_text().unwrap();
        let parsed: Value = serde_json::from_str(&text.text).unwrap();
        assert_eq!(parsed["x"], 10);
    }

    #[test]
    fn test_image_result_puts_image_first() {
        let output = ToolOutput {
            data: json!({"size_bytes": 4}),
            image: Some(vec![1, 2, 3, 4]),
        };

        let result = build_tool_result(&output);

        assert_eq!(result.content.len(), 2);
        assert!(result.content[0].as_image().is_some());
        assert!(result.content[1].as_text().unwrap().text.contains("size_bytes"));
    }
}
