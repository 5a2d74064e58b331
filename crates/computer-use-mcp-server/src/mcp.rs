//! MCP service implementation with tool routing
//!
//! Thin protocol layer over [`ActionDispatcher`]: each `#[tool]` method
//! unwraps its parameters, calls the dispatcher and converts the outcome
//! into a [`CallToolResult`] or an MCP error.

use std::sync::Arc;

use computer_use_core::{
    ActionDispatcher, DesktopContext, DesktopError, ToolOutput,
    dispatch::{
        ClickParams, DisplayParams, DragParams, KeyParams, ScreenshotParams, ScrollParams,
        StartXserverParams, StopXserverParams, TypeParams, WaitParams,
    },
    model::{ActionRequest, Capabilities, OsKind, PlatformProfile, SubEnvironment},
    platform::mock::MockHost,
    provider::{
        InputMethod, ScreenshotMethod,
        mock::{MockInputProvider, MockScreenshotProvider},
    },
    safety::SafetyConfig,
    util::mock_runner::MockCommandRunner,
};
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, ErrorCode, ErrorData as McpError, Implementation, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router,
};
use serde_json::Value;
use tracing::warn;

use crate::mcp_content::build_tool_result;

/// Converts a [`DesktopError`] to an MCP [`McpError`]
///
/// Safety rejections keep the JSON-RPC internal error code but carry only
/// the "Safety check failed" message, so clients can tell policy from
/// infrastructure. Infrastructure errors get the remediation hint appended
/// and the structured hint as error data.
pub fn convert_desktop_error_to_mcp(error: DesktopError) -> McpError {
    match &error {
        DesktopError::SafetyRejected { .. } => McpError::new(ErrorCode::INTERNAL_ERROR, error.to_string(), None),
        DesktopError::InvalidArgument { .. } => McpError::invalid_params(error.to_string(), None),
        _ => {
            warn!("Tool call failed: {}", error);
            let data = serde_json::to_value(error.structured_hint()).ok();
            McpError::internal_error(format!("{}. {}", error, error.remediation_hint()), data)
        }
    }
}

fn to_result(output: Result<ToolOutput, DesktopError>) -> Result<CallToolResult, McpError> {
    output
        .map(|output| build_tool_result(&output))
        .map_err(convert_desktop_error_to_mcp)
}

fn to_json_result(data: Result<Value, DesktopError>) -> Result<CallToolResult, McpError> {
    to_result(data.map(ToolOutput::json))
}

/// Platform profile used by [`ComputerUseMcpServer::new_with_mock`]
fn mock_profile() -> PlatformProfile {
    PlatformProfile {
        os: OsKind::Linux,
        sub_environment: SubEnvironment::Native,
        capabilities: Capabilities {
            can_use_x11: true,
            ..Default::default()
        },
        wsl_version: None,
        wsl_distro: None,
        display: Some(":0".to_string()),
        is_windows_server: false,
    }
}

/// Computer-use MCP server
///
/// Exposes screen capture, input injection, display management and platform
/// inspection tools. All tools share one [`DesktopContext`].
#[derive(Clone)]
pub struct ComputerUseMcpServer {
    tool_router: ToolRouter<Self>,
    dispatcher: ActionDispatcher,
}

#[tool_router]
impl ComputerUseMcpServer {
    /// Creates a server over an existing context
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use computer_use_core::{DesktopContext, safety::SafetyConfig};
    /// use computer_use_mcp_server::mcp::ComputerUseMcpServer;
    ///
    /// let context = Arc::new(DesktopContext::system(SafetyConfig::default()));
    /// let server = ComputerUseMcpServer::new(context);
    /// ```
    pub fn new(context: Arc<DesktopContext>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            dispatcher: ActionDispatcher::new(context),
        }
    }

    /// Server backed by the real host
    pub fn system() -> Self {
        Self::new(Arc::new(DesktopContext::system(SafetyConfig::default())))
    }

    /// Server on a scripted Linux/X11 host with mock providers
    ///
    /// Nothing touches the real machine: host tools answer through a
    /// [`MockCommandRunner`] and capture/input go to in-memory providers.
    pub fn new_with_mock() -> Self {
        let context = DesktopContext::new(
            Arc::new(MockCommandRunner::new()),
            Arc::new(MockHost::x11_desktop()),
            SafetyConfig::default(),
        )
        .with_profile(mock_profile())
        .with_screenshot_provider(Arc::new(MockScreenshotProvider::new(ScreenshotMethod::X11)))
        .with_input_provider(Arc::new(MockInputProvider::new(InputMethod::X11Xdotool)));
        Self::new(Arc::new(context))
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    // ========================================================================
    // Capture and input
    // ========================================================================

    /// Captures the screen
    ///
    /// Returns the PNG inline plus JSON metadata (`method_used`,
    /// `placeholder`, `attempts`, `guidance`). With `save_path` the file is
    /// written instead and only the metadata is returned.
    #[tool(description = "Take a screenshot. Optional: method override, region {x,y,width,height}, monitor index, save_path")]
    pub async fn screenshot(
        &self,
        Parameters(params): Parameters<ScreenshotParams>,
    ) -> Result<CallToolResult, McpError> {
        to_result(self.dispatcher.screenshot(params).await)
    }

    #[tool(description = "Click at screen coordinates with the left, right or middle button")]
    pub async fn click(&self, Parameters(params): Parameters<ClickParams>) -> Result<CallToolResult, McpError> {
        let request = params.into_request().map_err(convert_desktop_error_to_mcp)?;
        to_result(self.dispatcher.execute(request).await)
    }

    /// Types text after it passes the safety validator
    #[tool(name = "type", description = "Type text at the current focus. Dangerous commands are blocked")]
    pub async fn type_text(&self, Parameters(params): Parameters<TypeParams>) -> Result<CallToolResult, McpError> {
        to_result(self.dispatcher.execute(ActionRequest::Type { text: params.text }).await)
    }

    #[tool(description = "Press a key or combination such as Return, ctrl+c or alt+tab")]
    pub async fn key(&self, Parameters(params): Parameters<KeyParams>) -> Result<CallToolResult, McpError> {
        to_result(self.dispatcher.execute(ActionRequest::Key { key: params.key }).await)
    }

    #[tool(description = "Scroll up, down, left or right, optionally at a position")]
    pub async fn scroll(&self, Parameters(params): Parameters<ScrollParams>) -> Result<CallToolResult, McpError> {
        let request = params.into_request().map_err(convert_desktop_error_to_mcp)?;
        to_result(self.dispatcher.execute(request).await)
    }

    #[tool(description = "Drag the mouse from one position to another")]
    pub async fn drag(&self, Parameters(params): Parameters<DragParams>) -> Result<CallToolResult, McpError> {
        let request = ActionRequest::Drag {
            start_x: params.start_x,
            start_y: params.start_y,
            end_x: params.end_x,
            end_y: params.end_y,
        };
        to_result(self.dispatcher.execute(request).await)
    }

    #[tool(description = "Wait for a number of seconds (at most 60)")]
    pub async fn wait(&self, Parameters(params): Parameters<WaitParams>) -> Result<CallToolResult, McpError> {
        to_result(self.dispatcher.execute(ActionRequest::Wait { seconds: params.seconds }).await)
    }

    // ========================================================================
    // Display management
    // ========================================================================

    #[tool(description = "Install Xvfb and X11 utilities with apt-get (requires passwordless sudo)")]
    pub async fn install_xserver(&self) -> Result<CallToolResult, McpError> {
        to_json_result(self.dispatcher.install_xserver().await)
    }

    #[tool(description = "Start a virtual X display (defaults: display 99, 1920x1080). Reuses a running one")]
    pub async fn start_xserver(
        &self,
        Parameters(params): Parameters<StartXserverParams>,
    ) -> Result<CallToolResult, McpError> {
        to_json_result(self.dispatcher.start_xserver(params).await)
    }

    #[tool(description = "Stop a virtual X display started by this server")]
    pub async fn stop_xserver(
        &self,
        Parameters(params): Parameters<StopXserverParams>,
    ) -> Result<CallToolResult, McpError> {
        to_json_result(self.dispatcher.stop_xserver(params).await)
    }

    #[tool(description = "Route X11 from WSL to an X server (VcXsrv/X410) on the Windows host")]
    pub async fn setup_wsl_xforwarding(&self) -> Result<CallToolResult, McpError> {
        to_json_result(self.dispatcher.setup_wsl_xforwarding().await)
    }

    #[tool(description = "Report managed X servers, the current display and WSL mode")]
    pub async fn xserver_status(&self) -> Result<CallToolResult, McpError> {
        to_json_result(self.dispatcher.xserver_status())
    }

    #[tool(description = "Query an X display with xdpyinfo")]
    pub async fn test_display(
        &self,
        Parameters(params): Parameters<DisplayParams>,
    ) -> Result<CallToolResult, McpError> {
        to_json_result(self.dispatcher.test_display(params).await)
    }

    // ========================================================================
    // Platform information
    // ========================================================================

    #[tool(description = "Describe the host: OS, sub-environment, capabilities and recommended methods")]
    pub async fn get_platform_info(&self) -> Result<CallToolResult, McpError> {
        to_json_result(self.dispatcher.get_platform_info().await)
    }

    #[tool(description = "Check whether a display or GUI session is available for screenshots")]
    pub async fn check_display_available(
        &self,
        Parameters(params): Parameters<DisplayParams>,
    ) -> Result<CallToolResult, McpError> {
        to_json_result(self.dispatcher.check_display_available(params).await)
    }

    #[tool(description = "Recommended screenshot and input methods for this host, with fallbacks")]
    pub async fn get_recommended_methods(&self) -> Result<CallToolResult, McpError> {
        to_json_result(self.dispatcher.get_recommended_methods().await)
    }
}

impl Default for ComputerUseMcpServer {
    fn default() -> Self {
        Self::new_with_mock()
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for ComputerUseMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "computer-use-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Desktop automation for Linux/X11, WSL and Windows. Call get_platform_info first; \
                 use check_display_available or start_xserver when screenshots come back as \
                 placeholders."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}
