//! Enum-keyed tool dispatch
//!
//! [`ToolName`] is the closed set of tools the server exposes. Every call
//! goes through [`ActionDispatcher`], which validates the request with the
//! context's [`SafetyValidator`](crate::safety::SafetyValidator) before any
//! provider is resolved, so a rejected request never reaches the host.

use std::{future::Future, path::Path, str::FromStr, sync::Arc, time::Duration};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    constants::{
        DEFAULT_DISPLAY_HEIGHT, DEFAULT_DISPLAY_NUMBER, DEFAULT_DISPLAY_WIDTH, INPUT_MAX_ATTEMPTS,
        INPUT_RETRY_DELAY_MS, MAX_TEXT_LENGTH,
    },
    context::DesktopContext,
    error::{DesktopError, DesktopResult},
    model::{
        ActionKind, ActionRequest, ActionResult, MouseButton, OsKind, PlatformProfile, Region,
        ScrollDirection, SubEnvironment,
    },
    platform::{detect_wsl, wsl_host_ip},
    provider::{ScreenshotMethod, recommended_methods, vcxsrv_display},
    safety::{parse_button, parse_direction},
};

// ============================================================================
// Tool names
// ============================================================================

/// Every tool the server exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    Screenshot,
    Click,
    Type,
    Key,
    Scroll,
    Drag,
    Wait,
    InstallXserver,
    StartXserver,
    StopXserver,
    SetupWslXforwarding,
    XserverStatus,
    TestDisplay,
    GetPlatformInfo,
    CheckDisplayAvailable,
    GetRecommendedMethods,
}

impl ToolName {
    pub const ALL: [ToolName; 16] = [
        ToolName::Screenshot,
        ToolName::Click,
        ToolName::Type,
        ToolName::Key,
        ToolName::Scroll,
        ToolName::Drag,
        ToolName::Wait,
        ToolName::InstallXserver,
        ToolName::StartXserver,
        ToolName::StopXserver,
        ToolName::SetupWslXforwarding,
        ToolName::XserverStatus,
        ToolName::TestDisplay,
        ToolName::GetPlatformInfo,
        ToolName::CheckDisplayAvailable,
        ToolName::GetRecommendedMethods,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Screenshot => "screenshot",
            ToolName::Click => "click",
            ToolName::Type => "type",
            ToolName::Key => "key",
            ToolName::Scroll => "scroll",
            ToolName::Drag => "drag",
            ToolName::Wait => "wait",
            ToolName::InstallXserver => "install_xserver",
            ToolName::StartXserver => "start_xserver",
            ToolName::StopXserver => "stop_xserver",
            ToolName::SetupWslXforwarding => "setup_wsl_xforwarding",
            ToolName::XserverStatus => "xserver_status",
            ToolName::TestDisplay => "test_display",
            ToolName::GetPlatformInfo => "get_platform_info",
            ToolName::CheckDisplayAvailable => "check_display_available",
            ToolName::GetRecommendedMethods => "get_recommended_methods",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = DesktopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| DesktopError::invalid("tool", format!("unknown tool '{s}'")))
    }
}

// ============================================================================
// Tool parameters
// ============================================================================

/// Parameters for the screenshot tool
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ScreenshotParams {
    /// Capture method override (e.g. "x11", "wsl2_powershell"); "auto" or
    /// omitted routes by platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Write the PNG here instead of returning it inline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Capture only this region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    /// Zero-based monitor index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<u32>,
}

/// Parameters for the click tool
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ClickParams {
    pub x: i64,
    pub y: i64,
    /// "left" (default), "right" or "middle"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct TypeParams {
    /// Text to type
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct KeyParams {
    /// Key or combination such as "Return" or "ctrl+c"
    pub key: String,
}

/// Parameters for the scroll tool
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ScrollParams {
    /// "up", "down" (default), "left" or "right"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// Number of wheel steps (default: 3)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
    /// Pointer position to scroll at; requires `y` as well
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct DragParams {
    pub start_x: i64,
    pub start_y: i64,
    pub end_x: i64,
    pub end_y: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct WaitParams {
    /// Seconds to wait (0 < seconds <= 60)
    pub seconds: f64,
}

/// Parameters for the start_xserver tool
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct StartXserverParams {
    /// Display number (default: 99)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_num: Option<u32>,
    /// Width in pixels (default: 1920)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Height in pixels (default: 1080)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct StopXserverParams {
    /// Display id such as ":99"
    pub display: String,
}

/// Optional display selector shared by the display probing tools
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct DisplayParams {
    /// Display id such as ":0"; defaults to the current display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl ClickParams {
    pub fn into_request(self) -> DesktopResult<ActionRequest> {
        let button = match self.button.as_deref() {
            Some(name) => parse_button(name)?,
            None => MouseButton::default(),
        };
        Ok(ActionRequest::Click { x: self.x, y: self.y, button })
    }
}

impl ScrollParams {
    pub fn into_request(self) -> DesktopResult<ActionRequest> {
        let direction = match self.direction.as_deref() {
            Some(name) => parse_direction(name)?,
            None => ScrollDirection::default(),
        };
        Ok(ActionRequest::Scroll {
            direction,
            amount: self.amount.unwrap_or(3),
            x: self.x,
            y: self.y,
        })
    }
}

// ============================================================================
// Output
// ============================================================================

/// Result of a dispatched tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// JSON payload returned to the caller
    pub data: Value,
    /// Captured PNG when a screenshot is returned inline
    pub image: Option<Vec<u8>>,
}

impl ToolOutput {
    pub fn json(data: Value) -> Self {
        Self { data, image: None }
    }
}

fn to_json<T: Serialize>(value: &T) -> DesktopResult<Value> {
    serde_json::to_value(value).map_err(|e| DesktopError::Io {
        context: "serialize tool output".to_string(),
        reason: e.to_string(),
    })
}

fn parse_args<T: DeserializeOwned>(tool: ToolName, args: Value) -> DesktopResult<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| DesktopError::invalid("arguments", format!("{tool}: {e}")))
}

/// Validated form of an [`ActionRequest`]
#[derive(Debug)]
enum Prepared {
    Click { at: (u32, u32), button: MouseButton },
    Type(String),
    Key(String),
    Scroll { direction: ScrollDirection, amount: u32, at: Option<(u32, u32)> },
    Drag { from: (u32, u32), to: (u32, u32) },
    Wait(Duration),
    Screenshot { method: Option<ScreenshotMethod>, region: Option<Region>, monitor: Option<u32> },
}

fn parse_method(method: Option<&str>) -> DesktopResult<Option<ScreenshotMethod>> {
    match method.map(str::trim) {
        None | Some("") | Some("auto") => Ok(None),
        Some(name) => name.parse().map(Some),
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Validates and executes tool calls against a [`DesktopContext`]
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    context: Arc<DesktopContext>,
}

impl ActionDispatcher {
    pub fn new(context: Arc<DesktopContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &DesktopContext {
        &self.context
    }

    /// Runs a tool by name with JSON arguments
    ///
    /// Unknown names and malformed arguments both surface as
    /// [`DesktopError::InvalidArgument`].
    pub async fn dispatch(&self, name: &str, args: Value) -> DesktopResult<ToolOutput> {
        let tool: ToolName = name.parse()?;
        debug!("Dispatching tool {}", tool);

        match tool {
            ToolName::Screenshot => self.screenshot(parse_args(tool, args)?).await,
            ToolName::Click => {
                let params: ClickParams = parse_args(tool, args)?;
                self.execute(params.into_request()?).await
            }
            ToolName::Type => {
                let params: TypeParams = parse_args(tool, args)?;
                self.execute(ActionRequest::Type { text: params.text }).await
            }
            ToolName::Key => {
                let params: KeyParams = parse_args(tool, args)?;
                self.execute(ActionRequest::Key { key: params.key }).await
            }
            ToolName::Scroll => {
                let params: ScrollParams = parse_args(tool, args)?;
                self.execute(params.into_request()?).await
            }
            ToolName::Drag => {
                let p: DragParams = parse_args(tool, args)?;
                self.execute(ActionRequest::Drag {
                    start_x: p.start_x,
                    start_y: p.start_y,
                    end_x: p.end_x,
                    end_y: p.end_y,
                })
                .await
            }
            ToolName::Wait => {
                let params: WaitParams = parse_args(tool, args)?;
                self.execute(ActionRequest::Wait { seconds: params.seconds }).await
            }
            ToolName::InstallXserver => self.install_xserver().await.map(ToolOutput::json),
            ToolName::StartXserver => self.start_xserver(parse_args(tool, args)?).await.map(ToolOutput::json),
            ToolName::StopXserver => self.stop_xserver(parse_args(tool, args)?).await.map(ToolOutput::json),
            ToolName::SetupWslXforwarding => self.setup_wsl_xforwarding().await.map(ToolOutput::json),
            ToolName::XserverStatus => self.xserver_status().map(ToolOutput::json),
            ToolName::TestDisplay => self.test_display(parse_args(tool, args)?).await.map(ToolOutput::json),
            ToolName::GetPlatformInfo => self.get_platform_info().await.map(ToolOutput::json),
            ToolName::CheckDisplayAvailable => self
                .check_display_available(parse_args(tool, args)?)
                .await
                .map(ToolOutput::json),
            ToolName::GetRecommendedMethods => self.get_recommended_methods().await.map(ToolOutput::json),
        }
    }

    /// [`execute`](Self::execute) folded into an [`ActionResult`]
    pub async fn run(&self, request: ActionRequest) -> ActionResult {
        match self.execute(request).await {
            Ok(output) => ActionResult::ok(output.data),
            Err(e) => ActionResult::failed(&e),
        }
    }

    /// Validates `request`, resolves a provider and performs the action
    pub async fn execute(&self, request: ActionRequest) -> DesktopResult<ToolOutput> {
        let kind = request.kind();
        let prepared = self.prepare(request)?;

        match prepared {
            Prepared::Wait(duration) => {
                tokio::time::sleep(duration).await;
                Ok(ToolOutput::json(json!({ "waited_seconds": duration.as_secs_f64() })))
            }
            Prepared::Screenshot { method, region, monitor } => {
                let profile = self.context.profile().await;
                self.capture(&profile, method, region, monitor, None).await
            }
            input => self.execute_input(kind, input).await,
        }
    }

    fn prepare(&self, request: ActionRequest) -> DesktopResult<Prepared> {
        let validator = self.context.validator();

        let prepared = match request {
            ActionRequest::Click { x, y, button } => Prepared::Click {
                at: validator.check_coordinates(x, y)?,
                button,
            },
            ActionRequest::Type { text } => {
                if text.is_empty() {
                    return Err(DesktopError::invalid("text", "must not be empty"));
                }
                if text.chars().count() > MAX_TEXT_LENGTH {
                    return Err(DesktopError::invalid(
                        "text",
                        format!("longer than {MAX_TEXT_LENGTH} characters"),
                    ));
                }
                validator.check_text(&text)?;
                Prepared::Type(text)
            }
            ActionRequest::Key { key } => Prepared::Key(validator.check_key(&key)?),
            ActionRequest::Scroll { direction, amount, x, y } => {
                if !validator.validate_scroll_amount(amount) {
                    return Err(DesktopError::invalid("amount", format!("{amount} outside 1..=100")));
                }
                let at = match (x, y) {
                    (Some(x), Some(y)) => Some(validator.check_coordinates(x, y)?),
                    (None, None) => None,
                    _ => return Err(DesktopError::invalid("coordinates", "x and y must be given together")),
                };
                Prepared::Scroll { direction, amount, at }
            }
            ActionRequest::Drag { start_x, start_y, end_x, end_y } => Prepared::Drag {
                from: validator.check_coordinates(start_x, start_y)?,
                to: validator.check_coordinates(end_x, end_y)?,
            },
            ActionRequest::Wait { seconds } => {
                if !validator.validate_wait(seconds) {
                    return Err(DesktopError::invalid("seconds", "must be greater than 0 and at most 60"));
                }
                Prepared::Wait(Duration::from_secs_f64(seconds))
            }
            ActionRequest::Screenshot { method, region, monitor } => {
                if region.is_some_and(|r| r.width == 0 || r.height == 0) {
                    return Err(DesktopError::invalid("region", "width and height must be positive"));
                }
                Prepared::Screenshot {
                    method: parse_method(method.as_deref())?,
                    region,
                    monitor,
                }
            }
        };
        Ok(prepared)
    }

    async fn execute_input(&self, kind: ActionKind, action: Prepared) -> DesktopResult<ToolOutput> {
        let profile = self.context.profile().await;
        let provider = self.context.factory().create_input(&profile).await?;
        let method = provider.method().as_str();

        let mut data = match action {
            Prepared::Click { at, button } => {
                retry(kind, || provider.click(at.0, at.1, button)).await?;
                json!({ "x": at.0, "y": at.1, "button": button.as_str() })
            }
            Prepared::Type(text) => {
                retry(kind, || provider.type_text(&text)).await?;
                json!({ "characters": text.chars().count() })
            }
            Prepared::Key(key) => {
                retry(kind, || provider.key_press(&key)).await?;
                json!({ "key": key })
            }
            Prepared::Scroll { direction, amount, at } => {
                retry(kind, || provider.scroll(direction, amount, at)).await?;
                json!({ "direction": direction.as_str(), "amount": amount, "at": at })
            }
            Prepared::Drag { from, to } => {
                retry(kind, || provider.drag(from, to)).await?;
                json!({ "from": from, "to": to })
            }
            Prepared::Wait(_) | Prepared::Screenshot { .. } => {
                return Err(DesktopError::invalid("action", format!("{kind:?} is not an input action")));
            }
        };

        info!("{:?} executed with {}", kind, method);
        data["method"] = json!(method);
        Ok(ToolOutput::json(data))
    }

    // ========================================================================
    // Screenshot
    // ========================================================================

    /// Captures the screen, writing to `save_path` when given
    pub async fn screenshot(&self, params: ScreenshotParams) -> DesktopResult<ToolOutput> {
        let prepared = self.prepare(ActionRequest::Screenshot {
            method: params.method,
            region: params.region,
            monitor: params.monitor,
        })?;
        let Prepared::Screenshot { method, region, monitor } = prepared else {
            return Err(DesktopError::invalid("action", "expected a screenshot"));
        };

        let profile = self.context.profile().await;
        self.capture(&profile, method, region, monitor, params.save_path.as_deref())
            .await
    }

    async fn capture(
        &self,
        profile: &PlatformProfile,
        method: Option<ScreenshotMethod>,
        region: Option<Region>,
        monitor: Option<u32>,
        save_path: Option<&str>,
    ) -> DesktopResult<ToolOutput> {
        let outcome = self.context.factory().capture(profile, method, region, monitor).await?;
        let mut data = to_json(&outcome)?;
        data["size_bytes"] = json!(outcome.bytes.len());

        let Some(path) = save_path else {
            return Ok(ToolOutput {
                data,
                image: Some(outcome.bytes),
            });
        };

        let path = Path::new(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DesktopError::io(format!("create {}", parent.display()), e))?;
        }
        tokio::fs::write(path, &outcome.bytes)
            .await
            .map_err(|e| DesktopError::io(format!("write {}", path.display()), e))?;
        info!("Screenshot saved to {}", path.display());

        data["saved_to"] = json!(path.display().to_string());
        Ok(ToolOutput::json(data))
    }

    // ========================================================================
    // Display management
    // ========================================================================

    pub async fn install_xserver(&self) -> DesktopResult<Value> {
        to_json(&self.context.displays().install_packages().await)
    }

    /// Starts (or reuses) a virtual display and routes X11 providers to it
    pub async fn start_xserver(&self, params: StartXserverParams) -> DesktopResult<Value> {
        let outcome = self
            .context
            .displays()
            .start_virtual(
                params.display_num.unwrap_or(DEFAULT_DISPLAY_NUMBER),
                params.width.unwrap_or(DEFAULT_DISPLAY_WIDTH),
                params.height.unwrap_or(DEFAULT_DISPLAY_HEIGHT),
            )
            .await?;
        self.context.use_display(&outcome.display).await;
        to_json(&outcome)
    }

    pub async fn stop_xserver(&self, params: StopXserverParams) -> DesktopResult<Value> {
        let display = params.display.trim();
        if display.is_empty() {
            return Err(DesktopError::invalid("display", "must not be empty"));
        }
        let outcome = self.context.displays().stop(display).await;
        if outcome.success {
            self.context.release_display(display).await;
        }
        to_json(&outcome)
    }

    pub async fn setup_wsl_xforwarding(&self) -> DesktopResult<Value> {
        let outcome = self.context.displays().setup_wsl_forwarding().await;
        if let Some(display) = outcome.display.as_deref().filter(|_| outcome.success) {
            self.context.use_display(display).await;
        }
        to_json(&outcome)
    }

    pub fn xserver_status(&self) -> DesktopResult<Value> {
        to_json(&self.context.displays().status())
    }

    pub async fn test_display(&self, params: DisplayParams) -> DesktopResult<Value> {
        to_json(&self.context.displays().test_display(params.display.as_deref()).await)
    }

    // ========================================================================
    // Platform information
    // ========================================================================

    pub async fn get_platform_info(&self) -> DesktopResult<Value> {
        let profile = self.context.profile().await;
        let host = self.context.host();

        let mut info = json!({
            "platform": to_json(profile.as_ref())?,
            "environment": profile.environment_label(),
            "capabilities": to_json(&profile.capabilities.to_vec())?,
            "display_available": profile.display_available(),
            "current_display": self.context.displays().current_display(),
            "recommended": to_json(&recommended_methods(&profile))?,
        });
        if profile.is_wsl() {
            let wsl = detect_wsl(host);
            info["wsl"] = json!({
                "version": wsl.as_ref().map(|w| w.version).or(profile.wsl_version),
                "distro": wsl.and_then(|w| w.distro).or_else(|| profile.wsl_distro.clone()),
                "host_ip": wsl_host_ip(host),
            });
        }
        Ok(info)
    }

    /// Reports whether screenshots can work here and why
    pub async fn check_display_available(&self, params: DisplayParams) -> DesktopResult<Value> {
        let profile = self.context.profile().await;
        let caps = profile.capabilities;
        let mut result = json!({ "method": profile.environment_label() });

        let available = match (profile.os, profile.sub_environment) {
            (OsKind::Windows, sub) => {
                let server_core = sub == SubEnvironment::ServerCore;
                result["details"] = json!({
                    "server_core": server_core,
                    "rdp_session": sub == SubEnvironment::Rdp,
                    "uses_powershell": caps.can_use_powershell,
                    "vcxsrv_display": server_core
                        .then(|| vcxsrv_display(&profile, self.context.host()))
                        .flatten(),
                });
                !server_core
            }
            (OsKind::MacOS, _) => {
                result["details"] = json!({ "screencapture": caps.can_use_screencapture });
                caps.can_use_screencapture
            }
            (OsKind::Linux, _) => {
                let check = self.context.displays().check_available(params.display.as_deref()).await;
                if profile.is_wsl() {
                    result["details"] = json!({
                        "uses_powershell": caps.can_use_powershell,
                        "host_ip": wsl_host_ip(self.context.host()),
                    });
                }
                let available = check.available || (profile.is_wsl() && caps.can_use_powershell);
                result["x11"] = to_json(&check)?;
                available
            }
        };

        result["display_available"] = json!(available);
        result["gui_available"] = json!(available);
        Ok(result)
    }

    pub async fn get_recommended_methods(&self) -> DesktopResult<Value> {
        let profile = self.context.profile().await;
        to_json(&recommended_methods(&profile))
    }
}

/// Type and drag are only repeated when the tool never launched; a timeout
/// or non-zero exit may already have delivered part of the input.
fn should_retry(kind: ActionKind, err: &DesktopError) -> bool {
    if kind.is_idempotent() {
        err.is_transient() || err.is_before_launch()
    } else {
        err.is_before_launch()
    }
}

/// Runs an input operation, retrying transient failures
///
/// Policy and argument errors are returned on the first attempt.
async fn retry<F, Fut>(kind: ActionKind, mut op: F) -> DesktopResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DesktopResult<()>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if should_retry(kind, &e) && attempt < INPUT_MAX_ATTEMPTS => {
                warn!(
                    "{:?} failed (attempt {}/{}): {}, retrying",
                    kind, attempt, INPUT_MAX_ATTEMPTS, e
                );
                tokio::time::sleep(Duration::from_millis(INPUT_RETRY_DELAY_MS)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::typing_timeout,
        model::{Capabilities, ErrorKind},
        platform::mock::MockHost,
        provider::{
            InputMethod, PLACEHOLDER_PNG,
            mock::{InputCall, MockInputProvider, MockScreenshotProvider},
            x11::XdotoolInputProvider,
        },
        safety::SafetyConfig,
        util::{mock_runner::MockCommandRunner, process::CommandOutput},
    };

    fn linux_profile() -> PlatformProfile {
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

    struct Fixture {
        dispatcher: ActionDispatcher,
        runner: Arc<MockCommandRunner>,
        input: Arc<MockInputProvider>,
        screenshot: Arc<MockScreenshotProvider>,
    }

    fn fixture_with(input: MockInputProvider, screenshot: MockScreenshotProvider) -> Fixture {
        let runner = Arc::new(MockCommandRunner::new());
        let input = Arc::new(input);
        let screenshot = Arc::new(screenshot);
        let context = DesktopContext::new(runner.clone(), Arc::new(MockHost::x11_desktop()), SafetyConfig::default())
            .with_profile(linux_profile())
            .with_input_provider(input.clone())
            .with_screenshot_provider(screenshot.clone());

        Fixture {
            dispatcher: ActionDispatcher::new(Arc::new(context)),
            runner,
            input,
            screenshot,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            MockInputProvider::new(InputMethod::X11Xdotool),
            MockScreenshotProvider::new(ScreenshotMethod::X11),
        )
    }

    #[test]
    fn test_tool_names_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
        }
        assert_eq!(ToolName::Type.to_string(), "type");
    }

    #[test]
    fn test_unknown_tool_is_invalid_argument() {
        let err = "launch_missiles".parse::<ToolName>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_click_reaches_provider() {
        let f = fixture();

        let output = f
            .dispatcher
            .dispatch("click", json!({"x": 100, "y": 200, "button": "right"}))
            .await
            .unwrap();

        assert_eq!(output.data["button"], "right");
        assert_eq!(output.data["method"], "x11_xdotool");
        assert_eq!(
            f.input.calls(),
            vec![InputCall::Click { x: 100, y: 200, button: MouseButton::Right }]
        );
    }

    #[tokio::test]
    async fn test_dangerous_text_never_reaches_provider() {
        let f = fixture();

        let err = f
            .dispatcher
            .dispatch("type", json!({"text": "rm -rf /"}))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SafetyRejected);
        assert!(err.to_string().contains("Safety check failed"));
        assert!(!err.to_string().contains("rm -rf"));
        assert_eq!(f.input.call_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_coordinates_rejected() {
        let f = fixture();

        for args in [json!({"x": -1, "y": 5}), json!({"x": 5, "y": 20000})] {
            let err = f.dispatcher.dispatch("click", args).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert_eq!(f.input.call_count(), 0);
    }

    #[tokio::test]
    async fn test_dangerous_key_combo_rejected() {
        let f = fixture();

        let err = f.dispatcher.dispatch("key", json!({"key": "alt+F4"})).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SafetyRejected);
        assert_eq!(f.input.call_count(), 0);
    }

    #[tokio::test]
    async fn test_key_is_normalized() {
        let f = fixture();

        let output = f.dispatcher.dispatch("key", json!({"key": "enter"})).await.unwrap();

        assert_eq!(output.data["key"], "Return");
        assert_eq!(f.input.calls(), vec![InputCall::Key("Return".to_string())]);
    }

    #[tokio::test]
    async fn test_scroll_requires_both_coordinates() {
        let f = fixture();

        let err = f
            .dispatcher
            .dispatch("scroll", json!({"direction": "up", "x": 10}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        f.dispatcher
            .dispatch("scroll", json!({"direction": "up", "amount": 5, "x": 10, "y": 20}))
            .await
            .unwrap();
        assert_eq!(
            f.input.calls(),
            vec![InputCall::Scroll {
                direction: ScrollDirection::Up,
                amount: 5,
                at: Some((10, 20))
            }]
        );
    }

    #[tokio::test]
    async fn test_scroll_amount_bounds() {
        let f = fixture();

        for amount in [0, 101] {
            let err = f
                .dispatcher
                .dispatch("scroll", json!({"amount": amount}))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn test_overlong_text_rejected() {
        let f = fixture();
        let text = "a".repeat(MAX_TEXT_LENGTH + 1);

        let err = f.dispatcher.dispatch("type", json!({ "text": text })).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_invalid() {
        let f = fixture();

        let err = f.dispatcher.dispatch("drag", json!({"start_x": 1})).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("drag"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_input_failure_is_retried() {
        let f = fixture_with(
            MockInputProvider::new(InputMethod::X11Xdotool).failing_times(
                2,
                DesktopError::Timeout {
                    operation: "xdotool".to_string(),
                    duration_ms: 5000,
                },
            ),
            MockScreenshotProvider::new(ScreenshotMethod::X11),
        );

        f.dispatcher.dispatch("key", json!({"key": "enter"})).await.unwrap();

        assert_eq!(f.input.call_count(), 3);
    }

    fn xdotool_fixture(runner: MockCommandRunner) -> (ActionDispatcher, Arc<MockCommandRunner>) {
        let runner = Arc::new(runner);
        let host = Arc::new(MockHost::x11_desktop());
        let input = Arc::new(XdotoolInputProvider::new(runner.clone(), host.clone()));
        let context = DesktopContext::new(runner.clone(), host, SafetyConfig::default())
            .with_profile(linux_profile())
            .with_input_provider(input);
        (ActionDispatcher::new(Arc::new(context)), runner)
    }

    #[tokio::test]
    async fn test_long_text_gets_length_scaled_timeout() {
        let (dispatcher, runner) = xdotool_fixture(MockCommandRunner::new());
        let text = "abcde".repeat(1000);

        let output = dispatcher.dispatch("type", json!({ "text": text })).await.unwrap();

        assert_eq!(output.data["characters"], 5000);
        let calls = runner.calls_for("xdotool");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].timeout, typing_timeout(5000));
        assert!(calls[0].timeout > Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_typing_is_not_repeated() {
        let (dispatcher, runner) = xdotool_fixture(MockCommandRunner::new().fail(
            "xdotool",
            DesktopError::Timeout {
                operation: "xdotool".to_string(),
                duration_ms: 10_000,
            },
        ));

        let err = dispatcher.dispatch("type", json!({"text": "hello"})).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(runner.calls_for("xdotool").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_drag_is_not_repeated() {
        let (dispatcher, runner) = xdotool_fixture(
            MockCommandRunner::new().respond("xdotool", CommandOutput::failed(1, "XGetInputFocus failed")),
        );

        let result = dispatcher
            .run(ActionRequest::Drag { start_x: 1, start_y: 1, end_x: 50, end_y: 50 })
            .await;

        assert!(!result.success);
        assert_eq!(runner.calls_for("xdotool").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_retried_when_tool_never_started() {
        let f = fixture_with(
            MockInputProvider::new(InputMethod::X11Xdotool).failing_times(
                1,
                DesktopError::ProcessSpawnFailure {
                    program: "xdotool".to_string(),
                    reason: "Resource temporarily unavailable".to_string(),
                },
            ),
            MockScreenshotProvider::new(ScreenshotMethod::X11),
        );

        f.dispatcher.dispatch("type", json!({"text": "hello"})).await.unwrap();

        assert_eq!(f.input.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let f = fixture_with(
            MockInputProvider::new(InputMethod::X11Xdotool).with_error(DesktopError::Io {
                context: "xdotool".to_string(),
                reason: "broken pipe".to_string(),
            }),
            MockScreenshotProvider::new(ScreenshotMethod::X11),
        );

        let result = f.dispatcher.run(ActionRequest::Click { x: 1, y: 1, button: MouseButton::Left }).await;

        assert!(!result.success);
        assert_eq!(f.input.call_count(), INPUT_MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_non_transient_failure_is_not_retried() {
        let f = fixture_with(
            MockInputProvider::new(InputMethod::X11Xdotool).with_error(DesktopError::DisplayUnavailable {
                display: ":0".to_string(),
                reason: "gone".to_string(),
            }),
            MockScreenshotProvider::new(ScreenshotMethod::X11),
        );

        let result = f.dispatcher.run(ActionRequest::Key { key: "a".to_string() }).await;

        assert_eq!(result.error.unwrap().kind, ErrorKind::DisplayUnavailable);
        assert_eq!(f.input.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_validates_and_sleeps() {
        let f = fixture();

        let output = f.dispatcher.dispatch("wait", json!({"seconds": 1.5})).await.unwrap();
        assert_eq!(output.data["waited_seconds"], 1.5);

        for seconds in [0.0, -1.0, 61.0] {
            let err = f
                .dispatcher
                .dispatch("wait", json!({ "seconds": seconds }))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn test_screenshot_returns_inline_image() {
        let f = fixture();

        let output = f.dispatcher.dispatch("screenshot", json!({})).await.unwrap();

        assert_eq!(output.image.as_deref(), Some(f.screenshot.image()));
        assert_eq!(output.data["method_used"], "x11");
        assert_eq!(output.data["placeholder"], false);
        assert_eq!(f.screenshot.capture_count(), 1);
    }

    #[tokio::test]
    async fn test_screenshot_saves_to_path() {
        let f = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shot.png");

        let output = f
            .dispatcher
            .screenshot(ScreenshotParams {
                save_path: Some(path.display().to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(output.image.is_none());
        assert_eq!(output.data["saved_to"], path.display().to_string());
        assert_eq!(std::fs::read(&path).unwrap(), f.screenshot.image());
    }

    #[tokio::test]
    async fn test_screenshot_falls_back_to_placeholder() {
        let f = fixture_with(
            MockInputProvider::new(InputMethod::X11Xdotool),
            MockScreenshotProvider::unavailable(ScreenshotMethod::X11),
        );
        f.runner.set_response("xset", CommandOutput::failed(1, "unable to open display"));

        let output = f.dispatcher.dispatch("screenshot", json!({})).await.unwrap();

        assert_eq!(output.image.as_deref(), Some(PLACEHOLDER_PNG));
        assert_eq!(output.data["placeholder"], true);
    }

    #[tokio::test]
    async fn test_screenshot_rejects_unknown_method_and_empty_region() {
        let f = fixture();

        let err = f
            .dispatcher
            .dispatch("screenshot", json!({"method": "telepathy"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = f
            .dispatcher
            .dispatch(
                "screenshot",
                json!({"region": {"x": 0, "y": 0, "width": 0, "height": 10}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(f.screenshot.capture_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_xserver() {
        let f = fixture();

        let started = f
            .dispatcher
            .dispatch("start_xserver", json!({"display_num": 42, "width": 800, "height": 600}))
            .await
            .unwrap();
        assert_eq!(started.data["display"], ":42");
        assert_eq!(started.data["resolution"], "800x600");
        assert_eq!(f.dispatcher.context().factory().active_display().as_deref(), Some(":42"));

        let stopped = f
            .dispatcher
            .dispatch("stop_xserver", json!({"display": ":42"}))
            .await
            .unwrap();
        assert_eq!(stopped.data["success"], true);
        assert_eq!(f.dispatcher.context().factory().active_display(), None);
        assert_eq!(f.runner.spawn_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_untracked_display_reports_not_found() {
        let f = fixture();

        let output = f
            .dispatcher
            .dispatch("stop_xserver", json!({"display": ":7"}))
            .await
            .unwrap();

        assert_eq!(output.data["success"], false);
        assert!(output.data["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_platform_info_reports_environment() {
        let f = fixture();

        let output = f.dispatcher.dispatch("get_platform_info", Value::Null).await.unwrap();

        assert_eq!(output.data["environment"], "linux");
        assert_eq!(output.data["display_available"], true);
        assert_eq!(output.data["recommended"]["screenshot"], "x11");
        assert!(output.data.get("wsl").is_none());
    }

    #[tokio::test]
    async fn test_check_display_available_on_linux() {
        let f = fixture();

        let output = f.dispatcher.dispatch("check_display_available", json!({})).await.unwrap();
        assert_eq!(output.data["display_available"], true);
        assert_eq!(output.data["x11"]["available"], true);

        f.runner.set_response("xset", CommandOutput::failed(1, "unable to open display"));
        let output = f
            .dispatcher
            .dispatch("check_display_available", json!({"display": ":5"}))
            .await
            .unwrap();
        assert_eq!(output.data["display_available"], false);
    }

    #[tokio::test]
    async fn test_check_display_available_on_server_core() {
        let runner = Arc::new(MockCommandRunner::new());
        let profile = PlatformProfile {
            os: OsKind::Windows,
            sub_environment: SubEnvironment::ServerCore,
            capabilities: Capabilities {
                can_use_powershell: true,
                ..Default::default()
            },
            wsl_version: None,
            wsl_distro: None,
            display: None,
            is_windows_server: true,
        };
        let context = DesktopContext::new(runner, Arc::new(MockHost::windows()), SafetyConfig::default())
            .with_profile(profile);
        let dispatcher = ActionDispatcher::new(Arc::new(context));

        let output = dispatcher.dispatch("check_display_available", json!({})).await.unwrap();

        assert_eq!(output.data["gui_available"], false);
        assert_eq!(output.data["method"], "windows_server_core");
        assert_eq!(output.data["details"]["server_core"], true);
        assert_eq!(output.data["details"]["vcxsrv_display"], "localhost:0.0");
    }

    #[tokio::test]
    async fn test_xserver_status_is_json() {
        let f = fixture();

        let output = f.dispatcher.dispatch("xserver_status", json!({})).await.unwrap();

        assert_eq!(output.data["active_processes"], 0);
        assert_eq!(output.data["wsl_mode"], false);
    }
}
