//! Data models shared across the desktop automation core
//!
//! This module defines the core types used throughout the crate:
//! - Platform classification (OS, sub-environment, capability flags)
//! - Action requests and results exchanged with the dispatcher
//! - Small geometry and input helper types

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::DesktopError;

// ============================================================================
// Platform Classification
// ============================================================================

/// Host operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OsKind {
    /// Linux, including WSL guests
    Linux,
    /// Windows desktop or server
    Windows,
    /// macOS
    #[serde(rename = "macos")]
    MacOS,
}

impl OsKind {
    /// Returns the OS family as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            OsKind::Linux => "linux",
            OsKind::Windows => "windows",
            OsKind::MacOS => "macos",
        }
    }

    /// OS family this binary was compiled for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OsKind::Windows
        } else if cfg!(target_os = "macos") {
            OsKind::MacOS
        } else {
            OsKind::Linux
        }
    }
}

impl std::fmt::Display for OsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sub-environment within an OS family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubEnvironment {
    /// Plain desktop session
    Native,
    /// Windows Subsystem for Linux, version 1
    Wsl1,
    /// Windows Subsystem for Linux, version 2
    Wsl2,
    /// Windows Server Core (no GUI subsystem)
    ServerCore,
    /// Windows remote desktop session
    Rdp,
}

impl SubEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubEnvironment::Native => "native",
            SubEnvironment::Wsl1 => "wsl1",
            SubEnvironment::Wsl2 => "wsl2",
            SubEnvironment::ServerCore => "server_core",
            SubEnvironment::Rdp => "rdp",
        }
    }
}

impl std::fmt::Display for SubEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single host capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CanUsePowerShell,
    CanUseDotnet,
    CanUseX11,
    CanUseScreenCapture,
}

/// Set of capability flags detected for the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Capabilities {
    /// `powershell.exe` (or `powershell` on Windows) is reachable
    pub can_use_powershell: bool,
    /// .NET desktop APIs usable in-process (native Windows only)
    pub can_use_dotnet: bool,
    /// An X server answers on the current `DISPLAY`
    pub can_use_x11: bool,
    /// macOS `screencapture` is available
    pub can_use_screencapture: bool,
}

impl Capabilities {
    /// Returns true if the given capability is present
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::CanUsePowerShell => self.can_use_powershell,
            Capability::CanUseDotnet => self.can_use_dotnet,
            Capability::CanUseX11 => self.can_use_x11,
            Capability::CanUseScreenCapture => self.can_use_screencapture,
        }
    }

    /// Lists the capabilities that are present
    pub fn to_vec(&self) -> Vec<Capability> {
        [
            Capability::CanUsePowerShell,
            Capability::CanUseDotnet,
            Capability::CanUseX11,
            Capability::CanUseScreenCapture,
        ]
        .into_iter()
        .filter(|c| self.has(*c))
        .collect()
    }
}

/// Classification of the host the server runs on
///
/// Computed once by the platform detector and cached by
/// [`DesktopContext`](crate::context::DesktopContext) until invalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlatformProfile {
    pub os: OsKind,
    pub sub_environment: SubEnvironment,
    pub capabilities: Capabilities,
    /// 1 or 2 when running under WSL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wsl_version: Option<u8>,
    /// `WSL_DISTRO_NAME` when running under WSL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wsl_distro: Option<String>,
    /// `DISPLAY` at detection time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// True for any Windows Server edition (Core or Desktop Experience)
    pub is_windows_server: bool,
}

impl PlatformProfile {
    /// Returns true when running inside WSL1 or WSL2
    pub fn is_wsl(&self) -> bool {
        matches!(self.sub_environment, SubEnvironment::Wsl1 | SubEnvironment::Wsl2)
    }

    /// Returns true if some form of GUI is reachable from this host
    pub fn display_available(&self) -> bool {
        match (self.os, self.sub_environment) {
            (OsKind::Windows, SubEnvironment::ServerCore) => false,
            (OsKind::Windows, _) => true,
            (OsKind::MacOS, _) => self.capabilities.can_use_screencapture,
            (OsKind::Linux, _) => {
                self.capabilities.can_use_x11 || self.capabilities.can_use_powershell
            }
        }
    }

    /// Environment label used in guidance and tool responses
    pub fn environment_label(&self) -> &'static str {
        match (self.os, self.sub_environment) {
            (_, SubEnvironment::Wsl2) => "wsl2",
            (_, SubEnvironment::Wsl1) => "wsl1",
            (OsKind::Windows, SubEnvironment::ServerCore) => "windows_server_core",
            (OsKind::Windows, SubEnvironment::Rdp) => "windows_rdp",
            (OsKind::Windows, _) if self.is_windows_server => "windows_server",
            (OsKind::Windows, _) => "windows",
            (OsKind::MacOS, _) => "macos",
            (OsKind::Linux, _) => "linux",
        }
    }

    /// Checks that capability flags agree with the sub-environment
    ///
    /// .NET is only usable on a native Windows desktop, and X11/screencapture
    /// flags never appear on Windows.
    pub fn is_consistent(&self) -> bool {
        let dotnet_ok = !self.capabilities.can_use_dotnet
            || (self.os == OsKind::Windows && self.sub_environment == SubEnvironment::Native);
        let screencapture_ok = !self.capabilities.can_use_screencapture || self.os == OsKind::MacOS;
        let wsl_ok = self.is_wsl() == self.wsl_version.is_some() && (!self.is_wsl() || self.os == OsKind::Linux);
        let windows_env_ok = !matches!(
            self.sub_environment,
            SubEnvironment::ServerCore | SubEnvironment::Rdp
        ) || self.os == OsKind::Windows;
        dotnet_ok && screencapture_ok && wsl_ok && windows_env_ok
    }
}

// ============================================================================
// Geometry and Input Types
// ============================================================================

/// Screen resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rectangular capture region in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Mouse button for click actions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// X11 button number (1 left, 2 middle, 3 right)
    pub fn x11_button(&self) -> u8 {
        match self {
            MouseButton::Left => 1,
            MouseButton::Middle => 2,
            MouseButton::Right => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// Scroll wheel direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// X11 wheel button number (4 up, 5 down, 6 left, 7 right)
    pub fn x11_button(&self) -> u8 {
        match self {
            ScrollDirection::Up => 4,
            ScrollDirection::Down => 5,
            ScrollDirection::Left => 6,
            ScrollDirection::Right => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Discriminant of an [`ActionRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type,
    Key,
    Scroll,
    Drag,
    Wait,
    Screenshot,
}

impl ActionKind {
    /// Returns true for actions that inject input into the host
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            ActionKind::Click
                | ActionKind::Type
                | ActionKind::Key
                | ActionKind::Scroll
                | ActionKind::Drag
        )
    }

    /// False for actions whose partial execution is visible to the user
    /// (half-typed text, a drag that left the button down)
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, ActionKind::Type | ActionKind::Drag)
    }
}

/// A single requested action, built from tool-call arguments
///
/// Never persisted. Coordinates are signed so that out-of-range input
/// reaches the validator instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionRequest {
    Click {
        x: i64,
        y: i64,
        #[serde(default)]
        button: MouseButton,
    },
    Type {
        text: String,
    },
    Key {
        key: String,
    },
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        #[serde(default = "default_scroll_amount")]
        amount: u32,
        #[serde(default)]
        x: Option<i64>,
        #[serde(default)]
        y: Option<i64>,
    },
    Drag {
        start_x: i64,
        start_y: i64,
        end_x: i64,
        end_y: i64,
    },
    Wait {
        seconds: f64,
    },
    Screenshot {
        /// Forces a specific capture method instead of the routed one
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        region: Option<Region>,
        #[serde(default)]
        monitor: Option<u32>,
    },
}

fn default_scroll_amount() -> u32 {
    3
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::Click { .. } => ActionKind::Click,
            ActionRequest::Type { .. } => ActionKind::Type,
            ActionRequest::Key { .. } => ActionKind::Key,
            ActionRequest::Scroll { .. } => ActionKind::Scroll,
            ActionRequest::Drag { .. } => ActionKind::Drag,
            ActionRequest::Wait { .. } => ActionKind::Wait,
            ActionRequest::Screenshot { .. } => ActionKind::Screenshot,
        }
    }
}

/// Error classification carried in an [`ActionResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DisplayUnavailable,
    ProviderUnavailable,
    SafetyRejected,
    Timeout,
    ProcessSpawnFailure,
    InvalidArgument,
    Internal,
}

impl ErrorKind {
    /// True when the failure is a policy decision rather than an
    /// infrastructure problem
    pub fn is_policy(&self) -> bool {
        matches!(self, ErrorKind::SafetyRejected)
    }
}

/// Error part of an [`ActionResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
    /// Remediation text for infrastructure failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Structured outcome of an executed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionError>,
}

impl ActionResult {
    /// Creates a successful result carrying `data`
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Creates a failed result from an error
    pub fn failed(error: &DesktopError) -> Self {
        let kind = error.kind();
        Self {
            success: false,
            data: None,
            error: Some(ActionError {
                kind,
                message: error.to_string(),
                hint: if kind.is_policy() {
                    None
                } else {
                    Some(error.remediation_hint().to_string())
                },
            }),
        }
    }
}
