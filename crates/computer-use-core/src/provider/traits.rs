//! Provider traits and method names
//!
//! A provider is a concrete backend for one platform/environment
//! combination. Screen capture and input injection are separate traits so
//! that, for example, WSL2 can capture through PowerShell while injecting
//! input through xdotool.

use std::str::FromStr;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    constants::MAX_COORDINATE_VALUE,
    error::{DesktopError, DesktopResult},
    model::{MouseButton, Region, ScrollDirection},
};

// ============================================================================
// Method Names
// ============================================================================

/// Screen capture backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotMethod {
    WindowsNative,
    WindowsRdpCapture,
    /// Windows Server Core; always unavailable
    ServerCore,
    Wsl2Powershell,
    X11,
    /// X11 capture against a VcXsrv/X410 server on the Windows host
    VcxsrvX11,
    MacosScreencapture,
}

impl ScreenshotMethod {
    pub const ALL: [ScreenshotMethod; 7] = [
        ScreenshotMethod::WindowsNative,
        ScreenshotMethod::WindowsRdpCapture,
        ScreenshotMethod::ServerCore,
        ScreenshotMethod::Wsl2Powershell,
        ScreenshotMethod::X11,
        ScreenshotMethod::VcxsrvX11,
        ScreenshotMethod::MacosScreencapture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenshotMethod::WindowsNative => "windows_native",
            ScreenshotMethod::WindowsRdpCapture => "windows_rdp_capture",
            ScreenshotMethod::ServerCore => "server_core",
            ScreenshotMethod::Wsl2Powershell => "wsl2_powershell",
            ScreenshotMethod::X11 => "x11",
            ScreenshotMethod::VcxsrvX11 => "vcxsrv_x11",
            ScreenshotMethod::MacosScreencapture => "macos_screencapture",
        }
    }
}

impl std::fmt::Display for ScreenshotMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScreenshotMethod {
    type Err = DesktopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| DesktopError::invalid("method", format!("unknown screenshot method '{s}'")))
    }
}

/// Input injection backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InputMethod {
    WindowsNative,
    Wsl2Powershell,
    X11Xdotool,
}

impl InputMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputMethod::WindowsNative => "windows_native",
            InputMethod::Wsl2Powershell => "wsl2_powershell",
            InputMethod::X11Xdotool => "x11_xdotool",
        }
    }
}

impl std::fmt::Display for InputMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Provider Traits
// ============================================================================

/// One monitor as reported by a capture backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MonitorInfo {
    pub index: u32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub primary: bool,
}

impl MonitorInfo {
    /// Assumed primary monitor when the backend cannot enumerate
    pub fn fallback() -> Self {
        Self {
            index: 0,
            name: "default".to_string(),
            x: 0,
            y: 0,
            width: crate::constants::DEFAULT_DISPLAY_WIDTH,
            height: crate::constants::DEFAULT_DISPLAY_HEIGHT,
            primary: true,
        }
    }
}

/// Screen capture backend
///
/// Implementations must be safe to call concurrently; parallel captures need
/// not be faster, only non-corrupting.
#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    fn method(&self) -> ScreenshotMethod;

    /// Cheap check whether the backend can work on this host right now
    async fn is_available(&self) -> bool;

    /// Captures the screen (or a region of it) as PNG bytes
    async fn capture(&self, region: Option<Region>, monitor: Option<u32>) -> DesktopResult<Vec<u8>>;

    async fn monitors(&self) -> DesktopResult<Vec<MonitorInfo>> {
        Ok(vec![MonitorInfo::fallback()])
    }
}

/// Input injection backend
///
/// Keys are passed in the canonical form produced by
/// [`normalize_key`](crate::safety::normalize_key). Every operation is safe
/// to retry.
#[async_trait]
pub trait InputProvider: Send + Sync {
    fn method(&self) -> InputMethod;

    async fn is_available(&self) -> bool;

    async fn click(&self, x: u32, y: u32, button: MouseButton) -> DesktopResult<()>;

    async fn type_text(&self, text: &str) -> DesktopResult<()>;

    async fn key_press(&self, key: &str) -> DesktopResult<()>;

    /// Scrolls `amount` clicks, optionally moving to `at` first
    async fn scroll(
        &self,
        direction: ScrollDirection,
        amount: u32,
        at: Option<(u32, u32)>,
    ) -> DesktopResult<()>;

    async fn drag(&self, from: (u32, u32), to: (u32, u32)) -> DesktopResult<()>;

    async fn cursor_position(&self) -> DesktopResult<(i32, i32)>;
}

/// Bounds check applied by every input provider before dispatch
pub fn ensure_in_bounds(x: u32, y: u32) -> DesktopResult<()> {
    let max = MAX_COORDINATE_VALUE as u32;
    if x > max || y > max {
        return Err(DesktopError::invalid(
            "coordinates",
            format!("({x}, {y}) outside 0..={max}"),
        ));
    }
    Ok(())
}
