//! Provider routing, fallback chains and singletons
//!
//! A [`PlatformProfile`] maps to one routed screenshot method through a
//! static table. When the routed provider is not available the factory
//! walks a fixed fallback chain:
//!
//! | Environment          | Screenshot chain                               |
//! |----------------------|------------------------------------------------|
//! | Windows desktop      | `windows_native` -> `windows_rdp_capture`      |
//! | Windows RDP session  | `windows_rdp_capture` -> `windows_native`      |
//! | Windows Server Core  | `server_core` -> `vcxsrv_x11`                  |
//! | WSL1 / WSL2          | `wsl2_powershell` -> `x11` -> `vcxsrv_x11`     |
//! | Linux                | `x11` -> `vcxsrv_x11`                          |
//! | macOS                | `macos_screencapture`                          |
//!
//! Input routes to `windows_native` on Windows, `wsl2_powershell` under WSL
//! (then xdotool) and `x11_xdotool` on Linux (then PowerShell).
//!
//! Providers are built once per method and cached until
//! [`ProviderFactory::invalidate`]. Providers injected with
//! `with_screenshot_provider` / `with_input_provider` are pinned and survive
//! invalidation.

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    macos::MacScreenshotProvider,
    powershell::{PowerShellInputProvider, PowerShellScreenshotProvider},
    traits::{InputMethod, InputProvider, ScreenshotMethod, ScreenshotProvider},
    unavailable::UnavailableScreenshotProvider,
    x11::{X11ScreenshotProvider, XdotoolInputProvider},
};
use crate::{
    constants::screenshot_timeout,
    error::{DesktopError, DesktopResult},
    model::{OsKind, PlatformProfile, Region, SubEnvironment},
    platform::{HostProbe, wsl_host_ip},
    util::process::{CommandRunner, with_timeout},
};

/// 1x1 transparent PNG returned when every capture method failed
pub const PLACEHOLDER_PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x06\x00\x00\x00\x1f\x15\xc4\x89\x00\x00\x00\rIDATx\x9cc\xf8\x0f\x00\x00\x01\x01\x00\x00\x05\x00\x01\x0d\x0a\x2d\xb4\x00\x00\x00\x00IEND\xaeB\x60\x82";

// ============================================================================
// Routing
// ============================================================================

/// Screenshot method routed for a profile
pub fn route_screenshot(profile: &PlatformProfile) -> ScreenshotMethod {
    match (profile.os, profile.sub_environment) {
        (OsKind::Windows, SubEnvironment::ServerCore) => ScreenshotMethod::ServerCore,
        (OsKind::Windows, SubEnvironment::Rdp) => ScreenshotMethod::WindowsRdpCapture,
        (OsKind::Windows, _) => ScreenshotMethod::WindowsNative,
        (OsKind::Linux, SubEnvironment::Wsl1 | SubEnvironment::Wsl2) => ScreenshotMethod::Wsl2Powershell,
        (OsKind::Linux, _) => ScreenshotMethod::X11,
        (OsKind::MacOS, _) => ScreenshotMethod::MacosScreencapture,
    }
}

/// Ordered screenshot methods to try; the first entry is the routed method
pub fn screenshot_chain(profile: &PlatformProfile) -> Vec<ScreenshotMethod> {
    use ScreenshotMethod::*;

    match route_screenshot(profile) {
        WindowsNative => vec![WindowsNative, WindowsRdpCapture],
        WindowsRdpCapture => vec![WindowsRdpCapture, WindowsNative],
        ServerCore => vec![ServerCore, VcxsrvX11],
        Wsl2Powershell => vec![Wsl2Powershell, X11, VcxsrvX11],
        X11 => vec![X11, VcxsrvX11],
        VcxsrvX11 => vec![VcxsrvX11],
        MacosScreencapture => vec![MacosScreencapture],
    }
}

/// Ordered input methods to try; empty when the host has no input backend
pub fn input_chain(profile: &PlatformProfile) -> Vec<InputMethod> {
    match (profile.os, profile.sub_environment) {
        (OsKind::Windows, _) => vec![InputMethod::WindowsNative],
        (OsKind::Linux, SubEnvironment::Wsl1 | SubEnvironment::Wsl2) => {
            vec![InputMethod::Wsl2Powershell, InputMethod::X11Xdotool]
        }
        (OsKind::Linux, _) => vec![InputMethod::X11Xdotool, InputMethod::Wsl2Powershell],
        (OsKind::MacOS, _) => Vec::new(),
    }
}

/// X display of a VcXsrv/X410 server on the Windows side
///
/// Under WSL this is the Windows host address from the resolver config; on
/// Windows itself the server listens on localhost.
pub fn vcxsrv_display(profile: &PlatformProfile, host: &dyn HostProbe) -> Option<String> {
    if profile.is_wsl() {
        wsl_host_ip(host).map(|ip| format!("{ip}:0.0"))
    } else {
        Some("localhost:0.0".to_string())
    }
}

/// Methods reported by the `get_recommended_methods` tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendedMethods {
    pub environment: &'static str,
    pub screenshot: ScreenshotMethod,
    pub screenshot_fallbacks: Vec<ScreenshotMethod>,
    pub input: Option<InputMethod>,
    pub input_fallbacks: Vec<InputMethod>,
    pub display_available: bool,
}

pub fn recommended_methods(profile: &PlatformProfile) -> RecommendedMethods {
    let screenshot_chain = screenshot_chain(profile);
    let input_chain = input_chain(profile);
    RecommendedMethods {
        environment: profile.environment_label(),
        screenshot: route_screenshot(profile),
        screenshot_fallbacks: screenshot_chain.into_iter().skip(1).collect(),
        input: input_chain.first().copied(),
        input_fallbacks: input_chain.into_iter().skip(1).collect(),
        display_available: profile.display_available(),
    }
}

// ============================================================================
// Capture Outcome
// ============================================================================

/// One failed method in a capture attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureAttempt {
    pub method: ScreenshotMethod,
    pub error: String,
}

/// Result of [`ProviderFactory::capture`]
///
/// `bytes` is either a real PNG or [`PLACEHOLDER_PNG`] with
/// `placeholder = true`. The rest serializes as response metadata.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutcome {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub method_used: Option<ScreenshotMethod>,
    pub placeholder: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<CaptureAttempt>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub guidance: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
}

/// Remediation steps and the tool most likely to fix capture on this host
fn capture_guidance(profile: &PlatformProfile) -> (Vec<String>, Option<&'static str>) {
    let lines: &[&str] = match (profile.os, profile.sub_environment) {
        (OsKind::Windows, SubEnvironment::ServerCore) => &[
            "Windows Server Core has no GUI subsystem",
            "Connect through an RDP session or install the Desktop Experience feature",
            "Alternatively run VcXsrv and capture through X11",
        ],
        (OsKind::Windows, _) => &[
            "Make sure powershell is on PATH and the session is not locked",
            "Screen capture needs an interactive desktop session",
        ],
        (OsKind::Linux, SubEnvironment::Wsl1 | SubEnvironment::Wsl2) => &[
            "Check that powershell.exe is reachable from WSL (interop enabled)",
            "Install VcXsrv or X410 on Windows and allow connections",
            "Or start a virtual display with start_xserver",
        ],
        (OsKind::Linux, _) => &[
            "Install X11 capture tools with install_xserver",
            "Start a virtual display with start_xserver",
            "Check DISPLAY with check_display_available",
        ],
        (OsKind::MacOS, _) => &[
            "Grant Screen Recording permission to the terminal running the server",
        ],
    };

    let action = match (profile.os, profile.sub_environment) {
        (OsKind::Linux, SubEnvironment::Wsl1 | SubEnvironment::Wsl2) => Some("setup_wsl_xforwarding"),
        (OsKind::Linux, _) => Some("start_xserver"),
        _ => None,
    };
    (lines.iter().map(|s| s.to_string()).collect(), action)
}

// ============================================================================
// Factory
// ============================================================================

/// Equal share of the time left before `deadline` for `methods_left` methods
fn budget_share(deadline: Instant, methods_left: usize) -> Duration {
    let left = u32::try_from(methods_left.max(1)).unwrap_or(u32::MAX);
    deadline.saturating_duration_since(Instant::now()) / left
}

struct Slot<P: ?Sized> {
    provider: Arc<P>,
    pinned: bool,
}

/// Builds and caches providers
pub struct ProviderFactory {
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn HostProbe>,
    screenshot: RwLock<HashMap<ScreenshotMethod, Slot<dyn ScreenshotProvider>>>,
    input: RwLock<HashMap<InputMethod, Slot<dyn InputProvider>>>,
    /// Display chosen by the display manager, overriding `DISPLAY`
    active_display: RwLock<Option<String>>,
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("screenshot", &self.screenshot.read().keys().collect::<Vec<_>>())
            .field("input", &self.input.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderFactory {
    pub fn new(runner: Arc<dyn CommandRunner>, host: Arc<dyn HostProbe>) -> Self {
        Self {
            runner,
            host,
            screenshot: RwLock::new(HashMap::new()),
            input: RwLock::new(HashMap::new()),
            active_display: RwLock::new(None),
        }
    }

    /// Points local X11 providers at `display` and drops cached providers
    ///
    /// Returns true when the display changed. Compare and swap share one
    /// write guard; the cache lock is only taken after it is released.
    pub fn set_active_display(&self, display: Option<String>) -> bool {
        {
            let mut active = self.active_display.write();
            if *active == display {
                return false;
            }
            let shown = &display;
            info!("Active X display set to {:?}", shown);
            *active = display;
        }
        self.invalidate();
        true
    }

    pub fn active_display(&self) -> Option<String> {
        self.active_display.read().clone()
    }

    /// Pins `provider` as the screenshot backend for its method
    pub fn with_screenshot_provider(self, provider: Arc<dyn ScreenshotProvider>) -> Self {
        self.screenshot.write().insert(
            provider.method(),
            Slot {
                provider,
                pinned: true,
            },
        );
        self
    }

    /// Pins `provider` as the input backend for its method
    pub fn with_input_provider(self, provider: Arc<dyn InputProvider>) -> Self {
        self.input.write().insert(
            provider.method(),
            Slot {
                provider,
                pinned: true,
            },
        );
        self
    }

    /// Drops every cached provider that was not pinned
    pub fn invalidate(&self) {
        self.screenshot.write().retain(|_, slot| slot.pinned);
        self.input.write().retain(|_, slot| slot.pinned);
        debug!("Provider cache invalidated");
    }

    /// Number of cached screenshot providers
    pub fn cached_screenshot_providers(&self) -> usize {
        self.screenshot.read().len()
    }

    /// Singleton screenshot provider for `method`
    ///
    /// Fails only when the provider cannot even be constructed (a VcXsrv
    /// display that cannot be resolved).
    pub fn screenshot_provider(
        &self,
        method: ScreenshotMethod,
        profile: &PlatformProfile,
    ) -> DesktopResult<Arc<dyn ScreenshotProvider>> {
        if let Some(slot) = self.screenshot.read().get(&method) {
            return Ok(slot.provider.clone());
        }

        let mut cache = self.screenshot.write();
        if let Some(slot) = cache.get(&method) {
            return Ok(slot.provider.clone());
        }
        let provider = self.build_screenshot(method, profile)?;
        debug!("Created screenshot provider {}", method);
        cache.insert(
            method,
            Slot {
                provider: provider.clone(),
                pinned: false,
            },
        );
        Ok(provider)
    }

    fn build_screenshot(
        &self,
        method: ScreenshotMethod,
        profile: &PlatformProfile,
    ) -> DesktopResult<Arc<dyn ScreenshotProvider>> {
        let runner = self.runner.clone();
        let host = self.host.clone();
        Ok(match method {
            ScreenshotMethod::WindowsNative
            | ScreenshotMethod::WindowsRdpCapture
            | ScreenshotMethod::Wsl2Powershell => {
                Arc::new(PowerShellScreenshotProvider::new(runner, host, method))
            }
            ScreenshotMethod::X11 => {
                let provider = X11ScreenshotProvider::native(runner, host);
                match self.active_display() {
                    Some(display) => Arc::new(provider.with_display(display)),
                    None => Arc::new(provider),
                }
            }
            ScreenshotMethod::VcxsrvX11 => {
                let display = vcxsrv_display(profile, host.as_ref()).ok_or_else(|| {
                    DesktopError::ProviderUnavailable {
                        method: method.to_string(),
                        reason: "could not determine the Windows host IP".to_string(),
                    }
                })?;
                Arc::new(X11ScreenshotProvider::vcxsrv(runner, host, display))
            }
            ScreenshotMethod::ServerCore => Arc::new(UnavailableScreenshotProvider::server_core()),
            ScreenshotMethod::MacosScreencapture => Arc::new(MacScreenshotProvider::new(runner, host)),
        })
    }

    /// Singleton input provider for `method`
    pub fn input_provider(&self, method: InputMethod) -> Arc<dyn InputProvider> {
        if let Some(slot) = self.input.read().get(&method) {
            return slot.provider.clone();
        }

        let mut cache = self.input.write();
        let slot = cache.entry(method).or_insert_with(|| {
            let runner = self.runner.clone();
            let host = self.host.clone();
            let provider: Arc<dyn InputProvider> = match method {
                InputMethod::X11Xdotool => {
                    let provider = XdotoolInputProvider::new(runner, host);
                    match self.active_display.read().clone() {
                        Some(display) => Arc::new(provider.with_display(display)),
                        None => Arc::new(provider),
                    }
                }
                InputMethod::WindowsNative | InputMethod::Wsl2Powershell => {
                    Arc::new(PowerShellInputProvider::new(runner, host, method))
                }
            };
            debug!("Created input provider {}", method);
            Slot {
                provider,
                pinned: false,
            }
        });
        slot.provider.clone()
    }

    /// Resolves the screenshot provider for `profile`
    ///
    /// An override is returned as-is without an availability check.
    /// Otherwise the first available provider in the fallback chain wins.
    pub async fn create(
        &self,
        profile: &PlatformProfile,
        override_method: Option<ScreenshotMethod>,
    ) -> DesktopResult<Arc<dyn ScreenshotProvider>> {
        if let Some(method) = override_method {
            info!("Using screenshot method override {}", method);
            return self.screenshot_provider(method, profile);
        }

        let routed = route_screenshot(profile);
        let mut tried = Vec::new();
        for method in screenshot_chain(profile) {
            match self.screenshot_provider(method, profile) {
                Ok(provider) if provider.is_available().await => {
                    if method != routed {
                        info!("Falling back from {} to {}", routed, method);
                    }
                    return Ok(provider);
                }
                Ok(_) => tried.push(format!("{method} (not available)")),
                Err(e) => tried.push(format!("{method} ({e})")),
            }
            debug!("Screenshot method {} skipped", method);
        }

        Err(DesktopError::ProviderUnavailable {
            method: routed.to_string(),
            reason: format!("no available provider; tried {}", tried.join(", ")),
        })
    }

    /// Resolves the input provider for `profile`
    pub async fn create_input(&self, profile: &PlatformProfile) -> DesktopResult<Arc<dyn InputProvider>> {
        let chain = input_chain(profile);
        for method in &chain {
            let provider = self.input_provider(*method);
            if provider.is_available().await {
                return Ok(provider);
            }
            debug!("Input method {} not available", method);
        }

        Err(DesktopError::ProviderUnavailable {
            method: chain
                .first()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "input".to_string()),
            reason: format!("no input provider available for {}", profile.environment_label()),
        })
    }

    /// Captures the screen, walking the fallback chain
    ///
    /// The whole chain shares one screenshot timeout; each method gets an
    /// equal share of what is left when its turn comes. Invalid arguments
    /// fail immediately; any other failure moves on to the next method. When
    /// the chain is exhausted the outcome carries [`PLACEHOLDER_PNG`] with
    /// guidance instead of an error.
    pub async fn capture(
        &self,
        profile: &PlatformProfile,
        override_method: Option<ScreenshotMethod>,
        region: Option<Region>,
        monitor: Option<u32>,
    ) -> DesktopResult<CaptureOutcome> {
        let mut methods = Vec::new();
        if let Some(method) = override_method {
            methods.push(method);
        }
        methods.extend(
            screenshot_chain(profile)
                .into_iter()
                .filter(|m| Some(*m) != override_method),
        );

        let deadline = Instant::now() + screenshot_timeout();
        let total = methods.len();
        let mut attempts = Vec::new();
        for (index, method) in methods.into_iter().enumerate() {
            let methods_left = total - index;
            let provider = match self.screenshot_provider(method, profile) {
                Ok(provider) => provider,
                Err(e) => {
                    attempts.push(CaptureAttempt {
                        method,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let forced = Some(method) == override_method;
            if !forced {
                let probe = budget_share(deadline, methods_left);
                let available = tokio::time::timeout(probe, provider.is_available())
                    .await
                    .unwrap_or(false);
                if !available {
                    attempts.push(CaptureAttempt {
                        method,
                        error: "not available".to_string(),
                    });
                    continue;
                }
            }

            let budget = budget_share(deadline, methods_left);
            if budget.is_zero() {
                attempts.push(CaptureAttempt {
                    method,
                    error: "screenshot deadline exhausted".to_string(),
                });
                continue;
            }

            let operation = format!("screenshot via {method}");
            match with_timeout(&operation, budget, provider.capture(region, monitor)).await {
                Ok(bytes) => {
                    info!("Captured {} bytes via {}", bytes.len(), method);
                    return Ok(CaptureOutcome {
                        bytes,
                        method_used: Some(method),
                        placeholder: false,
                        attempts,
                        guidance: Vec::new(),
                        recommended_action: None,
                    });
                }
                Err(e @ DesktopError::InvalidArgument { .. }) => return Err(e),
                Err(e) => {
                    warn!("Screenshot via {} failed: {}", method, e);
                    attempts.push(CaptureAttempt {
                        method,
                        error: e.to_string(),
                    });
                }
            }
        }

        warn!(
            "All {} screenshot methods failed, returning placeholder",
            attempts.len()
        );
        let (guidance, action) = capture_guidance(profile);
        Ok(CaptureOutcome {
            bytes: PLACEHOLDER_PNG.to_vec(),
            method_used: None,
            placeholder: true,
            attempts,
            guidance,
            recommended_action: action.map(str::to_string),
        })
    }
}
