//! X11 capture and xdotool input
//!
//! Capture tries scrot, then ImageMagick `import`, then `xwd` piped through
//! `convert`, using whichever tools are on `PATH`. The same provider serves
//! a native display and a VcXsrv/X410 server on the Windows host; only the
//! target `DISPLAY` differs.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::traits::{
    InputMethod, InputProvider, MonitorInfo, ScreenshotMethod, ScreenshotProvider, ensure_in_bounds,
};
use crate::{
    constants::{NATIVE_DISPLAY, TYPE_DELAY_MS, command_timeout, screenshot_timeout, typing_timeout},
    error::{DesktopError, DesktopResult},
    model::{MouseButton, Region, ScrollDirection},
    platform::{HostProbe, probe_x11},
    util::{
        process::{CommandRunner, CommandSpec},
        temp_png::CaptureScratch,
    },
};

/// Display used for X11 on this host: `DISPLAY`, else `:0`
pub fn default_display(host: &dyn HostProbe) -> String {
    host.env_var("DISPLAY")
        .unwrap_or_else(|| NATIVE_DISPLAY.to_string())
}

fn on_display(program: &str, display: &str) -> CommandSpec {
    CommandSpec::new(program).env("DISPLAY", display)
}

fn geometry(region: &Region) -> String {
    format!("{}x{}+{}+{}", region.width, region.height, region.x, region.y)
}

fn check_region(region: Option<Region>) -> DesktopResult<()> {
    match region {
        Some(r) if r.width == 0 || r.height == 0 => {
            Err(DesktopError::invalid("region", "width and height must be positive"))
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Screenshot
// ============================================================================

/// X11 screen capture against a fixed display
pub struct X11ScreenshotProvider {
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn HostProbe>,
    display: String,
    method: ScreenshotMethod,
}

impl X11ScreenshotProvider {
    /// Capture from the local X server
    pub fn native(runner: Arc<dyn CommandRunner>, host: Arc<dyn HostProbe>) -> Self {
        let display = default_display(host.as_ref());
        Self {
            runner,
            host,
            display,
            method: ScreenshotMethod::X11,
        }
    }

    /// Capture from a VcXsrv/X410 server reachable at `display`
    pub fn vcxsrv(runner: Arc<dyn CommandRunner>, host: Arc<dyn HostProbe>, display: String) -> Self {
        Self {
            runner,
            host,
            display,
            method: ScreenshotMethod::VcxsrvX11,
        }
    }

    /// Targets `display` instead of the host's `DISPLAY`
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    fn has(&self, tool: &str) -> bool {
        self.host.find_executable(tool).is_some()
    }

    async fn run_capture_tool(&self, spec: CommandSpec) -> DesktopResult<()> {
        let program = spec.program.clone();
        self.runner
            .run(&spec.timeout(screenshot_timeout()))
            .await?
            .into_result(&program)
            .map(|_| ())
    }

    async fn capture_scrot(&self, region: Option<&Region>) -> DesktopResult<Vec<u8>> {
        let scratch = CaptureScratch::new()?;
        let out = scratch.file("scrot.png");

        let mut spec = on_display("scrot", &self.display).arg("--silent");
        if let Some(r) = region {
            spec = spec
                .arg("--autoselect")
                .arg(format!("{},{},{},{}", r.x, r.y, r.width, r.height));
        }
        self.run_capture_tool(spec.arg(out.to_string_lossy())).await?;
        scratch.read_png(&out, "scrot").await
    }

    async fn capture_import(&self, region: Option<&Region>) -> DesktopResult<Vec<u8>> {
        let scratch = CaptureScratch::new()?;
        let out = scratch.file("import.png");

        let mut spec = on_display("import", &self.display).args(["-window", "root"]);
        if let Some(r) = region {
            spec = spec.arg("-crop").arg(geometry(r));
        }
        self.run_capture_tool(spec.arg(format!("png:{}", out.to_string_lossy())))
            .await?;
        scratch.read_png(&out, "import").await
    }

    async fn capture_xwd(&self, region: Option<&Region>) -> DesktopResult<Vec<u8>> {
        let scratch = CaptureScratch::new()?;
        let dump = scratch.file("screen.xwd");
        let out = scratch.file("xwd.png");

        self.run_capture_tool(
            on_display("xwd", &self.display)
                .args(["-root", "-silent", "-out"])
                .arg(dump.to_string_lossy()),
        )
        .await?;

        let mut convert = CommandSpec::new("convert").arg(format!("xwd:{}", dump.to_string_lossy()));
        if let Some(r) = region {
            convert = convert.arg("-crop").arg(geometry(r));
        }
        self.run_capture_tool(convert.arg(format!("png:{}", out.to_string_lossy())))
            .await?;
        scratch.read_png(&out, "convert").await
    }

    async fn monitor_region(&self, index: u32) -> DesktopResult<Region> {
        let monitors = self.monitors().await?;
        monitors
            .iter()
            .find(|m| m.index == index)
            .map(|m| Region {
                x: m.x.max(0) as u32,
                y: m.y.max(0) as u32,
                width: m.width,
                height: m.height,
            })
            .ok_or_else(|| {
                DesktopError::invalid("monitor", format!("monitor {index} not found ({} present)", monitors.len()))
            })
    }
}

#[async_trait]
impl ScreenshotProvider for X11ScreenshotProvider {
    fn method(&self) -> ScreenshotMethod {
        self.method
    }

    async fn is_available(&self) -> bool {
        let has_tool = self.has("scrot") || self.has("import") || (self.has("xwd") && self.has("convert"));
        has_tool && probe_x11(self.runner.as_ref(), &self.display).await
    }

    async fn capture(&self, region: Option<Region>, monitor: Option<u32>) -> DesktopResult<Vec<u8>> {
        check_region(region)?;
        let region = match (region, monitor) {
            (Some(r), _) => Some(r),
            (None, Some(index)) => Some(self.monitor_region(index).await?),
            (None, None) => None,
        };

        let mut last_error = DesktopError::ProviderUnavailable {
            method: self.method.as_str().to_string(),
            reason: "no X11 capture tool (scrot, import, xwd) found".to_string(),
        };

        if self.has("scrot") {
            match self.capture_scrot(region.as_ref()).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::debug!("scrot capture on {} failed: {}", self.display, e);
                    last_error = e;
                }
            }
        }
        if self.has("import") {
            match self.capture_import(region.as_ref()).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::debug!("import capture on {} failed: {}", self.display, e);
                    last_error = e;
                }
            }
        }
        if self.has("xwd") && self.has("convert") {
            match self.capture_xwd(region.as_ref()).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::debug!("xwd capture on {} failed: {}", self.display, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn monitors(&self) -> DesktopResult<Vec<MonitorInfo>> {
        let spec = on_display("xrandr", &self.display)
            .arg("--query")
            .timeout(command_timeout());

        let monitors = match self.runner.run(&spec).await {
            Ok(output) if output.success() => parse_xrandr(&output.stdout_str()),
            Ok(output) => {
                tracing::debug!("xrandr failed: {}", output.stderr_str());
                Vec::new()
            }
            Err(e) => {
                tracing::debug!("xrandr unavailable: {}", e);
                Vec::new()
            }
        };

        if monitors.is_empty() {
            return Ok(vec![MonitorInfo::fallback()]);
        }
        Ok(monitors)
    }
}

static XRANDR_MONITOR: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(\S+) connected (primary )?(\d+)x(\d+)\+(-?\d+)\+(-?\d+)").ok()
});

/// Parses connected outputs from `xrandr --query`
pub fn parse_xrandr(output: &str) -> Vec<MonitorInfo> {
    let Some(re) = XRANDR_MONITOR.as_ref() else {
        return Vec::new();
    };

    output
        .lines()
        .filter_map(|line| re.captures(line))
        .enumerate()
        .filter_map(|(index, caps)| {
            Some(MonitorInfo {
                index: index as u32,
                name: caps.get(1)?.as_str().to_string(),
                primary: caps.get(2).is_some(),
                width: caps.get(3)?.as_str().parse().ok()?,
                height: caps.get(4)?.as_str().parse().ok()?,
                x: caps.get(5)?.as_str().parse().ok()?,
                y: caps.get(6)?.as_str().parse().ok()?,
            })
        })
        .collect()
}

// ============================================================================
// Input
// ============================================================================

/// xdotool input injection
pub struct XdotoolInputProvider {
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn HostProbe>,
    display: String,
}

impl XdotoolInputProvider {
    pub fn new(runner: Arc<dyn CommandRunner>, host: Arc<dyn HostProbe>) -> Self {
        let display = default_display(host.as_ref());
        Self {
            runner,
            host,
            display,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }

    async fn xdotool<I, S>(&self, args: I) -> DesktopResult<String>
    where
        I: IntoIterator<Item = S> + Send,
        S: Into<String>,
    {
        self.run_xdotool(on_display("xdotool", &self.display).args(args)).await
    }

    async fn run_xdotool(&self, spec: CommandSpec) -> DesktopResult<String> {
        let output = self.runner.run(&spec).await?.into_result("xdotool")?;
        Ok(output.stdout_str())
    }
}

/// Maps the canonical key form to xdotool keysyms
fn xdotool_key(key: &str) -> String {
    if key == "+" {
        return "plus".to_string();
    }
    match key.strip_suffix("++") {
        Some(mods) => format!("{mods}+plus"),
        None => key.to_string(),
    }
}

#[async_trait]
impl InputProvider for XdotoolInputProvider {
    fn method(&self) -> InputMethod {
        InputMethod::X11Xdotool
    }

    async fn is_available(&self) -> bool {
        self.host.find_executable("xdotool").is_some()
            && probe_x11(self.runner.as_ref(), &self.display).await
    }

    async fn click(&self, x: u32, y: u32, button: MouseButton) -> DesktopResult<()> {
        ensure_in_bounds(x, y)?;
        self.xdotool([
            "mousemove".to_string(),
            x.to_string(),
            y.to_string(),
            "click".to_string(),
            button.x11_button().to_string(),
        ])
        .await
        .map(|_| ())
    }

    async fn type_text(&self, text: &str) -> DesktopResult<()> {
        let delay = TYPE_DELAY_MS.to_string();
        let spec = on_display("xdotool", &self.display)
            .args(["type", "--delay", delay.as_str(), "--", text])
            .timeout(typing_timeout(text.chars().count()));
        self.run_xdotool(spec).await.map(|_| ())
    }

    async fn key_press(&self, key: &str) -> DesktopResult<()> {
        self.xdotool(["key".to_string(), "--".to_string(), xdotool_key(key)])
            .await
            .map(|_| ())
    }

    async fn scroll(
        &self,
        direction: ScrollDirection,
        amount: u32,
        at: Option<(u32, u32)>,
    ) -> DesktopResult<()> {
        let mut args = Vec::new();
        if let Some((x, y)) = at {
            ensure_in_bounds(x, y)?;
            args.extend(["mousemove".to_string(), x.to_string(), y.to_string()]);
        }
        args.extend([
            "click".to_string(),
            "--repeat".to_string(),
            amount.to_string(),
            direction.x11_button().to_string(),
        ]);
        self.xdotool(args).await.map(|_| ())
    }

    async fn drag(&self, from: (u32, u32), to: (u32, u32)) -> DesktopResult<()> {
        ensure_in_bounds(from.0, from.1)?;
        ensure_in_bounds(to.0, to.1)?;
        self.xdotool([
            "mousemove".to_string(),
            from.0.to_string(),
            from.1.to_string(),
            "mousedown".to_string(),
            "1".to_string(),
            "mousemove".to_string(),
            to.0.to_string(),
            to.1.to_string(),
            "mouseup".to_string(),
            "1".to_string(),
        ])
        .await
        .map(|_| ())
    }

    async fn cursor_position(&self) -> DesktopResult<(i32, i32)> {
        let stdout = self.xdotool(["getmouselocation", "--shell"]).await?;
        let field = |name: &str| {
            stdout
                .lines()
                .find_map(|l| l.trim().strip_prefix(name))
                .and_then(|v| v.parse::<i32>().ok())
        };
        match (field("X="), field("Y=")) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(DesktopError::CommandFailed {
                program: "xdotool".to_string(),
                status: Some(0),
                stderr: "unexpected getmouselocation output".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        platform::mock::MockHost,
        util::{mock_runner::MockCommandRunner, process::CommandOutput},
    };

    const XRANDR: &str = "Screen 0: minimum 8 x 8, current 4480 x 1440, maximum 32767 x 32767\n\
        DP-1 connected primary 2560x1440+0+0 (normal left inverted right x axis y axis) 597mm x 336mm\n\
           2560x1440     59.95*+\n\
        HDMI-1 connected 1920x1080+2560+180 (normal left inverted right x axis y axis) 527mm x 296mm\n\
        HDMI-2 disconnected (normal left inverted right x axis y axis)\n";

    fn setup(host: MockHost) -> (Arc<MockCommandRunner>, X11ScreenshotProvider) {
        let runner = Arc::new(MockCommandRunner::new());
        let provider = X11ScreenshotProvider::native(runner.clone(), Arc::new(host));
        (runner, provider)
    }

    #[test]
    fn test_parse_xrandr() {
        let monitors = parse_xrandr(XRANDR);
        assert_eq!(monitors.len(), 2);
        assert_eq!(monitors[0].name, "DP-1");
        assert!(monitors[0].primary);
        assert_eq!((monitors[0].width, monitors[0].height), (2560, 1440));
        assert_eq!((monitors[1].x, monitors[1].y), (2560, 180));
        assert!(!monitors[1].primary);
    }

    #[tokio::test]
    async fn test_monitors_fall_back_when_xrandr_fails() {
        let (runner, provider) = setup(MockHost::x11_desktop());
        runner.set_response("xrandr", CommandOutput::failed(1, "Can't open display"));

        let monitors = provider.monitors().await.unwrap();
        assert_eq!(monitors, vec![MonitorInfo::fallback()]);
    }

    #[tokio::test]
    async fn test_is_available_requires_tool_and_display() {
        let (runner, provider) = setup(MockHost::x11_desktop());
        runner.set_response("xset", CommandOutput::ok(""));
        assert!(provider.is_available().await);

        runner.set_response("xset", CommandOutput::failed(1, "unable to open display"));
        assert!(!provider.is_available().await);

        let (runner, provider) = setup(MockHost::linux().with_env("DISPLAY", ":0"));
        runner.set_response("xset", CommandOutput::ok(""));
        assert!(!provider.is_available().await);
    }

    #[tokio::test]
    async fn test_capture_falls_through_tools_and_reports_last_error() {
        let (runner, provider) = setup(MockHost::x11_desktop());
        runner.set_response("scrot", CommandOutput::failed(2, "giblib error"));
        runner.set_response("import", CommandOutput::failed(1, "unable to open X server"));
        runner.set_response("xwd", CommandOutput::failed(1, "unable to open display"));

        let err = provider.capture(None, None).await.unwrap_err();
        assert!(matches!(err, DesktopError::CommandFailed { ref program, .. } if program == "xwd"));

        let programs: Vec<String> = runner.calls().into_iter().map(|c| c.program).collect();
        assert_eq!(programs, vec!["scrot", "import", "xwd"]);
        assert!(runner.calls().iter().all(|c| c.env_value("DISPLAY") == Some(":0")));
    }

    #[tokio::test]
    async fn test_capture_without_tools_is_provider_unavailable() {
        let (_runner, provider) = setup(MockHost::linux().with_env("DISPLAY", ":1"));
        let err = provider.capture(None, None).await.unwrap_err();
        assert!(matches!(err, DesktopError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_region_is_passed_to_tools() {
        let host = MockHost::linux().with_env("DISPLAY", ":0").with_executable("import");
        let (runner, provider) = setup(host);
        runner.set_response("import", CommandOutput::failed(1, ""));

        let region = Region { x: 10, y: 20, width: 300, height: 200 };
        let _ = provider.capture(Some(region), None).await;

        let call = &runner.calls_for("import")[0];
        assert!(call.args.contains(&"300x200+10+20".to_string()));
    }

    #[tokio::test]
    async fn test_zero_sized_region_rejected() {
        let (runner, provider) = setup(MockHost::x11_desktop());
        let region = Region { x: 0, y: 0, width: 0, height: 10 };

        let err = provider.capture(Some(region), None).await.unwrap_err();
        assert!(matches!(err, DesktopError::InvalidArgument { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_selects_xrandr_geometry() {
        let host = MockHost::linux().with_env("DISPLAY", ":0").with_executable("import");
        let (runner, provider) = setup(host);
        runner.set_response("xrandr", CommandOutput::ok(XRANDR));
        runner.set_response("import", CommandOutput::failed(1, ""));

        let _ = provider.capture(None, Some(1)).await;
        let call = &runner.calls_for("import")[0];
        assert!(call.args.contains(&"1920x1080+2560+180".to_string()));

        let err = provider.capture(None, Some(7)).await.unwrap_err();
        assert!(matches!(err, DesktopError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_vcxsrv_targets_host_display() {
        let runner = Arc::new(MockCommandRunner::new());
        let provider = X11ScreenshotProvider::vcxsrv(
            runner.clone(),
            Arc::new(MockHost::wsl2().with_executable("import")),
            "172.29.96.1:0.0".to_string(),
        );
        runner.set_response("import", CommandOutput::failed(1, ""));

        assert_eq!(provider.method(), ScreenshotMethod::VcxsrvX11);
        let _ = provider.capture(None, None).await;
        assert_eq!(
            runner.calls_for("import")[0].env_value("DISPLAY"),
            Some("172.29.96.1:0.0")
        );
    }

    fn input(runner: Arc<MockCommandRunner>) -> XdotoolInputProvider {
        XdotoolInputProvider::new(runner, Arc::new(MockHost::x11_desktop()))
    }

    #[tokio::test]
    async fn test_xdotool_click() {
        let runner = Arc::new(MockCommandRunner::new());
        input(runner.clone()).click(100, 200, MouseButton::Right).await.unwrap();

        let call = &runner.calls_for("xdotool")[0];
        assert_eq!(call.command_line(), "xdotool mousemove 100 200 click 3");
        assert_eq!(call.env_value("DISPLAY"), Some(":0"));
    }

    #[tokio::test]
    async fn test_xdotool_drag_and_scroll() {
        let runner = Arc::new(MockCommandRunner::new());
        let provider = input(runner.clone());

        provider.drag((1, 2), (30, 40)).await.unwrap();
        provider.scroll(ScrollDirection::Up, 5, Some((7, 8))).await.unwrap();
        provider.scroll(ScrollDirection::Right, 1, None).await.unwrap();

        let lines: Vec<String> = runner.calls().iter().map(|c| c.command_line()).collect();
        assert_eq!(lines[0], "xdotool mousemove 1 2 mousedown 1 mousemove 30 40 mouseup 1");
        assert_eq!(lines[1], "xdotool mousemove 7 8 click --repeat 5 4");
        assert_eq!(lines[2], "xdotool click --repeat 1 7");
    }

    #[tokio::test]
    async fn test_xdotool_type_and_key() {
        let runner = Arc::new(MockCommandRunner::new());
        let provider = input(runner.clone());

        provider.type_text("-n starts with a dash").await.unwrap();
        provider.key_press("ctrl+c").await.unwrap();
        provider.key_press("ctrl++").await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].args, vec!["type", "--delay", "12", "--", "-n starts with a dash"]);
        assert_eq!(calls[0].timeout, typing_timeout(21));
        assert_eq!(calls[1].timeout, command_timeout());
        assert_eq!(calls[1].args, vec!["key", "--", "ctrl+c"]);
        assert_eq!(calls[2].args, vec!["key", "--", "ctrl+plus"]);
    }

    #[tokio::test]
    async fn test_xdotool_failure_is_command_failed() {
        let runner = Arc::new(
            MockCommandRunner::new().respond("xdotool", CommandOutput::failed(1, "Can't open display")),
        );
        let err = input(runner).click(1, 1, MouseButton::Left).await.unwrap_err();
        assert!(matches!(err, DesktopError::CommandFailed { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_xdotool_cursor_position() {
        let runner = Arc::new(
            MockCommandRunner::new()
                .respond("xdotool", CommandOutput::ok("X=640\nY=480\nSCREEN=0\nWINDOW=123\n")),
        );
        assert_eq!(input(runner).cursor_position().await.unwrap(), (640, 480));
    }

    #[tokio::test]
    async fn test_out_of_bounds_never_reaches_xdotool() {
        let runner = Arc::new(MockCommandRunner::new());
        let err = input(runner.clone()).click(20_000, 1, MouseButton::Left).await.unwrap_err();

        assert!(matches!(err, DesktopError::InvalidArgument { .. }));
        assert!(runner.calls().is_empty());
    }
}
