//! PowerShell-driven capture and input for Windows and WSL2
//!
//! Capture runs a System.Drawing script that saves a PNG to the Windows temp
//! directory and prints its path. Under WSL the path is translated to the
//! Linux view (`C:\...` to `/mnt/c/...`, `\\wsl$\<distro>\...` to `/...`),
//! read back and deleted. Input goes through user32 `SetCursorPos` /
//! `mouse_event` and `SendKeys`.

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;

use super::traits::{
    InputMethod, InputProvider, MonitorInfo, ScreenshotMethod, ScreenshotProvider, ensure_in_bounds,
};
use crate::{
    constants::{command_timeout, screenshot_timeout, typing_timeout},
    error::{DesktopError, DesktopResult},
    model::{MouseButton, OsKind, Region, ScrollDirection},
    platform::HostProbe,
    util::{
        process::{CommandOutput, CommandRunner, CommandSpec},
        temp_png::is_png,
    },
};

/// Exit code the capture script uses for an unknown monitor index
const EXIT_NO_SUCH_MONITOR: i32 = 3;

const WHEEL_DELTA: i32 = 120;

/// PowerShell executable name for this host
pub fn powershell_program(host: &dyn HostProbe) -> &'static str {
    match host.os() {
        OsKind::Windows => "powershell",
        _ => "powershell.exe",
    }
}

fn powershell(program: &str, script: String) -> CommandSpec {
    CommandSpec::new(program).args([
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
        script,
    ])
}

async fn run_script(
    runner: &dyn CommandRunner,
    program: &str,
    script: String,
    timeout: Duration,
) -> DesktopResult<CommandOutput> {
    runner.run(&powershell(program, script).timeout(timeout)).await
}

/// Translates a path printed by Windows into one readable from this host
///
/// Non-Windows paths are returned unchanged.
pub fn windows_to_local_path(path: &str, os: OsKind) -> PathBuf {
    let path = path.trim();
    if os == OsKind::Windows {
        return PathBuf::from(path);
    }

    for prefix in [r"\\wsl$\", r"\\wsl.localhost\"] {
        if let Some(rest) = path.strip_prefix(prefix) {
            let inner = rest.split_once('\\').map(|(_, p)| p).unwrap_or_default();
            return PathBuf::from(format!("/{}", inner.replace('\\', "/")));
        }
    }

    let mut chars = path.chars();
    if let (Some(drive), Some(':')) = (chars.next(), chars.next()) {
        if drive.is_ascii_alphabetic() {
            let rest = path[2..].replace('\\', "/");
            return PathBuf::from(format!(
                "/mnt/{}/{}",
                drive.to_ascii_lowercase(),
                rest.trim_start_matches('/')
            ));
        }
    }

    PathBuf::from(path)
}

/// Escapes a value for a single-quoted PowerShell string
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

// ============================================================================
// Screenshot
// ============================================================================

/// PowerShell System.Drawing capture
pub struct PowerShellScreenshotProvider {
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn HostProbe>,
    method: ScreenshotMethod,
}

impl PowerShellScreenshotProvider {
    /// `method` is one of `wsl2_powershell`, `windows_native` or
    /// `windows_rdp_capture`; RDP captures the whole virtual screen.
    pub fn new(runner: Arc<dyn CommandRunner>, host: Arc<dyn HostProbe>, method: ScreenshotMethod) -> Self {
        Self { runner, host, method }
    }

    fn program(&self) -> &'static str {
        powershell_program(self.host.as_ref())
    }

    fn bounds_expression(&self, region: Option<&Region>, monitor: Option<u32>) -> String {
        match (region, monitor) {
            (Some(r), _) => format!(
                "New-Object System.Drawing.Rectangle {}, {}, {}, {}",
                r.x, r.y, r.width, r.height
            ),
            (None, Some(index)) => format!(
                "$s = [System.Windows.Forms.Screen]::AllScreens; \
                 if ({index} -ge $s.Count) {{ exit {EXIT_NO_SUCH_MONITOR} }}; $s[{index}].Bounds"
            ),
            (None, None) if self.method == ScreenshotMethod::WindowsRdpCapture => {
                "[System.Windows.Forms.SystemInformation]::VirtualScreen".to_string()
            }
            (None, None) => "[System.Windows.Forms.Screen]::PrimaryScreen.Bounds".to_string(),
        }
    }

    fn capture_script(&self, region: Option<&Region>, monitor: Option<u32>) -> String {
        format!(
            "Add-Type -AssemblyName System.Windows.Forms, System.Drawing; \
             $b = $({bounds}); \
             $bmp = New-Object System.Drawing.Bitmap $b.Width, $b.Height; \
             $g = [System.Drawing.Graphics]::FromImage($bmp); \
             $g.CopyFromScreen($b.Location, [System.Drawing.Point]::Empty, $b.Size); \
             $p = Join-Path $env:TEMP ('computer-use-' + [guid]::NewGuid().ToString() + '.png'); \
             $bmp.Save($p, [System.Drawing.Imaging.ImageFormat]::Png); \
             $g.Dispose(); $bmp.Dispose(); \
             Write-Output $p",
            bounds = self.bounds_expression(region, monitor)
        )
    }
}

#[async_trait]
impl ScreenshotProvider for PowerShellScreenshotProvider {
    fn method(&self) -> ScreenshotMethod {
        self.method
    }

    async fn is_available(&self) -> bool {
        self.host.find_executable(self.program()).is_some()
    }

    async fn capture(&self, region: Option<Region>, monitor: Option<u32>) -> DesktopResult<Vec<u8>> {
        if let Some(r) = region {
            if r.width == 0 || r.height == 0 {
                return Err(DesktopError::invalid("region", "width and height must be positive"));
            }
        }

        let output = run_script(
            self.runner.as_ref(),
            self.program(),
            self.capture_script(region.as_ref(), monitor),
            screenshot_timeout(),
        )
        .await?;

        if output.status == Some(EXIT_NO_SUCH_MONITOR) {
            return Err(DesktopError::invalid("monitor", "monitor index out of range"));
        }
        let output = output.into_result(self.program())?;

        let printed = output
            .stdout_str()
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DesktopError::CommandFailed {
                program: self.program().to_string(),
                status: output.status,
                stderr: "capture script printed no path".to_string(),
            })?;

        let local = windows_to_local_path(&printed, self.host.os());
        tracing::debug!("PowerShell capture written to {} ({})", printed, local.display());

        let bytes = tokio::fs::read(&local)
            .await
            .map_err(|e| DesktopError::io(format!("reading {}", local.display()), e))?;
        if let Err(e) = tokio::fs::remove_file(&local).await {
            tracing::warn!("Could not remove capture file {}: {}", local.display(), e);
        }

        if !is_png(&bytes) {
            return Err(DesktopError::CommandFailed {
                program: self.program().to_string(),
                status: output.status,
                stderr: format!("capture file is not a PNG ({} bytes)", bytes.len()),
            });
        }
        Ok(bytes)
    }

    async fn monitors(&self) -> DesktopResult<Vec<MonitorInfo>> {
        let script = "Add-Type -AssemblyName System.Windows.Forms; \
            $i = 0; foreach ($s in [System.Windows.Forms.Screen]::AllScreens) { \
            $b = $s.Bounds; \
            Write-Output ('{0}|{1}|{2}|{3}|{4}|{5}|{6}' -f $i, $s.DeviceName, $b.X, $b.Y, $b.Width, $b.Height, $s.Primary); \
            $i++ }"
            .to_string();

        let output = run_script(self.runner.as_ref(), self.program(), script, command_timeout()).await?;
        let monitors = if output.success() {
            parse_screen_list(&output.stdout_str())
        } else {
            Vec::new()
        };

        if monitors.is_empty() {
            return Ok(vec![MonitorInfo::fallback()]);
        }
        Ok(monitors)
    }
}

fn parse_screen_list(stdout: &str) -> Vec<MonitorInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let f: Vec<&str> = line.trim().split('|').collect();
            if f.len() != 7 {
                return None;
            }
            Some(MonitorInfo {
                index: f[0].parse().ok()?,
                name: f[1].to_string(),
                x: f[2].parse().ok()?,
                y: f[3].parse().ok()?,
                width: f[4].parse().ok()?,
                height: f[5].parse().ok()?,
                primary: f[6].eq_ignore_ascii_case("true"),
            })
        })
        .collect()
}

// ============================================================================
// Input
// ============================================================================

const USER32: &str = "Add-Type -Namespace ComputerUse -Name User32 -MemberDefinition \
    '[DllImport(\"user32.dll\")] public static extern bool SetCursorPos(int x, int y); \
    [DllImport(\"user32.dll\")] public static extern void mouse_event(uint f, uint dx, uint dy, int d, System.UIntPtr e);'; ";

const SENDKEYS: &str = "Add-Type -AssemblyName System.Windows.Forms; ";

fn button_flags(button: MouseButton) -> (u32, u32) {
    match button {
        MouseButton::Left => (0x0002, 0x0004),
        MouseButton::Right => (0x0008, 0x0010),
        MouseButton::Middle => (0x0020, 0x0040),
    }
}

fn mouse_event(flags: u32, data: i32) -> String {
    format!("[ComputerUse.User32]::mouse_event({flags}, 0, 0, {data}, [System.UIntPtr]::Zero); ")
}

fn set_cursor(x: u32, y: u32) -> String {
    format!("[void][ComputerUse.User32]::SetCursorPos({x}, {y}); ")
}

/// Escapes literal text for `SendKeys`
pub fn escape_sendkeys(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '+' | '^' | '%' | '~' | '(' | ')' | '[' | ']' => {
                out.push('{');
                out.push(c);
                out.push('}');
            }
            '{' => out.push_str("{{}"),
            '}' => out.push_str("{}}"),
            '\n' => out.push_str("{ENTER}"),
            '\r' => {}
            '\t' => out.push_str("{TAB}"),
            _ => out.push(c),
        }
    }
    out
}

/// Converts a canonical key combination to `SendKeys` syntax
pub fn sendkeys_combo(key: &str) -> DesktopResult<String> {
    let (mods, base) = match key.strip_suffix("++") {
        Some(mods) => (mods, "+"),
        None => key.rsplit_once('+').unwrap_or(("", key)),
    };

    let mut out = String::new();
    for modifier in mods.split('+').filter(|m| !m.is_empty()) {
        match modifier {
            "ctrl" => out.push('^'),
            "alt" => out.push('%'),
            "shift" => out.push('+'),
            other => {
                return Err(DesktopError::invalid(
                    "key",
                    format!("modifier '{other}' is not supported by SendKeys"),
                ));
            }
        }
    }

    let named = match base {
        "Return" => "{ENTER}",
        "Tab" => "{TAB}",
        "Escape" => "{ESC}",
        "BackSpace" => "{BACKSPACE}",
        "Delete" => "{DELETE}",
        "Insert" => "{INSERT}",
        "Home" => "{HOME}",
        "End" => "{END}",
        "Page_Up" => "{PGUP}",
        "Page_Down" => "{PGDN}",
        "Up" => "{UP}",
        "Down" => "{DOWN}",
        "Left" => "{LEFT}",
        "Right" => "{RIGHT}",
        "Caps_Lock" => "{CAPSLOCK}",
        "Print" => "{PRTSC}",
        "space" => " ",
        _ => "",
    };

    if !named.is_empty() {
        out.push_str(named);
    } else if let Some(n) = base.strip_prefix('F').filter(|n| n.parse::<u8>().is_ok()) {
        out.push_str(&format!("{{F{n}}}"));
    } else if base.chars().count() == 1 {
        out.push_str(&escape_sendkeys(base));
    } else {
        return Err(DesktopError::invalid(
            "key",
            format!("key '{base}' is not supported by SendKeys"),
        ));
    }
    Ok(out)
}

/// PowerShell user32/SendKeys input
pub struct PowerShellInputProvider {
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn HostProbe>,
    method: InputMethod,
}

impl PowerShellInputProvider {
    pub fn new(runner: Arc<dyn CommandRunner>, host: Arc<dyn HostProbe>, method: InputMethod) -> Self {
        Self { runner, host, method }
    }

    async fn run(&self, script: String) -> DesktopResult<String> {
        self.run_with_timeout(script, command_timeout()).await
    }

    async fn run_with_timeout(&self, script: String, timeout: Duration) -> DesktopResult<String> {
        let program = powershell_program(self.host.as_ref());
        let output = run_script(self.runner.as_ref(), program, script, timeout)
            .await?
            .into_result(program)?;
        Ok(output.stdout_str())
    }
}

#[async_trait]
impl InputProvider for PowerShellInputProvider {
    fn method(&self) -> InputMethod {
        self.method
    }

    async fn is_available(&self) -> bool {
        self.host
            .find_executable(powershell_program(self.host.as_ref()))
            .is_some()
    }

    async fn click(&self, x: u32, y: u32, button: MouseButton) -> DesktopResult<()> {
        ensure_in_bounds(x, y)?;
        let (down, up) = button_flags(button);
        let script = format!(
            "{USER32}{}{}{}",
            set_cursor(x, y),
            mouse_event(down, 0),
            mouse_event(up, 0)
        );
        self.run(script).await.map(|_| ())
    }

    async fn type_text(&self, text: &str) -> DesktopResult<()> {
        let script = format!(
            "{SENDKEYS}[System.Windows.Forms.SendKeys]::SendWait({})",
            ps_quote(&escape_sendkeys(text))
        );
        self.run_with_timeout(script, typing_timeout(text.chars().count()))
            .await
            .map(|_| ())
    }

    async fn key_press(&self, key: &str) -> DesktopResult<()> {
        let combo = sendkeys_combo(key)?;
        let script = format!(
            "{SENDKEYS}[System.Windows.Forms.SendKeys]::SendWait({})",
            ps_quote(&combo)
        );
        self.run(script).await.map(|_| ())
    }

    async fn scroll(
        &self,
        direction: ScrollDirection,
        amount: u32,
        at: Option<(u32, u32)>,
    ) -> DesktopResult<()> {
        let clicks = amount as i32 * WHEEL_DELTA;
        let (flags, data) = match direction {
            ScrollDirection::Up => (0x0800, clicks),
            ScrollDirection::Down => (0x0800, -clicks),
            ScrollDirection::Right => (0x1000, clicks),
            ScrollDirection::Left => (0x1000, -clicks),
        };

        let mut script = USER32.to_string();
        if let Some((x, y)) = at {
            ensure_in_bounds(x, y)?;
            script.push_str(&set_cursor(x, y));
        }
        script.push_str(&mouse_event(flags, data));
        self.run(script).await.map(|_| ())
    }

    async fn drag(&self, from: (u32, u32), to: (u32, u32)) -> DesktopResult<()> {
        ensure_in_bounds(from.0, from.1)?;
        ensure_in_bounds(to.0, to.1)?;
        let (down, up) = button_flags(MouseButton::Left);
        let script = format!(
            "{USER32}{}{}Start-Sleep -Milliseconds 50; {}{}",
            set_cursor(from.0, from.1),
            mouse_event(down, 0),
            set_cursor(to.0, to.1),
            mouse_event(up, 0)
        );
        self.run(script).await.map(|_| ())
    }

    async fn cursor_position(&self) -> DesktopResult<(i32, i32)> {
        let stdout = self
            .run(format!(
                "{SENDKEYS}$p = [System.Windows.Forms.Cursor]::Position; Write-Output (\"{{0}},{{1}}\" -f $p.X, $p.Y)"
            ))
            .await?;
        stdout
            .trim()
            .split_once(',')
            .and_then(|(x, y)| Some((x.trim().parse().ok()?, y.trim().parse().ok()?)))
            .ok_or_else(|| DesktopError::CommandFailed {
                program: powershell_program(self.host.as_ref()).to_string(),
                status: Some(0),
                stderr: "unexpected cursor position output".to_string(),
            })
    }
}
