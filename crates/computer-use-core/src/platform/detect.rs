//! Platform detection
//!
//! Classifies the host into a [`PlatformProfile`]: OS family, sub-environment
//! (native, WSL1/WSL2, Windows Server Core, RDP session) and capability
//! flags.
//!
//! # Precedence
//!
//! 1. OS family from the host probe.
//! 2. On Linux, WSL markers: `/proc/version` mentioning Microsoft or WSL,
//!    `WSL_INTEROP`, `WSL_DISTRO_NAME`. `WSL_INTEROP`, `/mnt/wslg` or a
//!    `microsoft-standard` kernel mean WSL2; anything else WSL-like is WSL1.
//! 3. On Windows, Server Core (caption or Winlogon shell) beats an RDP
//!    session (`SESSIONNAME` starting with `RDP-`), which beats a console
//!    session.
//!
//! Detection never fails. Every probe that errors or times out degrades the
//! corresponding flag to false.

use crate::{
    constants::{detection_probe_timeout, probe_timeout},
    model::{Capabilities, OsKind, PlatformProfile, SubEnvironment},
    platform::host::{HostProbe, SystemHost},
    util::process::{CommandRunner, CommandSpec},
};

/// WSL markers found on a Linux host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WslInfo {
    pub version: u8,
    pub distro: Option<String>,
}

/// Detects the current platform using the real host environment
///
/// # Examples
///
/// ```no_run
/// use computer_use_core::{platform::detect_platform, util::process::TokioCommandRunner};
///
/// # async fn run() {
/// let profile = detect_platform(&TokioCommandRunner::new()).await;
/// println!("Running on: {} ({})", profile.os, profile.environment_label());
/// # }
/// ```
pub async fn detect_platform(runner: &dyn CommandRunner) -> PlatformProfile {
    detect_platform_with(&SystemHost, runner).await
}

/// Detects the platform through an injected host probe and command runner
pub async fn detect_platform_with(host: &dyn HostProbe, runner: &dyn CommandRunner) -> PlatformProfile {
    let profile = match host.os() {
        OsKind::Linux => detect_linux(host, runner).await,
        OsKind::Windows => detect_windows(host, runner).await,
        OsKind::MacOS => detect_macos(host),
    };

    tracing::info!(
        "Detected platform: os={} environment={} capabilities={:?}",
        profile.os,
        profile.environment_label(),
        profile.capabilities.to_vec()
    );
    profile
}

async fn detect_linux(host: &dyn HostProbe, runner: &dyn CommandRunner) -> PlatformProfile {
    let display = host.env_var("DISPLAY");
    let wsl = detect_wsl(host);
    let can_use_x11 = check_x11_available(host, runner).await;

    let (sub_environment, can_use_powershell) = match &wsl {
        Some(WslInfo { version: 2, .. }) => (
            SubEnvironment::Wsl2,
            host.env_var("WSL_INTEROP").is_some() || check_powershell_available(host),
        ),
        Some(_) => (SubEnvironment::Wsl1, check_powershell_available(host)),
        None => (SubEnvironment::Native, false),
    };

    PlatformProfile {
        os: OsKind::Linux,
        sub_environment,
        capabilities: Capabilities {
            can_use_powershell,
            can_use_dotnet: false,
            can_use_x11,
            can_use_screencapture: false,
        },
        wsl_version: wsl.as_ref().map(|w| w.version),
        wsl_distro: wsl.and_then(|w| w.distro),
        display,
        is_windows_server: false,
    }
}

async fn detect_windows(host: &dyn HostProbe, runner: &dyn CommandRunner) -> PlatformProfile {
    let caption = windows_caption(runner).await.unwrap_or_default();
    let is_windows_server = caption.contains("Server");
    let is_server_core =
        is_windows_server && (caption.contains("Core") || winlogon_shell_is_cmd(runner).await);
    let is_rdp = host
        .env_var("SESSIONNAME")
        .is_some_and(|s| s.to_ascii_uppercase().starts_with("RDP-"));

    let sub_environment = if is_server_core {
        SubEnvironment::ServerCore
    } else if is_rdp {
        SubEnvironment::Rdp
    } else {
        SubEnvironment::Native
    };

    PlatformProfile {
        os: OsKind::Windows,
        sub_environment,
        capabilities: Capabilities {
            can_use_powershell: check_powershell_available(host),
            can_use_dotnet: sub_environment == SubEnvironment::Native,
            can_use_x11: false,
            can_use_screencapture: false,
        },
        wsl_version: None,
        wsl_distro: None,
        display: host.env_var("DISPLAY"),
        is_windows_server,
    }
}

fn detect_macos(host: &dyn HostProbe) -> PlatformProfile {
    PlatformProfile {
        os: OsKind::MacOS,
        sub_environment: SubEnvironment::Native,
        capabilities: Capabilities {
            can_use_screencapture: host.find_executable("screencapture").is_some(),
            ..Default::default()
        },
        wsl_version: None,
        wsl_distro: None,
        display: None,
        is_windows_server: false,
    }
}

/// Reads WSL markers; `None` on a native Linux host
pub fn detect_wsl(host: &dyn HostProbe) -> Option<WslInfo> {
    let proc_version = host
        .read_file("/proc/version")
        .unwrap_or_default()
        .to_lowercase();
    let interop = host.env_var("WSL_INTEROP").is_some();
    let distro = host.env_var("WSL_DISTRO_NAME");

    let marked = proc_version.contains("microsoft") || proc_version.contains("wsl");
    if !marked && !interop && distro.is_none() {
        return None;
    }

    let is_wsl2 = interop
        || host.path_exists("/mnt/wslg")
        || proc_version.contains("microsoft-standard")
        || proc_version.contains("wsl2");

    Some(WslInfo {
        version: if is_wsl2 { 2 } else { 1 },
        distro,
    })
}

/// Probes the X server on `DISPLAY`
///
/// Short-circuits to false when `DISPLAY` is unset.
pub async fn check_x11_available(host: &dyn HostProbe, runner: &dyn CommandRunner) -> bool {
    match host.env_var("DISPLAY") {
        Some(display) => probe_x11(runner, &display).await,
        None => false,
    }
}

/// Runs `xset q` against `display` with the probe timeout
pub async fn probe_x11(runner: &dyn CommandRunner, display: &str) -> bool {
    let spec = CommandSpec::new("xset")
        .arg("q")
        .env("DISPLAY", display)
        .timeout(probe_timeout());

    match runner.run(&spec).await {
        Ok(output) => output.success(),
        Err(e) => {
            let shown = &display;
            tracing::debug!("X11 probe on {} failed: {}", shown, e);
            false
        }
    }
}

/// True if a PowerShell executable resolves on `PATH`
pub fn check_powershell_available(host: &dyn HostProbe) -> bool {
    let name = match host.os() {
        OsKind::Windows => "powershell",
        _ => "powershell.exe",
    };
    host.find_executable(name).is_some()
}

/// Windows host address as seen from a WSL2 guest
///
/// WSL2 writes the host's virtual switch address as the first `nameserver`
/// in `/etc/resolv.conf`.
pub fn wsl_host_ip(host: &dyn HostProbe) -> Option<String> {
    host.read_file("/etc/resolv.conf")?
        .lines()
        .filter_map(|line| line.trim().strip_prefix("nameserver"))
        .map(str::trim)
        .find(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Windows product caption via `wmic`, e.g. "Microsoft Windows Server 2022 Datacenter"
async fn windows_caption(runner: &dyn CommandRunner) -> Option<String> {
    let spec = CommandSpec::new("wmic")
        .args(["os", "get", "Caption", "/value"])
        .timeout(detection_probe_timeout());

    let output = runner
        .run(&spec)
        .await
        .map_err(|e| tracing::debug!("wmic caption probe failed: {}", e))
        .ok()?;
    if !output.success() {
        return None;
    }

    output
        .stdout_str()
        .lines()
        .find_map(|line| line.trim().strip_prefix("Caption="))
        .map(|caption| caption.trim().to_string())
}

/// Server Core runs `cmd.exe` as the Winlogon shell instead of `explorer.exe`
async fn winlogon_shell_is_cmd(runner: &dyn CommandRunner) -> bool {
    let spec = CommandSpec::new("reg")
        .args([
            "query",
            r"HKLM\SOFTWARE\Microsoft\Windows NT\CurrentVersion\Winlogon",
            "/v",
            "Shell",
        ])
        .timeout(detection_probe_timeout());

    match runner.run(&spec).await {
        Ok(output) if output.success() => {
            let shell = output.stdout_str().to_lowercase();
            shell.contains("cmd.exe") && !shell.contains("explorer.exe")
        }
        Ok(_) => false,
        Err(e) => {
            tracing::debug!("Winlogon shell probe failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::DesktopError,
        platform::mock::MockHost,
        util::{mock_runner::MockCommandRunner, process::CommandOutput},
    };

    fn x11_ok() -> MockCommandRunner {
        MockCommandRunner::new().respond("xset", CommandOutput::ok("Keyboard Control:"))
    }

    fn x11_down() -> MockCommandRunner {
        MockCommandRunner::new().respond("xset", CommandOutput::failed(1, "unable to open display"))
    }

    #[tokio::test]
    async fn test_wsl2_with_interop_and_no_wslg() {
        let host = MockHost::linux().with_env("WSL_INTEROP", "/run/WSL/12_interop");
        let profile = detect_platform_with(&host, &x11_down()).await;

        assert_eq!(profile.os, OsKind::Linux);
        assert_eq!(profile.sub_environment, SubEnvironment::Wsl2);
        assert_eq!(profile.wsl_version, Some(2));
        assert!(profile.capabilities.can_use_powershell);
        assert!(!profile.capabilities.can_use_dotnet);
        assert!(profile.is_consistent());
    }

    #[tokio::test]
    async fn test_wsl2_from_kernel_string() {
        let host = MockHost::linux()
            .with_env("WSL_DISTRO_NAME", "Debian")
            .with_file("/proc/version", "Linux version 5.15.90.1-microsoft-standard-WSL2");
        let profile = detect_platform_with(&host, &x11_down()).await;

        assert_eq!(profile.sub_environment, SubEnvironment::Wsl2);
        assert_eq!(profile.wsl_distro.as_deref(), Some("Debian"));
        assert!(!profile.capabilities.can_use_powershell);
    }

    #[tokio::test]
    async fn test_wsl1() {
        let host = MockHost::linux()
            .with_env("WSL_DISTRO_NAME", "Ubuntu")
            .with_file("/proc/version", "Linux version 4.4.0-19041-Microsoft")
            .with_executable("powershell.exe");
        let profile = detect_platform_with(&host, &x11_down()).await;

        assert_eq!(profile.sub_environment, SubEnvironment::Wsl1);
        assert_eq!(profile.wsl_version, Some(1));
        assert!(profile.capabilities.can_use_powershell);
        assert!(profile.is_consistent());
    }

    #[tokio::test]
    async fn test_native_linux_with_x11() {
        let host = MockHost::x11_desktop();
        let runner = x11_ok();
        let profile = detect_platform_with(&host, &runner).await;

        assert_eq!(profile.sub_environment, SubEnvironment::Native);
        assert!(profile.capabilities.can_use_x11);
        assert!(!profile.capabilities.can_use_powershell);
        assert_eq!(profile.display.as_deref(), Some(":0"));

        let probe = &runner.calls_for("xset")[0];
        assert_eq!(probe.env_value("DISPLAY"), Some(":0"));
    }

    #[tokio::test]
    async fn test_x11_probe_skipped_without_display() {
        let host = MockHost::linux();
        let runner = x11_ok();

        assert!(!check_x11_available(&host, &runner).await);
        assert!(runner.calls_for("xset").is_empty());
    }

    #[tokio::test]
    async fn test_x11_probe_failure_degrades_to_false() {
        let host = MockHost::linux().with_env("DISPLAY", ":0");
        let runner = MockCommandRunner::new().fail(
            "xset",
            DesktopError::ProcessSpawnFailure {
                program: "xset".to_string(),
                reason: "No such file or directory".to_string(),
            },
        );

        let profile = detect_platform_with(&host, &runner).await;
        assert!(!profile.capabilities.can_use_x11);
    }

    #[tokio::test]
    async fn test_windows_native() {
        let host = MockHost::windows()
            .with_env("SESSIONNAME", "Console")
            .with_executable("powershell");
        let runner = MockCommandRunner::new().respond(
            "wmic",
            CommandOutput::ok("\r\n\r\nCaption=Microsoft Windows 11 Pro\r\n\r\n"),
        );
        let profile = detect_platform_with(&host, &runner).await;

        assert_eq!(profile.sub_environment, SubEnvironment::Native);
        assert!(!profile.is_windows_server);
        assert!(profile.capabilities.can_use_dotnet);
        assert!(profile.capabilities.can_use_powershell);
        assert_eq!(profile.environment_label(), "windows");
    }

    #[tokio::test]
    async fn test_windows_rdp_session() {
        let host = MockHost::windows().with_env("SESSIONNAME", "RDP-Tcp#3");
        let runner = MockCommandRunner::new().respond(
            "wmic",
            CommandOutput::ok("Caption=Microsoft Windows Server 2022 Datacenter\r\n"),
        );
        let profile = detect_platform_with(&host, &runner).await;

        assert_eq!(profile.sub_environment, SubEnvironment::Rdp);
        assert!(profile.is_windows_server);
        assert!(!profile.capabilities.can_use_dotnet);
        assert!(profile.is_consistent());
    }

    #[tokio::test]
    async fn test_server_core_beats_rdp() {
        let host = MockHost::windows().with_env("SESSIONNAME", "RDP-Tcp#0");
        let runner = MockCommandRunner::new()
            .respond(
                "wmic",
                CommandOutput::ok("Caption=Microsoft Windows Server 2019 Standard\r\n"),
            )
            .respond(
                "reg",
                CommandOutput::ok("    Shell    REG_SZ    cmd.exe /c \"cd /d %USERPROFILE% & start cmd.exe\""),
            );
        let profile = detect_platform_with(&host, &runner).await;

        assert_eq!(profile.sub_environment, SubEnvironment::ServerCore);
        assert_eq!(profile.environment_label(), "windows_server_core");
        assert!(!profile.display_available());
    }

    #[tokio::test]
    async fn test_windows_desktop_server_with_explorer_shell() {
        let host = MockHost::windows();
        let runner = MockCommandRunner::new()
            .respond("wmic", CommandOutput::ok("Caption=Microsoft Windows Server 2022 Standard"))
            .respond("reg", CommandOutput::ok("    Shell    REG_SZ    explorer.exe"));
        let profile = detect_platform_with(&host, &runner).await;

        assert_eq!(profile.sub_environment, SubEnvironment::Native);
        assert_eq!(profile.environment_label(), "windows_server");
    }

    #[tokio::test]
    async fn test_windows_wmic_failure_is_native_desktop() {
        let host = MockHost::windows();
        let runner = MockCommandRunner::new().respond("wmic", CommandOutput::failed(1, "not recognized"));
        let profile = detect_platform_with(&host, &runner).await;

        assert_eq!(profile.sub_environment, SubEnvironment::Native);
        assert!(!profile.is_windows_server);
    }

    #[tokio::test]
    async fn test_macos() {
        let host = MockHost::macos().with_executable("screencapture");
        let profile = detect_platform_with(&host, &MockCommandRunner::new()).await;

        assert_eq!(profile.os, OsKind::MacOS);
        assert!(profile.capabilities.can_use_screencapture);
        assert!(profile.display_available());
    }

    #[tokio::test]
    async fn test_detection_is_deterministic() {
        let host = MockHost::wsl2();
        let runner = x11_down();

        let first = detect_platform_with(&host, &runner).await;
        let second = detect_platform_with(&host, &runner).await;
        assert_eq!(first, second);
    }

    #[test]
    fn test_detect_wsl_native() {
        let host = MockHost::linux().with_file("/proc/version", "Linux version 6.8.0-generic");
        assert_eq!(detect_wsl(&host), None);
    }

    #[test]
    fn test_check_powershell_available() {
        assert!(check_powershell_available(&MockHost::wsl2()));
        assert!(!check_powershell_available(&MockHost::linux()));
        assert!(check_powershell_available(&MockHost::windows().with_executable("powershell")));
    }

    #[test]
    fn test_wsl_host_ip_from_resolv_conf() {
        assert_eq!(wsl_host_ip(&MockHost::wsl2()).as_deref(), Some("172.29.96.1"));

        let host = MockHost::linux().with_file("/etc/resolv.conf", "# comment\nsearch lan\n");
        assert_eq!(wsl_host_ip(&host), None);
        assert_eq!(wsl_host_ip(&MockHost::linux()), None);
    }
}
