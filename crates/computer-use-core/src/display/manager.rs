//! Virtual and forwarded X display lifecycle
//!
//! [`DisplayLifecycleManager`] owns every display session it creates. The
//! session table is guarded by a synchronous mutex that is never held across
//! an await; operations on one display id are serialized by a per-display
//! async lock, so concurrent `start_virtual` calls for the same number spawn
//! at most one Xvfb.
//!
//! Failures to probe or spawn are always reported. Failures to terminate are
//! logged and the session record is removed anyway.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use super::session::{AvailabilityState, DisplaySession, SessionInfo, SessionKind, VirtualState, display_id};
use crate::{
    constants::{
        DEFAULT_DISPLAY_DEPTH, DEFAULT_DISPLAY_HEIGHT, DEFAULT_DISPLAY_NUMBER, DEFAULT_DISPLAY_WIDTH,
        DISPLAY_INFO_PREVIEW_CHARS, MAX_COORDINATE_VALUE, MAX_DISPLAY_NUMBER, NATIVE_DISPLAY, command_timeout,
        install_timeout, terminate_grace, xserver_start_delay,
    },
    error::{DesktopError, DesktopResult},
    model::Resolution,
    platform::{HostProbe, detect_wsl, probe_x11, wsl_host_ip},
    util::process::{CommandRunner, CommandSpec, ManagedProcess},
};

/// Packages installed by `install_xserver`
pub const XSERVER_PACKAGES: [&str; 8] = [
    "xorg",
    "xserver-xorg",
    "xvfb",
    "x11-apps",
    "x11-utils",
    "xdotool",
    "scrot",
    "imagemagick",
];

const WINDOWS_X_SERVER_SUGGESTION: &str = "Install VcXsrv or X410 on Windows and allow connections";

// ============================================================================
// Reports
// ============================================================================

/// Result of probing one display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayCheck {
    pub available: bool,
    pub display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One failed step of [`DisplayLifecycleManager::get_best_display`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayAttempt {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BestDisplay {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<DisplayAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl BestDisplay {
    fn found(display: String, method: &str) -> Self {
        Self {
            available: true,
            display: Some(display),
            method: Some(method.to_string()),
            host_ip: None,
            pid: None,
            attempts: Vec::new(),
            error: None,
            suggestions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    pub success: bool,
    pub display: String,
    /// `started` or `already_running`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub resolution: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    pub success: bool,
    pub display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StopOutcome {
    fn not_found(display: &str) -> Self {
        Self {
            success: false,
            display: display.to_string(),
            status: None,
            error: Some(format!("Display {display} not found: no managed X server process")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardingOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ForwardingOutcome {
    fn failed(error: &str) -> Self {
        Self {
            success: false,
            display: None,
            host_ip: None,
            method: None,
            error: Some(error.to_string()),
            suggestion: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedServer {
    #[serde(flatten)]
    pub session: SessionInfo,
    pub state: VirtualState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStatus {
    pub wsl_mode: bool,
    pub host_ip: Option<String>,
    pub current_display: Option<String>,
    pub managed_servers: BTreeMap<String, ManagedServer>,
    pub active_processes: usize,
    pub availability: BTreeMap<String, AvailabilityState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayTest {
    pub display: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPackage {
    pub package: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub failed: Vec<FailedPackage>,
    pub already_installed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub stopped_servers: usize,
    pub results: Vec<StopOutcome>,
}

// ============================================================================
// Manager
// ============================================================================

fn availability_of(available: bool) -> AvailabilityState {
    if available {
        AvailabilityState::Available
    } else {
        AvailabilityState::Unavailable
    }
}

/// Holds a display in `Starting`; resets it to `Stopped` on drop unless
/// disarmed
struct StartingGuard<'a> {
    manager: &'a DisplayLifecycleManager,
    display: String,
    armed: bool,
}

impl<'a> StartingGuard<'a> {
    fn new(manager: &'a DisplayLifecycleManager, display: &str) -> Self {
        manager.set_virtual_state(display, VirtualState::Starting);
        Self {
            manager,
            display: display.to_string(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.manager.set_virtual_state(&self.display, VirtualState::Stopped);
        }
    }
}

/// Owns display sessions and the Xvfb processes behind them
pub struct DisplayLifecycleManager {
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn HostProbe>,
    sessions: Mutex<HashMap<String, DisplaySession>>,
    display_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    availability: Mutex<HashMap<String, AvailabilityState>>,
    virtual_states: Mutex<HashMap<String, VirtualState>>,
    /// Display selected by `get_best_display` or forwarding setup
    current_display: RwLock<Option<String>>,
}

impl std::fmt::Debug for DisplayLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayLifecycleManager")
            .field("sessions", &self.sessions.lock().keys().collect::<Vec<_>>())
            .field("current_display", &*self.current_display.read())
            .finish()
    }
}

impl DisplayLifecycleManager {
    pub fn new(runner: Arc<dyn CommandRunner>, host: Arc<dyn HostProbe>) -> Self {
        Self {
            runner,
            host,
            sessions: Mutex::new(HashMap::new()),
            display_locks: Mutex::new(HashMap::new()),
            availability: Mutex::new(HashMap::new()),
            virtual_states: Mutex::new(HashMap::new()),
            current_display: RwLock::new(None),
        }
    }

    fn lock_for(&self, display: &str) -> Arc<AsyncMutex<()>> {
        self.display_locks
            .lock()
            .entry(display.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drops the lock entry for `display` once no other task holds a clone
    fn release_lock(&self, display: &str, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.display_locks.lock();
        // The map's entry plus `lock` itself
        let unused = locks
            .get(display)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if unused {
            locks.remove(display);
        }
    }

    pub fn lock_count(&self) -> usize {
        self.display_locks.lock().len()
    }

    /// True for displays whose availability is worth caching
    fn is_tracked(&self, display: &str) -> bool {
        self.has_session(display) || self.current_display().as_deref() == Some(display)
    }

    fn set_availability(&self, display: &str, state: AvailabilityState) {
        self.availability.lock().insert(display.to_string(), state);
    }

    fn set_virtual_state(&self, display: &str, state: VirtualState) {
        let shown = &display;
        debug!("Display {} -> {:?}", shown, state);
        self.virtual_states.lock().insert(display.to_string(), state);
    }

    pub fn virtual_state(&self, display: &str) -> VirtualState {
        self.virtual_states.lock().get(display).copied().unwrap_or_default()
    }

    pub fn availability(&self, display: &str) -> AvailabilityState {
        self.availability.lock().get(display).copied().unwrap_or_default()
    }

    pub fn wsl_mode(&self) -> bool {
        detect_wsl(self.host.as_ref()).is_some()
    }

    pub fn host_ip(&self) -> Option<String> {
        if self.wsl_mode() {
            wsl_host_ip(self.host.as_ref())
        } else {
            None
        }
    }

    /// Selected display, else the host's `DISPLAY`
    pub fn current_display(&self) -> Option<String> {
        self.current_display
            .read()
            .clone()
            .or_else(|| self.host.env_var("DISPLAY"))
    }

    fn select_display(&self, display: &str) {
        *self.current_display.write() = Some(display.to_string());
    }

    fn record_attached(&self, display: &str, kind: SessionKind) {
        self.sessions.lock().entry(display.to_string()).or_insert_with(|| {
            DisplaySession::attached(
                display,
                kind,
                Resolution::new(DEFAULT_DISPLAY_WIDTH, DEFAULT_DISPLAY_HEIGHT),
            )
        });
        self.set_availability(display, AvailabilityState::Available);
    }

    pub fn has_session(&self, display: &str) -> bool {
        self.sessions.lock().contains_key(display)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    // ------------------------------------------------------------------------
    // Probing
    // ------------------------------------------------------------------------

    /// Probes `display` (default: the current display, else `:0`)
    ///
    /// Only the availability cache is updated, and only for tracked
    /// sessions and the current display.
    pub async fn check_available(&self, display: Option<&str>) -> DisplayCheck {
        let display = display
            .map(str::to_string)
            .or_else(|| self.current_display())
            .unwrap_or_else(|| NATIVE_DISPLAY.to_string());

        let cache = self.is_tracked(&display);
        if cache {
            self.set_availability(&display, AvailabilityState::Checking);
        }
        let available = probe_x11(self.runner.as_ref(), &display).await;
        if cache {
            self.set_availability(&display, availability_of(available));
        }

        DisplayCheck {
            available,
            display,
            method: available.then(|| "native_x11".to_string()),
            error: (!available).then(|| "X server not responsive".to_string()),
        }
    }

    /// Runs `xdpyinfo` against `display` and returns the start of its output
    pub async fn test_display(&self, display: Option<&str>) -> DisplayTest {
        let display = display
            .map(str::to_string)
            .or_else(|| self.current_display())
            .unwrap_or_else(|| NATIVE_DISPLAY.to_string());

        let spec = CommandSpec::new("xdpyinfo")
            .env("DISPLAY", &display)
            .timeout(command_timeout());
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => DisplayTest {
                display,
                available: true,
                info: Some(
                    output
                        .stdout_str()
                        .chars()
                        .take(DISPLAY_INFO_PREVIEW_CHARS)
                        .collect(),
                ),
                error: None,
            },
            Ok(output) => DisplayTest {
                display,
                available: false,
                info: None,
                error: Some(output.stderr_str()),
            },
            Err(e) => DisplayTest {
                display,
                available: false,
                info: None,
                error: Some(e.to_string()),
            },
        }
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Connects to the Windows-side X server from WSL (`<hostIp>:0.0`)
    pub async fn setup_wsl_forwarding(&self) -> ForwardingOutcome {
        if !self.wsl_mode() {
            return ForwardingOutcome::failed("Not running in WSL environment");
        }
        let Some(host_ip) = wsl_host_ip(self.host.as_ref()) else {
            return ForwardingOutcome::failed("Could not determine Windows host IP");
        };

        let display = format!("{host_ip}:0.0");
        let check = self.check_available(Some(&display)).await;
        if check.available {
            let shown = &display;
            info!("Using Windows X server at {}", shown);
            self.select_display(&display);
            self.record_attached(&display, SessionKind::WslForwarded);
            ForwardingOutcome {
                success: true,
                display: Some(display),
                host_ip: Some(host_ip),
                method: Some("wsl_xforwarding".to_string()),
                error: None,
                suggestion: None,
            }
        } else {
            let shown = &display;
            warn!("Windows X server at {} is not reachable", shown);
            ForwardingOutcome {
                success: false,
                display: Some(display),
                host_ip: Some(host_ip),
                method: None,
                error: Some("Windows X server not accessible".to_string()),
                suggestion: Some(WINDOWS_X_SERVER_SUGGESTION.to_string()),
            }
        }
    }

    /// Finds a working display, starting one if needed
    ///
    /// Order: existing `DISPLAY`, WSL forwarding, a new virtual display,
    /// native `:0`. Never fails; on total failure the result lists every
    /// attempt with suggestions.
    pub async fn get_best_display(&self) -> BestDisplay {
        let mut attempts = Vec::new();

        if let Some(existing) = self.current_display() {
            let check = self.check_available(Some(&existing)).await;
            if check.available {
                info!("Using existing display {}", existing);
                self.select_display(&existing);
                self.record_attached(&existing, SessionKind::Existing);
                return BestDisplay {
                    attempts,
                    ..BestDisplay::found(existing, "existing_display")
                };
            }
            attempts.push(DisplayAttempt {
                method: "existing_display".to_string(),
                display: Some(existing),
                error: check.error.unwrap_or_default(),
            });
        }

        if self.wsl_mode() {
            match self.setup_wsl_forwarding().await {
                ForwardingOutcome {
                    success: true,
                    display: Some(display),
                    host_ip,
                    ..
                } => {
                    return BestDisplay {
                        host_ip,
                        attempts,
                        ..BestDisplay::found(display, "wsl_xforwarding")
                    };
                }
                failed => attempts.push(DisplayAttempt {
                    method: "wsl_xforwarding".to_string(),
                    display: failed.display,
                    error: failed.error.unwrap_or_default(),
                }),
            }
        }

        match self
            .start_virtual(DEFAULT_DISPLAY_NUMBER, DEFAULT_DISPLAY_WIDTH, DEFAULT_DISPLAY_HEIGHT)
            .await
        {
            Ok(started) => {
                self.select_display(&started.display);
                return BestDisplay {
                    pid: started.pid,
                    attempts,
                    ..BestDisplay::found(started.display, "virtual_display")
                };
            }
            Err(e) => attempts.push(DisplayAttempt {
                method: "virtual_display".to_string(),
                display: Some(display_id(DEFAULT_DISPLAY_NUMBER)),
                error: e.to_string(),
            }),
        }

        let native = self.check_available(Some(NATIVE_DISPLAY)).await;
        if native.available {
            self.select_display(NATIVE_DISPLAY);
            self.record_attached(NATIVE_DISPLAY, SessionKind::Native);
            return BestDisplay {
                attempts,
                ..BestDisplay::found(NATIVE_DISPLAY.to_string(), "native_x11")
            };
        }
        attempts.push(DisplayAttempt {
            method: "native_x11".to_string(),
            display: Some(NATIVE_DISPLAY.to_string()),
            error: native.error.unwrap_or_default(),
        });

        warn!("No X server available after {} attempts", attempts.len());
        BestDisplay {
            available: false,
            display: None,
            method: None,
            host_ip: None,
            pid: None,
            attempts,
            error: Some("No X server available".to_string()),
            suggestions: vec![
                "Install X server packages (install_xserver)".to_string(),
                "Start virtual display server (start_xserver)".to_string(),
                "Setup X11 forwarding (WSL2)".to_string(),
                "Install Windows X server (VcXsrv/X410)".to_string(),
            ],
        }
    }

    // ------------------------------------------------------------------------
    // Virtual displays
    // ------------------------------------------------------------------------

    /// Starts Xvfb on `:display_num`
    ///
    /// Idempotent: a live session for the same id is returned unchanged. A
    /// process that fails the post-start probe is terminated before the
    /// error is returned.
    pub async fn start_virtual(&self, display_num: u32, width: u32, height: u32) -> DesktopResult<StartOutcome> {
        if display_num > MAX_DISPLAY_NUMBER {
            return Err(DesktopError::invalid(
                "display_num",
                format!("must be at most {MAX_DISPLAY_NUMBER}"),
            ));
        }
        let max = MAX_COORDINATE_VALUE as u32;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(DesktopError::invalid(
                "resolution",
                format!("width and height must be within 1..={max}"),
            ));
        }

        let display = display_id(display_num);
        let lock = self.lock_for(&display);
        let _guard = lock.lock().await;

        if let Some(existing) = self.existing_session(&display) {
            return Ok(existing);
        }

        let resolution = Resolution::new(width, height);
        let starting = StartingGuard::new(self, &display);
        let spec = CommandSpec::new("Xvfb").args([
            display.clone(),
            "-screen".to_string(),
            "0".to_string(),
            format!("{resolution}x{DEFAULT_DISPLAY_DEPTH}"),
            "-ac".to_string(),
            "+extension".to_string(),
            "GLX".to_string(),
            "+render".to_string(),
            "-noreset".to_string(),
        ]);

        let mut process = match self.runner.spawn(&spec).await {
            Ok(process) => process,
            Err(e) => {
                let shown = &display;
                error!("Failed to spawn Xvfb for {}: {}", shown, e);
                return Err(e);
            }
        };
        let shown = &display;
        info!("Spawned Xvfb for {} (pid {:?})", shown, process.pid());

        tokio::time::sleep(xserver_start_delay()).await;

        let exited = !process.is_running();
        let ready = !exited && self.check_available(Some(&display)).await.available;
        if !ready {
            let shown = &display;
            warn!("Xvfb on {} did not come up, terminating", shown);
            self.terminate_logged(&display, process.as_mut()).await;
            return Err(DesktopError::DisplayUnavailable {
                display,
                reason: if exited {
                    "Failed to start X server: Xvfb exited immediately".to_string()
                } else {
                    "Failed to start X server".to_string()
                },
            });
        }

        let pid = process.pid();
        self.sessions.lock().insert(
            display.clone(),
            DisplaySession::virtual_display(display.clone(), process, resolution),
        );
        self.set_virtual_state(&display, VirtualState::Running);
        self.set_availability(&display, AvailabilityState::Available);
        starting.disarm();
        let shown = &display;
        info!("Virtual display {} running at {}", shown, resolution);

        Ok(StartOutcome {
            success: true,
            display,
            status: "started".to_string(),
            pid,
            resolution: resolution.to_string(),
        })
    }

    /// Live session for `display`, dropping the record if its process died
    fn existing_session(&self, display: &str) -> Option<StartOutcome> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(display)?;
        if session.is_live() {
            return Some(StartOutcome {
                success: true,
                display: display.to_string(),
                status: "already_running".to_string(),
                pid: session.pid(),
                resolution: session.resolution.to_string(),
            });
        }

        let shown = &display;
        warn!("X server for {} exited on its own, restarting", shown);
        sessions.remove(display);
        None
    }

    async fn terminate_logged(&self, display: &str, process: &mut dyn ManagedProcess) {
        if let Err(e) = process.terminate(terminate_grace()).await {
            let shown = &display;
            error!("Failed to terminate X server for {}: {}", shown, e);
        }
    }

    /// Stops a tracked display and removes its record
    ///
    /// Owned processes get SIGTERM, then a kill after the grace period.
    /// Termination errors are logged; the record is removed regardless.
    pub async fn stop(&self, display: &str) -> StopOutcome {
        // Unknown ids never get a lock entry; a start in progress already has one
        let known = self.has_session(display) || self.display_locks.lock().contains_key(display);
        if !known {
            return StopOutcome::not_found(display);
        }

        let lock = self.lock_for(display);
        let outcome = {
            let _guard = lock.lock().await;
            self.stop_locked(display).await
        };
        self.release_lock(display, lock);
        outcome
    }

    async fn stop_locked(&self, display: &str) -> StopOutcome {
        let Some(mut session) = self.sessions.lock().remove(display) else {
            return StopOutcome::not_found(display);
        };

        let status = match session.process.as_mut() {
            Some(process) => {
                self.set_virtual_state(display, VirtualState::Stopping);
                self.terminate_logged(display, process.as_mut()).await;
                self.set_virtual_state(display, VirtualState::Stopped);
                "stopped"
            }
            None => "released",
        };
        self.availability.lock().remove(display);

        {
            let mut current = self.current_display.write();
            if current.as_deref() == Some(display) {
                *current = None;
            }
        }

        let shown = &display;
        info!("Display {} {}", shown, status);
        StopOutcome {
            success: true,
            display: display.to_string(),
            status: Some(status.to_string()),
            error: None,
        }
    }

    /// Stops every display the manager owns a process for
    pub async fn cleanup_all(&self) -> CleanupReport {
        let owned: Vec<String> = self
            .sessions
            .lock()
            .iter()
            .filter(|(_, s)| s.process.is_some())
            .map(|(d, _)| d.clone())
            .collect();

        let mut results = Vec::with_capacity(owned.len());
        for display in owned {
            results.push(self.stop(&display).await);
        }
        CleanupReport {
            stopped_servers: results.iter().filter(|r| r.success).count(),
            results,
        }
    }

    pub fn status(&self) -> ManagerStatus {
        let mut sessions = self.sessions.lock();
        let active_processes = sessions
            .values_mut()
            .filter_map(|s| s.process.as_mut())
            .map(|p| p.is_running())
            .filter(|running| *running)
            .count();
        let managed_servers = sessions
            .iter()
            .map(|(display, session)| {
                (
                    display.clone(),
                    ManagedServer {
                        session: session.info(),
                        state: self.virtual_state(display),
                    },
                )
            })
            .collect();
        drop(sessions);

        let availability = self
            .availability
            .lock()
            .iter()
            .map(|(d, s)| (d.clone(), *s))
            .collect();

        ManagerStatus {
            wsl_mode: self.wsl_mode(),
            host_ip: self.host_ip(),
            current_display: self.current_display(),
            managed_servers,
            active_processes,
            availability,
        }
    }

    // ------------------------------------------------------------------------
    // Packages
    // ------------------------------------------------------------------------

    /// Installs the X server tool set with apt
    ///
    /// Uses `sudo -n` so a password prompt fails fast instead of hanging.
    pub async fn install_packages(&self) -> InstallReport {
        let mut report = InstallReport::default();

        for package in XSERVER_PACKAGES {
            let check = CommandSpec::new("dpkg")
                .args(["-l", package])
                .timeout(command_timeout());
            if matches!(self.runner.run(&check).await, Ok(out) if out.success()) {
                report.already_installed.push(package.to_string());
                continue;
            }

            let install = CommandSpec::new("sudo")
                .args(["-n", "apt-get", "install", "-y", package])
                .timeout(install_timeout());
            match self.runner.run(&install).await {
                Ok(output) if output.success() => {
                    info!("Installed {}", package);
                    report.installed.push(package.to_string());
                }
                Ok(output) => {
                    warn!("Installing {} failed", package);
                    report.failed.push(FailedPackage {
                        package: package.to_string(),
                        error: output.stderr_str(),
                    });
                }
                Err(e) => report.failed.push(FailedPackage {
                    package: package.to_string(),
                    error: e.to_string(),
                }),
            }
        }
        report
    }
}
