//! Centralized limits, timeouts and defaults.
//!
//! # Runtime Configuration
//!
//! Timeout values can be overridden at runtime via environment variables:
//!
//! | Environment Variable | Default | Description |
//! |---------------------|---------|-------------|
//! | `COMPUTER_USE_SCREENSHOT_TIMEOUT_MS` | 10000 | Whole-capture deadline per provider |
//! | `COMPUTER_USE_PROBE_TIMEOUT_MS` | 5000 | `xset q` / `xdpyinfo` display probes |
//! | `COMPUTER_USE_COMMAND_TIMEOUT_MS` | 10000 | Generic host tool invocations |
//! | `COMPUTER_USE_XSERVER_START_DELAY_MS` | 2000 | Settle time after spawning Xvfb |
//! | `COMPUTER_USE_TERMINATE_GRACE_MS` | 10000 | SIGTERM grace before force-kill |
//! | `COMPUTER_USE_INSTALL_TIMEOUT_MS` | 300000 | Per-package install deadline |
//!
//! Invalid values (non-numeric, negative, fractional) fall back to the default.

use std::time::Duration;

// =============================================================================
// Validation Limits
// =============================================================================

/// Largest accepted screen coordinate on either axis.
pub const MAX_COORDINATE_VALUE: i64 = 10_000;

/// Longest text accepted by the `type` tool.
pub const MAX_TEXT_LENGTH: usize = 10_000;

/// Longest accepted `wait` duration.
pub const MAX_WAIT_SECONDS: f64 = 60.0;

/// Largest accepted scroll amount.
pub const MAX_SCROLL_AMOUNT: u32 = 100;

/// Largest X display number `start_xserver` will use.
pub const MAX_DISPLAY_NUMBER: u32 = 1000;

/// Number of characters of `xdpyinfo` output returned by `test_display`.
pub const DISPLAY_INFO_PREVIEW_CHARS: usize = 200;

/// Default capacity of the safety verdict cache.
pub const SAFETY_CACHE_CAPACITY: usize = 1024;

// =============================================================================
// Timeouts
// =============================================================================

/// Quick checks such as `xset q` during platform detection.
pub const SHORT_TIMEOUT_MS: u64 = 2_000;

/// Display probes performed by the lifecycle manager.
pub const NORMAL_TIMEOUT_MS: u64 = 5_000;

/// Host tool invocations (capture tools, xdotool, PowerShell).
pub const LONG_TIMEOUT_MS: u64 = 10_000;

/// Package installation.
pub const INSTALL_TIMEOUT_MS: u64 = 300_000;

/// Deadline for a single provider capture.
pub const SCREENSHOT_TIMEOUT_MS: u64 = 10_000;

/// Time to let a freshly spawned Xvfb come up before re-probing.
pub const XSERVER_START_DELAY_MS: u64 = 2_000;

/// Time between SIGTERM and SIGKILL when stopping a managed process.
pub const PROCESS_TERMINATE_GRACE_MS: u64 = 10_000;

// =============================================================================
// Display Defaults
// =============================================================================

pub const DEFAULT_DISPLAY_NUMBER: u32 = 99;
pub const DEFAULT_DISPLAY_WIDTH: u32 = 1920;
pub const DEFAULT_DISPLAY_HEIGHT: u32 = 1080;
pub const DEFAULT_DISPLAY_DEPTH: u32 = 24;

/// Display used as the last resort by `get_best_display`.
pub const NATIVE_DISPLAY: &str = ":0";

// =============================================================================
// Input Retry Policy
// =============================================================================

/// Attempts for an input action that fails transiently.
pub const INPUT_MAX_ATTEMPTS: u32 = 3;

/// Delay between input attempts.
pub const INPUT_RETRY_DELAY_MS: u64 = 500;

/// Per-character delay used when typing text.
pub const TYPE_DELAY_MS: u64 = 12;

// =============================================================================
// Protocol
// =============================================================================

/// JSON-RPC code for generic infrastructure failures.
pub const JSONRPC_INTERNAL_ERROR_CODE: i32 = -32603;

// =============================================================================
// Environment Variable Overrides
// =============================================================================

/// Helper to get a timeout from environment variable or fall back to default.
fn get_timeout_from_env(env_var: &str, default: u64) -> u64 {
    std::env::var(env_var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Override with: `COMPUTER_USE_SCREENSHOT_TIMEOUT_MS`
pub fn screenshot_timeout() -> Duration {
    Duration::from_millis(get_timeout_from_env(
        "COMPUTER_USE_SCREENSHOT_TIMEOUT_MS",
        SCREENSHOT_TIMEOUT_MS,
    ))
}

/// Override with: `COMPUTER_USE_PROBE_TIMEOUT_MS`
pub fn probe_timeout() -> Duration {
    Duration::from_millis(get_timeout_from_env("COMPUTER_USE_PROBE_TIMEOUT_MS", NORMAL_TIMEOUT_MS))
}

/// Timeout for the detection-time X11 probe. Not overridable; detection
/// must stay fast.
pub fn detection_probe_timeout() -> Duration {
    Duration::from_millis(SHORT_TIMEOUT_MS)
}

/// Override with: `COMPUTER_USE_COMMAND_TIMEOUT_MS`
pub fn command_timeout() -> Duration {
    Duration::from_millis(get_timeout_from_env("COMPUTER_USE_COMMAND_TIMEOUT_MS", LONG_TIMEOUT_MS))
}

/// Deadline for typing `chars` characters: the command timeout plus the
/// per-character typing delay.
pub fn typing_timeout(chars: usize) -> Duration {
    command_timeout() + Duration::from_millis(TYPE_DELAY_MS.saturating_mul(chars as u64))
}

/// Override with: `COMPUTER_USE_XSERVER_START_DELAY_MS`
pub fn xserver_start_delay() -> Duration {
    Duration::from_millis(get_timeout_from_env(
        "COMPUTER_USE_XSERVER_START_DELAY_MS",
        XSERVER_START_DELAY_MS,
    ))
}

/// Override with: `COMPUTER_USE_TERMINATE_GRACE_MS`
pub fn terminate_grace() -> Duration {
    Duration::from_millis(get_timeout_from_env(
        "COMPUTER_USE_TERMINATE_GRACE_MS",
        PROCESS_TERMINATE_GRACE_MS,
    ))
}

/// Override with: `COMPUTER_USE_INSTALL_TIMEOUT_MS`
pub fn install_timeout() -> Duration {
    Duration::from_millis(get_timeout_from_env("COMPUTER_USE_INSTALL_TIMEOUT_MS", INSTALL_TIMEOUT_MS))
}
