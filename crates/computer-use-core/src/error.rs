//! Error types for desktop automation operations
//!
//! Every error distinguishes a policy rejection from an infrastructure
//! problem. Infrastructure errors carry actionable remediation text via
//! [`DesktopError::remediation_hint`], and machine-parseable recovery
//! metadata via [`DesktopError::structured_hint`] so that an LLM client can
//! attempt recovery without parsing prose.
//!
//! ```rust,ignore
//! let error = DesktopError::DisplayUnavailable { display: ":0".into(), reason: "no X server".into() };
//! let hint = error.structured_hint();
//!
//! if let Some(tool) = hint.suggested_tool {
//!     println!("Try calling: {}", tool);
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::{model::ErrorKind, safety::RuleCategory};

/// Result type alias for desktop operations
pub type DesktopResult<T> = Result<T, DesktopError>;

/// Structured error hint for LLM auto-recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHint {
    /// Human-readable description of the error and how to fix it
    pub message: String,

    /// Category of recovery action to attempt
    pub recovery_action: RecoveryAction,

    /// MCP tool name to call for recovery (if applicable)
    pub suggested_tool: Option<String>,

    /// Parameters to pass to the suggested tool
    pub tool_params: Option<serde_json::Value>,

    /// Whether the error is likely transient (retry may succeed)
    pub is_transient: bool,

    /// Error category for grouping/filtering
    pub category: ErrorCategory,
}

/// Category of recovery action an LLM client can attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Call a different tool to get more information or fix the environment
    CallTool,
    /// Retry the same operation
    Retry,
    /// Modify parameters and retry
    ModifyParams,
    /// Require user intervention (install software, grant permissions)
    RequireUser,
    /// No automated recovery possible
    None,
}

/// High-level error category for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected by the safety policy
    Policy,
    /// Invalid parameters or configuration
    InvalidInput,
    /// Display, backend or host tool not available
    Unavailable,
    /// Operation timed out
    Timeout,
    /// I/O, process or system error
    SystemError,
}

/// Error type for desktop automation operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum DesktopError {
    /// No usable X display
    #[error("Display {display} is unavailable: {reason}")]
    DisplayUnavailable {
        /// Display that was probed (e.g. ":99")
        display: String,
        /// Why the display could not be used
        reason: String,
    },

    /// No provider could serve the request
    #[error("Provider '{method}' is unavailable: {reason}")]
    ProviderUnavailable {
        /// Capture or input method name
        method: String,
        /// Why the provider cannot be used
        reason: String,
    },

    /// The safety validator rejected the request
    ///
    /// The rejected input is intentionally not part of the message.
    #[error("Safety check failed: blocked {category} content")]
    SafetyRejected {
        /// Rule category that matched
        category: RuleCategory,
    },

    /// A bounded operation exceeded its deadline
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// A host process could not be started
    #[error("Failed to spawn '{program}': {reason}")]
    ProcessSpawnFailure {
        /// Program that failed to start
        program: String,
        /// Underlying reason
        reason: String,
    },

    /// Invalid parameter provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidArgument {
        /// Name of the invalid parameter
        parameter: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// A host tool ran but exited unsuccessfully
    #[error("'{program}' failed with status {status:?}: {stderr}")]
    CommandFailed {
        /// Program that failed
        program: String,
        /// Exit code, `None` when killed by a signal
        status: Option<i32>,
        /// Trimmed stderr output
        stderr: String,
    },

    /// I/O error while handling capture files
    #[error("I/O error during {context}: {reason}")]
    Io {
        /// What was being done
        context: String,
        /// Underlying error text
        reason: String,
    },
}

impl From<std::io::Error> for DesktopError {
    fn from(err: std::io::Error) -> Self {
        DesktopError::Io {
            context: "file operation".to_string(),
            reason: err.to_string(),
        }
    }
}

impl DesktopError {
    /// Builds an [`DesktopError::Io`] with explicit context
    pub fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        DesktopError::Io {
            context: context.into(),
            reason: err.to_string(),
        }
    }

    /// Builds an [`DesktopError::InvalidArgument`]
    pub fn invalid(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        DesktopError::InvalidArgument {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Maps the error onto the result-level [`ErrorKind`]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DesktopError::DisplayUnavailable { .. } => ErrorKind::DisplayUnavailable,
            DesktopError::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            DesktopError::SafetyRejected { .. } => ErrorKind::SafetyRejected,
            DesktopError::Timeout { .. } => ErrorKind::Timeout,
            DesktopError::ProcessSpawnFailure { .. } => ErrorKind::ProcessSpawnFailure,
            DesktopError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            DesktopError::CommandFailed { .. } | DesktopError::Io { .. } => ErrorKind::Internal,
        }
    }

    /// True for failures where an identical retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DesktopError::Timeout { .. } | DesktopError::CommandFailed { .. } | DesktopError::Io { .. }
        )
    }

    /// True when the failing tool never started, so nothing reached the host
    pub fn is_before_launch(&self) -> bool {
        matches!(self, DesktopError::ProcessSpawnFailure { .. })
    }

    /// Returns an actionable remediation hint for this error
    ///
    /// # Examples
    ///
    /// ```
    /// use computer_use_core::error::DesktopError;
    ///
    /// let error = DesktopError::DisplayUnavailable {
    ///     display: ":0".to_string(),
    ///     reason: "connection refused".to_string(),
    /// };
    /// assert!(error.remediation_hint().contains("start_xserver"));
    /// ```
    pub fn remediation_hint(&self) -> &str {
        match self {
            DesktopError::DisplayUnavailable { .. } => {
                "No X server answered on this display. Call start_xserver to launch a virtual \
                 display, setup_wsl_xforwarding when running under WSL with VcXsrv or X410 on \
                 Windows, or install_xserver if the X server packages are missing."
            }
            DesktopError::ProviderUnavailable { method, .. } => match method.as_str() {
                "server_core" => {
                    "Windows Server Core has no GUI subsystem. Install VcXsrv for X11 support or \
                     use PowerShell automation instead."
                }
                "wsl2_powershell" | "windows_native" | "windows_rdp_capture" => {
                    "PowerShell is required for this method. Ensure powershell.exe is on PATH and \
                     Windows interop is enabled."
                }
                "x11" | "vcxsrv_x11" | "x11_xdotool" => {
                    "X11 tooling is missing or no display is reachable. Install scrot, \
                     ImageMagick and xdotool, then check DISPLAY with check_display_available."
                }
                "macos_screencapture" => {
                    "Grant screen recording permission in System Settings > Privacy & Security > \
                     Screen Recording."
                }
                _ => "Use get_recommended_methods to see which methods fit this host.",
            },
            DesktopError::SafetyRejected { .. } => {
                "The request was blocked by the safety policy and will not be retried. Rephrase \
                 the action without commands, credentials or injection payloads."
            }
            DesktopError::Timeout { .. } => {
                "The operation took too long. The display or host tool may be unresponsive. \
                 Check check_display_available and retry."
            }
            DesktopError::ProcessSpawnFailure { program, .. } => match program.as_str() {
                "Xvfb" => "Xvfb is not installed. Call install_xserver or install the xvfb package.",
                "xdotool" => "xdotool is not installed. Install it with your package manager.",
                "powershell.exe" | "powershell" => {
                    "PowerShell could not be started. Check that Windows interop is enabled."
                }
                _ => "A required host tool is missing. Call install_xserver to install X11 tooling.",
            },
            DesktopError::InvalidArgument { parameter, .. } => match parameter.as_str() {
                "x" | "y" | "coordinates" => "Coordinates must be between 0 and 10000.",
                "seconds" => "Wait duration must be greater than 0 and at most 60 seconds.",
                "amount" => "Scroll amount must be between 1 and 100.",
                "key" => "Use key names like Return, Tab, Escape, F1 or combinations like ctrl+c.",
                _ => "Check the parameter value against the tool schema.",
            },
            DesktopError::CommandFailed { .. } => {
                "A host tool exited with an error. Verify the display is reachable and retry."
            }
            DesktopError::Io { .. } => {
                "An I/O error occurred. Check file permissions, disk space, and the save path."
            }
        }
    }

    /// Returns a structured error hint for LLM auto-recovery.
    ///
    /// # Example
    ///
    /// ```
    /// use computer_use_core::error::{DesktopError, RecoveryAction};
    ///
    /// let error = DesktopError::DisplayUnavailable {
    ///     display: ":99".to_string(),
    ///     reason: "not running".to_string(),
    /// };
    ///
    /// let hint = error.structured_hint();
    /// assert_eq!(hint.recovery_action, RecoveryAction::CallTool);
    /// assert_eq!(hint.suggested_tool.as_deref(), Some("start_xserver"));
    /// ```
    pub fn structured_hint(&self) -> ErrorHint {
        let message = self.remediation_hint().to_string();
        match self {
            DesktopError::DisplayUnavailable { display, .. } => ErrorHint {
                message,
                recovery_action: RecoveryAction::CallTool,
                suggested_tool: Some("start_xserver".to_string()),
                tool_params: Some(serde_json::json!({
                    "failed_display": display,
                    "display_num": crate::constants::DEFAULT_DISPLAY_NUMBER,
                })),
                is_transient: false,
                category: ErrorCategory::Unavailable,
            },
            DesktopError::ProviderUnavailable { method, .. } => ErrorHint {
                message,
                recovery_action: RecoveryAction::CallTool,
                suggested_tool: Some("get_recommended_methods".to_string()),
                tool_params: Some(serde_json::json!({ "unavailable_method": method })),
                is_transient: false,
                category: ErrorCategory::Unavailable,
            },
            DesktopError::SafetyRejected { category } => ErrorHint {
                message,
                recovery_action: RecoveryAction::None,
                suggested_tool: None,
                tool_params: Some(serde_json::json!({ "category": category })),
                is_transient: false,
                category: ErrorCategory::Policy,
            },
            DesktopError::Timeout { duration_ms, .. } => ErrorHint {
                message,
                recovery_action: RecoveryAction::Retry,
                suggested_tool: None,
                tool_params: Some(serde_json::json!({ "previous_timeout_ms": duration_ms })),
                is_transient: true,
                category: ErrorCategory::Timeout,
            },
            DesktopError::ProcessSpawnFailure { program, .. } => ErrorHint {
                message,
                recovery_action: RecoveryAction::CallTool,
                suggested_tool: Some("install_xserver".to_string()),
                tool_params: Some(serde_json::json!({ "missing_program": program })),
                is_transient: false,
                category: ErrorCategory::Unavailable,
            },
            DesktopError::InvalidArgument { parameter, reason } => ErrorHint {
                message,
                recovery_action: RecoveryAction::ModifyParams,
                suggested_tool: None,
                tool_params: Some(serde_json::json!({
                    "parameter": parameter,
                    "reason": reason,
                })),
                is_transient: false,
                category: ErrorCategory::InvalidInput,
            },
            DesktopError::CommandFailed { .. } | DesktopError::Io { .. } => ErrorHint {
                message,
                recovery_action: RecoveryAction::Retry,
                suggested_tool: None,
                tool_params: None,
                is_transient: true,
                category: ErrorCategory::SystemError,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_rejected_message_is_distinguished() {
        let error = DesktopError::SafetyRejected {
            category: RuleCategory::Credential,
        };

        let msg = error.to_string();
        assert!(msg.contains("Safety check failed"));
        assert!(msg.contains("blocked"));
        assert!(msg.contains("credential"));
        assert_eq!(error.kind(), ErrorKind::SafetyRejected);
    }

    #[test]
    fn test_safety_rejected_is_not_transient() {
        let error = DesktopError::SafetyRejected {
            category: RuleCategory::DangerousCommand,
        };
        let hint = error.structured_hint();

        assert!(!error.is_transient());
        assert!(!hint.is_transient);
        assert_eq!(hint.recovery_action, RecoveryAction::None);
        assert_eq!(hint.category, ErrorCategory::Policy);
    }

    #[test]
    fn test_display_unavailable_message_and_hint() {
        let error = DesktopError::DisplayUnavailable {
            display: ":99".to_string(),
            reason: "probe failed".to_string(),
        };

        let msg = error.to_string();
        assert!(msg.contains(":99"));
        assert!(msg.contains("probe failed"));

        let hint = error.structured_hint();
        assert_eq!(hint.suggested_tool.as_deref(), Some("start_xserver"));
        assert_eq!(hint.tool_params.unwrap()["failed_display"], ":99");
    }

    #[test]
    fn test_provider_unavailable_server_core_hint() {
        let error = DesktopError::ProviderUnavailable {
            method: "server_core".to_string(),
            reason: "no GUI subsystem".to_string(),
        };

        assert!(error.remediation_hint().contains("VcXsrv"));
        assert_eq!(error.kind(), ErrorKind::ProviderUnavailable);
    }

    #[test]
    fn test_spawn_failure_happens_before_launch() {
        let error = DesktopError::ProcessSpawnFailure {
            program: "xdotool".to_string(),
            reason: "Resource temporarily unavailable".to_string(),
        };

        assert!(error.is_before_launch());
        assert!(!error.is_transient());
    }

    #[test]
    fn test_timeout_is_transient() {
        let error = DesktopError::Timeout {
            operation: "screenshot".to_string(),
            duration_ms: 10_000,
        };

        assert!(error.to_string().contains("10000ms"));
        assert!(error.is_transient());
        assert!(!error.is_before_launch());

        let hint = error.structured_hint();
        assert_eq!(hint.recovery_action, RecoveryAction::Retry);
        assert_eq!(hint.tool_params.unwrap()["previous_timeout_ms"], 10_000);
    }

    #[test]
    fn test_spawn_failure_xvfb_hint() {
        let error = DesktopError::ProcessSpawnFailure {
            program: "Xvfb".to_string(),
            reason: "No such file or directory".to_string(),
        };

        assert!(error.remediation_hint().contains("install_xserver"));
        assert_eq!(error.kind(), ErrorKind::ProcessSpawnFailure);
    }

    #[test]
    fn test_invalid_argument_hints() {
        let error = DesktopError::invalid("x", "negative");
        assert!(error.remediation_hint().contains("10000"));

        let error = DesktopError::invalid("seconds", "too long");
        assert!(error.remediation_hint().contains("60"));

        let hint = error.structured_hint();
        assert_eq!(hint.recovery_action, RecoveryAction::ModifyParams);
        assert_eq!(hint.category, ErrorCategory::InvalidInput);
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: DesktopError = io.into();

        assert!(matches!(error, DesktopError::Io { .. }));
        assert_eq!(error.kind(), ErrorKind::Internal);
        assert!(error.to_string().contains("denied"));
    }

    #[test]
    fn test_recovery_action_serialization() {
        assert_eq!(serde_json::to_string(&RecoveryAction::CallTool).unwrap(), r#""call_tool""#);
        assert_eq!(
            serde_json::to_string(&ErrorCategory::InvalidInput).unwrap(),
            r#""invalid_input""#
        );
    }
}
