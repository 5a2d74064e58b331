//! Display session records and lifecycle states

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{model::Resolution, util::process::ManagedProcess};

/// How a display came to be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// `DISPLAY` was already set and answered
    Existing,
    /// VcXsrv/X410 on the Windows host, reached from WSL
    WslForwarded,
    /// Xvfb started and owned by the manager
    Virtual,
    /// Last-resort local `:0`
    Native,
}

/// Probe state of a display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityState {
    #[default]
    Unchecked,
    Checking,
    Available,
    Unavailable,
}

/// Lifecycle of a virtual display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VirtualState {
    #[default]
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// X display id for a display number, e.g. `:99`
pub fn display_id(number: u32) -> String {
    format!(":{number}")
}

/// A display tracked by the manager
///
/// Virtual sessions own their Xvfb process; dropping the session kills it.
pub struct DisplaySession {
    pub display_id: String,
    pub kind: SessionKind,
    pub process: Option<Box<dyn ManagedProcess>>,
    pub resolution: Resolution,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for DisplaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplaySession")
            .field("display_id", &self.display_id)
            .field("kind", &self.kind)
            .field("pid", &self.pid())
            .field("resolution", &self.resolution)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl DisplaySession {
    /// Session for a display the manager does not own a process for
    pub fn attached(display_id: impl Into<String>, kind: SessionKind, resolution: Resolution) -> Self {
        Self {
            display_id: display_id.into(),
            kind,
            process: None,
            resolution,
            created_at: Utc::now(),
        }
    }

    pub fn virtual_display(
        display_id: impl Into<String>,
        process: Box<dyn ManagedProcess>,
        resolution: Resolution,
    ) -> Self {
        Self {
            display_id: display_id.into(),
            kind: SessionKind::Virtual,
            process: Some(process),
            resolution,
            created_at: Utc::now(),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid())
    }

    /// False once an owned process has exited; attached sessions are always live
    pub fn is_live(&mut self) -> bool {
        match self.process.as_mut() {
            Some(process) => process.is_running(),
            None => true,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            kind: self.kind,
            pid: self.pid(),
            resolution: self.resolution.to_string(),
            created_at: self.created_at,
        }
    }
}

/// Serializable view of a [`DisplaySession`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub kind: SessionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub resolution: String,
    pub created_at: DateTime<Utc>,
}
