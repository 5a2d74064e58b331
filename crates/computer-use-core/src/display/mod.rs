//! X display lifecycle: probing, forwarding and virtual displays

pub mod manager;
pub mod session;

pub use manager::{
    BestDisplay, CleanupReport, DisplayAttempt, DisplayCheck, DisplayLifecycleManager, DisplayTest,
    ForwardingOutcome, InstallReport, ManagerStatus, StartOutcome, StopOutcome, XSERVER_PACKAGES,
};
pub use session::{AvailabilityState, DisplaySession, SessionInfo, SessionKind, VirtualState, display_id};
