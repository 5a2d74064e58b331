//! Host classification

pub mod detect;
pub mod host;
pub mod mock;

pub use detect::{
    WslInfo, check_powershell_available, check_x11_available, detect_platform, detect_platform_with,
    detect_wsl, probe_x11, wsl_host_ip,
};
pub use host::{HostProbe, SystemHost};
