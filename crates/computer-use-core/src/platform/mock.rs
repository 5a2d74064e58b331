//! Mock host environment for testing
//!
//! `MockHost` implements [`HostProbe`] from in-memory maps so detection and
//! display management can be exercised for any OS/sub-environment
//! combination regardless of where the tests run.
//!
//! # Examples
//!
//! ```
//! use computer_use_core::platform::{HostProbe, mock::MockHost};
//!
//! let host = MockHost::linux()
//!     .with_env("WSL_INTEROP", "/run/WSL/1_interop")
//!     .with_file("/proc/version", "Linux version 5.15.90.1-microsoft-standard-WSL2")
//!     .with_executable("powershell.exe");
//!
//! assert_eq!(host.env_var("WSL_INTEROP").as_deref(), Some("/run/WSL/1_interop"));
//! assert!(host.find_executable("powershell.exe").is_some());
//! ```

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
};

use super::host::HostProbe;
use crate::model::OsKind;

/// In-memory [`HostProbe`]
#[derive(Debug, Clone)]
pub struct MockHost {
    os: OsKind,
    env: HashMap<String, String>,
    files: HashMap<String, String>,
    paths: HashSet<String>,
    executables: HashSet<String>,
}

impl MockHost {
    pub fn new(os: OsKind) -> Self {
        Self {
            os,
            env: HashMap::new(),
            files: HashMap::new(),
            paths: HashSet::new(),
            executables: HashSet::new(),
        }
    }

    pub fn linux() -> Self {
        Self::new(OsKind::Linux)
    }

    pub fn windows() -> Self {
        Self::new(OsKind::Windows)
    }

    pub fn macos() -> Self {
        Self::new(OsKind::MacOS)
    }

    /// Native Linux desktop with `DISPLAY=:0` and the X11 tool set on PATH
    pub fn x11_desktop() -> Self {
        Self::linux()
            .with_env("DISPLAY", ":0")
            .with_file("/proc/version", "Linux version 6.8.0-generic (gcc 13.2.0)")
            .with_executables(["scrot", "import", "xwd", "convert", "xdotool", "xset", "xrandr"])
    }

    /// WSL2 guest with interop and PowerShell reachable
    pub fn wsl2() -> Self {
        Self::linux()
            .with_env("WSL_INTEROP", "/run/WSL/8_interop")
            .with_env("WSL_DISTRO_NAME", "Ubuntu")
            .with_file(
                "/proc/version",
                "Linux version 5.15.153.1-microsoft-standard-WSL2 (root@build)",
            )
            .with_file("/etc/resolv.conf", "# generated by WSL\nnameserver 172.29.96.1\n")
            .with_executable("powershell.exe")
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn without_env(mut self, key: &str) -> Self {
        self.env.remove(key);
        self
    }

    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files.insert(path.to_string(), contents.to_string());
        self.paths.insert(path.to_string());
        self
    }

    /// Marks a path (typically a directory) as existing
    pub fn with_path(mut self, path: &str) -> Self {
        self.paths.insert(path.to_string());
        self
    }

    pub fn with_executable(mut self, name: &str) -> Self {
        self.executables.insert(name.to_string());
        self
    }

    pub fn with_executables<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.executables.extend(names.into_iter().map(str::to_string));
        self
    }

    pub fn without_executable(mut self, name: &str) -> Self {
        self.executables.remove(name);
        self
    }
}

impl HostProbe for MockHost {
    fn os(&self) -> OsKind {
        self.os
    }

    fn env_var(&self, key: &str) -> Option<String> {
        self.env.get(key).filter(|v| !v.is_empty()).cloned()
    }

    fn read_file(&self, path: &str) -> Option<String> {
        self.files.get(path).cloned()
    }

    fn path_exists(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        self.executables
            .contains(name)
            .then(|| PathBuf::from("/usr/bin").join(name))
    }
}
