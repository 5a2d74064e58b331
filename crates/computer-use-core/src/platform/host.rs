//! Read-only view of the host environment
//!
//! Detection and display management read environment variables, marker
//! files and `PATH` through [`HostProbe`] instead of touching process-global
//! state directly. Production code uses [`SystemHost`]; tests use
//! [`MockHost`](super::mock::MockHost).

use std::path::{Path, PathBuf};

use crate::model::OsKind;

/// Environment, filesystem and `PATH` lookups used for host classification
///
/// Every method is infallible: a missing variable, unreadable file or
/// unresolvable executable is reported as `None`/`false`.
pub trait HostProbe: Send + Sync {
    /// OS family of the host
    fn os(&self) -> OsKind;

    /// Environment variable, `None` when unset or empty
    fn env_var(&self, key: &str) -> Option<String>;

    /// Whole file contents, `None` when unreadable
    fn read_file(&self, path: &str) -> Option<String>;

    fn path_exists(&self, path: &str) -> bool;

    /// Resolves an executable on `PATH`
    fn find_executable(&self, name: &str) -> Option<PathBuf>;
}

/// [`HostProbe`] backed by the real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl HostProbe for SystemHost {
    fn os(&self) -> OsKind {
        OsKind::current()
    }

    fn env_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }

    fn read_file(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }

    fn path_exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}
