//! Placeholder provider for hosts without a GUI subsystem

use async_trait::async_trait;

use super::traits::{ScreenshotMethod, ScreenshotProvider};
use crate::{
    error::{DesktopError, DesktopResult},
    model::Region,
};

/// Capture provider that always reports itself unavailable
///
/// Routed on Windows Server Core so the fallback chain records an attempt
/// with a clear reason before trying a VcXsrv server.
#[derive(Debug, Clone)]
pub struct UnavailableScreenshotProvider {
    method: ScreenshotMethod,
    reason: String,
}

impl UnavailableScreenshotProvider {
    pub fn new(method: ScreenshotMethod, reason: impl Into<String>) -> Self {
        Self {
            method,
            reason: reason.into(),
        }
    }

    pub fn server_core() -> Self {
        Self::new(
            ScreenshotMethod::ServerCore,
            "Windows Server Core has no GUI subsystem",
        )
    }
}

#[async_trait]
impl ScreenshotProvider for UnavailableScreenshotProvider {
    fn method(&self) -> ScreenshotMethod {
        self.method
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn capture(&self, _region: Option<Region>, _monitor: Option<u32>) -> DesktopResult<Vec<u8>> {
        Err(DesktopError::ProviderUnavailable {
            method: self.method.to_string(),
            reason: self.reason.clone(),
        })
    }
}
