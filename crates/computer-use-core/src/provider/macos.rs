//! macOS `screencapture`

use std::sync::Arc;

use async_trait::async_trait;

use super::traits::{ScreenshotMethod, ScreenshotProvider};
use crate::{
    constants::screenshot_timeout,
    error::{DesktopError, DesktopResult},
    model::Region,
    platform::HostProbe,
    util::{
        process::{CommandRunner, CommandSpec},
        temp_png::CaptureScratch,
    },
};

pub struct MacScreenshotProvider {
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn HostProbe>,
}

impl MacScreenshotProvider {
    pub fn new(runner: Arc<dyn CommandRunner>, host: Arc<dyn HostProbe>) -> Self {
        Self { runner, host }
    }
}

#[async_trait]
impl ScreenshotProvider for MacScreenshotProvider {
    fn method(&self) -> ScreenshotMethod {
        ScreenshotMethod::MacosScreencapture
    }

    async fn is_available(&self) -> bool {
        self.host.find_executable("screencapture").is_some()
    }

    async fn capture(&self, region: Option<Region>, monitor: Option<u32>) -> DesktopResult<Vec<u8>> {
        let scratch = CaptureScratch::new()?;
        let path = scratch.file("capture.png");

        // -x silences the shutter sound
        let mut spec = CommandSpec::new("screencapture")
            .arg("-x")
            .timeout(screenshot_timeout());
        if let Some(r) = region {
            if r.width == 0 || r.height == 0 {
                return Err(DesktopError::invalid("region", "width and height must be positive"));
            }
            spec = spec.arg(format!("-R{},{},{},{}", r.x, r.y, r.width, r.height));
        } else if let Some(index) = monitor {
            // screencapture numbers displays from 1
            spec = spec.arg(format!("-D{}", index + 1));
        }
        spec = spec.arg(path.to_string_lossy());

        self.runner.run(&spec).await?.into_result("screencapture")?;
        scratch.read_png(&path, "screencapture").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        platform::mock::MockHost,
        util::{mock_runner::MockCommandRunner, process::CommandOutput},
    };

    fn provider(runner: Arc<MockCommandRunner>, host: MockHost) -> MacScreenshotProvider {
        MacScreenshotProvider::new(runner, Arc::new(host))
    }

    #[tokio::test]
    async fn test_region_arguments() {
        let runner = Arc::new(MockCommandRunner::new());
        let p = provider(runner.clone(), MockHost::macos().with_executable("screencapture"));

        // The mock writes no file, so the read fails after the command ran
        let err = p
            .capture(Some(Region { x: 5, y: 6, width: 70, height: 80 }), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DesktopError::Io { .. }));

        let call = &runner.calls_for("screencapture")[0];
        assert_eq!(call.args[0], "-x");
        assert_eq!(call.args[1], "-R5,6,70,80");
        assert!(call.args[2].ends_with("capture.png"));
    }

    #[tokio::test]
    async fn test_monitor_is_one_based() {
        let runner = Arc::new(MockCommandRunner::new());
        let p = provider(runner.clone(), MockHost::macos());

        let _ = p.capture(None, Some(1)).await;
        assert_eq!(runner.calls()[0].args[1], "-D2");
    }

    #[tokio::test]
    async fn test_command_failure_propagates() {
        let runner = Arc::new(
            MockCommandRunner::new().respond("screencapture", CommandOutput::failed(1, "not authorized")),
        );
        let p = provider(runner, MockHost::macos());

        let err = p.capture(None, None).await.unwrap_err();
        assert!(matches!(err, DesktopError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_availability() {
        let runner = Arc::new(MockCommandRunner::new());
        assert!(provider(runner.clone(), MockHost::macos().with_executable("screencapture")).is_available().await);
        assert!(!provider(runner, MockHost::macos()).is_available().await);
    }
}
