//! Mock providers for testing
//!
//! [`MockScreenshotProvider`] and [`MockInputProvider`] implement the provider
//! traits in memory. They record every call, can simulate latency with
//! `with_delay()` and can fail every operation with `with_error()`, so the
//! factory, dispatcher and MCP layer can be tested on any host.
//!
//! # Examples
//!
//! ```
//! use computer_use_core::provider::{
//!     ScreenshotMethod, ScreenshotProvider, mock::MockScreenshotProvider,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let provider = MockScreenshotProvider::new(ScreenshotMethod::X11);
//! let png = provider.capture(None, None).await.unwrap();
//! assert!(png.starts_with(b"\x89PNG"));
//! assert_eq!(provider.capture_count(), 1);
//! # });
//! ```

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::sleep;

use super::traits::{InputMethod, InputProvider, MonitorInfo, ScreenshotMethod, ScreenshotProvider};
use crate::{
    error::{DesktopError, DesktopResult},
    model::{MouseButton, Region, ScrollDirection},
    util::temp_png::PNG_SIGNATURE,
};

async fn apply_delay(delay: Option<Duration>) {
    if let Some(delay) = delay {
        sleep(delay).await;
    }
}

fn check_error_injection(error: &Option<DesktopError>) -> DesktopResult<()> {
    match error {
        Some(err) => Err(err.clone()),
        None => Ok(()),
    }
}

// ============================================================================
// Screenshot
// ============================================================================

/// In-memory [`ScreenshotProvider`]
#[derive(Debug)]
pub struct MockScreenshotProvider {
    method: ScreenshotMethod,
    available: bool,
    image: Vec<u8>,
    monitors: Vec<MonitorInfo>,
    delay: Option<Duration>,
    error_injection: Option<DesktopError>,
    captures: Mutex<Vec<(Option<Region>, Option<u32>)>>,
}

impl MockScreenshotProvider {
    /// Available provider returning a small fake PNG
    pub fn new(method: ScreenshotMethod) -> Self {
        let mut image = PNG_SIGNATURE.to_vec();
        image.extend_from_slice(format!("mock:{method}").as_bytes());
        Self {
            method,
            available: true,
            image,
            monitors: vec![MonitorInfo::fallback()],
            delay: None,
            error_injection: None,
            captures: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(method: ScreenshotMethod) -> Self {
        Self {
            available: false,
            ..Self::new(method)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every capture fails with `error`
    pub fn with_error(mut self, error: DesktopError) -> Self {
        self.error_injection = Some(error);
        self
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = image;
        self
    }

    pub fn with_monitors(mut self, monitors: Vec<MonitorInfo>) -> Self {
        self.monitors = monitors;
        self
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn capture_count(&self) -> usize {
        self.captures.lock().len()
    }

    /// Arguments of every capture call, in order
    pub fn captures(&self) -> Vec<(Option<Region>, Option<u32>)> {
        self.captures.lock().clone()
    }
}

#[async_trait]
impl ScreenshotProvider for MockScreenshotProvider {
    fn method(&self) -> ScreenshotMethod {
        self.method
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn capture(&self, region: Option<Region>, monitor: Option<u32>) -> DesktopResult<Vec<u8>> {
        self.captures.lock().push((region, monitor));
        apply_delay(self.delay).await;
        check_error_injection(&self.error_injection)?;
        if !self.available {
            return Err(DesktopError::ProviderUnavailable {
                method: self.method.to_string(),
                reason: "mock provider marked unavailable".to_string(),
            });
        }
        Ok(self.image.clone())
    }

    async fn monitors(&self) -> DesktopResult<Vec<MonitorInfo>> {
        apply_delay(self.delay).await;
        Ok(self.monitors.clone())
    }
}

// ============================================================================
// Input
// ============================================================================

/// One call recorded by [`MockInputProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCall {
    Click { x: u32, y: u32, button: MouseButton },
    Type(String),
    Key(String),
    Scroll { direction: ScrollDirection, amount: u32, at: Option<(u32, u32)> },
    Drag { from: (u32, u32), to: (u32, u32) },
}

/// In-memory [`InputProvider`]
#[derive(Debug)]
pub struct MockInputProvider {
    method: InputMethod,
    available: bool,
    delay: Option<Duration>,
    error_injection: Option<DesktopError>,
    /// Number of leading calls that fail before the injected error clears
    failures_remaining: Mutex<Option<u32>>,
    cursor: Mutex<(i32, i32)>,
    calls: Mutex<Vec<InputCall>>,
}

impl MockInputProvider {
    pub fn new(method: InputMethod) -> Self {
        Self {
            method,
            available: true,
            delay: None,
            error_injection: None,
            failures_remaining: Mutex::new(None),
            cursor: Mutex::new((0, 0)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(method: InputMethod) -> Self {
        Self {
            available: false,
            ..Self::new(method)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call fails with `error`
    pub fn with_error(mut self, error: DesktopError) -> Self {
        self.error_injection = Some(error);
        self
    }

    /// The first `count` calls fail with `error`, later calls succeed
    pub fn failing_times(mut self, count: u32, error: DesktopError) -> Self {
        self.error_injection = Some(error);
        self.failures_remaining = Mutex::new(Some(count));
        self
    }

    pub fn calls(&self) -> Vec<InputCall> {
        self.calls.lock().clone()
    }

    /// Number of attempted calls, including failed ones
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    async fn record(&self, call: InputCall) -> DesktopResult<()> {
        if let InputCall::Click { x, y, .. } = &call {
            *self.cursor.lock() = (*x as i32, *y as i32);
        }
        self.calls.lock().push(call);
        apply_delay(self.delay).await;

        let inject = {
            let mut remaining = self.failures_remaining.lock();
            match remaining.as_mut() {
                Some(0) => false,
                Some(n) => {
                    *n -= 1;
                    true
                }
                None => true,
            }
        };
        if inject {
            check_error_injection(&self.error_injection)?;
        }
        Ok(())
    }
}

#[async_trait]
impl InputProvider for MockInputProvider {
    fn method(&self) -> InputMethod {
        self.method
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn click(&self, x: u32, y: u32, button: MouseButton) -> DesktopResult<()> {
        self.record(InputCall::Click { x, y, button }).await
    }

    async fn type_text(&self, text: &str) -> DesktopResult<()> {
        self.record(InputCall::Type(text.to_string())).await
    }

    async fn key_press(&self, key: &str) -> DesktopResult<()> {
        self.record(InputCall::Key(key.to_string())).await
    }

    async fn scroll(
        &self,
        direction: ScrollDirection,
        amount: u32,
        at: Option<(u32, u32)>,
    ) -> DesktopResult<()> {
        self.record(InputCall::Scroll { direction, amount, at }).await
    }

    async fn drag(&self, from: (u32, u32), to: (u32, u32)) -> DesktopResult<()> {
        self.record(InputCall::Drag { from, to }).await
    }

    async fn cursor_position(&self) -> DesktopResult<(i32, i32)> {
        check_error_injection(&self.error_injection)?;
        Ok(*self.cursor.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_screenshot_records_arguments() {
        let provider = MockScreenshotProvider::new(ScreenshotMethod::Wsl2Powershell);
        let region = Region { x: 1, y: 2, width: 3, height: 4 };

        provider.capture(Some(region), None).await.unwrap();
        provider.capture(None, Some(1)).await.unwrap();

        assert_eq!(provider.captures(), vec![(Some(region), None), (None, Some(1))]);
    }

    #[tokio::test]
    async fn test_mock_screenshot_error_injection() {
        let provider = MockScreenshotProvider::new(ScreenshotMethod::X11).with_error(DesktopError::Timeout {
            operation: "capture".to_string(),
            duration_ms: 10,
        });

        assert!(provider.capture(None, None).await.is_err());
        assert_eq!(provider.capture_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_input_failing_times_then_recovers() {
        let provider = MockInputProvider::new(InputMethod::X11Xdotool).failing_times(
            2,
            DesktopError::CommandFailed {
                program: "xdotool".to_string(),
                status: Some(1),
                stderr: "busy".to_string(),
            },
        );

        assert!(provider.click(1, 1, MouseButton::Left).await.is_err());
        assert!(provider.click(1, 1, MouseButton::Left).await.is_err());
        assert!(provider.click(1, 1, MouseButton::Left).await.is_ok());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_input_tracks_cursor() {
        let provider = MockInputProvider::new(InputMethod::WindowsNative);
        provider.click(640, 480, MouseButton::Left).await.unwrap();

        assert_eq!(provider.cursor_position().await.unwrap(), (640, 480));
    }

    #[tokio::test]
    async fn test_mock_delay() {
        let provider =
            MockInputProvider::new(InputMethod::X11Xdotool).with_delay(Duration::from_millis(30));
        let start = std::time::Instant::now();
        provider.type_text("hi").await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(provider.calls(), vec![InputCall::Type("hi".to_string())]);
    }
}
