//! Screen capture and input providers
//!
//! [`traits`] defines the provider interfaces, the backend modules implement
//! them, and [`factory`] routes a platform profile to a provider with
//! fallback.

pub mod factory;
pub mod macos;
pub mod mock;
pub mod powershell;
pub mod traits;
pub mod unavailable;
pub mod x11;

pub use factory::{
    CaptureAttempt, CaptureOutcome, PLACEHOLDER_PNG, ProviderFactory, RecommendedMethods, input_chain,
    recommended_methods, route_screenshot, screenshot_chain, vcxsrv_display,
};
pub use traits::{InputMethod, InputProvider, MonitorInfo, ScreenshotMethod, ScreenshotProvider};
