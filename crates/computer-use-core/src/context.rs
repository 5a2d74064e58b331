//! Shared state for one server instance
//!
//! [`DesktopContext`] owns everything that would otherwise be process-wide:
//! the cached platform profile, provider singletons, the display manager
//! and the safety validator. Tests build isolated contexts and call
//! [`DesktopContext::reset`] instead of relying on ambient state.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::{
    display::DisplayLifecycleManager,
    model::PlatformProfile,
    platform::{HostProbe, SystemHost, detect_platform_with},
    provider::{InputProvider, ProviderFactory, ScreenshotProvider},
    safety::{SafetyConfig, SafetyValidator},
    util::process::{CommandRunner, TokioCommandRunner},
};

pub struct DesktopContext {
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn HostProbe>,
    profile: RwLock<Option<Arc<PlatformProfile>>>,
    /// Profile that bypasses detection, kept across invalidation
    fixed_profile: Option<Arc<PlatformProfile>>,
    factory: ProviderFactory,
    displays: DisplayLifecycleManager,
    validator: SafetyValidator,
}

impl std::fmt::Debug for DesktopContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesktopContext")
            .field("fixed_profile", &self.fixed_profile)
            .field("factory", &self.factory)
            .field("displays", &self.displays)
            .field("validator", &self.validator)
            .finish()
    }
}

impl DesktopContext {
    pub fn new(runner: Arc<dyn CommandRunner>, host: Arc<dyn HostProbe>, safety: SafetyConfig) -> Self {
        Self {
            factory: ProviderFactory::new(runner.clone(), host.clone()),
            displays: DisplayLifecycleManager::new(runner.clone(), host.clone()),
            validator: SafetyValidator::new(safety),
            profile: RwLock::new(None),
            fixed_profile: None,
            runner,
            host,
        }
    }

    /// Context backed by the real host and `tokio::process`
    pub fn system(safety: SafetyConfig) -> Self {
        Self::new(Arc::new(TokioCommandRunner::new()), Arc::new(SystemHost), safety)
    }

    /// Uses `profile` instead of detecting the host
    pub fn with_profile(mut self, profile: PlatformProfile) -> Self {
        self.fixed_profile = Some(Arc::new(profile));
        self
    }

    pub fn with_screenshot_provider(mut self, provider: Arc<dyn ScreenshotProvider>) -> Self {
        self.factory = self.factory.with_screenshot_provider(provider);
        self
    }

    pub fn with_input_provider(mut self, provider: Arc<dyn InputProvider>) -> Self {
        self.factory = self.factory.with_input_provider(provider);
        self
    }

    /// Platform profile, detected once and cached until [`invalidate`](Self::invalidate)
    pub async fn profile(&self) -> Arc<PlatformProfile> {
        if let Some(fixed) = &self.fixed_profile {
            return fixed.clone();
        }
        if let Some(cached) = self.profile.read().await.as_ref() {
            return cached.clone();
        }

        let mut slot = self.profile.write().await;
        if let Some(cached) = slot.as_ref() {
            return cached.clone();
        }
        let detected = Arc::new(detect_platform_with(self.host.as_ref(), self.runner.as_ref()).await);
        *slot = Some(detected.clone());
        detected
    }

    /// Drops the cached profile and unpinned providers
    pub async fn invalidate(&self) {
        *self.profile.write().await = None;
        self.factory.invalidate();
        info!("Platform state invalidated");
    }

    /// Invalidates and stops every display the manager owns
    pub async fn reset(&self) {
        let report = self.displays.cleanup_all().await;
        self.factory.set_active_display(None);
        self.invalidate().await;
        info!("Context reset, stopped {} display(s)", report.stopped_servers);
    }

    /// Routes X11 providers to `display` after the display manager picked it
    pub async fn use_display(&self, display: &str) {
        self.factory.set_active_display(Some(display.to_string()));
        *self.profile.write().await = None;
    }

    /// Undoes [`use_display`](Self::use_display) if `display` is the active one
    pub async fn release_display(&self, display: &str) {
        if self.factory.active_display().as_deref() == Some(display) {
            self.factory.set_active_display(None);
            *self.profile.write().await = None;
        }
    }

    pub fn factory(&self) -> &ProviderFactory {
        &self.factory
    }

    pub fn displays(&self) -> &DisplayLifecycleManager {
        &self.displays
    }

    pub fn validator(&self) -> &SafetyValidator {
        &self.validator
    }

    pub fn host(&self) -> &dyn HostProbe {
        self.host.as_ref()
    }
}
