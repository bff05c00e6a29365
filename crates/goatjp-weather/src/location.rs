//! Location acquisition: permission state machine plus a single bounded fix.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use goatjp_core::{LocationConfig, LocationError};

use crate::types::{AuthorizationStatus, Coordinates, PermissionState};

/// How often permission is re-checked after the OS prompt is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionPoll {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PermissionPoll {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_millis(200),
        }
    }
}

/// Default bound on a single location fix.
pub const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(10);

/// The platform's permission and positioning subsystem.
#[async_trait]
pub trait LocationManager: Send + Sync {
    /// Current OS authorization, read through on every call.
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Show the OS permission prompt. Returns immediately; the answer arrives
    /// later through `authorization_status`.
    fn request_authorization(&self);

    /// Resolve one fix.
    async fn request_fix(&self) -> anyhow::Result<Coordinates>;
}

/// Anything that can hand the orchestrator a set of coordinates.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn request_location(&self) -> Result<Coordinates, LocationError>;

    fn authorization_status(&self) -> AuthorizationStatus;
}

/// Steps of one `request_location` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStep {
    /// Inspect the current authorization.
    Evaluate,
    /// Trigger the OS prompt.
    Prompt,
    /// Check permission again; `attempt` checks have already happened.
    Poll { attempt: u32 },
    /// Wait one poll interval, then check again.
    Wait { attempt: u32 },
    /// Permission granted: take a fix.
    Fix,
    /// Terminal failure.
    Fail(LocationError),
}

impl AcquireStep {
    /// Pure transition function; the provider drives it and performs the effects.
    pub fn next(self, status: AuthorizationStatus, poll: PermissionPoll) -> AcquireStep {
        match self {
            AcquireStep::Evaluate => match status.permission_state() {
                PermissionState::Granted => AcquireStep::Fix,
                PermissionState::NotDetermined => AcquireStep::Prompt,
                PermissionState::Denied => AcquireStep::Fail(LocationError::PermissionDenied),
            },
            AcquireStep::Prompt => AcquireStep::Poll { attempt: 0 },
            AcquireStep::Poll { attempt } if attempt >= poll.attempts => {
                AcquireStep::Fail(LocationError::PermissionDenied)
            }
            AcquireStep::Poll { .. } if status.is_authorized() => AcquireStep::Fix,
            AcquireStep::Poll { attempt } => AcquireStep::Wait { attempt },
            AcquireStep::Wait { attempt } => AcquireStep::Poll {
                attempt: attempt + 1,
            },
            terminal @ (AcquireStep::Fix | AcquireStep::Fail(_)) => terminal,
        }
    }
}

/// Wraps a `LocationManager` into a one-shot async location request.
pub struct LocationProvider {
    manager: Arc<dyn LocationManager>,
    poll: PermissionPoll,
    fix_timeout: Duration,
}

impl LocationProvider {
    pub fn new(manager: Arc<dyn LocationManager>) -> Self {
        Self {
            manager,
            poll: PermissionPoll::default(),
            fix_timeout: DEFAULT_FIX_TIMEOUT,
        }
    }

    pub fn from_config(manager: Arc<dyn LocationManager>, config: &LocationConfig) -> Self {
        Self::new(manager)
            .with_poll(PermissionPoll {
                attempts: config.permission_poll_attempts,
                interval: Duration::from_millis(config.permission_poll_interval_ms),
            })
            .with_fix_timeout(Duration::from_secs(config.fix_timeout_secs))
    }

    pub fn with_poll(mut self, poll: PermissionPoll) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_fix_timeout(mut self, fix_timeout: Duration) -> Self {
        self.fix_timeout = fix_timeout;
        self
    }

    /// Current OS authorization, never cached.
    pub fn current_authorization_status(&self) -> AuthorizationStatus {
        self.manager.authorization_status()
    }

    async fn fix(&self) -> Result<Coordinates, LocationError> {
        match tokio::time::timeout(self.fix_timeout, self.manager.request_fix()).await {
            Ok(Ok(coordinates)) => {
                tracing::debug!(
                    "Location fix: {}, {}",
                    coordinates.latitude,
                    coordinates.longitude
                );
                Ok(coordinates)
            }
            Ok(Err(e)) => {
                tracing::warn!("Location fix failed: {}", e);
                Err(LocationError::LocationUnavailable)
            }
            Err(_) => {
                tracing::warn!("Location fix timed out after {:?}", self.fix_timeout);
                Err(LocationError::Timeout)
            }
        }
    }
}

#[async_trait]
impl LocationSource for LocationProvider {
    async fn request_location(&self) -> Result<Coordinates, LocationError> {
        let mut step = AcquireStep::Evaluate;

        loop {
            step = match step {
                AcquireStep::Fix => return self.fix().await,
                AcquireStep::Fail(e) => {
                    tracing::info!("Location request failed: {}", e);
                    return Err(e);
                }
                AcquireStep::Prompt => {
                    tracing::info!("Requesting location permission");
                    self.manager.request_authorization();
                    step.next(self.manager.authorization_status(), self.poll)
                }
                AcquireStep::Wait { .. } => {
                    tokio::time::sleep(self.poll.interval).await;
                    step.next(self.manager.authorization_status(), self.poll)
                }
                AcquireStep::Evaluate | AcquireStep::Poll { .. } => {
                    step.next(self.manager.authorization_status(), self.poll)
                }
            };
        }
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        self.current_authorization_status()
    }
}

/// Location manager for hosts without a positioning subsystem: the fix comes
/// from configuration. Authorized when coordinates exist, restricted otherwise.
#[derive(Debug, Clone)]
pub struct FixedLocationManager {
    coordinates: Option<Coordinates>,
}

impl FixedLocationManager {
    pub fn new(coordinates: Option<Coordinates>) -> Self {
        Self { coordinates }
    }

    pub fn from_config(config: &LocationConfig) -> Self {
        Self::new(
            config
                .fixed_coordinates()
                .map(|(lat, lon)| Coordinates::new(lat, lon)),
        )
    }
}

#[async_trait]
impl LocationManager for FixedLocationManager {
    fn authorization_status(&self) -> AuthorizationStatus {
        if self.coordinates.is_some() {
            AuthorizationStatus::AuthorizedAlways
        } else {
            AuthorizationStatus::Restricted
        }
    }

    fn request_authorization(&self) {
        tracing::debug!("Fixed location manager has no permission prompt");
    }

    async fn request_fix(&self) -> anyhow::Result<Coordinates> {
        match self.coordinates {
            Some(coordinates) if coordinates.is_valid() => Ok(coordinates),
            Some(coordinates) => anyhow::bail!(
                "configured coordinates out of range: {}, {}",
                coordinates.latitude,
                coordinates.longitude
            ),
            None => anyhow::bail!("no coordinates configured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted location manager: `grant_on_prompt` flips the status to
    /// authorized once the prompt has been requested.
    struct MockLocationManager {
        status: Mutex<AuthorizationStatus>,
        fix: Option<Coordinates>,
        fix_delay: Option<Duration>,
        grant_on_prompt: bool,
        prompts: AtomicUsize,
        fixes: AtomicUsize,
    }

    impl MockLocationManager {
        fn new(status: AuthorizationStatus, fix: Option<Coordinates>) -> Self {
            Self {
                status: Mutex::new(status),
                fix,
                fix_delay: None,
                grant_on_prompt: false,
                prompts: AtomicUsize::new(0),
                fixes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LocationManager for MockLocationManager {
        fn authorization_status(&self) -> AuthorizationStatus {
            *self.status.lock()
        }

        fn request_authorization(&self) {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            if self.grant_on_prompt {
                *self.status.lock() = AuthorizationStatus::AuthorizedWhenInUse;
            }
        }

        async fn request_fix(&self) -> anyhow::Result<Coordinates> {
            self.fixes.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.fix_delay {
                tokio::time::sleep(delay).await;
            }
            self.fix.ok_or_else(|| anyhow::anyhow!("locating failed"))
        }
    }

    fn provider(manager: &Arc<MockLocationManager>) -> LocationProvider {
        LocationProvider::new(manager.clone())
    }

    #[tokio::test]
    async fn test_granted_returns_fix() {
        let manager = Arc::new(MockLocationManager::new(
            AuthorizationStatus::AuthorizedWhenInUse,
            Some(Coordinates::new(35.6762, 139.6503)),
        ));

        let coordinates = provider(&manager).request_location().await.unwrap();

        assert_eq!(coordinates, Coordinates::new(35.6762, 139.6503));
        assert_eq!(manager.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_denied_fails_without_fix() {
        for status in [AuthorizationStatus::Denied, AuthorizationStatus::Restricted] {
            let manager = Arc::new(MockLocationManager::new(
                status,
                Some(Coordinates::new(0.0, 0.0)),
            ));

            let err = provider(&manager).request_location().await.unwrap_err();

            assert_eq!(err, LocationError::PermissionDenied);
            assert_eq!(manager.fixes.load(Ordering::SeqCst), 0);
            assert_eq!(manager.prompts.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_determined_prompts_once_then_fixes() {
        let mut manager = MockLocationManager::new(
            AuthorizationStatus::NotDetermined,
            Some(Coordinates::new(34.6937, 135.5023)),
        );
        manager.grant_on_prompt = true;
        let manager = Arc::new(manager);

        let coordinates = provider(&manager).request_location().await.unwrap();

        assert_eq!(coordinates, Coordinates::new(34.6937, 135.5023));
        assert_eq!(manager.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.fixes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_determined_gives_up_after_poll_window() {
        let manager = Arc::new(MockLocationManager::new(
            AuthorizationStatus::NotDetermined,
            Some(Coordinates::new(0.0, 0.0)),
        ));
        let started = tokio::time::Instant::now();

        let err = provider(&manager).request_location().await.unwrap_err();

        assert_eq!(err, LocationError::PermissionDenied);
        assert_eq!(manager.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.fixes.load(Ordering::SeqCst), 0);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(1000), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(1200), "waited {:?}", waited);
    }

    #[tokio::test]
    async fn test_fix_failure_is_location_unavailable() {
        let manager = Arc::new(MockLocationManager::new(
            AuthorizationStatus::AuthorizedAlways,
            None,
        ));

        let err = provider(&manager).request_location().await.unwrap_err();

        assert_eq!(err, LocationError::LocationUnavailable);
        assert_eq!(manager.fixes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fix_times_out() {
        let mut manager = MockLocationManager::new(
            AuthorizationStatus::AuthorizedAlways,
            Some(Coordinates::new(0.0, 0.0)),
        );
        manager.fix_delay = Some(Duration::from_secs(30));
        let manager = Arc::new(manager);

        let err = provider(&manager)
            .with_fix_timeout(Duration::from_secs(5))
            .request_location()
            .await
            .unwrap_err();

        assert_eq!(err, LocationError::Timeout);
    }

    #[test]
    fn test_authorization_status_reads_through() {
        let manager = Arc::new(MockLocationManager::new(
            AuthorizationStatus::AuthorizedWhenInUse,
            None,
        ));
        let provider = provider(&manager);
        assert_eq!(
            provider.current_authorization_status(),
            AuthorizationStatus::AuthorizedWhenInUse
        );

        *manager.status.lock() = AuthorizationStatus::Denied;
        assert_eq!(
            provider.current_authorization_status(),
            AuthorizationStatus::Denied
        );
    }

    #[test]
    fn test_poll_transitions_are_bounded() {
        let poll = PermissionPoll::default();
        let pending = AuthorizationStatus::NotDetermined;

        let mut step = AcquireStep::Evaluate.next(pending, poll);
        assert_eq!(step, AcquireStep::Prompt);

        let mut waits = 0;
        while !matches!(step, AcquireStep::Fail(_) | AcquireStep::Fix) {
            if matches!(step, AcquireStep::Wait { .. }) {
                waits += 1;
            }
            step = step.next(pending, poll);
        }

        assert_eq!(step, AcquireStep::Fail(LocationError::PermissionDenied));
        assert_eq!(waits, 5);
    }

    #[test]
    fn test_poll_grant_mid_window() {
        let poll = PermissionPoll::default();
        let step = AcquireStep::Poll { attempt: 3 };
        assert_eq!(
            step.next(AuthorizationStatus::AuthorizedAlways, poll),
            AcquireStep::Fix
        );
        assert_eq!(
            AcquireStep::Poll { attempt: 5 }.next(AuthorizationStatus::AuthorizedAlways, poll),
            AcquireStep::Fail(LocationError::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn test_fixed_manager() {
        let manager = FixedLocationManager::new(Some(Coordinates::new(35.0, 139.0)));
        assert!(manager.authorization_status().is_authorized());
        assert_eq!(
            manager.request_fix().await.unwrap(),
            Coordinates::new(35.0, 139.0)
        );

        let manager = FixedLocationManager::new(None);
        assert_eq!(
            manager.authorization_status(),
            AuthorizationStatus::Restricted
        );
        assert!(manager.request_fix().await.is_err());
    }
}
