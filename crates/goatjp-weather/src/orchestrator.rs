//! Location -> weather -> shared storage, behind a single `refresh` call.
//!
//! Runs are single-flight. A caller that arrives while a run of the same kind
//! is in flight joins it and receives that run's own outcome. A caller of the
//! other kind waits for the run to end and then starts its own, so a refresh
//! never hands back the demo sample. When a run ends without an outcome
//! (cancelled, or its future dropped) joined callers start over.

use std::sync::Arc;
use std::time::Duration;

use goatjp_core::{AppError, WeatherError};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::location::LocationSource;
use crate::provider::WeatherFetcher;
use crate::shared::SharedStorage;
use crate::types::{PermissionState, Weather};

/// Simulated latency of the demo path.
pub const DEMO_DELAY: Duration = Duration::from_secs(1);

/// Observable state of the weather screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherState {
    pub current_weather: Option<Weather>,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

/// Result of an in-flight run; `None` until it finishes.
type Outcome = Option<Result<Weather, AppError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Refresh,
    Demo,
}

struct Run {
    kind: RunKind,
    outcome: watch::Receiver<Outcome>,
}

enum Slot<'a> {
    Run(RunGuard<'a>),
    Join(watch::Receiver<Outcome>),
    Wait(watch::Receiver<Outcome>),
}

/// Ownership of the in-flight slot. Dropping it frees the slot, clears
/// `is_loading`, and closes the outcome channel so waiters wake up.
struct RunGuard<'a> {
    orchestrator: &'a WeatherOrchestrator,
    outcome: watch::Sender<Outcome>,
}

impl RunGuard<'_> {
    fn publish(&self, outcome: Result<Weather, AppError>) {
        self.outcome.send_replace(Some(outcome));
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.orchestrator.in_flight.lock();
        self.orchestrator
            .state
            .send_if_modified(|s| std::mem::replace(&mut s.is_loading, false));
        *slot = None;
    }
}

pub struct WeatherOrchestrator {
    location: Arc<dyn LocationSource>,
    fetcher: Arc<dyn WeatherFetcher>,
    storage: SharedStorage,
    state: watch::Sender<WeatherState>,
    in_flight: Mutex<Option<Run>>,
    demo_delay: Duration,
}

impl WeatherOrchestrator {
    pub fn new(
        location: Arc<dyn LocationSource>,
        fetcher: Arc<dyn WeatherFetcher>,
        storage: SharedStorage,
    ) -> Self {
        let (state, _) = watch::channel(WeatherState::default());
        Self {
            location,
            fetcher,
            storage,
            state,
            in_flight: Mutex::new(None),
            demo_delay: DEMO_DELAY,
        }
    }

    pub fn with_demo_delay(mut self, delay: Duration) -> Self {
        self.demo_delay = delay;
        self
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> WeatherState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<WeatherState> {
        self.state.subscribe()
    }

    pub fn check_location_permission(&self) -> PermissionState {
        self.location.authorization_status().permission_state()
    }

    /// Seed `current_weather` from the shared store, if anything is saved there.
    pub fn restore_cached(&self) -> Option<Weather> {
        let cached = self.storage.load_weather()?;
        tracing::info!("Restored cached weather for {}", cached.location);
        self.state.send_modify(|s| s.current_weather = Some(cached.clone()));
        Some(cached)
    }

    /// Fetch weather for the current location and persist it.
    pub async fn refresh(&self) -> Result<Weather, AppError> {
        self.refresh_with_cancel(&CancellationToken::new()).await
    }

    /// Like `refresh`, abandoning the location/network phase when `cancel` fires.
    ///
    /// A cancelled refresh leaves `current_weather` alone and writes nothing.
    pub async fn refresh_with_cancel(&self, cancel: &CancellationToken) -> Result<Weather, AppError> {
        if !self.fetcher.has_api_key() {
            let err = WeatherError::ApiKeyMissing;
            tracing::warn!("Refresh skipped: {}", err);
            self.state
                .send_modify(|s| s.last_error = Some(err.user_message()));
            return Err(err.into());
        }

        loop {
            match self.claim(RunKind::Refresh) {
                Slot::Run(run) => return self.run_refresh(run, cancel).await,
                Slot::Join(mut outcome) => {
                    tracing::debug!("Refresh already in flight, joining it");
                    let joined = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AppError::Cancelled),
                        result = joined(&mut outcome) => result,
                    };
                    if let Some(result) = joined {
                        return result;
                    }
                    tracing::debug!("Joined refresh ended without a result, starting over");
                }
                Slot::Wait(mut outcome) => {
                    tracing::debug!("Demo load in flight, refreshing after it");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AppError::Cancelled),
                        () = finished(&mut outcome) => {}
                    }
                }
            }
        }
    }

    /// Install the fixed sample record after a simulated delay.
    pub async fn load_sample(&self) -> Weather {
        loop {
            match self.claim(RunKind::Demo) {
                Slot::Run(run) => {
                    self.begin();
                    tokio::time::sleep(self.demo_delay).await;

                    let weather = Weather::sample();
                    self.complete(&run, weather.clone()).await;
                    return weather;
                }
                Slot::Join(mut outcome) => {
                    if let Some(Ok(weather)) = joined(&mut outcome).await {
                        return weather;
                    }
                }
                Slot::Wait(mut outcome) => {
                    tracing::debug!("Refresh in flight, loading sample after it");
                    finished(&mut outcome).await;
                }
            }
        }
    }

    fn claim(&self, kind: RunKind) -> Slot<'_> {
        let mut slot = self.in_flight.lock();
        match slot.as_ref() {
            Some(run) if run.kind == kind => Slot::Join(run.outcome.clone()),
            Some(run) => Slot::Wait(run.outcome.clone()),
            None => {
                let (tx, rx) = watch::channel(None);
                *slot = Some(Run { kind, outcome: rx });
                Slot::Run(RunGuard {
                    orchestrator: self,
                    outcome: tx,
                })
            }
        }
    }

    async fn run_refresh(
        &self,
        run: RunGuard<'_>,
        cancel: &CancellationToken,
    ) -> Result<Weather, AppError> {
        self.begin();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = self.acquire() => result,
        };

        match result {
            Ok(weather) => {
                self.complete(&run, weather.clone()).await;
                Ok(weather)
            }
            Err(AppError::Cancelled) => {
                tracing::info!("Weather refresh cancelled");
                self.state.send_modify(|s| s.is_loading = false);
                Err(AppError::Cancelled)
            }
            Err(e) => {
                tracing::warn!("Weather refresh failed: {}", e);
                self.state.send_modify(|s| {
                    s.last_error = Some(e.user_message());
                    s.is_loading = false;
                });
                run.publish(Err(e.clone()));
                Err(e)
            }
        }
    }

    async fn acquire(&self) -> Result<Weather, AppError> {
        let coordinates = self.location.request_location().await?;
        tracing::info!(
            "Got location: {}, {}",
            coordinates.latitude,
            coordinates.longitude
        );
        let weather = self.fetcher.fetch_weather(coordinates).await?;
        Ok(weather)
    }

    fn begin(&self) {
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.last_error = None;
        });
    }

    async fn complete(&self, run: &RunGuard<'_>, weather: Weather) {
        self.state.send_modify(|s| {
            s.current_weather = Some(weather.clone());
            s.is_loading = false;
        });
        run.publish(Ok(weather.clone()));

        // Best-effort: SharedStorage logs and drops write failures.
        let storage = self.storage.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || storage.save_weather(&weather)).await {
            tracing::error!("Weather persistence task failed: {}", e);
        }
    }
}

/// Outcome of the joined run, or `None` if it ended without one.
async fn joined(outcome: &mut watch::Receiver<Outcome>) -> Outcome {
    match outcome.wait_for(Option::is_some).await {
        Ok(done) => (*done).clone(),
        Err(_) => None,
    }
}

/// Resolves once the run behind `outcome` has released the slot.
async fn finished(outcome: &mut watch::Receiver<Outcome>) {
    while outcome.changed().await.is_ok() {}
}
