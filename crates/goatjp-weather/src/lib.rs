//! Weather acquisition for GoatJp.
//!
//! Location permission and fix, the OpenWeatherMap client, the shared store
//! used by both the app and the widget, and the orchestrator tying them into
//! one observable refresh.

pub mod location;
pub mod orchestrator;
pub mod provider;
pub mod shared;
pub mod store;
pub mod types;
pub mod widget;

pub use location::{FixedLocationManager, LocationManager, LocationProvider, LocationSource};
pub use orchestrator::{WeatherOrchestrator, WeatherState};
pub use provider::{WeatherClient, WeatherFetcher};
pub use shared::SharedStorage;
pub use store::{MemoryStore, PersistentStore, SqliteStore};
pub use types::*;
pub use widget::{Timeline, WidgetEntry, WidgetProvider};
