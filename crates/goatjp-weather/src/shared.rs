//! Typed records stored in the shared namespace.
//!
//! Nothing here returns an error: unreadable records come back as absent or
//! default, failed writes are reported through tracing and dropped.

use std::sync::Arc;

use goatjp_core::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::PersistentStore;
use crate::types::{Weather, WidgetConfiguration};

pub const WEATHER_KEY: &str = "lastWeather";
pub const CONFIGURATION_KEY: &str = "widgetConfiguration";
pub const BACKGROUND_IMAGE_KEY: &str = "widgetBackgroundImage";

#[derive(Clone)]
pub struct SharedStorage {
    store: Arc<dyn PersistentStore>,
}

impl SharedStorage {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    /// Save the latest weather for the widget.
    pub fn save_weather(&self, weather: &Weather) {
        self.save_record(WEATHER_KEY, weather);
    }

    /// Last saved weather, or `None` if absent or unreadable.
    pub fn load_weather(&self) -> Option<Weather> {
        self.load_record(WEATHER_KEY)
    }

    pub fn save_widget_configuration(&self, configuration: &WidgetConfiguration) {
        self.save_record(CONFIGURATION_KEY, configuration);
    }

    /// Saved configuration, or the default one if absent or unreadable.
    pub fn load_widget_configuration(&self) -> WidgetConfiguration {
        self.load_record(CONFIGURATION_KEY).unwrap_or_default()
    }

    /// Store encoded image bytes as-is.
    pub fn save_background_image(&self, image: &[u8]) {
        if let Err(e) = self.store.set(BACKGROUND_IMAGE_KEY, image) {
            log_write_failure(BACKGROUND_IMAGE_KEY, &e);
        }
    }

    pub fn load_background_image(&self) -> Option<Vec<u8>> {
        match self.store.get(BACKGROUND_IMAGE_KEY) {
            Ok(image) => image,
            Err(e) => {
                log_read_failure(BACKGROUND_IMAGE_KEY, &e);
                None
            }
        }
    }

    pub fn remove_background_image(&self) {
        self.remove(BACKGROUND_IMAGE_KEY);
    }

    /// Clear all widget data
    pub fn clear_all(&self) {
        for key in [WEATHER_KEY, CONFIGURATION_KEY, BACKGROUND_IMAGE_KEY] {
            self.remove(key);
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            log_write_failure(key, &e);
        }
    }

    fn save_record<T: Serialize>(&self, key: &str, record: &T) {
        let bytes = match serde_json::to_vec(record) {
            Ok(bytes) => bytes,
            Err(e) => {
                log_write_failure(key, &StorageError::Serialization(e.to_string()));
                return;
            }
        };

        match self.store.set(key, &bytes) {
            Ok(()) => tracing::debug!(key, bytes = bytes.len(), "Saved shared record"),
            Err(e) => log_write_failure(key, &e),
        }
    }

    fn load_record<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                log_read_failure(key, &e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                log_read_failure(key, &StorageError::Serialization(e.to_string()));
                None
            }
        }
    }
}

fn log_write_failure(key: &str, error: &StorageError) {
    tracing::warn!(key, error = %error, "Failed to persist shared record");
}

fn log_read_failure(key: &str, error: &StorageError) {
    tracing::warn!(key, error = %error, "Failed to load shared record");
}
