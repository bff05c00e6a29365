//! Widget read path: turns shared records into timeline entries.
//!
//! The widget never fetches. It shows whatever the app last saved, or the
//! sample record when nothing usable is stored.

use chrono::{DateTime, Duration, Local, Utc};
use goatjp_core::WidgetConfig;

use crate::shared::SharedStorage;
use crate::types::{Weather, WidgetConfiguration, WidgetSize};

/// Default cadence, in minutes, at which the widget asks for a new timeline.
pub const DEFAULT_REFRESH_MINUTES: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetEntry {
    pub date: DateTime<Utc>,
    pub weather: Weather,
    pub configuration: WidgetConfiguration,
    /// Encoded image bytes, only when the configuration asks for them.
    pub background: Option<Vec<u8>>,
}

impl WidgetEntry {
    /// Location name, with the configured override applied.
    pub fn location_name(&self) -> &str {
        self.configuration
            .custom_location
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.weather.location)
    }

    pub fn temperature(&self) -> String {
        self.weather
            .formatted_temperature_in(self.configuration.temperature_unit)
    }

    /// Local "HH:MM" of the weather's capture time.
    pub fn updated_time(&self) -> String {
        self.weather
            .timestamp
            .with_timezone(&Local)
            .format("%H:%M")
            .to_string()
    }

    pub fn gradient(&self) -> [&'static str; 2] {
        self.weather.condition.gradient()
    }

    /// Text lines shown at the configured size.
    pub fn lines(&self) -> Vec<String> {
        self.lines_for(self.configuration.size)
    }

    pub fn lines_for(&self, size: WidgetSize) -> Vec<String> {
        let mut lines = vec![self.temperature(), self.location_name().to_string()];

        match size {
            WidgetSize::Small => {}
            WidgetSize::Medium => {
                lines.push(self.weather.condition.description().to_string());
                lines.push(format!("Updated: {}", self.updated_time()));
            }
            WidgetSize::Large => {
                lines.push(self.weather.condition.description().to_string());
                // Feels-like reuses the measured temperature.
                lines.push(format!("Feels like {}", self.temperature()));
                lines.push(format!("Updated: {}", self.updated_time()));
            }
        }

        lines
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub entries: Vec<WidgetEntry>,
    /// When to ask again; `None` means never.
    pub next_update: Option<DateTime<Utc>>,
}

pub struct WidgetProvider {
    storage: SharedStorage,
    refresh_interval: Option<Duration>,
}

impl WidgetProvider {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            refresh_interval: Some(Duration::minutes(DEFAULT_REFRESH_MINUTES)),
        }
    }

    /// Zero minutes disables timeline reloads.
    pub fn from_config(storage: SharedStorage, config: &WidgetConfig) -> Self {
        let refresh_interval =
            (config.refresh_minutes > 0).then(|| Duration::minutes(i64::from(config.refresh_minutes)));
        Self {
            storage,
            refresh_interval,
        }
    }

    /// Entry shown while the widget has not loaded yet.
    pub fn placeholder(&self) -> WidgetEntry {
        WidgetEntry {
            date: Utc::now(),
            weather: Weather::sample(),
            configuration: WidgetConfiguration::default(),
            background: None,
        }
    }

    /// Preview entry for the widget gallery: sample weather, saved appearance.
    pub fn snapshot(&self) -> WidgetEntry {
        let configuration = self.storage.load_widget_configuration();
        let background = self.background_for(&configuration);
        WidgetEntry {
            date: Utc::now(),
            weather: Weather::sample(),
            configuration,
            background,
        }
    }

    /// One entry for `now` built from shared storage.
    pub fn timeline(&self, now: DateTime<Utc>) -> Timeline {
        let weather = self.storage.load_weather().unwrap_or_else(|| {
            tracing::debug!("No saved weather, widget shows sample");
            Weather::sample()
        });
        let configuration = self.storage.load_widget_configuration();
        let background = self.background_for(&configuration);

        Timeline {
            entries: vec![WidgetEntry {
                date: now,
                weather,
                configuration,
                background,
            }],
            next_update: self.refresh_interval.map(|interval| now + interval),
        }
    }

    fn background_for(&self, configuration: &WidgetConfiguration) -> Option<Vec<u8>> {
        if configuration.use_custom_background {
            self.storage.load_background_image()
        } else {
            None
        }
    }
}
