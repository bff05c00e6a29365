use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Temperatures strictly above this are extreme heat.
pub const EXTREME_HOT_CELSIUS: f64 = 33.0;

/// Temperatures strictly below this are extreme cold.
pub const EXTREME_COLD_CELSIUS: f64 = -5.0;

/// Temperature unit preference for widget display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }

    /// Convert a Celsius reading into this unit.
    pub fn from_celsius(&self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

/// Weather condition categories mapped from the provider's `main` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Sunny,
    Cloudy,
    #[default]
    PartlyCloudy,
    Raining,
    Snow,
}

impl Condition {
    /// Map a provider condition string, case-insensitively.
    ///
    /// Total: anything unrecognized (including the empty string) is `PartlyCloudy`.
    pub fn from_provider(main: &str) -> Self {
        match main.to_lowercase().as_str() {
            "clear" => Self::Sunny,
            "clouds" => Self::Cloudy,
            "rain" | "drizzle" => Self::Raining,
            "snow" => Self::Snow,
            _ => Self::PartlyCloudy,
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Sunny => "Sunny",
            Self::Cloudy => "Cloudy",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Raining => "Raining",
            Self::Snow => "Snow",
        }
    }

    /// Symbol name used by the widget renderer
    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::Sunny => "sun.max.fill",
            Self::Cloudy => "cloud.fill",
            Self::PartlyCloudy => "cloud.sun.fill",
            Self::Raining => "cloud.rain.fill",
            Self::Snow => "snow",
        }
    }

    /// Two-stop background gradient used when no custom image is set
    pub fn gradient(&self) -> [&'static str; 2] {
        match self {
            Self::Sunny => ["orange", "yellow"],
            Self::Cloudy => ["gray", "blue"],
            Self::PartlyCloudy => ["orange", "gray"],
            Self::Raining => ["blue", "gray"],
            Self::Snow => ["white", "blue"],
        }
    }
}

/// Current weather at one place. Replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    /// Temperature in Celsius
    pub temperature: f64,
    pub condition: Condition,
    /// Display name of the location
    pub location: String,
    /// Capture time, not provider time
    pub timestamp: DateTime<Utc>,
}

impl Weather {
    pub fn new(
        temperature: f64,
        condition: Condition,
        location: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            temperature,
            condition,
            location: location.into(),
            timestamp,
        }
    }

    /// Fixed record used by the demo path and the widget placeholder.
    pub fn sample() -> Self {
        Self::new(22.5, Condition::Sunny, "Tokyo", Utc::now())
    }

    /// Rounded to the nearest degree, halves away from zero (25.5 -> "26°C").
    pub fn formatted_temperature(&self) -> String {
        self.formatted_temperature_in(TemperatureUnit::Celsius)
    }

    pub fn formatted_temperature_in(&self, unit: TemperatureUnit) -> String {
        let value = unit.from_celsius(self.temperature).round() as i64;
        format!("{}{}", value, unit.symbol())
    }

    /// Hot above 33°C or cold below -5°C, both bounds exclusive.
    pub fn is_extreme(&self) -> bool {
        self.temperature > EXTREME_HOT_CELSIUS || self.temperature < EXTREME_COLD_CELSIUS
    }
}

/// Geographic coordinates in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both values finite and inside the standard degree ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Widget size option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WidgetSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl WidgetSize {
    pub const ALL: [WidgetSize; 3] = [WidgetSize::Small, WidgetSize::Medium, WidgetSize::Large];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Small => "Small",
            Self::Medium => "Medium",
            Self::Large => "Large",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Small => "Compact view",
            Self::Medium => "Weather details",
            Self::Large => "Full forecast",
        }
    }
}

impl std::str::FromStr for WidgetSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            other => Err(format!("unknown widget size: {}", other)),
        }
    }
}

impl std::str::FromStr for TemperatureUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "celsius" | "c" => Ok(Self::Celsius),
            "fahrenheit" | "f" => Ok(Self::Fahrenheit),
            other => Err(format!("unknown temperature unit: {}", other)),
        }
    }
}

/// User-chosen widget appearance, persisted as one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetConfiguration {
    pub size: WidgetSize,
    pub use_custom_background: bool,
    /// Location name override (`None` for current location)
    pub custom_location: Option<String>,
    pub temperature_unit: TemperatureUnit,
}

/// Raw OS authorization status as reported by the permission subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedWhenInUse,
    AuthorizedAlways,
}

impl AuthorizationStatus {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::AuthorizedWhenInUse | Self::AuthorizedAlways)
    }

    pub fn permission_state(&self) -> PermissionState {
        match self {
            Self::AuthorizedWhenInUse | Self::AuthorizedAlways => PermissionState::Granted,
            Self::Denied | Self::Restricted => PermissionState::Denied,
            Self::NotDetermined => PermissionState::NotDetermined,
        }
    }
}

/// Location permission as seen by the app. Owned by the OS, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    NotDetermined,
    Granted,
    Denied,
}
