//! Centralized error types for GoatJp.
//!
//! Three independent families never combine into one another:
//! - location acquisition (`LocationError`)
//! - weather fetching (`WeatherError`)
//! - shared storage (`StorageError`), which the typed storage layer swallows
//!
//! `AppError` is what a refresh returns. Configuration has its own
//! `ConfigError`, surfaced only while loading settings.

use thiserror::Error;

/// Outcome of a failed refresh.
///
/// Use `user_message()` to get a UI-appropriate message. Cloneable so that
/// callers joining an in-flight refresh receive the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl AppError {
    /// Returns a user-friendly message suitable for display in the UI.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Location(e) => e.user_message().to_string(),
            AppError::Weather(e) => e.user_message(),
            AppError::Cancelled => "The request was cancelled.".to_string(),
        }
    }

    /// Whether the user must change a system setting before retrying.
    pub fn needs_settings_change(&self) -> bool {
        matches!(self, AppError::Location(e) if e.is_user_actionable())
    }

    /// Whether an unchanged retry later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Location(e) => !e.is_user_actionable(),
            AppError::Weather(e) => e.is_transient(),
            AppError::Cancelled => true,
        }
    }
}

/// Location acquisition errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
    /// Permission denied, restricted, or never granted within the poll window.
    #[error("Location permission denied")]
    PermissionDenied,

    /// The positioning subsystem failed to produce a fix.
    #[error("Location unavailable")]
    LocationUnavailable,

    /// The positioning subsystem did not answer within the fix timeout.
    #[error("Location request timed out")]
    Timeout,
}

impl LocationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationError::PermissionDenied => {
                "Location permission was denied. Please enable it in Settings."
            }
            LocationError::LocationUnavailable => "Unable to determine your location at this time.",
            LocationError::Timeout => "Location request timed out.",
        }
    }

    /// Whether the user has to change a system setting to recover.
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, LocationError::PermissionDenied)
    }
}

/// Weather provider errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeatherError {
    #[error("Weather API key is missing")]
    ApiKeyMissing,

    /// Any non-200 status. Status code and body are intentionally dropped.
    #[error("Invalid response from weather service")]
    InvalidResponse,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode weather data: {0}")]
    Decoding(String),
}

impl WeatherError {
    pub fn user_message(&self) -> String {
        match self {
            WeatherError::ApiKeyMissing => "Weather API key is not configured".to_string(),
            WeatherError::InvalidResponse => "Invalid response from weather service".to_string(),
            WeatherError::Network(detail) => format!("Network error: {}", detail),
            WeatherError::Decoding(detail) => format!("Failed to decode weather data: {}", detail),
        }
    }

    /// Whether retrying later could succeed without any configuration change.
    pub fn is_transient(&self) -> bool {
        matches!(self, WeatherError::Network(_))
    }
}

/// Shared key-value storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open shared storage: {0}")]
    Open(String),

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn user_message(&self) -> &'static str {
        match self {
            StorageError::Open(_) => "Unable to access shared data. Try restarting the app.",
            StorageError::Read(_) | StorageError::Serialization(_) => {
                "Saved widget data could not be read."
            }
            StorageError::Write(_) => "Widget data could not be saved.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Configuration file error: {0}")]
    Io(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration directory not found.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::Io(_) => "The configuration file could not be read or written.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_weather_error(self) -> WeatherError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_weather_error(self) -> WeatherError {
        if self.is_decode() {
            WeatherError::Decoding(self.to_string())
        } else {
            // Timeouts, refused connections and DNS failures all keep their detail.
            WeatherError::Network(self.to_string())
        }
    }
}
