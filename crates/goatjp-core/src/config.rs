use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

type Result<T> = std::result::Result<T, ConfigError>;

/// Default current-weather endpoint (OpenWeatherMap).
pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Default shared namespace used by the app and the widget.
pub const DEFAULT_GROUP_ID: &str = "group.com.goatjp.shared";

/// Environment variable consulted for the API key when the file has none.
pub const API_KEY_ENV: &str = "GOATJP_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Weather provider settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Location acquisition settings
    #[serde(default)]
    pub location: LocationConfig,

    /// Shared storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Widget settings
    #[serde(default)]
    pub widget: WidgetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Static API key from the file. Never written when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    /// Key read from `GOATJP_API_KEY` at load time; never saved.
    #[serde(skip)]
    pub env_api_key: Option<String>,

    /// Current-weather endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_WEATHER_URL.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl WeatherConfig {
    /// The file's key, or the environment's when the file has none.
    /// Empty disables every weather fetch.
    pub fn effective_api_key(&self) -> &str {
        match self.api_key.trim() {
            "" => self.env_api_key.as_deref().map(str::trim).unwrap_or_default(),
            key => key,
        }
    }

    /// Whether weather fetches are enabled at all.
    pub fn has_api_key(&self) -> bool {
        !self.effective_api_key().is_empty()
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            env_api_key: None,
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Fixed latitude for hosts without a positioning subsystem
    #[serde(default)]
    pub latitude: Option<f64>,

    /// Fixed longitude for hosts without a positioning subsystem
    #[serde(default)]
    pub longitude: Option<f64>,

    /// Upper bound on a single location fix, in seconds
    #[serde(default = "default_fix_timeout")]
    pub fix_timeout_secs: u64,

    /// How many times permission is re-checked after prompting
    #[serde(default = "default_poll_attempts")]
    pub permission_poll_attempts: u32,

    /// Pause between permission checks, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub permission_poll_interval_ms: u64,
}

fn default_fix_timeout() -> u64 {
    10
}

fn default_poll_attempts() -> u32 {
    5
}

fn default_poll_interval() -> u64 {
    200
}

impl LocationConfig {
    /// Both coordinates, when configured.
    pub fn fixed_coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            fix_timeout_secs: default_fix_timeout(),
            permission_poll_attempts: default_poll_attempts(),
            permission_poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Namespace shared by the app and the widget
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Database path; defaults to `<config_dir>/shared/<group_id>.sqlite3`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_group_id() -> String {
    DEFAULT_GROUP_ID.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    /// Widget timeline refresh cadence in minutes
    #[serde(default = "default_widget_refresh")]
    pub refresh_minutes: u32,
}

fn default_widget_refresh() -> u32 {
    1
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            refresh_minutes: default_widget_refresh(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("goatjp");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            location: LocationConfig::default(),
            storage: StorageConfig::default(),
            widget: WidgetConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_from_with_env(path, |name| std::env::var(name).ok())
    }

    /// Like `load_from`, reading environment variables through `env`.
    pub fn load_from_with_env(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
                _ => ConfigError::Io(format!("{}: {}", path.display(), e)),
            })?;
            toml::from_str::<Config>(&contents)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        config.weather.env_api_key = env(API_KEY_ENV).filter(|key| !key.trim().is_empty());
        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        Self::load_validated_from(&Self::config_path()?)
    }

    /// `load_validated` against an explicit path.
    pub fn load_validated_from(path: &Path) -> Result<(Self, ValidationResult)> {
        let config = Self::load_from(path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !self.weather.has_api_key() {
            result.add_warning(
                "weather.api_key",
                format!(
                    "No API key configured (set it here or via {}); weather fetches are disabled",
                    API_KEY_ENV
                ),
            );
        }

        self.validate_url(&self.weather.base_url, "weather.base_url", &mut result);

        if self.weather.request_timeout_secs == 0 {
            result.add_error(
                "weather.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        match (self.location.latitude, self.location.longitude) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    result.add_error("location.latitude", "Latitude must be within -90..=90");
                }
                if !(-180.0..=180.0).contains(&lon) {
                    result.add_error("location.longitude", "Longitude must be within -180..=180");
                }
            }
            (None, None) => {}
            _ => result.add_error(
                "location",
                "Latitude and longitude must be configured together",
            ),
        }

        if self.location.fix_timeout_secs == 0 {
            result.add_error(
                "location.fix_timeout_secs",
                "Fix timeout must be greater than 0",
            );
        }

        if self.location.permission_poll_attempts == 0 {
            result.add_warning(
                "location.permission_poll_attempts",
                "Permission is never re-checked after prompting",
            );
        }

        if self.storage.group_id.trim().is_empty() {
            result.add_error("storage.group_id", "Shared group identifier must not be empty");
        }

        if self.widget.refresh_minutes == 0 {
            result.add_warning("widget.refresh_minutes", "Widget refresh disabled (0 minutes)");
        } else if self.widget.refresh_minutes > 1440 {
            result.add_warning(
                "widget.refresh_minutes",
                "Widget refresh interval is more than 24 hours",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Path of the shared database both processes open.
    pub fn shared_store_path(&self) -> PathBuf {
        self.storage.path.clone().unwrap_or_else(|| {
            self.config_dir
                .join("shared")
                .join(format!("{}.sqlite3", self.storage.group_id))
        })
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Io(format!("Failed to create config directory: {}", e))
            })?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Io(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("platform config directory".to_string()))?
            .join("goatjp");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        let mut config = Config::default();
        config.weather.api_key = "test_key".to_string();
        config
    }

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_missing_api_key_is_warning() {
        let mut config = Config::default();
        config.weather.api_key = String::new();
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "weather.api_key"));
        assert!(!config.weather.has_api_key());
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = configured();
        config.weather.base_url = "ftp://api.example.com/weather".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_request_timeout() {
        let mut config = configured();
        config.weather.request_timeout_secs = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.request_timeout_secs"));
    }

    #[test]
    fn test_coordinate_ranges() {
        let mut config = configured();
        config.location.latitude = Some(91.0);
        config.location.longitude = Some(139.65);
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "location.latitude"));

        config.location.latitude = Some(35.68);
        config.location.longitude = None;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "location"));
    }

    #[test]
    fn test_shared_store_path_defaults_under_config_dir() {
        let mut config = Config::default();
        config.config_dir = PathBuf::from("/tmp/goatjp-test");
        assert_eq!(
            config.shared_store_path(),
            PathBuf::from("/tmp/goatjp-test/shared/group.com.goatjp.shared.sqlite3")
        );

        config.storage.path = Some(PathBuf::from("/var/lib/goatjp/shared.db"));
        assert_eq!(config.shared_store_path(), PathBuf::from("/var/lib/goatjp/shared.db"));
    }

    #[test]
    fn test_load_creates_defaults_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.location.permission_poll_attempts, 5);

        let mut edited = created.clone();
        edited.weather.api_key = "abc".to_string();
        edited.location.latitude = Some(35.6762);
        edited.location.longitude = Some(139.6503);
        edited.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.weather.api_key, "abc");
        assert_eq!(reloaded.location.fixed_coordinates(), Some((35.6762, 139.6503)));
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "config_dir = \"/tmp/goatjp\"\n\n[weather]\napi_key = \"k\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.weather.api_key, "k");
        assert_eq!(config.weather.base_url, DEFAULT_WEATHER_URL);
        assert_eq!(config.weather.request_timeout_secs, 10);
        assert_eq!(config.location.permission_poll_interval_ms, 200);
        assert_eq!(config.widget.refresh_minutes, 1);
        assert_eq!(config.storage.group_id, DEFAULT_GROUP_ID);
    }

    #[test]
    fn test_env_key_applies_after_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let first = Config::load_from_with_env(&path, |_| None).unwrap();
        assert!(!first.weather.has_api_key());

        let second = Config::load_from_with_env(&path, |name| {
            (name == API_KEY_ENV).then(|| "from-env".to_string())
        })
        .unwrap();
        assert_eq!(second.weather.effective_api_key(), "from-env");
        assert!(second.weather.has_api_key());
    }

    #[test]
    fn test_env_key_is_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config =
            Config::load_from_with_env(&path, |_| Some("secret-from-env".to_string())).unwrap();
        config.save_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("secret-from-env"));
        assert!(!contents.contains("api_key"));
    }

    #[test]
    fn test_file_key_wins_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "config_dir = \"/tmp/goatjp\"\n\n[weather]\napi_key = \"file\"\n")
            .unwrap();

        let config = Config::load_from_with_env(&path, |_| Some("env".to_string())).unwrap();
        assert_eq!(config.weather.effective_api_key(), "file");
    }

    #[test]
    fn test_process_env_is_read_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::load_from(&path).unwrap();

        std::env::set_var(API_KEY_ENV, "process-env-key");
        let reloaded = Config::load_from(&path);
        std::env::remove_var(API_KEY_ENV);

        assert_eq!(reloaded.unwrap().weather.effective_api_key(), "process-env-key");
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "config_dir = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_invalid_file_fails_validated_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "config_dir = \"/tmp/goatjp\"\n\n[weather]\nrequest_timeout_secs = 0\n",
        )
        .unwrap();

        let err = Config::load_validated_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("request_timeout_secs")));
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
