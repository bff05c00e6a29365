pub mod config;
pub mod error;

pub use config::{
    Config, LocationConfig, StorageConfig, ValidationResult, WeatherConfig, WidgetConfig,
};
pub use error::{
    AppError, ConfigError, LocationError, ReqwestErrorExt, StorageError, WeatherError,
};

use anyhow::Result;

/// Initialize logging for a GoatJp process (app or widget host)
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("GoatJp core initialized");
    Ok(())
}
