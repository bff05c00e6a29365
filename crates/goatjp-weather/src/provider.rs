//! Current-weather client for the OpenWeatherMap REST endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use goatjp_core::{ReqwestErrorExt, WeatherConfig, WeatherError};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::instrument;

use crate::types::{Condition, Coordinates, Weather};

pub use goatjp_core::config::DEFAULT_WEATHER_URL;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Anything that can turn coordinates into a `Weather` record.
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    /// False when no API key is configured; fetches are then disabled.
    fn has_api_key(&self) -> bool;

    async fn fetch_weather(&self, coordinates: Coordinates) -> Result<Weather, WeatherError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    weather: Vec<ApiCondition>,
    main: ApiMain,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    main: String,
}

#[derive(Debug, Deserialize)]
struct ApiMain {
    temp: f64,
}

impl ApiResponse {
    fn into_weather(self) -> Weather {
        // An empty condition list maps to the default condition rather than failing.
        let condition = self
            .weather
            .first()
            .map(|c| Condition::from_provider(&c.main))
            .unwrap_or_default();

        Weather::new(self.main.temp, condition, self.name, Utc::now())
    }
}

#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: Arc<Client>,
    api_key: String,
    base_url: String,
}

impl WeatherClient {
    pub fn new(api_key: &str) -> Result<Self, WeatherError> {
        Self::with_base_url(
            api_key,
            DEFAULT_WEATHER_URL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_base_url(
        api_key: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ReqwestErrorExt::into_weather_error)?;

        Ok(Self {
            client: Arc::new(client),
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
        })
    }

    pub fn from_config(config: &WeatherConfig) -> Result<Self, WeatherError> {
        Self::with_base_url(
            config.effective_api_key(),
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Fetch current weather at `lat`/`lon`. One request, no retry.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch(&self, lat: f64, lon: f64) -> Result<Weather, WeatherError> {
        if self.api_key.is_empty() {
            return Err(WeatherError::ApiKeyMissing);
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await
            .map_err(ReqwestErrorExt::into_weather_error)?;

        if response.status() != StatusCode::OK {
            tracing::debug!("Weather API returned status {}", response.status());
            return Err(WeatherError::InvalidResponse);
        }

        let body = response
            .bytes()
            .await
            .map_err(ReqwestErrorExt::into_weather_error)?;

        let parsed: ApiResponse = serde_json::from_slice(&body)
            .map_err(|e| WeatherError::Decoding(e.to_string()))?;

        let weather = parsed.into_weather();
        tracing::info!(
            "Fetched weather for {}: {} ({})",
            weather.location,
            weather.formatted_temperature(),
            weather.condition.description()
        );
        Ok(weather)
    }
}

#[async_trait]
impl WeatherFetcher for WeatherClient {
    fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn fetch_weather(&self, coordinates: Coordinates) -> Result<Weather, WeatherError> {
        self.fetch(coordinates.latitude, coordinates.longitude).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_takes_first_condition() {
        let parsed: ApiResponse = serde_json::from_str(
            r#"{
                "weather": [
                    {"main": "Rain", "description": "light rain"},
                    {"main": "Clear", "description": "clear sky"}
                ],
                "main": {"temp": 12.25, "feels_like": 10.0},
                "name": "Sapporo"
            }"#,
        )
        .unwrap();

        let weather = parsed.into_weather();
        assert_eq!(weather.condition, Condition::Raining);
        assert_eq!(weather.temperature, 12.25);
        assert_eq!(weather.location, "Sapporo");
    }

    #[test]
    fn test_decode_empty_conditions_defaults_to_partly_cloudy() {
        let parsed: ApiResponse =
            serde_json::from_str(r#"{"weather": [], "main": {"temp": 3.0}, "name": "Oslo"}"#)
                .unwrap();

        assert_eq!(parsed.into_weather().condition, Condition::PartlyCloudy);
    }

    #[test]
    fn test_decode_rejects_missing_temperature() {
        let parsed = serde_json::from_str::<ApiResponse>(
            r#"{"weather": [{"main": "Clear"}], "main": {}, "name": "Oslo"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_from_config_uses_env_key() {
        let mut config = WeatherConfig::default();
        assert!(!WeatherClient::from_config(&config).unwrap().has_api_key());

        config.env_api_key = Some("env-key".to_string());
        assert!(WeatherClient::from_config(&config).unwrap().has_api_key());
    }

    #[tokio::test]
    async fn test_empty_api_key_fails_without_request() {
        // Unroutable base URL: reaching the network would surface as Network.
        let client =
            WeatherClient::with_base_url("", "http://192.0.2.1/weather", Duration::from_secs(1))
                .unwrap();

        assert!(!client.has_api_key());
        assert_eq!(
            client.fetch(35.0, 139.0).await.unwrap_err(),
            WeatherError::ApiKeyMissing
        );
    }
}
