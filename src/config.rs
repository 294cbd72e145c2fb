use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("policy value `{field}` must be a finite number")]
    NonFinite { field: &'static str },
    #[error("forecast floor {floor} is above forecast ceiling {ceiling}")]
    InvertedForecastBounds { floor: f64, ceiling: f64 },
}

/// Thresholds for the at-risk heuristic. Defaults: average below 60, or a
/// slope steeper than -0.5 per term with the latest grade below 70.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskPolicy {
    pub low_average_below: f64,
    pub decline_slope_below: f64,
    pub decline_latest_below: f64,
    pub forecast_floor: f64,
    pub forecast_ceiling: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            low_average_below: 60.0,
            decline_slope_below: -0.5,
            decline_latest_below: 70.0,
            forecast_floor: 0.0,
            forecast_ceiling: 100.0,
        }
    }
}

impl RiskPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("low_average_below", self.low_average_below),
            ("decline_slope_below", self.decline_slope_below),
            ("decline_latest_below", self.decline_latest_below),
            ("forecast_floor", self.forecast_floor),
            ("forecast_ceiling", self.forecast_ceiling),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field });
            }
        }
        if self.forecast_floor > self.forecast_ceiling {
            return Err(ConfigError::InvertedForecastBounds {
                floor: self.forecast_floor,
                ceiling: self.forecast_ceiling,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub policy: RiskPolicy,
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(raw).context("invalid config file")?;
        config.policy.validate()?;
        Ok(config)
    }

    /// Reads the optional TOML file, then applies `DATABASE_URL` on top.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                let config = Self::from_toml_str(&raw)
                    .with_context(|| format!("failed to load config {}", path.display()))?;
                tracing::debug!(path = %path.display(), "loaded config file");
                config
            }
            None => Self::default(),
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                config.database_url = Some(url);
            }
        }

        Ok(config)
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set (or database_url in the config file) for Postgres commands")
    }
}
