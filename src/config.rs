use std::time::Duration;

use crate::error::ConfigurationError;

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const MAX_TOKENS_LIMIT: u32 = 4000;
pub const TEMPERATURE_BOUNDS: (f64, f64) = (0.0, 2.0);
pub const TOP_P_BOUNDS: (f64, f64) = (0.0, 1.0);

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const MODEL_ENV: &str = "OPENAI_MODEL";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const REQUEST_TIMEOUT_ENV: &str = "LLM_LAB_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub temperature_range: Vec<f64>,
    pub top_p_range: Vec<f64>,
    pub max_tokens: u32,
    pub batch_size: usize,
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_range("temperature_range", &self.temperature_range, TEMPERATURE_BOUNDS)?;
        check_range("top_p_range", &self.top_p_range, TOP_P_BOUNDS)?;

        if self.max_tokens == 0 || self.max_tokens > MAX_TOKENS_LIMIT {
            return Err(ConfigurationError::MaxTokens(self.max_tokens));
        }
        if self.batch_size == 0 {
            return Err(ConfigurationError::BatchSize);
        }

        Ok(())
    }
}

pub(crate) fn check_range(
    name: &'static str,
    values: &[f64],
    (min, max): (f64, f64),
) -> Result<(), ConfigurationError> {
    if values.is_empty() {
        return Err(ConfigurationError::EmptyRange(name));
    }

    for value in values {
        if !value.is_finite() || *value < min || *value > max {
            return Err(ConfigurationError::OutOfBounds {
                name,
                value: *value,
                min,
                max,
            });
        }
    }

    Ok(())
}

/// Backend settings for the OpenAI-compatible generation client.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl GenerationSettings {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key =
            non_empty(API_KEY_ENV).ok_or(ConfigurationError::MissingCredential(API_KEY_ENV))?;
        let model = non_empty(MODEL_ENV).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = non_empty(BASE_URL_ENV)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let request_timeout = match non_empty(REQUEST_TIMEOUT_ENV) {
            Some(raw) => {
                let seconds = raw.parse::<u64>().map_err(|err| ConfigurationError::InvalidSetting {
                    name: REQUEST_TIMEOUT_ENV,
                    reason: err.to_string(),
                })?;
                Duration::from_secs(seconds.max(1))
            }
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        Ok(Self {
            api_key,
            model,
            base_url,
            request_timeout,
        })
    }

    pub fn with_model(mut self, model: Option<&str>) -> Self {
        if let Some(model) = model.map(str::trim).filter(|value| !value.is_empty()) {
            self.model = model.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config() -> SweepConfig {
        SweepConfig {
            temperature_range: vec![0.2, 0.7],
            top_p_range: vec![0.9, 1.0],
            max_tokens: DEFAULT_MAX_TOKENS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert_eq!(config().validate(), Ok(()));
    }

    #[test]
    fn empty_ranges_are_rejected() {
        let mut cfg = config();
        cfg.top_p_range.clear();
        assert_eq!(
            cfg.validate(),
            Err(ConfigurationError::EmptyRange("top_p_range"))
        );
    }

    #[test]
    fn out_of_bounds_and_non_finite_values_are_rejected() {
        let mut cfg = config();
        cfg.temperature_range.push(2.5);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigurationError::OutOfBounds { name: "temperature_range", .. })
        ));

        let mut cfg = config();
        cfg.top_p_range.push(f64::NAN);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigurationError::OutOfBounds { name: "top_p_range", .. })
        ));
    }

    #[test]
    fn max_tokens_and_batch_size_bounds() {
        let mut cfg = config();
        cfg.max_tokens = 0;
        assert_eq!(cfg.validate(), Err(ConfigurationError::MaxTokens(0)));
        cfg.max_tokens = 4001;
        assert_eq!(cfg.validate(), Err(ConfigurationError::MaxTokens(4001)));
        cfg.max_tokens = 4000;
        cfg.batch_size = 0;
        assert_eq!(cfg.validate(), Err(ConfigurationError::BatchSize));
    }

    #[test]
    fn settings_require_api_key() {
        let env = HashMap::<&str, &str>::new();
        let err = GenerationSettings::from_lookup(|key| env.get(key).map(|v| v.to_string()))
            .expect_err("missing key should be rejected");
        assert_eq!(err, ConfigurationError::MissingCredential(API_KEY_ENV));

        let env = HashMap::from([(API_KEY_ENV, "   ")]);
        let result = GenerationSettings::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn settings_apply_defaults_and_overrides() {
        let env = HashMap::from([(API_KEY_ENV, "sk-test")]);
        let settings = GenerationSettings::from_lookup(|key| env.get(key).map(|v| v.to_string()))
            .expect("settings should load");
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.request_timeout, Duration::from_secs(60));

        let env = HashMap::from([
            (API_KEY_ENV, "sk-test"),
            (MODEL_ENV, "gpt-4o-mini"),
            (BASE_URL_ENV, "http://localhost:8000/v1/"),
            (REQUEST_TIMEOUT_ENV, "15"),
        ]);
        let settings = GenerationSettings::from_lookup(|key| env.get(key).map(|v| v.to_string()))
            .expect("settings should load")
            .with_model(Some("local-model"));
        assert_eq!(settings.model, "local-model");
        assert_eq!(settings.base_url, "http://localhost:8000/v1");
        assert_eq!(settings.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn invalid_timeout_is_reported() {
        let env = HashMap::from([(API_KEY_ENV, "sk-test"), (REQUEST_TIMEOUT_ENV, "soon")]);
        let err = GenerationSettings::from_lookup(|key| env.get(key).map(|v| v.to_string()))
            .expect_err("timeout should be rejected");
        assert!(matches!(err, ConfigurationError::InvalidSetting { .. }));
    }
}
