use std::{env::var, path::PathBuf, str::FromStr};

use analyst::OpenAiConfig;
use chrono::{Local, NaiveDate};
use stock::{Lookback, PreviousClosePolicy};
use thiserror::Error;

use crate::handler::Settings;

pub const DEFAULT_TRIGGER_PREFIX: &str = "!股票超人";
pub const DEFAULT_MARKET_SUFFIX: &str = ".TW";
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;
pub const MAX_LOOKBACK_DAYS: i64 = 3650;
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub discord_token: String,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub openai_model: String,
    pub openai_temperature: f32,
    pub openai_timeout_secs: u64,
    pub yahoo_api_base: String,
    pub trigger_prefix: String,
    pub market_suffix: String,
    pub lookback: Lookback,
    pub previous_close: PreviousClosePolicy,
    pub chart_dir: PathBuf,
    pub port: u16,
    pub version: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| var(name).ok())
    }

    /// Builds the config from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let discord_token = require("DISCORD_TOKEN")?;
        let openai_api_key = require("OPENAI_API_KEY")?;

        let lookback = match get("LOOKBACK_START") {
            Some(start) => {
                let start = parse_date("LOOKBACK_START", start)?;
                let end = match get("LOOKBACK_END") {
                    Some(end) => parse_date("LOOKBACK_END", end)?,
                    None => Local::now().date_naive(),
                };
                if start > end {
                    return Err(ConfigError::Invalid {
                        name: "LOOKBACK_START",
                        value: start.to_string(),
                    });
                }
                Lookback::Between { start, end }
            }
            None => {
                let days: i64 =
                    parse_or("LOOKBACK_DAYS", get("LOOKBACK_DAYS"), DEFAULT_LOOKBACK_DAYS)?;
                if !(1..=MAX_LOOKBACK_DAYS).contains(&days) {
                    return Err(ConfigError::Invalid {
                        name: "LOOKBACK_DAYS",
                        value: days.to_string(),
                    });
                }
                Lookback::days(days)
            }
        };

        Ok(Self {
            discord_token,
            openai_api_key,
            openai_api_base: get("OPENAI_API_BASE")
                .unwrap_or_else(|| analyst::DEFAULT_API_BASE.to_string()),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| analyst::DEFAULT_MODEL.to_string()),
            openai_temperature: parse_or(
                "OPENAI_TEMPERATURE",
                get("OPENAI_TEMPERATURE"),
                analyst::DEFAULT_TEMPERATURE,
            )?,
            openai_timeout_secs: parse_or(
                "OPENAI_TIMEOUT_SECS",
                get("OPENAI_TIMEOUT_SECS"),
                analyst::DEFAULT_TIMEOUT_SECS,
            )?,
            yahoo_api_base: get("YAHOO_API_BASE")
                .unwrap_or_else(|| stock::DEFAULT_BASE_API.to_string()),
            trigger_prefix: get("TRIGGER_PREFIX")
                .unwrap_or_else(|| DEFAULT_TRIGGER_PREFIX.to_string()),
            market_suffix: get("MARKET_SUFFIX")
                .unwrap_or_else(|| DEFAULT_MARKET_SUFFIX.to_string()),
            lookback,
            previous_close: parse_or(
                "PREVIOUS_CLOSE",
                get("PREVIOUS_CLOSE"),
                PreviousClosePolicy::default(),
            )?,
            chart_dir: get("CHART_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            version: get("APP_VERSION").unwrap_or_else(|| "Unknown".to_string()),
        })
    }

    pub fn handler_settings(&self) -> Settings {
        Settings {
            trigger_prefix: self.trigger_prefix.clone(),
            market_suffix: self.market_suffix.clone(),
            lookback: self.lookback,
            previous_close: self.previous_close,
            chart_dir: self.chart_dir.clone(),
        }
    }

    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig::new(self.openai_api_key.clone())
            .with_api_base(self.openai_api_base.clone())
            .with_model(self.openai_model.clone())
            .with_temperature(self.openai_temperature)
            .with_timeout(self.openai_timeout_secs)
    }
}

fn parse_or<T: FromStr>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { name, value: v }),
        None => Ok(default),
    }
}

fn parse_date(name: &'static str, value: String) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| ConfigError::Invalid { name, value })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| env.get(name).cloned())
    }

    const CREDENTIALS: [(&str, &str); 2] = [("DISCORD_TOKEN", "discord"), ("OPENAI_API_KEY", "sk-test")];

    #[test]
    fn defaults_apply() {
        let config = load(&CREDENTIALS).unwrap();

        assert_eq!(config.trigger_prefix, DEFAULT_TRIGGER_PREFIX);
        assert_eq!(config.market_suffix, ".TW");
        assert_eq!(config.lookback, Lookback::days(30));
        assert_eq!(config.previous_close, PreviousClosePolicy::PriorBar);
        assert_eq!(config.port, 8080);
        assert_eq!(config.openai_model, "gpt-3.5-turbo");
    }

    #[test]
    fn missing_discord_token_is_fatal() {
        let err = load(&[("OPENAI_API_KEY", "sk-test")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DISCORD_TOKEN"));
    }

    #[test]
    fn blank_openai_key_is_missing() {
        let err = load(&[("DISCORD_TOKEN", "discord"), ("OPENAI_API_KEY", "   ")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("OPENAI_API_KEY"));
    }

    #[test]
    fn port_override() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("PORT", "3000"));
        assert_eq!(load(&pairs).unwrap().port, 3000);

        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("PORT", "http"));
        assert!(matches!(
            load(&pairs),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
    }

    #[test]
    fn explicit_window() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("LOOKBACK_START", "2024-01-02"));
        pairs.push(("LOOKBACK_END", "2024-03-29"));

        let config = load(&pairs).unwrap();
        assert_eq!(
            config.lookback,
            Lookback::Between {
                start: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 3, 29).unwrap(),
            }
        );
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("LOOKBACK_START", "2024-03-29"));
        pairs.push(("LOOKBACK_END", "2024-01-02"));
        assert!(load(&pairs).is_err());
    }

    #[test]
    fn lookback_days_must_be_in_range() {
        for days in ["0", "-5", "3651", "100000000", "200000000000"] {
            let mut pairs = CREDENTIALS.to_vec();
            pairs.push(("LOOKBACK_DAYS", days));
            assert_eq!(
                load(&pairs).unwrap_err(),
                ConfigError::Invalid {
                    name: "LOOKBACK_DAYS",
                    value: days.to_string(),
                }
            );
        }

        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("LOOKBACK_DAYS", "3650"));
        assert_eq!(load(&pairs).unwrap().lookback, Lookback::days(3650));
    }

    #[test]
    fn alternate_prefix_and_policy() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("TRIGGER_PREFIX", "股票超人 "));
        pairs.push(("PREVIOUS_CLOSE", "provider"));

        let config = load(&pairs).unwrap();
        assert_eq!(config.trigger_prefix, "股票超人");
        assert_eq!(config.previous_close, PreviousClosePolicy::ProviderReference);
        assert_eq!(config.handler_settings().trigger_prefix, "股票超人");
    }

    #[test]
    fn openai_config_carries_overrides() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("OPENAI_MODEL", "gpt-4o-mini"));
        pairs.push(("OPENAI_TEMPERATURE", "0.2"));

        let openai = load(&pairs).unwrap().openai_config();
        assert_eq!(openai.api_key, "sk-test");
        assert_eq!(openai.model, "gpt-4o-mini");
        assert!((openai.temperature - 0.2).abs() < f32::EPSILON);
    }
}
