use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::signal::Action;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub target: TargetSettings,
    pub signal: SignalSettings,
    pub scenario: ScenarioSettings,
    pub thresholds: ThresholdSettings,
}

#[derive(Debug, Deserialize)]
pub struct TargetSettings {
    pub url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalSettings {
    pub ticker: String,
    #[serde(deserialize_with = "from_str")]
    pub action: Action,
    #[serde(deserialize_with = "from_str")]
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioSettings {
    pub name: String,
    pub rate: u32,
    pub time_unit_ms: u64,
    pub duration_secs: u64,
    pub pre_allocated_vus: usize,
    pub max_vus: usize,
    pub graceful_stop_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdSettings {
    #[serde(deserialize_with = "vec_from_str")]
    pub http_reqs: Vec<String>,
    #[serde(deserialize_with = "vec_from_str")]
    pub http_req_failed: Vec<String>,
    #[serde(deserialize_with = "vec_from_str")]
    pub http_req_duration: Vec<String>,
    #[serde(deserialize_with = "vec_from_str")]
    pub checks: Vec<String>,
    #[serde(deserialize_with = "vec_from_str")]
    pub dropped_iterations: Vec<String>,
}

pub fn vec_from_str<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(From::from)
        .collect())
}

pub fn from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let s = String::deserialize(deserializer)?;
    s.trim().parse().map_err(de::Error::custom)
}

impl ScenarioSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn graceful_stop(&self) -> Duration {
        Duration::from_secs(self.graceful_stop_secs)
    }

    /// Gap between two iteration starts.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.time_unit_ms) / self.rate
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rate == 0 || self.time_unit_ms == 0 {
            return Err(ConfigError::Message(
                "scenario rate and time unit must be positive".into(),
            ));
        }
        // tokio's interval panics on a zero period.
        if self.interval().is_zero() {
            return Err(ConfigError::Message(format!(
                "rate {} per {}ms leaves less than 1ns between iterations",
                self.rate, self.time_unit_ms
            )));
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::Message(
                "scenario duration must be positive".into(),
            ));
        }
        if self.max_vus == 0 {
            return Err(ConfigError::Message("max_vus must be positive".into()));
        }
        if self.pre_allocated_vus > self.max_vus {
            return Err(ConfigError::Message(format!(
                "pre_allocated_vus ({}) exceeds max_vus ({})",
                self.pre_allocated_vus, self.max_vus
            )));
        }
        Ok(())
    }
}

impl TargetSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let mut s = defaults()?;
        s.merge(File::with_name("loadtest").required(false))?;
        s.merge(Environment::new().separator("__"))?;
        Self::from_config(s)
    }

    pub fn from_config(s: Config) -> Result<Self, ConfigError> {
        let settings: Self = s.try_into()?;
        settings.scenario.validate()?;
        Ok(settings)
    }
}

pub fn defaults() -> Result<Config, ConfigError> {
    let mut s = Config::new();
    s.set_default("target.url", "https://pyron.alwa.ai/api/v1/webhook")?
        .set_default("target.timeout_ms", 60_000_i64)?
        .set_default("signal.ticker", "BTCUSDT")?
        .set_default("signal.action", "buy")?
        .set_default("signal.price", "95000.50")?
        .set_default("scenario.name", "trading_spike")?
        .set_default("scenario.rate", 20_i64)?
        .set_default("scenario.time_unit_ms", 1_000_i64)?
        .set_default("scenario.duration_secs", 60_i64)?
        .set_default("scenario.pre_allocated_vus", 50_i64)?
        .set_default("scenario.max_vus", 100_i64)?
        .set_default("scenario.graceful_stop_secs", 30_i64)?
        .set_default("thresholds.http_reqs", "")?
        .set_default("thresholds.http_req_failed", "rate<0.01")?
        .set_default("thresholds.http_req_duration", "p(95)<600,avg<300")?
        .set_default("thresholds.checks", "")?
        .set_default("thresholds.dropped_iterations", "")?;
    Ok(s)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_scenario() {
        let settings = Settings::from_config(defaults().unwrap()).unwrap();
        assert_eq!(settings.target.url, "https://pyron.alwa.ai/api/v1/webhook");
        assert_eq!(settings.signal.ticker, "BTCUSDT");
        assert_eq!(settings.signal.action, Action::Buy);
        assert_eq!(settings.signal.price, Decimal::new(9500050, 2));
        assert_eq!(settings.scenario.rate, 20);
        assert_eq!(settings.scenario.duration(), Duration::from_secs(60));
        assert_eq!(settings.scenario.pre_allocated_vus, 50);
        assert_eq!(settings.scenario.max_vus, 100);
        assert_eq!(settings.scenario.interval(), Duration::from_millis(50));
        assert_eq!(settings.thresholds.http_req_failed, vec!["rate<0.01"]);
        assert_eq!(
            settings.thresholds.http_req_duration,
            vec!["p(95)<600", "avg<300"]
        );
        assert!(settings.thresholds.checks.is_empty());
    }

    #[test]
    fn overrides() {
        let mut s = defaults().unwrap();
        s.set("scenario.rate", 50_i64).unwrap();
        s.set("signal.action", "sell").unwrap();
        s.set("thresholds.checks", " rate>0.99 , ").unwrap();
        let settings = Settings::from_config(s).unwrap();
        assert_eq!(settings.scenario.interval(), Duration::from_millis(20));
        assert_eq!(settings.signal.action, Action::Sell);
        assert_eq!(settings.thresholds.checks, vec!["rate>0.99"]);
    }

    #[test]
    fn rejects_pre_allocation_above_max() {
        let mut s = defaults().unwrap();
        s.set("scenario.pre_allocated_vus", 200_i64).unwrap();
        assert!(Settings::from_config(s).is_err());
    }

    #[test]
    fn rejects_zero_rate() {
        let mut s = defaults().unwrap();
        s.set("scenario.rate", 0_i64).unwrap();
        assert!(Settings::from_config(s).is_err());
    }

    #[test]
    fn rejects_sub_nanosecond_interval() {
        let mut s = defaults().unwrap();
        s.set("scenario.rate", 2_000_000_i64).unwrap();
        s.set("scenario.time_unit_ms", 1_i64).unwrap();
        assert!(Settings::from_config(s).is_err());
    }

    #[test]
    fn one_nanosecond_interval_is_accepted() {
        let mut s = defaults().unwrap();
        s.set("scenario.rate", 1_000_000_i64).unwrap();
        s.set("scenario.time_unit_ms", 1_i64).unwrap();
        let settings = Settings::from_config(s).unwrap();
        assert_eq!(settings.scenario.interval(), Duration::from_nanos(1));
    }

    #[test]
    fn huge_time_unit_does_not_overflow() {
        let mut s = defaults().unwrap();
        s.set("scenario.time_unit_ms", i64::MAX).unwrap();
        let settings = Settings::from_config(s).unwrap();
        assert_eq!(
            settings.scenario.interval(),
            Duration::from_millis(i64::MAX as u64) / 20
        );
    }

    #[test]
    fn rejects_unknown_action() {
        let mut s = defaults().unwrap();
        s.set("signal.action", "hold").unwrap();
        assert!(Settings::from_config(s).is_err());
    }
}
