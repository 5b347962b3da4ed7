use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::str::FromStr;
use thiserror::Error;

use crate::settings::SignalSettings;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

#[derive(Debug, Error)]
#[error("unknown signal action `{0}`, expected `buy` or `sell`")]
pub struct UnknownAction(String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Action::Buy),
            "sell" => Ok(Action::Sell),
            _ => Err(UnknownAction(s.into())),
        }
    }
}

/// Body of a single webhook call.
#[derive(Serialize, Debug, Clone)]
pub struct TradingSignal {
    pub ticker: String,
    pub action: Action,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(serialize_with = "iso8601_millis")]
    pub timestamp: DateTime<Utc>,
}

impl TradingSignal {
    /// Stamp a fresh signal from the configured template.
    pub fn now(template: &SignalSettings) -> Self {
        Self {
            ticker: template.ticker.clone(),
            action: template.action,
            price: template.price,
            timestamp: Utc::now(),
        }
    }
}

// Matches JavaScript's Date.toISOString(), e.g. 2026-10-19T12:00:00.123Z
fn iso8601_millis<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}
