use anyhow::{Context, Result};
use reqwest::{header, Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::settings::{Settings, SignalSettings};
use crate::signal::TradingSignal;

pub const EXPECTED_STATUS: StatusCode = StatusCode::ACCEPTED;

/// Outcome of one iteration.
#[derive(Debug, Clone)]
pub struct Sample {
    pub duration: Duration,
    pub status: Option<u16>,
    pub failed: bool,
    pub check_passed: bool,
}

impl Sample {
    fn from_status(duration: Duration, status: StatusCode) -> Self {
        Self {
            duration,
            status: Some(status.as_u16()),
            // Anything outside 200..=399 counts against http_req_failed.
            failed: !(status.is_success() || status.is_redirection()),
            check_passed: status == EXPECTED_STATUS,
        }
    }

    fn transport_error(duration: Duration) -> Self {
        Self {
            duration,
            status: None,
            failed: true,
            check_passed: false,
        }
    }
}

/// Per-iteration request function. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct WebhookCall {
    client: Client,
    url: String,
    signal: SignalSettings,
}

impl WebhookCall {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.target.timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: settings.target.url.clone(),
            signal: settings.signal.clone(),
        })
    }

    pub async fn run(&self) -> Sample {
        let signal = TradingSignal::now(&self.signal);
        let start = Instant::now();
        let res = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&signal)
            .send()
            .await;
        let elapsed = start.elapsed();
        match res {
            Ok(res) => {
                let status = res.status();
                if status != EXPECTED_STATUS {
                    debug!(%status, "Check `is status 202` failed");
                }
                Sample::from_status(elapsed, status)
            }
            Err(e) => {
                debug!(error = %e, "Request failed");
                Sample::transport_error(elapsed)
            }
        }
    }
}
