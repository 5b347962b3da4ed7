use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod iteration;
mod metrics;
mod report;
mod scenario;
mod settings;
mod signal;
mod thresholds;

use iteration::WebhookCall;
use metrics::Summary;
use settings::Settings;
use thresholds::{Thresholds, Verdict};

/// Exit code when any threshold is crossed.
const THRESHOLDS_CROSSED: i32 = 99;

struct RunResult {
    summary: Summary,
    verdicts: Vec<Verdict>,
}

impl RunResult {
    fn passed(&self) -> bool {
        self.verdicts.iter().all(|v| v.passed)
    }
}

async fn execute(settings: &Settings) -> Result<RunResult> {
    let thresholds = Thresholds::from_settings(&settings.thresholds)
        .context("Failed to parse thresholds")?;
    let call = WebhookCall::new(settings)?;
    info!(
        url = %settings.target.url,
        thresholds = thresholds.len(),
        "Targeting webhook"
    );
    let outcome = scenario::run(&settings.scenario, move || {
        let call = call.clone();
        async move { call.run().await }
    })
    .await;
    let summary = Summary::new(&outcome.samples, outcome.stats)
        .context("Failed to summarize samples")?;
    let verdicts = thresholds.evaluate(&summary);
    for v in verdicts.iter().filter(|v| !v.passed) {
        warn!(
            metric = v.threshold.metric.name(),
            threshold = %v.threshold.source,
            observed = v.observed,
            "Threshold crossed"
        );
    }
    Ok(RunResult { summary, verdicts })
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let settings = Settings::new().context("Failed to load settings")?;
    let result = execute(&settings).await?;
    println!(
        "{}",
        report::render(&settings.scenario.name, &result.summary, &result.verdicts)
    );
    if !result.passed() {
        std::process::exit(THRESHOLDS_CROSSED);
    }
    Ok(())
}
