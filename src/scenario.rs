use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::iteration::Sample;
use crate::metrics::RunStats;
use crate::settings::ScenarioSettings;

#[derive(Debug)]
pub struct Outcome {
    pub samples: Vec<Sample>,
    pub stats: RunStats,
}

/// Constant-arrival-rate driver: starts one iteration every
/// `scenario.interval()` for `scenario.duration()`, each on its own VU.
/// Iterations that find every VU busy are dropped, not queued.
pub async fn run<F, Fut>(scenario: &ScenarioSettings, mut iteration: F) -> Outcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Sample> + Send + 'static,
{
    info!(
        scenario = %scenario.name,
        rate = scenario.rate,
        time_unit_ms = scenario.time_unit_ms,
        duration_secs = scenario.duration_secs,
        pre_allocated_vus = scenario.pre_allocated_vus,
        max_vus = scenario.max_vus,
        "Starting scenario"
    );
    let vus = Arc::new(Semaphore::new(scenario.max_vus));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut handles = Vec::new();
    let mut dropped_iterations: u64 = 0;
    let mut vus_max = scenario.pre_allocated_vus;

    let start = Instant::now();
    let deadline = start + scenario.duration();
    let mut ticker = time::interval(scenario.interval());
    loop {
        if ticker.tick().await >= deadline {
            break;
        }
        let vu = match vus.clone().try_acquire_owned() {
            Ok(vu) => vu,
            Err(_) => {
                dropped_iterations += 1;
                if dropped_iterations == 1 {
                    warn!(
                        max_vus = scenario.max_vus,
                        "Insufficient VUs, dropping iterations"
                    );
                } else {
                    debug!(dropped_iterations, "Dropped iteration");
                }
                continue;
            }
        };
        vus_max = vus_max.max(scenario.max_vus - vus.available_permits());
        let tx = tx.clone();
        let fut = iteration();
        handles.push(tokio::spawn(async move {
            let sample = fut.await;
            drop(vu);
            // Receiver outlives every task that isn't aborted.
            let _ = tx.send(sample);
        }));
    }
    drop(tx);

    let started = handles.len();
    if time::timeout(scenario.graceful_stop(), join_all(handles.iter_mut()))
        .await
        .is_err()
    {
        warn!(
            graceful_stop_secs = scenario.graceful_stop_secs,
            "Graceful stop elapsed, interrupting in-flight iterations"
        );
        for handle in handles.iter() {
            handle.abort();
        }
    }
    let elapsed = start.elapsed();

    let mut samples = Vec::with_capacity(started);
    while let Ok(sample) = rx.try_recv() {
        samples.push(sample);
    }
    let stats = RunStats {
        elapsed,
        dropped_iterations,
        interrupted_iterations: (started - samples.len()) as u64,
        vus_max,
    };
    info!(
        iterations = samples.len(),
        dropped_iterations = stats.dropped_iterations,
        interrupted_iterations = stats.interrupted_iterations,
        vus_max = stats.vus_max,
        elapsed_ms = elapsed.as_millis() as u64,
        "Scenario finished"
    );
    Outcome { samples, stats }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::settings::defaults;
    use crate::settings::Settings;
    use std::time::Duration;

    fn scenario(rate: i64, duration_secs: i64, max_vus: i64) -> ScenarioSettings {
        let mut s = defaults().unwrap();
        s.set("scenario.rate", rate).unwrap();
        s.set("scenario.duration_secs", duration_secs).unwrap();
        s.set("scenario.pre_allocated_vus", 1_i64).unwrap();
        s.set("scenario.max_vus", max_vus).unwrap();
        s.set("scenario.graceful_stop_secs", 1_i64).unwrap();
        Settings::from_config(s).unwrap().scenario
    }

    type Iteration = std::pin::Pin<Box<dyn Future<Output = Sample> + Send>>;

    fn sleep_for(ms: u64) -> Iteration {
        Box::pin(async move {
            time::sleep(Duration::from_millis(ms)).await;
            Sample {
                duration: Duration::from_millis(ms),
                status: Some(202),
                failed: false,
                check_passed: true,
            }
        })
    }

    fn sleeping(ms: u64) -> impl FnMut() -> Iteration {
        move || sleep_for(ms)
    }

    #[tokio::test]
    async fn starts_rate_times_duration_iterations() {
        let outcome = run(&scenario(20, 1, 10), sleeping(5)).await;
        assert_eq!(outcome.samples.len(), 20);
        assert_eq!(outcome.stats.dropped_iterations, 0);
        assert_eq!(outcome.stats.interrupted_iterations, 0);
        assert!(outcome.stats.elapsed >= Duration::from_millis(950));
    }

    #[tokio::test]
    async fn arrivals_do_not_wait_for_completion() {
        // 20/s with 300ms iterations needs ~6 concurrent VUs.
        let outcome = run(&scenario(20, 1, 50), sleeping(300)).await;
        assert_eq!(outcome.samples.len(), 20);
        assert!(outcome.stats.vus_max >= 5);
        assert!(outcome.stats.elapsed < Duration::from_millis(1800));
    }

    #[tokio::test]
    async fn drops_iterations_when_vus_exhausted() {
        let outcome = run(&scenario(20, 1, 2), sleeping(400)).await;
        assert!(outcome.stats.dropped_iterations > 0);
        assert_eq!(outcome.stats.vus_max, 2);
        assert_eq!(
            outcome.samples.len() as u64 + outcome.stats.dropped_iterations,
            20
        );
    }

    #[tokio::test]
    async fn graceful_stop_keeps_finished_and_interrupts_slow() {
        // Every other iteration outlasts the 1s graceful stop.
        let mut n = 0;
        let outcome = run(&scenario(10, 1, 20), move || {
            n += 1;
            sleep_for(if n % 2 == 0 { 5_000 } else { 20 })
        })
        .await;
        assert_eq!(outcome.stats.dropped_iterations, 0);
        assert_eq!(outcome.samples.len(), 5);
        assert_eq!(outcome.stats.interrupted_iterations, 5);
        assert_eq!(
            outcome.samples.len() as u64 + outcome.stats.interrupted_iterations,
            10
        );
        assert!(outcome
            .samples
            .iter()
            .all(|s| s.duration == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn interrupts_after_graceful_stop() {
        let outcome = run(&scenario(5, 1, 10), sleeping(5_000)).await;
        assert!(outcome.samples.is_empty());
        assert_eq!(outcome.stats.interrupted_iterations, 5);
        assert!(outcome.stats.elapsed < Duration::from_secs(4));
    }
}
