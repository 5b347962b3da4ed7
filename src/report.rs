use std::fmt::Write;

use crate::metrics::Summary;
use crate::thresholds::{Metric, Verdict};

const PASS: char = '✓';
const FAIL: char = '✗';

/// End-of-test summary in the familiar k6 layout.
pub fn render(scenario: &str, summary: &Summary, verdicts: &[Verdict]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n  scenario: {}\n", scenario);
    let mark = if summary.checks_failed == 0 { PASS } else { FAIL };
    let _ = writeln!(out, "     {} is status 202\n", mark);

    line(
        &mut out,
        "checks",
        format!(
            "{:.2}% {} {} {} {}",
            summary.checks_rate() * 100.0,
            PASS,
            summary.checks_passed,
            FAIL,
            summary.checks_failed
        ),
        verdicts,
        Metric::Checks,
    );
    line(
        &mut out,
        "dropped_iterations",
        summary.dropped_iterations.to_string(),
        verdicts,
        Metric::DroppedIterations,
    );
    let t = &summary.http_req_duration;
    line(
        &mut out,
        "http_req_duration",
        format!(
            "avg={:.2}ms min={:.2}ms med={:.2}ms max={:.2}ms p(90)={:.2}ms p(95)={:.2}ms",
            t.avg(),
            t.min(),
            t.med(),
            t.max(),
            t.percentile(90.0),
            t.percentile(95.0)
        ),
        verdicts,
        Metric::HttpReqDuration,
    );
    line(
        &mut out,
        "http_req_failed",
        format!(
            "{:.2}% {} {} {} {}",
            summary.http_req_failed_rate() * 100.0,
            PASS,
            summary.http_req_failed,
            FAIL,
            summary.http_reqs - summary.http_req_failed
        ),
        verdicts,
        Metric::HttpReqFailed,
    );
    line(
        &mut out,
        "http_reqs",
        format!("{} {:.2}/s", summary.http_reqs, summary.http_reqs_per_sec),
        verdicts,
        Metric::HttpReqs,
    );
    let _ = writeln!(
        out,
        "     {:.<31}: {} interrupted={} transport_errors={}",
        "iterations",
        summary.iterations,
        summary.interrupted_iterations,
        summary.transport_errors
    );
    let _ = writeln!(out, "     {:.<31}: {}", "vus_max", summary.vus_max);
    out
}

fn line(out: &mut String, name: &str, value: String, verdicts: &[Verdict], metric: Metric) {
    let mine: Vec<_> = verdicts
        .iter()
        .filter(|v| v.threshold.metric == metric)
        .collect();
    let prefix = if mine.is_empty() {
        ' '
    } else if mine.iter().all(|v| v.passed) {
        PASS
    } else {
        FAIL
    };
    let _ = writeln!(out, "   {} {:.<31}: {}", prefix, name, value);
    for v in mine {
        let _ = writeln!(
            out,
            "     {} {{ {} }} observed {:.4}",
            if v.passed { PASS } else { FAIL },
            v.threshold.source,
            v.observed
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::iteration::Sample;
    use crate::metrics::RunStats;
    use crate::settings::{defaults, Settings};
    use crate::thresholds::Thresholds;
    use std::time::Duration;

    #[test]
    fn marks_crossed_thresholds() {
        let settings = Settings::from_config(defaults().unwrap()).unwrap();
        let thresholds = Thresholds::from_settings(&settings.thresholds).unwrap();
        let samples = vec![
            Sample {
                duration: Duration::from_millis(20),
                status: Some(500),
                failed: true,
                check_passed: false,
            };
            10
        ];
        let summary = Summary::new(&samples, RunStats::default()).unwrap();
        let text = render("trading_spike", &summary, &thresholds.evaluate(&summary));
        assert!(text.contains("✗ is status 202"));
        assert!(text.contains("✗ http_req_failed"));
        assert!(text.contains("✗ { rate<0.01 }"));
        assert!(text.contains("✓ http_req_duration"));
        assert!(text.contains("✓ { p(95)<600 }"));
    }
}
