use thiserror::Error;

use crate::metrics::{Summary, Trend};
use crate::settings::ThresholdSettings;

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("malformed threshold expression `{0}`")]
    Malformed(String),
    #[error("unknown aggregation `{0}`")]
    UnknownAggregation(String),
    #[error("percentile out of range in `{0}`")]
    Percentile(String),
    #[error("aggregation `{aggregation}` does not apply to {kind} metric `{metric}`")]
    Mismatch {
        metric: &'static str,
        kind: &'static str,
        aggregation: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    HttpReqs,
    HttpReqFailed,
    HttpReqDuration,
    Checks,
    DroppedIterations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Counter,
    Rate,
    Trend,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Metric::HttpReqs => "http_reqs",
            Metric::HttpReqFailed => "http_req_failed",
            Metric::HttpReqDuration => "http_req_duration",
            Metric::Checks => "checks",
            Metric::DroppedIterations => "dropped_iterations",
        }
    }

    fn kind(self) -> Kind {
        match self {
            Metric::HttpReqs | Metric::DroppedIterations => Kind::Counter,
            Metric::HttpReqFailed | Metric::Checks => Kind::Rate,
            Metric::HttpReqDuration => Kind::Trend,
        }
    }
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::Counter => "counter",
            Kind::Rate => "rate",
            Kind::Trend => "trend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Count,
    Rate,
    Avg,
    Min,
    Med,
    Max,
    Percentile(f64),
}

impl Aggregation {
    fn applies_to(self, kind: Kind) -> bool {
        match self {
            Aggregation::Count => kind == Kind::Counter,
            Aggregation::Rate => kind != Kind::Trend,
            _ => kind == Kind::Trend,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Operator::Lt => lhs < rhs,
            Operator::Le => lhs <= rhs,
            Operator::Gt => lhs > rhs,
            Operator::Ge => lhs >= rhs,
            Operator::Eq => (lhs - rhs).abs() < f64::EPSILON,
            Operator::Ne => (lhs - rhs).abs() >= f64::EPSILON,
        }
    }
}

/// A pass/fail assertion over one aggregated metric, e.g. `p(95)<600`.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: Metric,
    pub source: String,
    aggregation: Aggregation,
    operator: Operator,
    value: f64,
}

impl Threshold {
    pub fn parse(metric: Metric, expr: &str) -> Result<Self, ThresholdError> {
        let source: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        let malformed = || ThresholdError::Malformed(expr.into());
        let op_start = source
            .find(|c| matches!(c, '<' | '>' | '=' | '!'))
            .ok_or_else(malformed)?;
        let (lhs, rest) = source.split_at(op_start);
        let (operator, rhs) = if let Some(rhs) = rest.strip_prefix("<=") {
            (Operator::Le, rhs)
        } else if let Some(rhs) = rest.strip_prefix(">=") {
            (Operator::Ge, rhs)
        } else if let Some(rhs) = rest.strip_prefix("==") {
            (Operator::Eq, rhs)
        } else if let Some(rhs) = rest.strip_prefix("!=") {
            (Operator::Ne, rhs)
        } else if let Some(rhs) = rest.strip_prefix('<') {
            (Operator::Lt, rhs)
        } else if let Some(rhs) = rest.strip_prefix('>') {
            (Operator::Gt, rhs)
        } else {
            return Err(malformed());
        };
        let value: f64 = rhs.parse().map_err(|_| malformed())?;
        let aggregation = parse_aggregation(lhs, expr)?;
        if !aggregation.applies_to(metric.kind()) {
            return Err(ThresholdError::Mismatch {
                metric: metric.name(),
                kind: metric.kind().as_str(),
                aggregation: lhs.into(),
            });
        }
        Ok(Self {
            metric,
            source,
            aggregation,
            operator,
            value,
        })
    }

    /// The aggregated value this threshold compares against.
    /// Aggregations `parse` rejects for the metric yield NaN, which fails
    /// every operator.
    pub fn observed(&self, summary: &Summary) -> f64 {
        match self.metric {
            Metric::HttpReqs => self.counter(summary.http_reqs, summary),
            Metric::DroppedIterations => self.counter(summary.dropped_iterations, summary),
            Metric::HttpReqFailed => self.rate(summary.http_req_failed_rate()),
            Metric::Checks => self.rate(summary.checks_rate()),
            Metric::HttpReqDuration => self.trend(&summary.http_req_duration),
        }
    }

    fn counter(&self, count: u64, summary: &Summary) -> f64 {
        match self.aggregation {
            Aggregation::Count => count as f64,
            Aggregation::Rate => {
                let secs = summary.elapsed.as_secs_f64();
                if secs > 0.0 {
                    count as f64 / secs
                } else {
                    0.0
                }
            }
            Aggregation::Avg
            | Aggregation::Min
            | Aggregation::Med
            | Aggregation::Max
            | Aggregation::Percentile(_) => f64::NAN,
        }
    }

    fn rate(&self, rate: f64) -> f64 {
        match self.aggregation {
            Aggregation::Rate => rate,
            Aggregation::Count
            | Aggregation::Avg
            | Aggregation::Min
            | Aggregation::Med
            | Aggregation::Max
            | Aggregation::Percentile(_) => f64::NAN,
        }
    }

    fn trend(&self, trend: &Trend) -> f64 {
        match self.aggregation {
            Aggregation::Avg => trend.avg(),
            Aggregation::Min => trend.min(),
            Aggregation::Med => trend.med(),
            Aggregation::Max => trend.max(),
            Aggregation::Percentile(p) => trend.percentile(p),
            Aggregation::Count | Aggregation::Rate => f64::NAN,
        }
    }

    pub fn passes(&self, summary: &Summary) -> bool {
        self.operator.holds(self.observed(summary), self.value)
    }
}

fn parse_aggregation(lhs: &str, expr: &str) -> Result<Aggregation, ThresholdError> {
    let aggregation = match lhs {
        "count" => Aggregation::Count,
        "rate" => Aggregation::Rate,
        "avg" => Aggregation::Avg,
        "min" => Aggregation::Min,
        "med" => Aggregation::Med,
        "max" => Aggregation::Max,
        _ => {
            let p = lhs
                .strip_prefix("p(")
                .and_then(|x| x.strip_suffix(')'))
                .ok_or_else(|| ThresholdError::UnknownAggregation(lhs.into()))?;
            let p: f64 = p
                .parse()
                .map_err(|_| ThresholdError::Percentile(expr.into()))?;
            if !(0.0..=100.0).contains(&p) {
                return Err(ThresholdError::Percentile(expr.into()));
            }
            Aggregation::Percentile(p)
        }
    };
    Ok(aggregation)
}

#[derive(Debug, Clone)]
pub struct Verdict {
    pub threshold: Threshold,
    pub observed: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Thresholds(Vec<Threshold>);

impl Thresholds {
    pub fn from_settings(settings: &ThresholdSettings) -> Result<Self, ThresholdError> {
        let groups = [
            (Metric::HttpReqs, &settings.http_reqs),
            (Metric::HttpReqFailed, &settings.http_req_failed),
            (Metric::HttpReqDuration, &settings.http_req_duration),
            (Metric::Checks, &settings.checks),
            (Metric::DroppedIterations, &settings.dropped_iterations),
        ];
        let mut thresholds = Vec::new();
        for (metric, exprs) in groups.iter() {
            for expr in exprs.iter() {
                thresholds.push(Threshold::parse(*metric, expr)?);
            }
        }
        Ok(Self(thresholds))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn evaluate(&self, summary: &Summary) -> Vec<Verdict> {
        self.0
            .iter()
            .map(|t| Verdict {
                threshold: t.clone(),
                observed: t.observed(summary),
                passed: t.passes(summary),
            })
            .collect()
    }
}
