//! # Thresholds
//!
//! Pass/fail gates over final metric values, written as `<aggregation><op><bound>`:
//!
//! ```text
//! http_req_duration: p(95)<3000
//! auth_errors:       rate<0.2
//! http_reqs:         count>=100
//! ```
//!
//! Aggregations: `avg`, `min`, `max`, `med`, `p(50|90|95|99)` on trends;
//! `rate` on rates; `count` and `rate` on counters; `value`, `min`, `max` on
//! gauges. Operators: `<`, `<=`, `>`, `>=`, `==`, `!=`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LoadCheckError, Result};
use crate::metrics::{MetricKind, MetricSnapshot, Registry};

/// Statistic a threshold reads from its metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    P90,
    P95,
    P99,
    Count,
    Rate,
    Value,
}

impl Aggregation {
    fn parse(raw: &str) -> Option<Self> {
        let aggregation = match raw {
            "avg" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            "med" | "p(50)" => Self::Med,
            "p(90)" => Self::P90,
            "p(95)" => Self::P95,
            "p(99)" => Self::P99,
            "count" => Self::Count,
            "rate" => Self::Rate,
            "value" => Self::Value,
            _ => return None,
        };
        Some(aggregation)
    }

    fn applies_to(self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => matches!(
                self,
                Self::Avg | Self::Min | Self::Max | Self::Med | Self::P90 | Self::P95 | Self::P99
            ),
            MetricKind::Rate => self == Self::Rate,
            MetricKind::Counter => matches!(self, Self::Count | Self::Rate),
            MetricKind::Gauge => matches!(self, Self::Value | Self::Min | Self::Max),
        }
    }

    fn read(self, snapshot: &MetricSnapshot) -> Option<f64> {
        match snapshot {
            MetricSnapshot::Trend { values, .. } => match self {
                Self::Avg => Some(values.avg),
                Self::Min => Some(values.min),
                Self::Max => Some(values.max),
                Self::Med => Some(values.med),
                Self::P90 => Some(values.p90),
                Self::P95 => Some(values.p95),
                Self::P99 => Some(values.p99),
                _ => None,
            },
            MetricSnapshot::Rate { values, .. } => (self == Self::Rate).then_some(values.rate),
            MetricSnapshot::Counter { values, .. } => match self {
                Self::Count => Some(values.count as f64),
                Self::Rate => Some(values.rate),
                _ => None,
            },
            MetricSnapshot::Gauge { values, .. } => match self {
                Self::Value => Some(values.value as f64),
                Self::Min => Some(values.min as f64),
                Self::Max => Some(values.max as f64),
                _ => None,
            },
        }
    }
}

/// Comparison between the aggregated value and the bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    /// Longest operators first so `<=` is not read as `<`
    const OPERATORS: [(&'static str, Comparison); 6] = [
        ("<=", Self::Le),
        (">=", Self::Ge),
        ("==", Self::Eq),
        ("!=", Self::Ne),
        ("<", Self::Lt),
        (">", Self::Gt),
    ];

    fn holds(self, value: f64, bound: f64) -> bool {
        match self {
            Self::Lt => value < bound,
            Self::Le => value <= bound,
            Self::Gt => value > bound,
            Self::Ge => value >= bound,
            Self::Eq => value == bound,
            Self::Ne => value != bound,
        }
    }
}

/// One parsed threshold expression bound to a metric
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    metric: String,
    expression: String,
    aggregation: Aggregation,
    comparison: Comparison,
    bound: f64,
}

impl Threshold {
    /// Parse `expression` for `metric` without checking the metric exists
    pub fn parse(metric: &str, expression: &str) -> Result<Self> {
        let invalid = |reason: &str| LoadCheckError::InvalidThreshold {
            metric: metric.to_string(),
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        let op_start = compact
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| invalid("missing comparison operator"))?;
        let (lhs, rest) = compact.split_at(op_start);

        let (comparison, rhs) = Comparison::OPERATORS
            .iter()
            .find_map(|(token, comparison)| rest.strip_prefix(token).map(|rhs| (*comparison, rhs)))
            .ok_or_else(|| invalid("unknown comparison operator"))?;

        let aggregation = Aggregation::parse(lhs).ok_or_else(|| invalid("unknown aggregation"))?;
        let bound: f64 = rhs.parse().map_err(|_| invalid("bound is not a number"))?;
        if !bound.is_finite() {
            return Err(invalid("bound is not finite"));
        }

        Ok(Self {
            metric: metric.to_string(),
            expression: expression.trim().to_string(),
            aggregation,
            comparison,
            bound,
        })
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Display name used in summaries
    pub fn name(&self) -> String {
        format!("{}: {}", self.metric, self.expression)
    }

    /// Whether the metric's final value satisfies the expression.
    ///
    /// A metric with no observations has nothing crossing the bound and passes.
    pub fn evaluate(&self, snapshot: Option<&MetricSnapshot>) -> bool {
        match snapshot.and_then(|s| self.aggregation.read(s)) {
            Some(value) => self.comparison.holds(value, self.bound),
            None => true,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.expression)
    }
}

/// Outcome of one threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub ok: bool,
}

/// All thresholds of a run, validated against its registry
#[derive(Debug, Clone, Default)]
pub struct Thresholds {
    thresholds: Vec<Threshold>,
}

impl Thresholds {
    /// Parse `metric -> [expression]` and check each against the registry
    pub fn from_config(config: &BTreeMap<String, Vec<String>>, registry: &Registry) -> Result<Self> {
        let mut thresholds = Vec::new();
        for (metric, expressions) in config {
            let kind = registry
                .kind_of(metric)
                .ok_or_else(|| LoadCheckError::UnknownMetric(metric.clone()))?;

            for expression in expressions {
                let threshold = Threshold::parse(metric, expression)?;
                if !threshold.aggregation.applies_to(kind) {
                    return Err(LoadCheckError::InvalidThreshold {
                        metric: metric.clone(),
                        expression: expression.clone(),
                        reason: format!("aggregation does not apply to a {}", kind),
                    });
                }
                thresholds.push(threshold);
            }
        }
        Ok(Self { thresholds })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.thresholds.iter()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn evaluate(
        &self,
        metrics: &BTreeMap<String, MetricSnapshot>,
    ) -> BTreeMap<String, ThresholdResult> {
        self.thresholds
            .iter()
            .map(|t| {
                let ok = t.evaluate(metrics.get(t.metric()));
                (t.name(), ThresholdResult { ok })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{RateValues, TrendValues, ValueType};

    fn trend_with_p95(p95: f64) -> MetricSnapshot {
        MetricSnapshot::Trend {
            contains: ValueType::Time,
            values: TrendValues {
                avg: 100.0,
                min: 10.0,
                med: 90.0,
                max: 5000.0,
                p90: 1000.0,
                p95,
                p99: 4000.0,
            },
        }
    }

    fn rate(rate: f64) -> MetricSnapshot {
        MetricSnapshot::Rate {
            contains: ValueType::Default,
            values: RateValues {
                rate,
                passes: 0,
                fails: 0,
            },
        }
    }

    #[test]
    fn test_parse_expressions() {
        let t = Threshold::parse("http_req_duration", "p(95)<3000").unwrap();
        assert_eq!(t.aggregation, Aggregation::P95);
        assert_eq!(t.comparison, Comparison::Lt);
        assert_eq!(t.bound, 3000.0);
        assert_eq!(t.name(), "http_req_duration: p(95)<3000");

        let t = Threshold::parse("http_reqs", " count >= 10 ").unwrap();
        assert_eq!(t.comparison, Comparison::Ge);
        assert_eq!(t.expression(), "count >= 10");

        let t = Threshold::parse("auth_errors", "rate<0.2").unwrap();
        assert_eq!(t.aggregation, Aggregation::Rate);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["p(95)", "p(97)<10", "avg<<10", "avg<abc", "<10", "avg=>1"] {
            assert!(Threshold::parse("m", bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_p95_strict_inequality() {
        let t = Threshold::parse("http_req_duration", "p(95)<3000").unwrap();
        assert!(t.evaluate(Some(&trend_with_p95(2999.0))));
        assert!(!t.evaluate(Some(&trend_with_p95(3000.0))));
    }

    #[test]
    fn test_missing_metric_passes() {
        let t = Threshold::parse("errors", "rate<0.1").unwrap();
        assert!(t.evaluate(None));
    }

    #[test]
    fn test_from_config_validates_metrics() {
        let mut registry = Registry::new();
        registry.rate("errors").unwrap();
        registry
            .trend("http_req_duration", ValueType::Time)
            .unwrap();

        let mut config = BTreeMap::new();
        config.insert("errors".to_string(), vec!["rate<0.1".to_string()]);
        config.insert(
            "http_req_duration".to_string(),
            vec!["p(95)<2000".to_string(), "avg<1000".to_string()],
        );
        let thresholds = Thresholds::from_config(&config, &registry).unwrap();
        assert_eq!(thresholds.len(), 3);

        let mut unknown = BTreeMap::new();
        unknown.insert("nope".to_string(), vec!["rate<0.1".to_string()]);
        assert!(matches!(
            Thresholds::from_config(&unknown, &registry),
            Err(LoadCheckError::UnknownMetric(_))
        ));

        let mut wrong_kind = BTreeMap::new();
        wrong_kind.insert("errors".to_string(), vec!["p(95)<10".to_string()]);
        assert!(matches!(
            Thresholds::from_config(&wrong_kind, &registry),
            Err(LoadCheckError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_evaluate_all() {
        let mut registry = Registry::new();
        registry.rate("errors").unwrap();
        registry
            .trend("http_req_duration", ValueType::Time)
            .unwrap();

        let mut config = BTreeMap::new();
        config.insert("errors".to_string(), vec!["rate<0.1".to_string()]);
        config.insert(
            "http_req_duration".to_string(),
            vec!["p(95)<2000".to_string()],
        );
        let thresholds = Thresholds::from_config(&config, &registry).unwrap();

        let mut metrics = BTreeMap::new();
        metrics.insert("errors".to_string(), rate(0.05));
        metrics.insert("http_req_duration".to_string(), trend_with_p95(2500.0));

        let results = thresholds.evaluate(&metrics);
        assert!(results["errors: rate<0.1"].ok);
        assert!(!results["http_req_duration: p(95)<2000"].ok);
    }
}
