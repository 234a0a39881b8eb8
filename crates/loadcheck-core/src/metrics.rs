//! # Metrics
//!
//! Run-wide metric state shared by every virtual user.
//!
//! Four kinds exist, all accumulated with commutative operations so that VUs
//! never coordinate with each other:
//!
//! - [`Counter`]: atomic running total
//! - [`Gauge`]: last value plus min/max ever set
//! - [`Rate`]: atomic count of true observations over all observations
//! - [`Trend`]: atomic count/sum/min/max plus an HDR histogram for
//!   percentiles. Each VU records into its own [`TrendRecorder`] and merges
//!   the local histogram into the shared one when it flushes.
//!
//! Metrics are registered on a [`Registry`] before the run. Registration needs
//! `&mut Registry`; once the registry is shared behind an `Arc` no new metric
//! can appear.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hdrhistogram::Histogram;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::check::{CheckResult, CheckTally};
use crate::error::{LoadCheckError, Result};

/// Names of the metrics every run registers
pub mod names {
    pub const HTTP_REQS: &str = "http_reqs";
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    pub const DATA_SENT: &str = "data_sent";
    pub const DATA_RECEIVED: &str = "data_received";
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_DURATION: &str = "iteration_duration";
    pub const VUS: &str = "vus";
    pub const VUS_MAX: &str = "vus_max";
    pub const CHECKS: &str = "checks";
}

/// Highest trackable trend value: one hour, in microseconds
const TREND_MAX_US: u64 = 3_600_000_000;

/// Significant figures kept by trend histograms.
///
/// Quantiles are accurate to 0.1% of the value, about 2ms either way at 3s,
/// so a percentile within that distance of a threshold bound can land on
/// either side of it. Quantiles are clamped to the exact observed extremes.
/// Four figures would cost roughly 1.3MB per histogram, and every VU keeps
/// its own recorder per trend.
const TREND_SIGFIG: u8 = 3;

// ============================================================================
// KINDS
// ============================================================================

/// Metric kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Rate => "rate",
            Self::Trend => "trend",
        };
        f.write_str(name)
    }
}

/// What the metric's numbers measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Default,
    Time,
    Data,
}

// ============================================================================
// COUNTER
// ============================================================================

/// Monotonic integer total
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicU64,
}

impl Counter {
    pub fn add(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn values(&self, elapsed: Duration) -> Option<CounterValues> {
        let count = self.count();
        if count == 0 {
            return None;
        }
        let secs = elapsed.as_secs_f64();
        Some(CounterValues {
            count,
            rate: if secs > 0.0 { count as f64 / secs } else { 0.0 },
        })
    }
}

// ============================================================================
// GAUGE
// ============================================================================

/// Last value set, with the extremes it has taken
#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
    samples: AtomicU64,
}

impl Default for Gauge {
    fn default() -> Self {
        Self {
            value: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }
}

impl Gauge {
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
        self.min.fetch_min(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    fn values(&self) -> Option<GaugeValues> {
        if self.samples.load(Ordering::Relaxed) == 0 {
            return None;
        }
        Some(GaugeValues {
            value: self.value(),
            min: self.min.load(Ordering::Relaxed),
            max: self.max(),
        })
    }
}

// ============================================================================
// RATE
// ============================================================================

/// Fraction of boolean observations that were true
#[derive(Debug, Default)]
pub struct Rate {
    passes: AtomicU64,
    total: AtomicU64,
}

impl Rate {
    pub fn add(&self, observation: bool) {
        if observation {
            self.passes.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of true observations
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.passes() as f64 / total as f64)
    }

    fn values(&self) -> Option<RateValues> {
        let total = self.total();
        let passes = self.passes().min(total);
        (total > 0).then(|| RateValues {
            rate: passes as f64 / total as f64,
            passes,
            fails: total - passes,
        })
    }
}

// ============================================================================
// TREND
// ============================================================================

/// Distribution of durations or sizes
pub struct Trend {
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
    merged: Mutex<Histogram<u64>>,
}

impl fmt::Debug for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trend")
            .field("count", &self.count.load(Ordering::Relaxed))
            .field("sum", &self.sum.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Trend {
    /// Values are recorded in microseconds (or bytes for data trends)
    pub fn new() -> Result<Self> {
        let histogram = Histogram::new_with_bounds(1, TREND_MAX_US, TREND_SIGFIG)
            .map_err(|e| LoadCheckError::Histogram(format!("{:?}", e)))?;
        Ok(Self {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
            merged: Mutex::new(histogram),
        })
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn observe(&self, value: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.min.fetch_min(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    fn merge(&self, local: &Histogram<u64>) {
        if let Err(e) = self.merged.lock().add(local) {
            warn!("Failed to merge trend histogram: {:?}", e);
        }
    }

    /// Aggregate stats in milliseconds, `None` before the first observation
    pub fn values(&self) -> Option<TrendValues> {
        let count = self.count();
        if count == 0 {
            return None;
        }

        let to_ms = |us: u64| us as f64 / 1000.0;
        let avg = self.sum.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0;
        let min = self.min.load(Ordering::Relaxed);
        let max = self.max.load(Ordering::Relaxed);

        let hist = self.merged.lock();
        let quantile = |q: f64| {
            if hist.len() == 0 {
                avg
            } else {
                let value = hist.median_equivalent(hist.value_at_quantile(q));
                to_ms(value.max(min).min(max))
            }
        };

        Some(TrendValues {
            avg,
            min: to_ms(min),
            med: quantile(0.50),
            max: to_ms(max),
            p90: quantile(0.90),
            p95: quantile(0.95),
            p99: quantile(0.99),
        })
    }
}

/// Per-VU trend writer.
///
/// Count, sum and extremes hit the shared atomics immediately; the histogram
/// is local and merged on [`flush`](Self::flush) or drop.
pub struct TrendRecorder {
    trend: Arc<Trend>,
    local: Histogram<u64>,
}

impl TrendRecorder {
    pub fn new(trend: Arc<Trend>) -> Self {
        let local = Histogram::new_from(&*trend.merged.lock());
        Self { trend, local }
    }

    /// Whether this recorder writes into `trend`
    pub fn records(&self, trend: &Arc<Trend>) -> bool {
        Arc::ptr_eq(&self.trend, trend)
    }

    /// Record a duration at microsecond resolution
    pub fn add(&mut self, value: Duration) {
        self.add_raw(value.as_micros().min(u64::MAX as u128) as u64);
    }

    /// Record a raw value in the trend's unit
    pub fn add_raw(&mut self, value: u64) {
        self.trend.observe(value);
        self.local.saturating_record(value);
    }

    /// Merge local samples into the shared histogram
    pub fn flush(&mut self) {
        if self.local.len() == 0 {
            return;
        }
        self.trend.merge(&self.local);
        self.local.reset();
    }
}

impl Drop for TrendRecorder {
    fn drop(&mut self) {
        self.flush();
    }
}

// ============================================================================
// SNAPSHOT VALUES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterValues {
    pub count: u64,
    /// Per second over the run
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeValues {
    pub value: u64,
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateValues {
    pub rate: f64,
    pub passes: u64,
    pub fails: u64,
}

/// Trend statistics in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendValues {
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    #[serde(rename = "p(90)")]
    pub p90: f64,
    #[serde(rename = "p(95)")]
    pub p95: f64,
    #[serde(rename = "p(99)")]
    pub p99: f64,
}

/// Final state of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricSnapshot {
    Counter {
        contains: ValueType,
        values: CounterValues,
    },
    Gauge {
        contains: ValueType,
        values: GaugeValues,
    },
    Rate {
        contains: ValueType,
        values: RateValues,
    },
    Trend {
        contains: ValueType,
        values: TrendValues,
    },
}

impl MetricSnapshot {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter { .. } => MetricKind::Counter,
            Self::Gauge { .. } => MetricKind::Gauge,
            Self::Rate { .. } => MetricKind::Rate,
            Self::Trend { .. } => MetricKind::Trend,
        }
    }

    pub fn as_counter(&self) -> Option<&CounterValues> {
        match self {
            Self::Counter { values, .. } => Some(values),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&GaugeValues> {
        match self {
            Self::Gauge { values, .. } => Some(values),
            _ => None,
        }
    }

    pub fn as_rate(&self) -> Option<&RateValues> {
        match self {
            Self::Rate { values, .. } => Some(values),
            _ => None,
        }
    }

    pub fn as_trend(&self) -> Option<&TrendValues> {
        match self {
            Self::Trend { values, .. } => Some(values),
            _ => None,
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Shared handle to a registered metric
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Rate(Arc<Rate>),
    Trend(Arc<Trend>),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Rate(_) => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }
}

#[derive(Debug)]
struct Entry {
    metric: Metric,
    contains: ValueType,
}

/// All metrics and check tallies of one run, in registration order
#[derive(Debug, Default)]
pub struct Registry {
    metrics: IndexMap<String, Entry>,
    checks: IndexMap<String, Arc<CheckTally>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&mut self, name: &str, contains: ValueType) -> Result<Arc<Counter>> {
        let counter = Arc::new(Counter::default());
        self.insert(name, Metric::Counter(counter.clone()), contains)?;
        Ok(counter)
    }

    pub fn gauge(&mut self, name: &str) -> Result<Arc<Gauge>> {
        let gauge = Arc::new(Gauge::default());
        self.insert(name, Metric::Gauge(gauge.clone()), ValueType::Default)?;
        Ok(gauge)
    }

    pub fn rate(&mut self, name: &str) -> Result<Arc<Rate>> {
        let rate = Arc::new(Rate::default());
        self.insert(name, Metric::Rate(rate.clone()), ValueType::Default)?;
        Ok(rate)
    }

    pub fn trend(&mut self, name: &str, contains: ValueType) -> Result<Arc<Trend>> {
        let trend = Arc::new(Trend::new()?);
        self.insert(name, Metric::Trend(trend.clone()), contains)?;
        Ok(trend)
    }

    fn insert(&mut self, name: &str, metric: Metric, contains: ValueType) -> Result<()> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(LoadCheckError::InvalidMetricName(name.to_string()));
        }
        if self.metrics.contains_key(name) {
            return Err(LoadCheckError::DuplicateMetric(name.to_string()));
        }
        self.metrics
            .insert(name.to_string(), Entry { metric, contains });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name).map(|entry| &entry.metric)
    }

    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.get(name).map(Metric::kind)
    }

    /// Look up a registered rate
    pub fn get_rate(&self, name: &str) -> Result<Arc<Rate>> {
        match self.get(name) {
            Some(Metric::Rate(rate)) => Ok(rate.clone()),
            Some(other) => Err(LoadCheckError::MetricKindMismatch {
                name: name.to_string(),
                expected: MetricKind::Rate,
                actual: other.kind(),
            }),
            None => Err(LoadCheckError::UnknownMetric(name.to_string())),
        }
    }

    /// Metric names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Tally for a named check; repeated names share one tally
    pub fn check_tally(&mut self, name: &str) -> Arc<CheckTally> {
        self.checks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CheckTally::default()))
            .clone()
    }

    /// Check outcomes in declaration order
    pub fn check_results(&self) -> Vec<CheckResult> {
        self.checks
            .iter()
            .map(|(name, tally)| tally.result(name))
            .collect()
    }

    /// Values of every metric with at least one observation
    pub fn snapshot(&self, elapsed: Duration) -> BTreeMap<String, MetricSnapshot> {
        self.metrics
            .iter()
            .filter_map(|(name, entry)| {
                let contains = entry.contains;
                let snapshot = match &entry.metric {
                    Metric::Counter(c) => c
                        .values(elapsed)
                        .map(|values| MetricSnapshot::Counter { contains, values }),
                    Metric::Gauge(g) => g
                        .values()
                        .map(|values| MetricSnapshot::Gauge { contains, values }),
                    Metric::Rate(r) => r
                        .values()
                        .map(|values| MetricSnapshot::Rate { contains, values }),
                    Metric::Trend(t) => t
                        .values()
                        .map(|values| MetricSnapshot::Trend { contains, values }),
                };
                snapshot.map(|s| (name.clone(), s))
            })
            .collect()
    }
}

// ============================================================================
// BUILT-IN METRICS
// ============================================================================

/// Metrics the executor and HTTP layer maintain for every run
#[derive(Debug, Clone)]
pub struct BuiltinMetrics {
    pub http_reqs: Arc<Counter>,
    pub http_req_duration: Arc<Trend>,
    pub http_req_failed: Arc<Rate>,
    pub data_sent: Arc<Counter>,
    pub data_received: Arc<Counter>,
    pub iterations: Arc<Counter>,
    pub iteration_duration: Arc<Trend>,
    pub vus: Arc<Gauge>,
    pub vus_max: Arc<Gauge>,
    pub checks: Arc<Rate>,
}

impl BuiltinMetrics {
    pub fn register(registry: &mut Registry) -> Result<Self> {
        Ok(Self {
            http_reqs: registry.counter(names::HTTP_REQS, ValueType::Default)?,
            http_req_duration: registry.trend(names::HTTP_REQ_DURATION, ValueType::Time)?,
            http_req_failed: registry.rate(names::HTTP_REQ_FAILED)?,
            data_sent: registry.counter(names::DATA_SENT, ValueType::Data)?,
            data_received: registry.counter(names::DATA_RECEIVED, ValueType::Data)?,
            iterations: registry.counter(names::ITERATIONS, ValueType::Default)?,
            iteration_duration: registry.trend(names::ITERATION_DURATION, ValueType::Time)?,
            vus: registry.gauge(names::VUS)?,
            vus_max: registry.gauge(names::VUS_MAX)?,
            checks: registry.rate(names::CHECKS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_rate_per_second() {
        let mut registry = Registry::new();
        let reqs = registry.counter("reqs", ValueType::Default).unwrap();
        reqs.add(10);
        reqs.inc();

        let snapshot = registry.snapshot(Duration::from_secs(2));
        let values = snapshot["reqs"].as_counter().unwrap();
        assert_eq!(values.count, 11);
        assert!((values.rate - 5.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_duplicate_and_invalid_names() {
        let mut registry = Registry::new();
        registry.rate("errors").unwrap();

        assert!(matches!(
            registry.counter("errors", ValueType::Default),
            Err(LoadCheckError::DuplicateMetric(_))
        ));
        assert!(matches!(
            registry.rate("bad name"),
            Err(LoadCheckError::InvalidMetricName(_))
        ));
        assert!(matches!(registry.rate(""), Err(LoadCheckError::InvalidMetricName(_))));
    }

    #[test]
    fn test_get_rate_kind_mismatch() {
        let mut registry = Registry::new();
        registry.counter("attempts", ValueType::Default).unwrap();

        assert!(matches!(
            registry.get_rate("attempts"),
            Err(LoadCheckError::MetricKindMismatch { .. })
        ));
        assert!(matches!(
            registry.get_rate("missing"),
            Err(LoadCheckError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_rate_values() {
        let rate = Rate::default();
        assert_eq!(rate.rate(), None);

        rate.add(true);
        rate.add(false);
        rate.add(false);
        rate.add(false);

        let values = rate.values().unwrap();
        assert_eq!(values.passes, 1);
        assert_eq!(values.fails, 3);
        assert!((values.rate - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gauge_tracks_extremes() {
        let gauge = Gauge::default();
        assert!(gauge.values().is_none());

        gauge.set(3);
        gauge.set(8);
        gauge.set(1);

        let values = gauge.values().unwrap();
        assert_eq!(values.value, 1);
        assert_eq!(values.min, 1);
        assert_eq!(values.max, 8);
    }

    #[test]
    fn test_trend_percentiles() {
        let trend = Arc::new(Trend::new().unwrap());
        {
            let mut recorder = TrendRecorder::new(trend.clone());
            for ms in 1..=100u64 {
                recorder.add(Duration::from_millis(ms));
            }
        }

        let values = trend.values().unwrap();
        assert!((values.avg - 50.5).abs() < 1e-9);
        assert!((values.min - 1.0).abs() < 1e-9);
        assert!((values.max - 100.0).abs() < 1e-9);
        assert!((values.med - 50.0).abs() <= 1.5);
        assert!((values.p95 - 95.0).abs() <= 1.5);
        assert!((values.p99 - 99.0).abs() <= 1.5);
    }

    #[test]
    fn test_trend_percentile_precision_near_bound() {
        let trend = Arc::new(Trend::new().unwrap());
        let mut recorder = TrendRecorder::new(trend.clone());
        for _ in 0..100 {
            recorder.add(Duration::from_millis(2999));
        }
        recorder.flush();

        // The bucket midpoint lies above 2999ms; clamping keeps it at the max
        let values = trend.values().unwrap();
        assert_eq!(values.p95, 2999.0);
        assert_eq!(values.med, 2999.0);

        let trend = Arc::new(Trend::new().unwrap());
        let mut recorder = TrendRecorder::new(trend.clone());
        for ms in 2000..3000u64 {
            recorder.add(Duration::from_millis(ms));
        }
        recorder.flush();

        let values = trend.values().unwrap();
        assert!((values.p95 - 2950.0).abs() <= 2950.0 * 0.001 + 1.0);
        assert!(values.p99 <= values.max);
    }

    #[test]
    fn test_trend_recorders_merge() {
        let trend = Arc::new(Trend::new().unwrap());
        let mut a = TrendRecorder::new(trend.clone());
        let mut b = TrendRecorder::new(trend.clone());

        a.add(Duration::from_millis(10));
        b.add(Duration::from_millis(30));
        a.flush();
        b.flush();

        let values = trend.values().unwrap();
        assert_eq!(trend.count(), 2);
        assert!((values.avg - 20.0).abs() < 1e-9);
        assert!((values.max - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_skips_unobserved() {
        let mut registry = Registry::new();
        let builtins = BuiltinMetrics::register(&mut registry).unwrap();
        builtins.http_req_failed.add(false);

        let snapshot = registry.snapshot(Duration::from_secs(1));
        assert!(snapshot.contains_key(names::HTTP_REQ_FAILED));
        assert!(!snapshot.contains_key(names::HTTP_REQ_DURATION));
        assert!(!snapshot.contains_key(names::HTTP_REQS));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = MetricSnapshot::Trend {
            contains: ValueType::Time,
            values: TrendValues {
                avg: 1.0,
                min: 1.0,
                med: 1.0,
                max: 1.0,
                p90: 1.0,
                p95: 1.0,
                p99: 1.0,
            },
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["type"], "trend");
        assert_eq!(json["contains"], "time");
        assert_eq!(json["values"]["p(95)"], 1.0);

        let back: MetricSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
