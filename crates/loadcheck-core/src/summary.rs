//! Summary snapshot handed to the report renderer at the end of a run

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::check::CheckResult;
use crate::error::Result;
use crate::metrics::{
    names, CounterValues, GaugeValues, MetricSnapshot, RateValues, Registry, TrendValues,
};
use crate::threshold::{ThresholdResult, Thresholds};

/// Run-level facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub test_run_duration_ms: f64,
}

/// Final, immutable aggregation of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySnapshot {
    pub state: RunState,

    /// Metrics with at least one observation
    pub metrics: BTreeMap<String, MetricSnapshot>,

    /// Threshold outcomes keyed by `<metric>: <expression>`
    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdResult>,

    /// Per-check tallies in declaration order
    #[serde(default)]
    pub checks: Vec<CheckResult>,
}

impl SummarySnapshot {
    /// Freeze the registry and evaluate thresholds against it
    pub fn collect(registry: &Registry, thresholds: &Thresholds, elapsed: Duration) -> Self {
        let metrics = registry.snapshot(elapsed);
        let thresholds = thresholds.evaluate(&metrics);
        Self {
            state: RunState {
                test_run_duration_ms: elapsed.as_secs_f64() * 1000.0,
            },
            metrics,
            thresholds,
            checks: registry.check_results(),
        }
    }

    /// True when every threshold passed
    pub fn passed(&self) -> bool {
        self.thresholds.values().all(|t| t.ok)
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &str> {
        self.thresholds
            .iter()
            .filter(|(_, t)| !t.ok)
            .map(|(name, _)| name.as_str())
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.get(name)
    }

    pub fn counter(&self, name: &str) -> Option<&CounterValues> {
        self.metric(name).and_then(MetricSnapshot::as_counter)
    }

    pub fn gauge(&self, name: &str) -> Option<&GaugeValues> {
        self.metric(name).and_then(MetricSnapshot::as_gauge)
    }

    pub fn rate(&self, name: &str) -> Option<&RateValues> {
        self.metric(name).and_then(MetricSnapshot::as_rate)
    }

    pub fn trend(&self, name: &str) -> Option<&TrendValues> {
        self.metric(name).and_then(MetricSnapshot::as_trend)
    }

    /// Pretty JSON with 2-space indentation
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Print formatted console report
    pub fn print_report(&self, title: &str) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║ {:<60} ║", title);
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!(
            "║ Duration:          {:>10.2} seconds                        ║",
            self.state.test_run_duration_ms / 1000.0
        );
        if let Some(reqs) = self.counter(names::HTTP_REQS) {
            println!(
                "║ Requests:          {:>10} ({:>8.2}/s)                   ║",
                reqs.count, reqs.rate
            );
        }
        if let Some(failed) = self.rate(names::HTTP_REQ_FAILED) {
            println!(
                "║ Failed:            {:>10.2}%                               ║",
                failed.rate * 100.0
            );
        }
        if let Some(iterations) = self.counter(names::ITERATIONS) {
            println!(
                "║ Iterations:        {:>10}                                 ║",
                iterations.count
            );
        }
        if let Some(vus) = self.gauge(names::VUS_MAX) {
            println!(
                "║ VUs max:           {:>10}                                 ║",
                vus.max
            );
        }

        if let Some(duration) = self.trend(names::HTTP_REQ_DURATION) {
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ LATENCY (milliseconds)                                       ║");
            for (label, value) in [
                ("avg", duration.avg),
                ("med", duration.med),
                ("p90", duration.p90),
                ("p95", duration.p95),
                ("p99", duration.p99),
                ("max", duration.max),
            ] {
                println!("║   {:<16}{:>10.2}                                 ║", label, value);
            }
        }

        if !self.checks.is_empty() {
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ CHECKS                                                       ║");
            for check in &self.checks {
                let mark = if check.fails == 0 { "✓" } else { "✗" };
                println!(
                    "║   {} {:<40} {:>6} / {:<6} ║",
                    mark,
                    check.name,
                    check.passes,
                    check.passes + check.fails
                );
            }
        }

        if !self.thresholds.is_empty() {
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ THRESHOLDS                                                   ║");
            for (name, result) in &self.thresholds {
                let status = if result.ok { "✅ PASS" } else { "❌ FAIL" };
                println!("║   {:<48} {} ║", name, status);
            }
        }

        println!("╚══════════════════════════════════════════════════════════════╝\n");
    }
}
