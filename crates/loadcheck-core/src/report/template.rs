//! Declarative report templates
//!
//! A template is a list of sections whose rows are `{label, metric path,
//! formatter, grade}` tuples. Grades use hard-coded cutoffs that are
//! independent from the run's thresholds.

use crate::summary::SummarySnapshot;

/// Placeholder for values whose metric has no observations
pub const MISSING: &str = "N/A";

/// Trend statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Avg,
    Min,
    Med,
    P90,
    P95,
    P99,
    Max,
}

/// Where a value lives in the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricPath {
    Trend(&'static str, Stat),
    Rate(&'static str),
    Count(&'static str),
    GaugeMax(&'static str),
    /// Run duration in milliseconds
    RunDuration,
}

impl MetricPath {
    pub fn resolve(&self, snapshot: &SummarySnapshot) -> Option<f64> {
        let value = match *self {
            Self::Trend(name, stat) => {
                let t = snapshot.trend(name)?;
                match stat {
                    Stat::Avg => t.avg,
                    Stat::Min => t.min,
                    Stat::Med => t.med,
                    Stat::P90 => t.p90,
                    Stat::P95 => t.p95,
                    Stat::P99 => t.p99,
                    Stat::Max => t.max,
                }
            }
            Self::Rate(name) => snapshot.rate(name)?.rate,
            Self::Count(name) => snapshot.counter(name)?.count as f64,
            Self::GaugeMax(name) => snapshot.gauge(name)?.max as f64,
            Self::RunDuration => snapshot.state.test_run_duration_ms,
        };
        value.is_finite().then_some(value)
    }
}

/// Value formatter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Rounded milliseconds, `1235ms`
    Millis,
    /// Fraction as a percentage with two decimals, `12.50%`
    Percent,
    /// Rounded integer
    Integer,
    /// Milliseconds as rounded seconds, `301s`
    Seconds,
}

impl Format {
    pub fn apply(self, value: f64) -> String {
        match self {
            Self::Millis => format!("{}ms", value.round() as i64),
            Self::Percent => format!("{:.2}%", value * 100.0),
            Self::Integer => format!("{}", value.round() as i64),
            Self::Seconds => format!("{}s", (value / 1000.0).round() as i64),
        }
    }
}

/// A formatted snapshot value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub path: MetricPath,
    pub format: Format,
}

impl Field {
    pub const fn new(path: MetricPath, format: Format) -> Self {
        Self { path, format }
    }

    pub fn render(&self, snapshot: &SummarySnapshot) -> String {
        self.path
            .resolve(snapshot)
            .map(|v| self.format.apply(v))
            .unwrap_or_else(|| MISSING.to_string())
    }
}

/// CSS class and text shown for a graded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub class: &'static str,
    pub text: &'static str,
}

impl Verdict {
    pub const fn new(class: &'static str, text: &'static str) -> Self {
        Self { class, text }
    }

    /// Verdict that only colors its value
    pub const fn class(class: &'static str) -> Self {
        Self { class, text: "" }
    }
}

/// Verdict applied when the value is strictly below `below`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tier {
    pub below: f64,
    pub verdict: Verdict,
}

/// Severity classification over fixed cutoffs
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub path: MetricPath,
    pub tiers: Vec<Tier>,
    pub otherwise: Verdict,
}

impl Grade {
    /// `pass` when the value is below `cutoff`, `otherwise` else
    pub fn below(path: MetricPath, cutoff: f64, pass: Verdict, otherwise: Verdict) -> Self {
        Self::tiered(
            path,
            vec![Tier {
                below: cutoff,
                verdict: pass,
            }],
            otherwise,
        )
    }

    /// First tier whose cutoff the value is below wins
    pub fn tiered(path: MetricPath, tiers: Vec<Tier>, otherwise: Verdict) -> Self {
        Self {
            path,
            tiers,
            otherwise,
        }
    }

    /// A missing value takes the fallback verdict
    pub fn verdict(&self, snapshot: &SummarySnapshot) -> Verdict {
        self.path
            .resolve(snapshot)
            .and_then(|value| {
                self.tiers
                    .iter()
                    .find(|tier| value < tier.below)
                    .map(|tier| tier.verdict)
            })
            .unwrap_or(self.otherwise)
    }
}

/// Headline value in a highlighted block
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub label: &'static str,
    pub value: Field,
    pub grade: Option<Grade>,
}

/// Table line; a grade adds a status cell
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub label: &'static str,
    pub value: Field,
    pub grade: Option<Grade>,
}

/// Checklist item rendered as `label: verdict text`
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub label: &'static str,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    Cards {
        heading: &'static str,
        cards: Vec<Card>,
    },
    Table {
        heading: &'static str,
        headers: &'static [&'static str],
        rows: Vec<Row>,
    },
    /// Threshold outcomes from the snapshot
    Thresholds { heading: &'static str },
    /// Fixed text block
    Notice {
        heading: &'static str,
        class: &'static str,
        lines: &'static [&'static str],
    },
    Recommendations {
        heading: &'static str,
        items: Vec<Recommendation>,
    },
}

/// Full description of one pipeline's HTML report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTemplate {
    pub title: &'static str,
    pub heading: &'static str,
    /// Prefix of the generation timestamp line
    pub generated_label: &'static str,
    /// CSS rules added after the base pass/fail rules
    pub extra_styles: &'static [&'static str],
    pub sections: Vec<Section>,
}
