//! # loadcheck core
//!
//! Network-free building blocks of a loadcheck run.
//!
//! ## Modules
//!
//! - **stage**: Ramp stages, duration literals, VU schedule interpolation
//! - **metrics**: Counter, gauge, rate and trend metrics on a shared registry
//! - **check**: Named response predicates with per-check tallies
//! - **threshold**: `p(95)<3000`-style pass/fail gates
//! - **summary**: Frozen end-of-run snapshot and console report
//! - **report**: Declarative HTML templates and artifact writing
//!
//! ## Flow
//!
//! ```text
//! Registry ──► VUs push observations ──► SummarySnapshot::collect
//!                                              │
//!                          Thresholds ─────────┤
//!                                              ▼
//!                          ReportTemplate ──► render ──► *-summary.html / *-summary.json
//! ```

pub mod check;
pub mod error;
pub mod metrics;
pub mod report;
pub mod stage;
pub mod summary;
pub mod threshold;

pub use check::{CheckGroup, CheckResult, Predicate, Response};
pub use error::{LoadCheckError, Result};
pub use metrics::{
    names, BuiltinMetrics, Counter, Gauge, MetricKind, MetricSnapshot, Rate, Registry, Trend,
    TrendRecorder, ValueType,
};
pub use report::{render, ArtifactPaths, RenderedReport, ReportTemplate};
pub use stage::{parse_duration, RampProfile, Stage};
pub use summary::SummarySnapshot;
pub use threshold::{Threshold, ThresholdResult, Thresholds};
