//! # Checks
//!
//! Named boolean predicates evaluated against each HTTP response.
//!
//! A [`CheckGroup`] is declared once per call site at configuration time. Every
//! evaluation runs all of its predicates, records each outcome into the
//! built-in `checks` rate and the per-check tally, and returns whether all of
//! them held. What a failed group means (an error-rate sample, a log line) is
//! up to the scenario.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::{names, Rate, Registry};

// ============================================================================
// RESPONSE
// ============================================================================

/// Outcome of one HTTP call
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status, 0 when the request never got an answer
    pub status: u16,

    /// Raw body
    pub body: Bytes,

    /// Time from send to end of body
    pub duration: Duration,

    /// Transport error text, if the request failed before a status arrived
    pub error: Option<String>,
}

impl Response {
    pub fn new(status: u16, duration: Duration) -> Self {
        Self {
            status,
            body: Bytes::new(),
            duration,
            error: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Response for a request that failed in transport
    pub fn transport_error(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: 0,
            body: Bytes::new(),
            duration,
            error: Some(error.into()),
        }
    }

    pub fn is_transport_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

// ============================================================================
// PREDICATES
// ============================================================================

/// Condition a response must satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Status is one of the listed codes
    StatusIn(Vec<u16>),

    /// Duration strictly below the ceiling
    DurationBelow(Duration),
}

impl Predicate {
    pub fn status_in(statuses: impl Into<Vec<u16>>) -> Self {
        Self::StatusIn(statuses.into())
    }

    pub fn duration_below_ms(ms: u64) -> Self {
        Self::DurationBelow(Duration::from_millis(ms))
    }

    pub fn holds(&self, response: &Response) -> bool {
        match self {
            Self::StatusIn(allowed) => allowed.contains(&response.status),
            Self::DurationBelow(ceiling) => response.duration < *ceiling,
        }
    }
}

// ============================================================================
// TALLIES
// ============================================================================

/// Pass/fail counts of one named check
#[derive(Debug, Default)]
pub struct CheckTally {
    passes: AtomicU64,
    fails: AtomicU64,
}

impl CheckTally {
    pub fn record(&self, passed: bool) {
        let counter = if passed { &self.passes } else { &self.fails };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn result(&self, name: &str) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            passes: self.passes.load(Ordering::Relaxed),
            fails: self.fails.load(Ordering::Relaxed),
        }
    }
}

/// Final pass/fail counts of one named check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

// ============================================================================
// CHECK GROUP
// ============================================================================

#[derive(Debug, Clone)]
struct Check {
    name: String,
    predicate: Predicate,
    tally: Arc<CheckTally>,
}

/// Predicates applied together to one response
#[derive(Debug, Clone)]
pub struct CheckGroup {
    checks: Vec<Check>,
    checks_rate: Arc<Rate>,
}

impl CheckGroup {
    /// Declare a group; the registry must already hold the built-in `checks` rate
    pub fn new<I, S>(registry: &mut Registry, checks: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Predicate)>,
        S: Into<String>,
    {
        let checks_rate = registry.get_rate(names::CHECKS)?;
        let checks = checks
            .into_iter()
            .map(|(name, predicate)| {
                let name = name.into();
                let tally = registry.check_tally(&name);
                Check {
                    name,
                    predicate,
                    tally,
                }
            })
            .collect();

        Ok(Self {
            checks,
            checks_rate,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|c| c.name.as_str())
    }

    /// Evaluate every predicate, record the outcomes, return their conjunction
    pub fn evaluate(&self, response: &Response) -> bool {
        let mut all_passed = true;
        for check in &self.checks {
            let passed = check.predicate.holds(response);
            check.tally.record(passed);
            self.checks_rate.add(passed);
            all_passed &= passed;
        }
        all_passed
    }
}
