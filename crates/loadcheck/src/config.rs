//! Run configuration
//!
//! Every field has a default matching the reference load profiles, so an
//! empty (or absent) TOML file yields a runnable configuration. Only the
//! identity-service API key has no default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use loadcheck_core::{LoadCheckError, RampProfile, Result, Stage};
use serde::{Deserialize, Serialize};

/// Full loadcheck configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadCheckConfig {
    /// Executor and HTTP client settings
    pub runtime: RuntimeConfig,

    /// Artifact output
    pub report: ReportConfig,

    /// Web front pipeline
    pub web: WebConfig,

    /// Authentication pipeline
    pub auth: AuthConfig,
}

impl LoadCheckConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LoadCheckError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| LoadCheckError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ============================================================================
// RUNTIME
// ============================================================================

/// Executor settings shared by both pipelines
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Per-request timeout
    #[serde(with = "loadcheck_core::stage::duration_literal")]
    pub request_timeout: Duration,

    /// Time VUs get to finish their iteration once the schedule ends
    #[serde(with = "loadcheck_core::stage::duration_literal")]
    pub graceful_stop: Duration,

    /// Controller tick driving the VU target
    #[serde(with = "loadcheck_core::stage::duration_literal")]
    pub tick: Duration,

    /// Multiplier applied to every think-time pause
    pub think_time_scale: f64,

    /// Seed for the per-VU random sources, random when absent
    pub seed: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            graceful_stop: Duration::from_secs(30),
            tick: Duration::from_millis(100),
            think_time_scale: 1.0,
            seed: None,
        }
    }
}

/// Upper bound on `think_time_scale`: a 2s pause stretches to at most 33 minutes
pub const MAX_THINK_TIME_SCALE: f64 = 1000.0;

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick.is_zero() {
            return Err(LoadCheckError::Config("runtime.tick must be positive".into()));
        }
        if !(0.0..=MAX_THINK_TIME_SCALE).contains(&self.think_time_scale) {
            return Err(LoadCheckError::Config(format!(
                "runtime.think_time_scale must be between 0 and {}, got {}",
                MAX_THINK_TIME_SCALE, self.think_time_scale
            )));
        }
        Ok(())
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory receiving `<name>-summary.html` and `<name>-summary.json`
    pub dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("reports"),
        }
    }
}

// ============================================================================
// PIPELINES
// ============================================================================

/// Thresholds keyed by metric name
pub type ThresholdConfig = BTreeMap<String, Vec<String>>;

fn thresholds(entries: &[(&str, &str)]) -> ThresholdConfig {
    let mut config = ThresholdConfig::new();
    for (metric, expression) in entries {
        config
            .entry(metric.to_string())
            .or_default()
            .push(expression.to_string());
    }
    config
}

fn stages(entries: &[(u64, u32)]) -> Vec<Stage> {
    entries
        .iter()
        .map(|&(secs, target)| Stage::new(Duration::from_secs(secs), target))
        .collect()
}

fn strings(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| s.to_string()).collect()
}

/// Web front pipeline settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Application origin, without trailing slash
    pub base_url: String,

    /// VU ramp
    pub stages: Vec<Stage>,

    /// Pass/fail gates
    pub thresholds: ThresholdConfig,

    /// Catalog search terms picked uniformly per iteration
    pub search_terms: Vec<String>,

    /// Catalog categories picked uniformly per iteration
    pub categories: Vec<String>,

    /// Product ids are drawn from `1..=product_count`
    pub product_count: u32,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            base_url: "https://flutterecommerce-fc124.firebaseapp.com".to_string(),
            stages: stages(&[(30, 5), (60, 10), (120, 20), (60, 30), (30, 0)]),
            thresholds: thresholds(&[
                ("http_req_duration", "p(95)<2000"),
                ("http_req_failed", "rate<0.1"),
                ("errors", "rate<0.1"),
            ]),
            search_terms: strings(&["smartphone", "ordinateur", "casque", "montre"]),
            categories: strings(&["electronique", "vetements", "maison", "sport"]),
            product_count: 20,
        }
    }
}

impl WebConfig {
    pub fn profile(&self) -> Result<RampProfile> {
        RampProfile::new(self.stages.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_terms.is_empty() {
            return Err(LoadCheckError::EmptyPool("web.search_terms"));
        }
        if self.categories.is_empty() {
            return Err(LoadCheckError::EmptyPool("web.categories"));
        }
        if self.product_count == 0 {
            return Err(LoadCheckError::EmptyPool("web.product_count"));
        }
        self.profile().map(|_| ())
    }
}

/// Authentication pipeline settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Identity service origin
    pub base_url: String,

    /// API key sent as the `key` query parameter
    pub api_key: Option<String>,

    /// VU ramp
    pub stages: Vec<Stage>,

    /// Pass/fail gates
    pub thresholds: ThresholdConfig,

    /// Sign-in accounts picked uniformly per iteration
    pub test_emails: Vec<String>,

    /// Password used for sign-in and sign-up
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "https://identitytoolkit.googleapis.com".to_string(),
            api_key: None,
            stages: stages(&[(30, 2), (60, 5), (60, 8), (30, 0)]),
            thresholds: thresholds(&[
                ("http_req_duration", "p(95)<3000"),
                ("auth_errors", "rate<0.2"),
            ]),
            test_emails: (1..=5)
                .map(|i| format!("loadtest{}@example.com", i))
                .collect(),
            password: "TestPassword123!".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn profile(&self) -> Result<RampProfile> {
        RampProfile::new(self.stages.clone())
    }

    /// The API key, which must be configured before the pipeline can run
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                LoadCheckError::Config(
                    "auth.api_key is required (config file, --api-key or LOADCHECK_API_KEY)"
                        .into(),
                )
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.test_emails.is_empty() {
            return Err(LoadCheckError::EmptyPool("auth.test_emails"));
        }
        self.require_api_key()?;
        self.profile().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoadCheckConfig::default();

        assert_eq!(config.runtime.request_timeout, Duration::from_secs(30));
        assert_eq!(config.report.dir, PathBuf::from("reports"));

        let web = config.web.profile().unwrap();
        assert_eq!(web.total_duration(), Duration::from_secs(300));
        assert_eq!(web.max_target(), 30);
        assert_eq!(config.web.thresholds["errors"], vec!["rate<0.1"]);

        let auth = config.auth.profile().unwrap();
        assert_eq!(auth.total_duration(), Duration::from_secs(180));
        assert_eq!(auth.max_target(), 8);
        assert_eq!(config.auth.test_emails.len(), 5);
        assert_eq!(config.auth.test_emails[0], "loadtest1@example.com");
        assert!(config.auth.api_key.is_none());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = LoadCheckConfig::from_toml("").unwrap();
        assert_eq!(config, LoadCheckConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = LoadCheckConfig::from_toml(
            r#"
            [runtime]
            seed = 7
            tick = "250ms"

            [web]
            base_url = "http://localhost:8080"

            [[web.stages]]
            duration = "10s"
            target = 3

            [web.thresholds]
            http_req_duration = ["p(95)<500", "avg<200"]

            [auth]
            api_key = "test-key"
            test_emails = ["only@example.com"]
            "#,
        )
        .unwrap();

        assert_eq!(config.runtime.seed, Some(7));
        assert_eq!(config.runtime.tick, Duration::from_millis(250));
        assert_eq!(config.runtime.graceful_stop, Duration::from_secs(30));
        assert_eq!(config.web.base_url, "http://localhost:8080");
        assert_eq!(config.web.stages, vec![Stage::new(Duration::from_secs(10), 3)]);
        assert_eq!(config.web.thresholds.len(), 1);
        assert_eq!(config.web.categories.len(), 4);
        assert_eq!(config.auth.require_api_key().unwrap(), "test-key");
        assert!(config.auth.validate().is_ok());
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let sample = include_str!("../../../config/loadcheck.toml");
        assert_eq!(
            LoadCheckConfig::from_toml(sample).unwrap(),
            LoadCheckConfig::default()
        );
    }

    #[test]
    fn test_invalid_toml() {
        let err = LoadCheckConfig::from_toml("[web]\nstages = [{ duration = \"ten\", target = 1 }]")
            .unwrap_err();
        assert!(matches!(err, LoadCheckError::Config(_)));
    }

    #[test]
    fn test_validation() {
        let mut auth = AuthConfig::default();
        assert!(auth.validate().is_err());

        auth.api_key = Some("  ".into());
        assert!(auth.require_api_key().is_err());

        auth.api_key = Some("key".into());
        auth.test_emails.clear();
        assert!(matches!(
            auth.validate(),
            Err(LoadCheckError::EmptyPool("auth.test_emails"))
        ));

        let mut web = WebConfig::default();
        web.categories.clear();
        assert!(matches!(
            web.validate(),
            Err(LoadCheckError::EmptyPool("web.categories"))
        ));

        for scale in [-1.0, f64::NAN, f64::INFINITY, 1e300] {
            let runtime = RuntimeConfig {
                think_time_scale: scale,
                ..Default::default()
            };
            assert!(runtime.validate().is_err(), "accepted scale {}", scale);
        }
        let runtime = RuntimeConfig {
            think_time_scale: MAX_THINK_TIME_SCALE,
            ..Default::default()
        };
        assert!(runtime.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loadcheck.toml");

        let mut config = LoadCheckConfig::default();
        config.auth.api_key = Some("abc".into());
        config.save(&path).unwrap();

        let loaded = LoadCheckConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
