//! End-to-end pipeline: configure, run, aggregate, report

use std::path::Path;
use std::sync::Arc;

use loadcheck_core::report::{self, ArtifactPaths};
use loadcheck_core::{
    BuiltinMetrics, LoadCheckError, RampProfile, Registry, Result, SummarySnapshot, Thresholds,
};
use tracing::info;

use crate::config::{LoadCheckConfig, ThresholdConfig};
use crate::executor::RampingExecutor;
use crate::scenario::Scenario;
use crate::scenarios::{AuthScenario, Pipeline, WebScenario};

/// Format of the generation timestamp embedded in HTML reports
const GENERATED_AT_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Result of a finished run
#[derive(Debug)]
pub struct RunOutcome {
    pub snapshot: SummarySnapshot,
    pub artifacts: ArtifactPaths,
}

impl RunOutcome {
    /// True when every threshold passed
    pub fn passed(&self) -> bool {
        self.snapshot.passed()
    }
}

/// Everything a run needs, validated before any request is sent
struct Prepared {
    registry: Arc<Registry>,
    builtins: Arc<BuiltinMetrics>,
    scenario: Arc<dyn Scenario>,
    thresholds: Thresholds,
    profile: RampProfile,
}

fn prepare(pipeline: Pipeline, config: &LoadCheckConfig) -> Result<Prepared> {
    config.runtime.validate()?;

    let mut registry = Registry::new();
    let builtins = Arc::new(BuiltinMetrics::register(&mut registry)?);

    let (scenario, profile, threshold_config): (Arc<dyn Scenario>, RampProfile, &ThresholdConfig) =
        match pipeline {
            Pipeline::Web => (
                Arc::new(WebScenario::new(&config.web, &mut registry)?) as Arc<dyn Scenario>,
                config.web.profile()?,
                &config.web.thresholds,
            ),
            Pipeline::Auth => (
                Arc::new(AuthScenario::new(&config.auth, &mut registry)?) as Arc<dyn Scenario>,
                config.auth.profile()?,
                &config.auth.thresholds,
            ),
        };

    let thresholds = Thresholds::from_config(threshold_config, &registry)?;

    Ok(Prepared {
        registry: Arc::new(registry),
        builtins,
        scenario,
        thresholds,
        profile,
    })
}

fn http_client(config: &LoadCheckConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.runtime.request_timeout)
        .user_agent(concat!("loadcheck/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LoadCheckError::Config(format!("HTTP client: {}", e)))
}

fn generated_at() -> String {
    chrono::Local::now().format(GENERATED_AT_FORMAT).to_string()
}

/// Run `pipeline` to completion and write its report artifacts
pub async fn run(pipeline: Pipeline, config: &LoadCheckConfig) -> Result<RunOutcome> {
    let prepared = prepare(pipeline, config)?;
    let client = http_client(config)?;
    let seed = config.runtime.seed.unwrap_or_else(rand::random);

    info!(
        %pipeline,
        seed,
        metrics = prepared.registry.len(),
        thresholds = prepared.thresholds.len(),
        "Pipeline configured"
    );

    let executor = RampingExecutor::new(prepared.profile, &config.runtime, seed);
    let elapsed = executor
        .run(prepared.scenario, client, prepared.builtins)
        .await;

    let snapshot = SummarySnapshot::collect(&prepared.registry, &prepared.thresholds, elapsed);
    let rendered = report::render(&pipeline.report_template(), &snapshot, &generated_at())?;
    let artifacts = rendered.write(&config.report.dir, pipeline.artifact_name())?;

    Ok(RunOutcome {
        snapshot,
        artifacts,
    })
}

/// Re-render the report of a saved JSON snapshot, without any network traffic
pub fn render_saved(pipeline: Pipeline, summary: &Path, out_dir: &Path) -> Result<RunOutcome> {
    let json = std::fs::read_to_string(summary)?;
    let snapshot = SummarySnapshot::from_json(&json)?;

    let rendered = report::render(&pipeline.report_template(), &snapshot, &generated_at())?;
    let artifacts = rendered.write(out_dir, pipeline.artifact_name())?;
    info!(%pipeline, source = %summary.display(), "Report re-rendered");

    Ok(RunOutcome {
        snapshot,
        artifacts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_default_web() {
        let prepared = prepare(Pipeline::Web, &LoadCheckConfig::default()).unwrap();
        assert_eq!(prepared.thresholds.len(), 3);
        assert_eq!(prepared.profile.max_target(), 30);
        assert_eq!(prepared.scenario.name(), "web");
    }

    #[test]
    fn test_prepare_rejects_unknown_threshold_metric() {
        let mut config = LoadCheckConfig::default();
        config
            .web
            .thresholds
            .insert("auth_errors".into(), vec!["rate<0.2".into()]);

        assert!(matches!(
            prepare(Pipeline::Web, &config),
            Err(LoadCheckError::UnknownMetric(name)) if name == "auth_errors"
        ));
    }

    #[test]
    fn test_prepare_auth_requires_key() {
        let mut config = LoadCheckConfig::default();
        assert!(prepare(Pipeline::Auth, &config).is_err());

        config.auth.api_key = Some("key".into());
        let prepared = prepare(Pipeline::Auth, &config).unwrap();
        assert_eq!(prepared.thresholds.len(), 2);
        assert!(prepared.registry.get("auth_attempts").is_some());
    }

    #[test]
    fn test_render_saved() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("saved.json");
        std::fs::write(
            &source,
            r#"{
              "state": {"testRunDurationMs": 180000.0},
              "metrics": {
                "auth_errors": {"type": "rate", "contains": "default", "values": {"rate": 0.05, "passes": 1, "fails": 19}}
              },
              "thresholds": {"auth_errors: rate<0.2": {"ok": true}}
            }"#,
        )
        .unwrap();

        let out = dir.path().join("out");
        let outcome = render_saved(Pipeline::Auth, &source, &out).unwrap();
        assert!(outcome.passed());
        assert_eq!(outcome.artifacts.html, out.join("firebase-summary.html"));

        let html = std::fs::read_to_string(&outcome.artifacts.html).unwrap();
        assert!(html.contains("<span class=\"pass\">5.00%</span>"));
        assert!(html.contains("✅ auth_errors: rate&lt;0.2"));
        assert!(html.contains("<strong>Tentatives d'authentification:</strong> N/A"));
    }

    #[test]
    fn test_render_saved_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = render_saved(Pipeline::Web, &dir.path().join("nope.json"), dir.path());
        assert!(matches!(result, Err(LoadCheckError::Io(_))));
    }
}
