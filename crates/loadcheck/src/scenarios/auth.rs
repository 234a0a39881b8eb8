//! Identity service authentication scenario
//!
//! Each iteration signs in with a pooled test account, signs up a throwaway
//! account and pokes the token refresh endpoint with a dummy token.
//!
//! HTTP 400 is an expected answer on all three endpoints (unknown test
//! account, duplicate sign-up, invalid refresh token) and passes the status
//! checks. Only sign-in and sign-up feed `auth_attempts` and `auth_errors`;
//! an iteration whose sign-in or sign-up failed a check is one error sample.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loadcheck_core::report::{
    Card, Field, Format, Grade, MetricPath, Recommendation, ReportTemplate, Row, Section, Stat,
    Verdict,
};
use loadcheck_core::{
    names, CheckGroup, Counter, LoadCheckError, Predicate, Rate, Registry, Response, Result,
    ValueType,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::scenario::{pick, unique_email, IterationOutcome, Scenario};
use crate::vu::{body_preview, Vu};

/// Sign-in and sign-up requests sent
pub const AUTH_ATTEMPTS: &str = "auth_attempts";

/// Rate of iterations whose sign-in or sign-up failed a check
pub const AUTH_ERRORS: &str = "auth_errors";

const DUMMY_REFRESH_TOKEN: &str = "dummy_refresh_token_for_load_test";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: Option<String>,
}

/// Endpoints with the API key already in their query string
struct Endpoints {
    sign_in: Url,
    sign_up: Url,
    refresh: Url,
}

impl Endpoints {
    fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        let endpoint = |path: &str| {
            let raw = format!("{}{}", base, path);
            Url::parse_with_params(&raw, &[("key", api_key)]).map_err(|e| {
                LoadCheckError::InvalidUrl {
                    url: raw,
                    reason: e.to_string(),
                }
            })
        };

        Ok(Self {
            sign_in: endpoint("/v1/accounts:signInWithPassword")?,
            sign_up: endpoint("/v1/accounts:signUp")?,
            refresh: endpoint("/v1/token")?,
        })
    }
}

/// Sign-in, sign-up and token refresh against the identity service
pub struct AuthScenario {
    endpoints: Endpoints,
    test_emails: Vec<String>,
    password: String,

    attempts: Arc<Counter>,
    errors: Arc<Rate>,

    sign_in_checks: CheckGroup,
    sign_up_checks: CheckGroup,
    refresh_checks: CheckGroup,
}

impl AuthScenario {
    /// Register the scenario's metrics and checks
    pub fn new(config: &AuthConfig, registry: &mut Registry) -> Result<Self> {
        config.validate()?;
        let endpoints = Endpoints::new(&config.base_url, config.require_api_key()?)?;

        let attempts = registry.counter(AUTH_ATTEMPTS, ValueType::Default)?;
        let errors = registry.rate(AUTH_ERRORS)?;

        let sign_in_checks = CheckGroup::new(
            registry,
            [
                ("SignIn request completed", Predicate::status_in([200, 400])),
                ("SignIn response time < 3s", Predicate::duration_below_ms(3000)),
            ],
        )?;
        let sign_up_checks = CheckGroup::new(
            registry,
            [
                ("SignUp request completed", Predicate::status_in([200, 400])),
                ("SignUp response time < 3s", Predicate::duration_below_ms(3000)),
            ],
        )?;
        let refresh_checks = CheckGroup::new(
            registry,
            [
                ("Refresh token endpoint responsive", Predicate::status_in([400, 200])),
                ("Refresh token response time < 2s", Predicate::duration_below_ms(2000)),
            ],
        )?;

        Ok(Self {
            endpoints,
            test_emails: config.test_emails.clone(),
            password: config.password.clone(),
            attempts,
            errors,
            sign_in_checks,
            sign_up_checks,
            refresh_checks,
        })
    }

    /// Count the attempt and fold its checks into the iteration outcome
    fn record_attempt(
        &self,
        outcome: &mut IterationOutcome,
        group: &CheckGroup,
        response: &Response,
    ) -> bool {
        self.attempts.inc();
        outcome.check(group, response)
    }

    async fn sign_in(&self, vu: &mut Vu, outcome: &mut IterationOutcome) {
        // Pool is validated non-empty at construction
        let Some(email) = pick(vu.rng(), &self.test_emails) else {
            return;
        };
        let body = Credentials {
            email,
            password: &self.password,
            return_secure_token: true,
        };

        let response = vu.post_json(self.endpoints.sign_in.as_str(), &body).await;
        self.record_attempt(outcome, &self.sign_in_checks, &response);

        if !response.is_transport_error() && !matches!(response.status, 200 | 400) {
            warn!(
                vu = vu.id(),
                status = response.status,
                body = %body_preview(&response.body, 200),
                "SignIn unexpected status"
            );
        }
    }

    async fn sign_up(&self, vu: &mut Vu, outcome: &mut IterationOutcome) {
        let email = unique_email(vu.rng(), chrono::Utc::now().timestamp_millis());
        let body = Credentials {
            email: &email,
            password: &self.password,
            return_secure_token: true,
        };

        let response = vu.post_json(self.endpoints.sign_up.as_str(), &body).await;
        self.record_attempt(outcome, &self.sign_up_checks, &response);

        let created = response.status == 200
            && matches!(
                response.json::<SignUpResponse>(),
                Ok(SignUpResponse { id_token: Some(_) })
            );
        if created {
            info!(vu = vu.id(), email = %email, "Account created");
        }
    }

    async fn refresh_token(&self, vu: &mut Vu) {
        let body = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: DUMMY_REFRESH_TOKEN,
        };
        let response = vu.post_json(self.endpoints.refresh.as_str(), &body).await;
        self.refresh_checks.evaluate(&response);
    }
}

#[async_trait]
impl Scenario for AuthScenario {
    fn name(&self) -> &str {
        "auth"
    }

    async fn iteration(&self, vu: &mut Vu) {
        let mut outcome = IterationOutcome::default();

        self.sign_in(vu, &mut outcome).await;
        vu.think(Duration::from_secs(1)).await;

        self.sign_up(vu, &mut outcome).await;
        vu.think(Duration::from_secs(2)).await;

        self.refresh_token(vu).await;
        vu.think(Duration::from_secs(1)).await;

        outcome.finish(&self.errors);
    }
}

// ============================================================================
// REPORT
// ============================================================================

const DURATION: &str = names::HTTP_REQ_DURATION;

/// HTML report layout of the auth pipeline
pub fn report_template() -> ReportTemplate {
    let errors = MetricPath::Rate(AUTH_ERRORS);
    let avg = MetricPath::Trend(DURATION, Stat::Avg);
    let p95 = MetricPath::Trend(DURATION, Stat::P95);

    ReportTemplate {
        title: "Firebase Auth Test Report",
        heading: "🔐 Test Firebase Authentication - Flutter E-commerce",
        generated_label: "Généré le",
        extra_styles: &[".warning { color: orange; }"],
        sections: vec![
            Section::Cards {
                heading: "📊 Métriques Firebase Auth",
                cards: vec![
                    Card {
                        label: "Tentatives d'authentification",
                        value: Field::new(MetricPath::Count(AUTH_ATTEMPTS), Format::Integer),
                        grade: None,
                    },
                    Card {
                        label: "Taux d'erreur auth",
                        value: Field::new(errors, Format::Percent),
                        grade: Some(Grade::below(
                            errors,
                            0.2,
                            Verdict::class("pass"),
                            Verdict::class("warning"),
                        )),
                    },
                    Card {
                        label: "Requêtes HTTP totales",
                        value: Field::new(MetricPath::Count(names::HTTP_REQS), Format::Integer),
                        grade: None,
                    },
                ],
            },
            Section::Table {
                heading: "⏱️ Performance Firebase",
                headers: &["Métrique", "Valeur", "Statut"],
                rows: vec![
                    Row {
                        label: "Temps de réponse moyen",
                        value: Field::new(avg, Format::Millis),
                        grade: Some(Grade::below(
                            avg,
                            2000.0,
                            Verdict::new("pass", "✅ Bon"),
                            Verdict::new("warning", "⚠️ Lent"),
                        )),
                    },
                    Row {
                        label: "P95",
                        value: Field::new(p95, Format::Millis),
                        grade: Some(Grade::below(
                            p95,
                            3000.0,
                            Verdict::new("pass", "✅ Accepté"),
                            Verdict::new("fail", "❌ Trop lent"),
                        )),
                    },
                ],
            },
            Section::Thresholds {
                heading: "🎯 Résultats des Tests",
            },
            Section::Notice {
                heading: "📝 Notes Importantes",
                class: "warning",
                lines: &[
                    "⚠️ Ce test utilise des comptes de test temporaires.",
                    "🔒 Les erreurs 400 sont normales pour les tentatives de connexion avec des comptes inexistants.",
                    "📈 Focus sur les temps de réponse et la disponibilité du service Firebase.",
                ],
            },
            Section::Recommendations {
                heading: "📈 Recommandations",
                items: vec![
                    Recommendation {
                        label: "Temps de réponse Firebase < 3s",
                        grade: Grade::below(
                            p95,
                            3000.0,
                            Verdict::new("pass", "✅ Respecté"),
                            Verdict::new("fail", "❌ À surveiller"),
                        ),
                    },
                    Recommendation {
                        label: "Service disponible",
                        grade: Grade::below(
                            MetricPath::Rate(names::HTTP_REQ_FAILED),
                            0.5,
                            Verdict::new("pass", "✅ Stable"),
                            Verdict::new("fail", "❌ Instable"),
                        ),
                    },
                    Recommendation {
                        label: "Performance auth",
                        grade: Grade::below(
                            avg,
                            2000.0,
                            Verdict::new("pass", "🚀 Rapide"),
                            Verdict::new("warning", "⚠️ Peut être optimisé côté client"),
                        ),
                    },
                ],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadcheck_core::BuiltinMetrics;

    fn config() -> AuthConfig {
        AuthConfig {
            api_key: Some("test-key".into()),
            ..Default::default()
        }
    }

    fn scenario(registry: &mut Registry) -> AuthScenario {
        BuiltinMetrics::register(registry).unwrap();
        AuthScenario::new(&config(), registry).unwrap()
    }

    fn response(status: u16) -> Response {
        Response::new(status, Duration::from_millis(250))
    }

    #[test]
    fn test_endpoints_carry_key() {
        let endpoints = Endpoints::new("https://identitytoolkit.googleapis.com/", "a b&c").unwrap();
        assert_eq!(
            endpoints.sign_in.as_str(),
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword?key=a+b%26c"
        );
        assert_eq!(endpoints.sign_up.path(), "/v1/accounts:signUp");
        assert_eq!(endpoints.refresh.path(), "/v1/token");
    }

    #[test]
    fn test_missing_api_key() {
        let mut registry = Registry::new();
        BuiltinMetrics::register(&mut registry).unwrap();
        let result = AuthScenario::new(&AuthConfig::default(), &mut registry);
        assert!(matches!(result, Err(LoadCheckError::Config(_))));
    }

    #[test]
    fn test_400_is_not_an_auth_error() {
        let mut registry = Registry::new();
        let auth = scenario(&mut registry);

        let mut outcome = IterationOutcome::default();
        assert!(auth.record_attempt(&mut outcome, &auth.sign_in_checks, &response(400)));
        assert!(auth.record_attempt(&mut outcome, &auth.sign_up_checks, &response(400)));
        outcome.finish(&auth.errors);

        assert_eq!(auth.attempts.count(), 2);
        assert_eq!(auth.errors.passes(), 0);
        assert_eq!(auth.errors.total(), 1);
    }

    #[test]
    fn test_500_is_an_auth_error() {
        let mut registry = Registry::new();
        let auth = scenario(&mut registry);

        // Failed sign-in, successful sign-up: the iteration still fails
        let mut outcome = IterationOutcome::default();
        assert!(!auth.record_attempt(&mut outcome, &auth.sign_in_checks, &response(500)));
        assert!(auth.record_attempt(&mut outcome, &auth.sign_up_checks, &response(200)));
        outcome.finish(&auth.errors);
        assert_eq!(auth.errors.passes(), 1);

        let slow = Response::new(200, Duration::from_millis(3000));
        let mut outcome = IterationOutcome::default();
        assert!(auth.record_attempt(&mut outcome, &auth.sign_in_checks, &response(200)));
        assert!(!auth.record_attempt(&mut outcome, &auth.sign_up_checks, &slow));
        outcome.finish(&auth.errors);

        let mut outcome = IterationOutcome::default();
        auth.record_attempt(&mut outcome, &auth.sign_in_checks, &response(400));
        auth.record_attempt(&mut outcome, &auth.sign_up_checks, &response(200));
        outcome.finish(&auth.errors);

        assert_eq!(auth.attempts.count(), 6);
        assert_eq!(auth.errors.passes(), 2);
        assert_eq!(auth.errors.total(), 3);
    }

    #[test]
    fn test_refresh_checks_skip_auth_metrics() {
        let mut registry = Registry::new();
        let auth = scenario(&mut registry);

        auth.refresh_checks.evaluate(&response(500));
        assert_eq!(auth.errors.total(), 0);
        assert_eq!(auth.attempts.count(), 0);

        let results = registry.check_results();
        let refresh = results
            .iter()
            .find(|c| c.name == "Refresh token endpoint responsive")
            .unwrap();
        assert_eq!(refresh.fails, 1);
    }

    #[test]
    fn test_request_bodies() {
        let credentials = Credentials {
            email: "a@example.com",
            password: "pw",
            return_secure_token: true,
        };
        assert_eq!(
            serde_json::to_value(&credentials).unwrap(),
            serde_json::json!({"email": "a@example.com", "password": "pw", "returnSecureToken": true})
        );

        let refresh = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: DUMMY_REFRESH_TOKEN,
        };
        assert_eq!(
            serde_json::to_value(&refresh).unwrap()["grant_type"],
            "refresh_token"
        );
    }
}
