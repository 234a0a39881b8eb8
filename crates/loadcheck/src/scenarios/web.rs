//! Web front browsing scenario
//!
//! Each iteration walks the storefront the way a shopper would: home page,
//! catalog, a search, a product page and a category listing, pausing between
//! pages. An iteration with any failed check counts as one `errors` sample.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loadcheck_core::report::{
    Card, Field, Format, Grade, MetricPath, Recommendation, ReportTemplate, Row, Section, Stat,
    Tier, Verdict,
};
use loadcheck_core::{
    names, CheckGroup, LoadCheckError, Predicate, Rate, Registry, Result, Trend, ValueType,
};
use rand::Rng;

use crate::config::WebConfig;
use crate::scenario::{pick, IterationOutcome, Scenario};
use crate::vu::Vu;

/// Rate of iterations with at least one failed check
pub const ERRORS: &str = "errors";

/// Home page load time
pub const PAGE_LOAD_TIME: &str = "page_load_time";

/// Shopper journey through the storefront
pub struct WebScenario {
    base_url: String,
    search_terms: Vec<String>,
    categories: Vec<String>,
    product_count: u32,

    errors: Arc<Rate>,
    page_load_time: Arc<Trend>,

    homepage: CheckGroup,
    catalog: CheckGroup,
    search: CheckGroup,
    product: CheckGroup,
    category: CheckGroup,
}

impl WebScenario {
    /// Register the scenario's metrics and checks
    pub fn new(config: &WebConfig, registry: &mut Registry) -> Result<Self> {
        config.validate()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|e| LoadCheckError::InvalidUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        let errors = registry.rate(ERRORS)?;
        let page_load_time = registry.trend(PAGE_LOAD_TIME, ValueType::Time)?;

        let homepage = CheckGroup::new(
            registry,
            [
                ("Homepage status is 200", Predicate::status_in([200])),
                ("Homepage loads in <2s", Predicate::duration_below_ms(2000)),
            ],
        )?;
        let catalog = CheckGroup::new(
            registry,
            [
                ("Catalog status is 200", Predicate::status_in([200])),
                ("Catalog loads in <3s", Predicate::duration_below_ms(3000)),
            ],
        )?;
        let search = CheckGroup::new(
            registry,
            [("Search status is 200", Predicate::status_in([200]))],
        )?;
        let product = CheckGroup::new(
            registry,
            [("Product page status is 200", Predicate::status_in([200]))],
        )?;
        let category = CheckGroup::new(
            registry,
            [("Category page status is 200", Predicate::status_in([200]))],
        )?;

        Ok(Self {
            base_url,
            search_terms: config.search_terms.clone(),
            categories: config.categories.clone(),
            product_count: config.product_count,
            errors,
            page_load_time,
            homepage,
            catalog,
            search,
            product,
            category,
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }
}

#[async_trait]
impl Scenario for WebScenario {
    fn name(&self) -> &str {
        "web"
    }

    async fn iteration(&self, vu: &mut Vu) {
        let mut outcome = IterationOutcome::default();

        let response = vu.get(&self.url("/")).await;
        outcome.check(&self.homepage, &response);
        vu.record_trend(&self.page_load_time, response.duration);
        vu.think(Duration::from_secs(1)).await;

        let response = vu.get(&self.url("/#/catalog")).await;
        outcome.check(&self.catalog, &response);
        vu.think(Duration::from_secs(1)).await;

        // Pools are validated non-empty at construction
        if let Some(term) = pick(vu.rng(), &self.search_terms) {
            let response = vu.get(&self.url(&format!("/#/catalog?search={}", term))).await;
            outcome.check(&self.search, &response);
        }
        vu.think(Duration::from_secs(1)).await;

        let product_id = vu.rng().gen_range(1..=self.product_count);
        let response = vu.get(&self.url(&format!("/#/product/{}", product_id))).await;
        outcome.check(&self.product, &response);
        vu.think(Duration::from_secs(1)).await;

        if let Some(category) = pick(vu.rng(), &self.categories) {
            let response = vu
                .get(&self.url(&format!("/#/catalog?category={}", category)))
                .await;
            outcome.check(&self.category, &response);
        }
        vu.think(Duration::from_secs(2)).await;

        outcome.finish(&self.errors);
    }
}

// ============================================================================
// REPORT
// ============================================================================

const DURATION: &str = names::HTTP_REQ_DURATION;

const RESPECTED: Verdict = Verdict::new("pass", "✅ Respecté");
const TO_IMPROVE: Verdict = Verdict::new("fail", "❌ À améliorer");

/// HTML report layout of the web pipeline
pub fn report_template() -> ReportTemplate {
    let failed_rate = MetricPath::Rate(names::HTTP_REQ_FAILED);
    let p95 = MetricPath::Trend(DURATION, Stat::P95);
    let avg = MetricPath::Trend(DURATION, Stat::Avg);

    let duration_row = |label, stat| Row {
        label,
        value: Field::new(MetricPath::Trend(DURATION, stat), Format::Millis),
        grade: None,
    };

    ReportTemplate {
        title: "Web Performance Test Report",
        heading: "🚀 Test de Performance Web - Flutter E-commerce",
        generated_label: "Généré le",
        extra_styles: &[],
        sections: vec![
            Section::Cards {
                heading: "📊 Métriques Principales",
                cards: vec![
                    Card {
                        label: "Durée totale",
                        value: Field::new(MetricPath::RunDuration, Format::Seconds),
                        grade: None,
                    },
                    Card {
                        label: "VUs maximum",
                        value: Field::new(MetricPath::GaugeMax(names::VUS_MAX), Format::Integer),
                        grade: None,
                    },
                    Card {
                        label: "Requêtes totales",
                        value: Field::new(MetricPath::Count(names::HTTP_REQS), Format::Integer),
                        grade: None,
                    },
                    Card {
                        label: "Taux d'erreur",
                        value: Field::new(failed_rate, Format::Percent),
                        grade: Some(Grade::below(
                            failed_rate,
                            0.1,
                            Verdict::class("pass"),
                            Verdict::class("fail"),
                        )),
                    },
                ],
            },
            Section::Table {
                heading: "⏱️ Temps de Réponse",
                headers: &["Métrique", "Valeur"],
                rows: vec![
                    duration_row("Moyenne", Stat::Avg),
                    duration_row("P50 (médiane)", Stat::Med),
                    duration_row("P95", Stat::P95),
                    duration_row("P99", Stat::P99),
                    duration_row("Maximum", Stat::Max),
                ],
            },
            Section::Thresholds {
                heading: "🎯 Validation des Seuils",
            },
            Section::Recommendations {
                heading: "📈 Recommandations",
                items: vec![
                    Recommendation {
                        label: "Temps de réponse P95 < 2s",
                        grade: Grade::below(p95, 2000.0, RESPECTED, TO_IMPROVE),
                    },
                    Recommendation {
                        label: "Taux d'erreur < 10%",
                        grade: Grade::below(failed_rate, 0.1, RESPECTED, TO_IMPROVE),
                    },
                    Recommendation {
                        label: "Performance globale",
                        grade: Grade::tiered(
                            avg,
                            vec![
                                Tier {
                                    below: 1000.0,
                                    verdict: Verdict::new("pass", "🚀 Excellente"),
                                },
                                Tier {
                                    below: 2000.0,
                                    verdict: Verdict::new("pass", "👍 Bonne"),
                                },
                            ],
                            Verdict::new("warning", "⚠️ À optimiser"),
                        ),
                    },
                ],
            },
        ],
    }
}
