//! # loadcheck
//!
//! Load tests for the Flutter e-commerce storefront and its identity service.
//!
//! ## Pipelines
//!
//! - **web**: home, catalog, search, product and category pages per iteration
//! - **auth**: sign-in, sign-up and token refresh per iteration
//!
//! Each pipeline ramps virtual users along its stages, checks every response,
//! evaluates thresholds at the end of the run and writes
//! `<name>-summary.html` / `<name>-summary.json`.
//!
//! ## Usage
//!
//! ```bash
//! # Storefront run with the default profile
//! loadcheck web
//!
//! # Auth run against a local emulator
//! LOADCHECK_API_KEY=... loadcheck auth --base-url http://localhost:9099/identitytoolkit.googleapis.com
//!
//! # Rebuild the HTML report of a saved snapshot
//! loadcheck render --pipeline web --summary reports/web-summary.json
//! ```

pub mod config;
pub mod executor;
pub mod pipeline;
pub mod scenario;
pub mod scenarios;
pub mod vu;

pub use config::{AuthConfig, LoadCheckConfig, ReportConfig, RuntimeConfig, WebConfig};
pub use executor::RampingExecutor;
pub use pipeline::{render_saved, run, RunOutcome};
pub use scenario::Scenario;
pub use scenarios::Pipeline;
pub use vu::Vu;
