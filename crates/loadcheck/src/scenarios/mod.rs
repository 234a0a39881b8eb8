//! Built-in pipelines

pub mod auth;
pub mod web;

use std::fmt;
use std::str::FromStr;

use loadcheck_core::ReportTemplate;
use serde::{Deserialize, Serialize};

pub use auth::AuthScenario;
pub use web::WebScenario;

/// The two load-test pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    /// Storefront browsing
    Web,
    /// Identity service sign-in, sign-up and token refresh
    Auth,
}

impl Pipeline {
    /// Artifact prefix: `<name>-summary.html`, `<name>-summary.json`
    pub fn artifact_name(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Auth => "firebase",
        }
    }

    pub fn report_template(self) -> ReportTemplate {
        match self {
            Self::Web => web::report_template(),
            Self::Auth => auth::report_template(),
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Web => write!(f, "web"),
            Self::Auth => write!(f, "auth"),
        }
    }
}

impl FromStr for Pipeline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "auth" | "firebase" => Ok(Self::Auth),
            other => Err(format!("unknown pipeline {:?} (expected web or auth)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_names() {
        assert_eq!("web".parse::<Pipeline>().unwrap(), Pipeline::Web);
        assert_eq!("firebase".parse::<Pipeline>().unwrap(), Pipeline::Auth);
        assert!("mobile".parse::<Pipeline>().is_err());

        assert_eq!(Pipeline::Auth.artifact_name(), "firebase");
        assert_eq!(Pipeline::Auth.to_string(), "auth");
        assert_eq!(Pipeline::Web.report_template().title, "Web Performance Test Report");
    }
}
