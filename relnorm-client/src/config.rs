//! Solver client configuration
//!
//! Carries the solver base URL plus the per-session knobs every solver
//! request repeats: the correlation id the server namespaces its session
//! keys with, and the solver budget (time limit, Monte Carlo sampling).

use serde::{Deserialize, Serialize};

/// Configuration for one normalization session against a solver.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverConfig {
    base_url: String,
    /// Correlation id sent with every request; the server uses it to
    /// namespace session state. Generated fresh unless supplied.
    pub computation_id: String,
    /// Solver time budget in seconds.
    pub time_limit: u32,
    /// Ask the solver to estimate via Monte Carlo sampling.
    pub monte_carlo: bool,
    /// Sample count when `monte_carlo` is set; 0 lets the solver choose.
    pub samples: u32,
}

impl SolverConfig {
    /// Create a config for the given solver host.
    ///
    /// `base_url` is normalized: trailing slashes are stripped and
    /// `/normalize` is appended if absent.
    pub fn new(base_url: impl Into<String>) -> Self {
        let raw = base_url.into();
        let trimmed = raw.trim_end_matches('/').to_string();
        let normalized = if trimmed.ends_with("/normalize") {
            trimmed
        } else {
            format!("{}/normalize", trimmed)
        };
        Self {
            base_url: normalized,
            computation_id: uuid::Uuid::new_v4().to_string(),
            time_limit: 30,
            monte_carlo: false,
            samples: 0,
        }
    }

    /// The normalized base URL, e.g. `http://localhost:8080/normalize`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn with_computation_id(mut self, id: impl Into<String>) -> Self {
        self.computation_id = id.into();
        self
    }

    pub fn with_time_limit(mut self, seconds: u32) -> Self {
        self.time_limit = seconds;
        self
    }

    pub fn with_monte_carlo(mut self, enabled: bool, samples: u32) -> Self {
        self.monte_carlo = enabled;
        self.samples = samples;
        self
    }
}
