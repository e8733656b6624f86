//! Engine configuration
//!
//! Every field is optional on the wire; missing fields take the defaults below.
//! Counts are unsigned, so negative values are rejected at deserialization and
//! [`WorkflowConfig::validate`] only has to police the rates and zero limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub const DEFAULT_RECURSION_LIMIT: u32 = 25;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MIN_COMPLETION_RATE: f64 = 0.7;
pub const DEFAULT_MIN_UNDERSTANDING_LEVEL: f64 = 0.6;
pub const DEFAULT_MAX_REVIEW_ATTEMPTS: u32 = 2;
pub const DEFAULT_MAX_PLAN_ADJUSTMENTS: u32 = 2;
pub const DEFAULT_MAX_COORDINATION_ROUNDS: u32 = 5;
pub const DEFAULT_PARALLELISM_LIMIT: usize = 4;

/// Rejected engine configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be within [0, 1], got {value}")]
    RateOutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be greater than zero")]
    ZeroLimit { field: &'static str },
}

/// Ceilings and quality thresholds applied by the routing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowConfig {
    /// Upper bound on progress evaluations (`iterationCount`)
    pub recursion_limit: u32,
    /// Upper bound on `attempts`
    pub max_attempts: u32,
    /// Share of plan tasks that must be completed
    pub min_completion_rate: f64,
    /// Mean focus score the latest session must reach
    pub min_understanding_level: f64,
    pub max_review_attempts: u32,
    pub max_plan_adjustments: u32,
    /// Upper bound on coordinator re-assessments in the coordinator loop
    pub max_coordination_rounds: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_completion_rate: DEFAULT_MIN_COMPLETION_RATE,
            min_understanding_level: DEFAULT_MIN_UNDERSTANDING_LEVEL,
            max_review_attempts: DEFAULT_MAX_REVIEW_ATTEMPTS,
            max_plan_adjustments: DEFAULT_MAX_PLAN_ADJUSTMENTS,
            max_coordination_rounds: DEFAULT_MAX_COORDINATION_ROUNDS,
        }
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_rate("minCompletionRate", self.min_completion_rate)?;
        check_rate("minUnderstandingLevel", self.min_understanding_level)?;

        if self.recursion_limit == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "recursionLimit",
            });
        }

        Ok(())
    }
}

fn check_rate(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::RateOutOfRange { field, value })
    }
}

/// Settings for the concurrent group executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
    /// Maximum agents running at once inside one group
    pub parallelism_limit: usize,
    /// Per-agent time budget; `None` waits indefinitely
    pub stage_timeout_secs: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallelism_limit: DEFAULT_PARALLELISM_LIMIT,
            stage_timeout_secs: None,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism_limit == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "parallelismLimit",
            });
        }
        if self.stage_timeout_secs == Some(0) {
            return Err(ConfigError::ZeroLimit {
                field: "stageTimeoutSecs",
            });
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}
