//! Stage interface

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{state::SharedState, Result};

/// Closed set of stage identifiers used by both workflow shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub enum StageId {
    AnalyzeProfile,
    ProcessMaterial,
    CreatePlan,
    ExecuteSession,
    EvaluateProgress,
    ProvideFeedback,
    Coordinator,
    ProfileAnalyzer,
    Execute,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::AnalyzeProfile => "analyzeProfile",
            StageId::ProcessMaterial => "processMaterial",
            StageId::CreatePlan => "createPlan",
            StageId::ExecuteSession => "executeSession",
            StageId::EvaluateProgress => "evaluateProgress",
            StageId::ProvideFeedback => "provideFeedback",
            StageId::Coordinator => "coordinator",
            StageId::ProfileAnalyzer => "profileAnalyzer",
            StageId::Execute => "execute",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work in the workflow graph.
///
/// A stage has exclusive access to the state for the duration of `invoke` and must not
/// keep a reference to it afterwards. Returning an error fails the run; the engine also
/// catches panics raised from `invoke`.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Validate seed data before the run starts. Only called for the entry stage.
    fn check_input(&self, _state: &SharedState) -> Result<()> {
        Ok(())
    }

    async fn invoke(&self, state: &mut SharedState) -> Result<()>;
}
