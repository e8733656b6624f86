use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use super::StageId;
use crate::state::CompletionReason;

/// Events emitted while a run progresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    WorkflowStarted {
        run_id: Uuid,
        entry: StageId,
    },
    StageStarted {
        run_id: Uuid,
        stage: StageId,
        step: u32,
    },
    StageCompleted {
        run_id: Uuid,
        stage: StageId,
        step: u32,
        execution_time_ms: u64,
    },
    StageFailed {
        run_id: Uuid,
        stage: StageId,
        error: String,
    },
    /// A decision or direct edge was followed; `to` is `None` when the run terminates
    Routed {
        run_id: Uuid,
        from: StageId,
        to: Option<StageId>,
    },
    WorkflowCompleted {
        run_id: Uuid,
        reason: CompletionReason,
        steps: u32,
        execution_time_ms: u64,
    },
    WorkflowFailed {
        run_id: Uuid,
        error: String,
        stage: Option<StageId>,
    },
}
