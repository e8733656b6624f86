//! Workflow engine - stage graph, routing policy and the primary study workflow

mod engine;
mod events;
mod routing;
mod stage;
mod stages;

pub(crate) use engine::panic_message;
pub use engine::{Edge, Router, Transition, WorkflowEngine, WorkflowEngineBuilder, DEFAULT_STEP_LIMIT};
pub use events::WorkflowEvent;
pub use routing::{
    CoordinationRoute, FeedbackRoute, ProgressMetrics, ProgressRoute, RoutingError, RoutingPolicy,
};
pub use stage::{Stage, StageId};
pub use stages::{
    AnalyzeProfileStage, CreatePlanStage, EvaluateProgressStage, ExecuteSessionStage,
    ProcessMaterialStage, ProvideFeedbackStage, DEFAULT_FOCUS_SCORE,
};
