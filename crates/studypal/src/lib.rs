//! # Studypal - Study Plan Orchestration
//!
//! Coordinates a pipeline of study agents over one shared state to produce a
//! personalised study plan from profile, calendar and task data.
//!
//! Two control shapes are provided on top of the same [`WorkflowEngine`]:
//!
//! - the **study workflow**, a cyclic graph that analyses the profile, summarises
//!   material, plans, runs sessions and loops back for review or re-planning based on
//!   progress scores, bounded by attempt and iteration ceilings
//! - the **coordinator loop**, which asks a coordinator which agents are required and
//!   runs them in concurrency groups until every required agent has produced output

pub mod agents;
pub mod brain;
pub mod config;
pub mod coordination;
pub mod data;
pub mod state;
pub mod workflow;

#[cfg(test)]
mod coordination_tests;
#[cfg(test)]
mod test_support;

pub use agents::{Advisor, NoteWriter, Planner, ProfileAnalyzer, StudyAgent, StudyAgents};
pub use brain::{LLMConfig, OpenAIProvider, ProviderError, TextGenerator};
pub use config::{ConfigError, ExecutorConfig, WorkflowConfig};
pub use coordination::{ConcurrentGroupExecutor, CoordinatorStage};
pub use data::DataManager;
pub use state::{
    AgentKind, AgentOutput, CompletionReason, CoordinatorAnalysis, Feedback, SharedState,
    StudyPlan, WorkflowStatus,
};
pub use workflow::{
    RoutingError, RoutingPolicy, Stage, StageId, WorkflowEngine, WorkflowEngineBuilder,
    WorkflowEvent,
};

/// Main error types for Studypal operations
#[derive(Debug, thiserror::Error)]
pub enum StudypalError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Invalid workflow graph: {0}")]
    GraphError(String),

    #[error("Input error: {0}")]
    InputError(String),

    #[error("Stage error: {0}")]
    StageError(String),

    #[error("Routing error: {0}")]
    RoutingError(#[from] RoutingError),

    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StudypalError>;
