//! Coordinator loop - coordinator, profile analysis and grouped concurrent execution
//!
//! `coordinator -> profileAnalyzer -> execute`, then back to the coordinator until every
//! required agent has produced output or the coordination round ceiling is reached.

mod coordinator;
mod executor;

use std::sync::Arc;

pub use coordinator::{
    analyze_context, parse_coordinator_response, CoordinatorStage, ProfileAnalysisStage,
};
pub use executor::ConcurrentGroupExecutor;

use crate::{
    agents::StudyAgents,
    brain::TextGenerator,
    config::{ExecutorConfig, WorkflowConfig},
    workflow::{Router, StageId, WorkflowEngine},
    Result,
};

impl WorkflowEngine {
    /// Coordinator loop over the default study agents
    pub fn coordinator_loop(
        generator: Arc<dyn TextGenerator>,
        agents: &StudyAgents,
        executor: ExecutorConfig,
        config: WorkflowConfig,
    ) -> Result<WorkflowEngine> {
        Self::coordinator_loop_with(
            CoordinatorStage::new(generator),
            ProfileAnalysisStage::new(agents.profile_analyzer.clone()),
            ConcurrentGroupExecutor::from_agents(agents, executor)?,
            config,
        )
    }

    /// Coordinator loop over explicitly constructed stages
    pub fn coordinator_loop_with(
        coordinator: CoordinatorStage,
        profile_analysis: ProfileAnalysisStage,
        executor: ConcurrentGroupExecutor,
        config: WorkflowConfig,
    ) -> Result<WorkflowEngine> {
        WorkflowEngine::builder()
            .add_stage(coordinator)
            .add_stage(profile_analysis)
            .add_stage(executor)
            .add_edge(StageId::Coordinator, StageId::ProfileAnalyzer)
            .add_edge(StageId::ProfileAnalyzer, StageId::Execute)
            .add_conditional_edge(StageId::Execute, Router::Coordination)
            .entry(StageId::Coordinator)
            .config(config)
            .build()
    }
}
