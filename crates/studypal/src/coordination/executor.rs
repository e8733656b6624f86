//! Grouped concurrent executor
//!
//! Runs the coordinator's concurrency groups one after another. Agents inside a group run
//! as separate tokio tasks over a shared read-only snapshot of the state; once the whole
//! group has resolved, successful outputs are merged back by the executor alone.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::{
    agents::{StudyAgent, StudyAgents},
    config::ExecutorConfig,
    state::{AgentKind, AgentOutput, SharedState},
    workflow::{panic_message, Stage, StageId},
    Result, StudypalError,
};

pub struct ConcurrentGroupExecutor {
    agents: BTreeMap<AgentKind, Arc<dyn StudyAgent>>,
    config: ExecutorConfig,
}

impl ConcurrentGroupExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            agents: BTreeMap::new(),
            config,
        })
    }

    /// Executor with the planner, note writer and advisor registered
    pub fn from_agents(agents: &StudyAgents, config: ExecutorConfig) -> Result<Self> {
        let executor = Self::new(config)?;
        Ok(agents
            .concurrent_agents()
            .into_iter()
            .fold(executor, |executor, agent| executor.with_agent(agent)))
    }

    /// Register an agent; a later registration for the same kind replaces the earlier one
    pub fn with_agent(mut self, agent: Arc<dyn StudyAgent>) -> Self {
        self.agents.insert(agent.kind(), agent);
        self
    }

    pub fn registered(&self) -> BTreeSet<AgentKind> {
        self.agents.keys().copied().collect()
    }

    /// Run every concurrency group of the recorded coordinator analysis and merge the
    /// successful outputs into `results.agentOutputs`.
    ///
    /// Failures of individual agents are logged and leave no key behind. Without an
    /// analysis the fallback plan is merged instead.
    pub async fn execute(&self, state: &mut SharedState) {
        let Some(analysis) = state.results.coordinator_analysis.clone() else {
            tracing::warn!("[EXECUTOR] No coordinator analysis recorded, using fallback plan");
            state
                .results
                .merge_agent_output(AgentKind::Planner, AgentOutput::fallback_plan());
            return;
        };

        let mut groups = analysis.concurrent_groups.clone();
        let grouped: BTreeSet<AgentKind> = groups.iter().flatten().copied().collect();
        let ungrouped: BTreeSet<AgentKind> = analysis
            .required_agents
            .difference(&grouped)
            .copied()
            .collect();
        if !ungrouped.is_empty() {
            // Required agents missing from every group run after the listed groups
            groups.push(ungrouped);
        }

        for (index, group) in groups.iter().enumerate() {
            let selected: Vec<Arc<dyn StudyAgent>> = group
                .iter()
                .filter(|kind| analysis.required_agents.contains(*kind))
                .filter_map(|kind| match self.agents.get(kind) {
                    Some(agent) => Some(agent.clone()),
                    None => {
                        tracing::warn!("[EXECUTOR] Agent '{}' is not registered, skipping", kind);
                        None
                    }
                })
                .collect();

            if selected.is_empty() {
                tracing::debug!("[EXECUTOR] Group {} has nothing to run", index + 1);
                continue;
            }

            let outputs = self.run_group(index, selected, state).await;
            state.results.merge_agent_outputs(outputs);
        }
    }

    async fn run_group(
        &self,
        index: usize,
        agents: Vec<Arc<dyn StudyAgent>>,
        state: &SharedState,
    ) -> Vec<(AgentKind, AgentOutput)> {
        tracing::info!(
            "[EXECUTOR] Running group {} with {} agents (parallelism {})",
            index + 1,
            agents.len(),
            self.config.parallelism_limit
        );

        let snapshot = Arc::new(state.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism_limit));
        let timeout = self.config.stage_timeout();

        let mut kinds = Vec::with_capacity(agents.len());
        let mut handles = Vec::with_capacity(agents.len());
        for agent in agents {
            kinds.push(agent.kind());
            handles.push(tokio::spawn(run_agent(
                agent,
                snapshot.clone(),
                semaphore.clone(),
                timeout,
            )));
        }

        let mut outputs = Vec::new();
        for (kind, outcome) in kinds.into_iter().zip(join_all(handles).await) {
            match outcome {
                Ok(Ok(output)) => {
                    tracing::info!("[EXECUTOR] Agent '{}' completed", kind);
                    outputs.push((kind, output));
                }
                Ok(Err(e)) => {
                    tracing::warn!("[EXECUTOR] Agent '{}' failed: {}", kind, e);
                }
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic().as_ref());
                    tracing::warn!("[EXECUTOR] Agent '{}' panicked: {}", kind, message);
                }
                Err(e) => {
                    tracing::warn!("[EXECUTOR] Agent '{}' task aborted: {}", kind, e);
                }
            }
        }

        tracing::info!(
            "[EXECUTOR] Group {} finished with {} successful outputs",
            index + 1,
            outputs.len()
        );
        outputs
    }
}

async fn run_agent(
    agent: Arc<dyn StudyAgent>,
    snapshot: Arc<SharedState>,
    semaphore: Arc<Semaphore>,
    timeout: Option<Duration>,
) -> Result<AgentOutput> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|e| StudypalError::StageError(format!("Semaphore error: {}", e)))?;

    match timeout {
        Some(limit) => tokio::time::timeout(limit, agent.run(&snapshot))
            .await
            .map_err(|_| {
                StudypalError::StageError(format!(
                    "Agent '{}' timed out after {}s",
                    agent.kind(),
                    limit.as_secs()
                ))
            })?,
        None => agent.run(&snapshot).await,
    }
}

#[async_trait]
impl Stage for ConcurrentGroupExecutor {
    fn id(&self) -> StageId {
        StageId::Execute
    }

    async fn invoke(&self, state: &mut SharedState) -> Result<()> {
        self.execute(state).await;
        Ok(())
    }
}
