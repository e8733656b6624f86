//! Workflow engine - owns the stage graph and drives a run to a terminal status

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::broadcast;

use super::{
    routing::{CoordinationRoute, FeedbackRoute, ProgressRoute, RoutingPolicy},
    Stage, StageId, WorkflowEvent,
};
use crate::{
    config::{ConfigError, WorkflowConfig},
    state::{CompletionReason, SharedState, WorkflowStatus},
    Result, StudypalError,
};

/// Hard backstop on stage executions per run, independent of the state counters
pub const DEFAULT_STEP_LIMIT: u32 = 100;

/// Decision functions that can sit on a conditional edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Router {
    /// After `evaluateProgress`: review, re-plan, or on to feedback
    Progress,
    /// After `provideFeedback`: another session or terminate
    Feedback,
    /// After the concurrent execute stage: re-coordinate or terminate
    Coordination,
}

impl Router {
    /// Stages this router may send the run to
    pub fn targets(&self) -> &'static [StageId] {
        match self {
            Router::Progress => &[
                StageId::ProcessMaterial,
                StageId::CreatePlan,
                StageId::ProvideFeedback,
            ],
            Router::Feedback => &[StageId::ExecuteSession],
            Router::Coordination => &[StageId::Coordinator],
        }
    }

    fn resolve(&self, policy: &RoutingPolicy, state: &mut SharedState) -> Result<Transition> {
        let transition = match self {
            Router::Progress => match policy.route_progress(state)? {
                ProgressRoute::ReviewMaterial => {
                    state.set_status(WorkflowStatus::Processing);
                    Transition::Next(StageId::ProcessMaterial)
                }
                ProgressRoute::AdjustPlan => {
                    state.set_status(WorkflowStatus::Processing);
                    Transition::Next(StageId::CreatePlan)
                }
                ProgressRoute::Complete(reason) => {
                    // Feedback still runs; the reason is applied when the feedback router ends the run
                    state.set_pending_completion(reason);
                    Transition::Next(StageId::ProvideFeedback)
                }
            },
            Router::Feedback => {
                let pending = state.take_pending_completion();
                match (pending, policy.route_feedback(state)) {
                    (Some(reason), _) => Transition::End(reason),
                    (None, FeedbackRoute::Complete(reason)) => Transition::End(reason),
                    (None, FeedbackRoute::NextSession) => {
                        state.set_status(WorkflowStatus::Processing);
                        Transition::Next(StageId::ExecuteSession)
                    }
                }
            }
            Router::Coordination => match policy.route_coordination(state)? {
                CoordinationRoute::Reassess => Transition::Next(StageId::Coordinator),
                CoordinationRoute::Complete(reason) => Transition::End(reason),
            },
        };
        Ok(transition)
    }
}

/// Outgoing edge of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Direct(StageId),
    Conditional(Router),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(StageId),
    End(CompletionReason),
}

/// Runs a fixed graph of stages over one [`SharedState`]
pub struct WorkflowEngine {
    stages: HashMap<StageId, Arc<dyn Stage>>,
    edges: HashMap<StageId, Edge>,
    entry: StageId,
    policy: RoutingPolicy,
    step_limit: u32,
    event_sender: broadcast::Sender<WorkflowEvent>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stages: Vec<_> = self.stages.keys().collect();
        stages.sort();
        f.debug_struct("WorkflowEngine")
            .field("entry", &self.entry)
            .field("stages", &stages)
            .field("step_limit", &self.step_limit)
            .finish()
    }
}

impl WorkflowEngine {
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new()
    }

    pub fn entry(&self) -> StageId {
        self.entry
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn step_limit(&self) -> u32 {
        self.step_limit
    }

    pub fn edge(&self, from: StageId) -> Option<Edge> {
        self.edges.get(&from).copied()
    }

    /// Subscribe to run events. Events sent while nobody listens are dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_sender.subscribe()
    }

    fn emit(&self, event: WorkflowEvent) {
        let _ = self.event_sender.send(event);
    }

    /// Execute a run to completion.
    ///
    /// Never returns an error: invalid seed data, stage errors and stage panics all end
    /// in `failed` with `error` set, and every other path ends in `complete` with a
    /// recorded [`CompletionReason`].
    pub async fn run(&self, initial: SharedState) -> SharedState {
        let mut state = initial;
        state.begin_run();

        let run_id = state.run_id;
        let started = Instant::now();

        tracing::info!("[WORKFLOW] Starting run {} at '{}'", run_id, self.entry);
        self.emit(WorkflowEvent::WorkflowStarted {
            run_id,
            entry: self.entry,
        });

        if let Err(err) = self.check_input(&state) {
            tracing::error!("[WORKFLOW] Run {} rejected: {}", run_id, err);
            state.fail(err.to_string());
            self.finish(&state, 0, started);
            return state;
        }

        let mut current = self.entry;
        let mut steps = 0u32;

        loop {
            if steps >= self.step_limit {
                tracing::warn!(
                    "[WORKFLOW] Step limit of {} reached at '{}', stopping run {}",
                    self.step_limit,
                    current,
                    run_id
                );
                state.complete(CompletionReason::StepLimit);
                break;
            }

            let Some(stage) = self.stages.get(&current) else {
                state.fail(format!("Stage '{}' is not registered", current));
                break;
            };

            steps += 1;
            state.enter_stage(current);
            self.emit(WorkflowEvent::StageStarted {
                run_id,
                stage: current,
                step: steps,
            });
            tracing::info!("[WORKFLOW] Executing stage {}: {}", steps, current);

            let stage_started = Instant::now();
            let outcome = AssertUnwindSafe(stage.invoke(&mut state))
                .catch_unwind()
                .await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
            };

            match failure {
                None => {
                    let execution_time_ms = stage_started.elapsed().as_millis() as u64;
                    tracing::info!(
                        "[WORKFLOW] Stage '{}' completed in {}ms",
                        current,
                        execution_time_ms
                    );
                    self.emit(WorkflowEvent::StageCompleted {
                        run_id,
                        stage: current,
                        step: steps,
                        execution_time_ms,
                    });
                }
                Some(error) => {
                    tracing::error!("[WORKFLOW] Stage '{}' failed: {}", current, error);
                    self.emit(WorkflowEvent::StageFailed {
                        run_id,
                        stage: current,
                        error: error.clone(),
                    });
                    state.fail(format!("Stage '{}' failed: {}", current, error));
                }
            }

            if state.status().is_terminal() {
                break;
            }

            match self.next_transition(current, &mut state) {
                Ok(Transition::Next(next)) => {
                    tracing::debug!("[WORKFLOW] Routing '{}' -> '{}'", current, next);
                    self.emit(WorkflowEvent::Routed {
                        run_id,
                        from: current,
                        to: Some(next),
                    });
                    current = next;
                }
                Ok(Transition::End(reason)) => {
                    if reason.is_ceiling() {
                        tracing::warn!("[WORKFLOW] Run {} stopped: {}", run_id, reason);
                    }
                    self.emit(WorkflowEvent::Routed {
                        run_id,
                        from: current,
                        to: None,
                    });
                    state.complete(reason);
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        "[ROUTING] Routing after '{}' failed, terminating run: {}",
                        current,
                        err
                    );
                    state.complete(CompletionReason::RoutingFailure);
                    break;
                }
            }
        }

        self.finish(&state, steps, started);
        state
    }

    fn check_input(&self, state: &SharedState) -> Result<()> {
        let stage = self.stages.get(&self.entry).ok_or_else(|| {
            StudypalError::GraphError(format!("Entry stage '{}' is not registered", self.entry))
        })?;
        stage.check_input(state)
    }

    fn next_transition(&self, from: StageId, state: &mut SharedState) -> Result<Transition> {
        match self.edges.get(&from) {
            Some(Edge::Direct(to)) => Ok(Transition::Next(*to)),
            Some(Edge::Conditional(router)) => router.resolve(&self.policy, state),
            None => Err(StudypalError::GraphError(format!(
                "Stage '{}' has no outgoing edge",
                from
            ))),
        }
    }

    fn finish(&self, state: &SharedState, steps: u32, started: Instant) {
        let run_id = state.run_id;
        let execution_time_ms = started.elapsed().as_millis() as u64;

        match (state.status(), state.completion()) {
            (WorkflowStatus::Complete, Some(reason)) => {
                tracing::info!(
                    "[WORKFLOW] Run {} complete after {} steps ({})",
                    run_id,
                    steps,
                    reason
                );
                self.emit(WorkflowEvent::WorkflowCompleted {
                    run_id,
                    reason,
                    steps,
                    execution_time_ms,
                });
            }
            _ => {
                let error = state.error().unwrap_or("run did not complete").to_string();
                tracing::error!("[WORKFLOW] Run {} failed: {}", run_id, error);
                self.emit(WorkflowEvent::WorkflowFailed {
                    run_id,
                    error,
                    stage: state.current_stage(),
                });
            }
        }
    }
}

/// Render a panic payload for the state's error message
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Builder for [`WorkflowEngine`]; the graph is validated once in [`WorkflowEngineBuilder::build`]
pub struct WorkflowEngineBuilder {
    stages: HashMap<StageId, Arc<dyn Stage>>,
    edges: Vec<(StageId, Edge)>,
    duplicate_stages: Vec<StageId>,
    entry: Option<StageId>,
    config: WorkflowConfig,
    step_limit: u32,
}

impl Default for WorkflowEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowEngineBuilder {
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
            edges: Vec::new(),
            duplicate_stages: Vec::new(),
            entry: None,
            config: WorkflowConfig::default(),
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn add_stage(self, stage: impl Stage + 'static) -> Self {
        self.add_shared_stage(Arc::new(stage))
    }

    pub fn add_shared_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        let id = stage.id();
        if self.stages.insert(id, stage).is_some() {
            self.duplicate_stages.push(id);
        }
        self
    }

    pub fn add_edge(mut self, from: StageId, to: StageId) -> Self {
        self.edges.push((from, Edge::Direct(to)));
        self
    }

    pub fn add_conditional_edge(mut self, from: StageId, router: Router) -> Self {
        self.edges.push((from, Edge::Conditional(router)));
        self
    }

    pub fn entry(mut self, stage: StageId) -> Self {
        self.entry = Some(stage);
        self
    }

    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn step_limit(mut self, limit: u32) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn build(self) -> Result<WorkflowEngine> {
        self.config.validate()?;
        if self.step_limit == 0 {
            return Err(ConfigError::ZeroLimit { field: "stepLimit" }.into());
        }

        if let Some(id) = self.duplicate_stages.first() {
            return Err(graph_error(format!("Stage '{}' registered twice", id)));
        }

        let entry = self
            .entry
            .ok_or_else(|| graph_error("No entry stage specified".to_string()))?;
        if !self.stages.contains_key(&entry) {
            return Err(graph_error(format!("Entry stage '{}' not found", entry)));
        }

        let mut edges = HashMap::new();
        for (from, edge) in self.edges {
            if !self.stages.contains_key(&from) {
                return Err(graph_error(format!("Edge source '{}' not found", from)));
            }

            let targets: &[StageId] = match &edge {
                Edge::Direct(to) => std::slice::from_ref(to),
                Edge::Conditional(router) => router.targets(),
            };
            if let Some(missing) = targets.iter().find(|to| !self.stages.contains_key(*to)) {
                return Err(graph_error(format!(
                    "Edge target '{}' from '{}' not found",
                    missing, from
                )));
            }

            if edges.insert(from, edge).is_some() {
                return Err(graph_error(format!(
                    "Stage '{}' has more than one outgoing edge",
                    from
                )));
            }
        }

        let mut ids: Vec<_> = self.stages.keys().copied().collect();
        ids.sort();
        if let Some(dead_end) = ids.iter().find(|id| !edges.contains_key(*id)) {
            return Err(graph_error(format!(
                "Stage '{}' has no outgoing edge",
                dead_end
            )));
        }

        let (event_sender, _) = broadcast::channel(1000);

        Ok(WorkflowEngine {
            stages: self.stages,
            edges,
            entry,
            policy: RoutingPolicy::new(self.config),
            step_limit: self.step_limit,
            event_sender,
        })
    }
}

fn graph_error(message: String) -> StudypalError {
    StudypalError::GraphError(message)
}
