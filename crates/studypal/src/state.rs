//! Shared state threaded through every stage of a run

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::workflow::StageId;

/// Number of plan tasks scheduled into one study session
pub const SESSION_TASK_LIMIT: usize = 3;

/// Lifecycle status of a run. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Processing,
    Reviewing,
    Complete,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Complete | WorkflowStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Processing => "processing",
            WorkflowStatus::Reviewing => "reviewing",
            WorkflowStatus::Complete => "complete",
            WorkflowStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run reached `complete`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub enum CompletionReason {
    CompletionThreshold,
    UnderstandingThreshold,
    SessionComplete,
    NoFeedback,
    AgentsSatisfied,
    AttemptCeiling,
    IterationCeiling,
    ReviewCeiling,
    PlanAdjustmentCeiling,
    CoordinationCeiling,
    StepLimit,
    /// A routing policy could not evaluate the state; the run stops instead of looping
    RoutingFailure,
    /// The termination predicate observed a failed status
    RunFailed,
}

impl CompletionReason {
    /// True when the run stopped because a configured ceiling was exhausted
    pub fn is_ceiling(&self) -> bool {
        matches!(
            self,
            CompletionReason::AttemptCeiling
                | CompletionReason::IterationCeiling
                | CompletionReason::ReviewCeiling
                | CompletionReason::PlanAdjustmentCeiling
                | CompletionReason::CoordinationCeiling
                | CompletionReason::StepLimit
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            CompletionReason::CompletionThreshold => "plan completion rate reached",
            CompletionReason::UnderstandingThreshold => "understanding level reached",
            CompletionReason::SessionComplete => "advisor marked the session complete",
            CompletionReason::NoFeedback => "no feedback to act on",
            CompletionReason::AgentsSatisfied => "all required agents produced output",
            CompletionReason::AttemptCeiling => "attempt ceiling reached",
            CompletionReason::IterationCeiling => "iteration ceiling reached",
            CompletionReason::ReviewCeiling => "review attempt ceiling reached",
            CompletionReason::PlanAdjustmentCeiling => "plan adjustment ceiling reached",
            CompletionReason::CoordinationCeiling => "coordination round ceiling reached",
            CompletionReason::StepLimit => "engine step limit reached",
            CompletionReason::RoutingFailure => "routing policy failed",
            CompletionReason::RunFailed => "run already failed",
        }
    }
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Agents the concurrent executor can schedule.
///
/// Names are case-insensitive on the way in and lowercase on the way out, so
/// `PLANNER`, `Planner` and `planner` all refer to the same agent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum AgentKind {
    Planner,
    NoteWriter,
    Advisor,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Planner, AgentKind::NoteWriter, AgentKind::Advisor];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Planner => "planner",
            AgentKind::NoteWriter => "notewriter",
            AgentKind::Advisor => "advisor",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "planner" => Ok(AgentKind::Planner),
            "notewriter" => Ok(AgentKind::NoteWriter),
            "advisor" => Ok(AgentKind::Advisor),
            _ => Err(format!("Unknown agent: {}", s)),
        }
    }
}

impl TryFrom<String> for AgentKind {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Output of one concurrent agent, merged into `results.agentOutputs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AgentOutput {
    Plan { plan: String, tasks: Vec<PlanTask> },
    Notes { notes: String },
    Guidance {
        guidance: String,
        recommendations: Vec<String>,
    },
}

impl AgentOutput {
    /// Minimal plan substituted when the executor cannot run at all
    pub fn fallback_plan() -> Self {
        AgentOutput::Plan {
            plan: "Emergency fallback plan".to_string(),
            tasks: Vec::new(),
        }
    }
}

/// Which agents a coordinator round requires and how to group them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorAnalysis {
    pub required_agents: BTreeSet<AgentKind>,
    #[serde(default)]
    pub priority: BTreeMap<AgentKind, u32>,
    /// Groups run one after another; agents inside a group run concurrently
    #[serde(default)]
    pub concurrent_groups: Vec<BTreeSet<AgentKind>>,
    #[serde(default)]
    pub reasoning: String,
}

impl CoordinatorAnalysis {
    pub fn planner_only(reasoning: impl Into<String>) -> Self {
        Self {
            required_agents: BTreeSet::from([AgentKind::Planner]),
            priority: BTreeMap::from([(AgentKind::Planner, 1)]),
            concurrent_groups: vec![BTreeSet::from([AgentKind::Planner])],
            reasoning: reasoning.into(),
        }
    }

    /// Build an analysis from free-form agent names, normalising case.
    /// Names that match no known agent are dropped.
    pub fn from_names<S: AsRef<str>>(required: &[S], groups: &[Vec<S>]) -> Self {
        let required_agents: BTreeSet<AgentKind> = parse_agent_names(required).collect();
        let priority = required_agents
            .iter()
            .enumerate()
            .map(|(idx, kind)| (*kind, idx as u32 + 1))
            .collect();
        let concurrent_groups = groups
            .iter()
            .map(|group| parse_agent_names(group).collect::<BTreeSet<_>>())
            .filter(|group| !group.is_empty())
            .collect();

        Self {
            required_agents,
            priority,
            concurrent_groups,
            reasoning: String::new(),
        }
    }

    /// Add an agent to the required set and to group `group`, opening new groups as needed
    pub fn require(&mut self, kind: AgentKind, priority: u32, group: usize) {
        self.required_agents.insert(kind);
        self.priority.entry(kind).or_insert(priority);
        while self.concurrent_groups.len() <= group {
            self.concurrent_groups.push(BTreeSet::new());
        }
        self.concurrent_groups[group].insert(kind);
    }
}

fn parse_agent_names<S: AsRef<str>>(names: &[S]) -> impl Iterator<Item = AgentKind> + '_ {
    names.iter().filter_map(|name| match name.as_ref().parse() {
        Ok(kind) => Some(kind),
        Err(err) => {
            tracing::warn!("[STATE] Dropping agent name: {}", err);
            None
        }
    })
}

/// Structured profile analysis produced by the profile analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ProfileAnalysis {
    pub user_id: Option<String>,
    pub session_structure: String,
    pub environment: String,
    pub learning_methods: Vec<String>,
    pub focus_strategies: Vec<String>,
    pub summary: String,
    pub analyzed_at: DateTime<Utc>,
}

/// One summarised pass over the study material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub content: String,
    pub key_points: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct PlanTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Focus score the session assigns this task when it is worked on
    #[serde(default)]
    pub expected_focus: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub tasks: Vec<PlanTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlan {
    pub subject: Option<String>,
    pub overview: String,
    pub tasks: Vec<PlanTask>,
    pub current_session: StudySession,
    pub created_at: DateTime<Utc>,
}

impl StudyPlan {
    pub fn new(subject: Option<String>, overview: String, tasks: Vec<PlanTask>) -> Self {
        let mut plan = Self {
            subject,
            overview,
            tasks,
            current_session: StudySession::default(),
            created_at: Utc::now(),
        };
        plan.advance_session();
        plan
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|task| task.completed).count()
    }

    pub fn all_tasks_completed(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|task| task.completed)
    }

    pub fn mark_completed(&mut self, task_id: &str) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == task_id) {
            Some(task) => {
                task.completed = true;
                true
            }
            None => false,
        }
    }

    /// Schedule the next outstanding tasks into the current session
    pub fn advance_session(&mut self) {
        self.current_session.tasks = self
            .tasks
            .iter()
            .filter(|task| !task.completed)
            .take(SESSION_TASK_LIMIT)
            .cloned()
            .collect();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct TaskFocus {
    pub task_id: String,
    pub focus_score: f64,
    pub completed: bool,
}

/// Outcome of the latest study session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub start_time: DateTime<Utc>,
    pub completed_task_count: u32,
    pub focus_scores: Vec<TaskFocus>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvaluation {
    pub assessment: String,
    pub next_steps: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub session_complete: bool,
    pub message: String,
    pub recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-agent outputs plus the coordinator's working notes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Results {
    pub coordinator_analysis: Option<CoordinatorAnalysis>,
    pub profile_analysis: Option<ProfileAnalysis>,
    /// Latest output per agent; a new output replaces the previous one
    pub agent_outputs: BTreeMap<AgentKind, AgentOutput>,
}

impl Results {
    pub fn merge_agent_output(&mut self, kind: AgentKind, output: AgentOutput) -> Option<AgentOutput> {
        self.agent_outputs.insert(kind, output)
    }

    pub fn merge_agent_outputs(&mut self, outputs: impl IntoIterator<Item = (AgentKind, AgentOutput)>) {
        for (kind, output) in outputs {
            self.merge_agent_output(kind, output);
        }
    }

    pub fn executed_agents(&self) -> BTreeSet<AgentKind> {
        self.agent_outputs.keys().copied().collect()
    }
}

/// Counters driving the routing ceilings. Each one has a single increment site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub attempts: u32,
    pub iteration_count: u32,
    pub review_attempts: u32,
    pub plan_adjustments: u32,
    pub coordination_rounds: u32,
}

/// The single mutable record owned by a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedState {
    pub run_id: Uuid,
    /// Free-text request driving the coordinator loop
    pub request: Option<String>,
    pub profile: serde_json::Value,
    pub study_material: serde_json::Value,
    pub calendar: serde_json::Value,
    pub tasks: serde_json::Value,
    summaries: Vec<Summary>,
    pub plan: Option<StudyPlan>,
    pub progress: Option<SessionProgress>,
    pub evaluation: Option<ProgressEvaluation>,
    feedback: Vec<Feedback>,
    pub results: Results,
    status: WorkflowStatus,
    counters: Counters,
    completion_score: f64,
    understanding_score: f64,
    error: Option<String>,
    completion: Option<CompletionReason>,
    #[serde(skip)]
    pending_completion: Option<CompletionReason>,
    current_stage: Option<StageId>,
    visited: Vec<StageId>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            request: None,
            profile: serde_json::Value::Null,
            study_material: serde_json::Value::Null,
            calendar: serde_json::Value::Null,
            tasks: serde_json::Value::Null,
            summaries: Vec::new(),
            plan: None,
            progress: None,
            evaluation: None,
            feedback: Vec::new(),
            results: Results::default(),
            status: WorkflowStatus::Processing,
            counters: Counters::default(),
            completion_score: 0.0,
            understanding_score: 0.0,
            error: None,
            completion: None,
            pending_completion: None,
            current_stage: None,
            visited: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Seed state for the study workflow
    pub fn for_study(profile: serde_json::Value, study_material: serde_json::Value) -> Self {
        Self {
            profile,
            study_material,
            ..Self::new()
        }
    }

    /// Seed state for the coordinator loop
    pub fn for_coordination(
        request: impl Into<String>,
        profile: serde_json::Value,
        calendar: serde_json::Value,
        tasks: serde_json::Value,
    ) -> Self {
        Self {
            request: Some(request.into()),
            profile,
            calendar,
            tasks,
            ..Self::new()
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn completion(&self) -> Option<CompletionReason> {
        self.completion
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn completion_score(&self) -> f64 {
        self.completion_score
    }

    pub fn understanding_score(&self) -> f64 {
        self.understanding_score
    }

    pub fn summaries(&self) -> &[Summary] {
        &self.summaries
    }

    pub fn feedback(&self) -> &[Feedback] {
        &self.feedback
    }

    pub fn current_stage(&self) -> Option<StageId> {
        self.current_stage
    }

    /// Stages executed so far, in order
    pub fn visited(&self) -> &[StageId] {
        &self.visited
    }

    pub fn append_summary(&mut self, summary: Summary) {
        self.summaries.push(summary);
    }

    pub fn append_feedback(&mut self, feedback: Feedback) {
        self.feedback.push(feedback);
    }

    /// Move between the non-terminal statuses. Terminal statuses are never left,
    /// and are only entered through [`SharedState::fail`] or the engine.
    pub fn set_status(&mut self, status: WorkflowStatus) -> bool {
        if self.status.is_terminal() || status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    /// Mark the run failed. Returns false if the run had already terminated.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = WorkflowStatus::Failed;
        self.error = Some(message.into());
        self.completed_at = Some(Utc::now());
        true
    }

    pub(crate) fn complete(&mut self, reason: CompletionReason) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = WorkflowStatus::Complete;
        self.completion = Some(reason);
        self.completed_at = Some(Utc::now());
        true
    }

    /// Reset run bookkeeping and drop outputs of a previous run; inputs are kept.
    /// The only place counters go back to zero.
    pub(crate) fn begin_run(&mut self) {
        self.summaries.clear();
        self.feedback.clear();
        self.plan = None;
        self.progress = None;
        self.evaluation = None;
        self.results = Results::default();
        self.status = WorkflowStatus::Processing;
        self.counters = Counters::default();
        self.completion_score = 0.0;
        self.understanding_score = 0.0;
        self.error = None;
        self.completion = None;
        self.pending_completion = None;
        self.current_stage = None;
        self.visited.clear();
        self.started_at = Utc::now();
        self.completed_at = None;
    }

    pub(crate) fn enter_stage(&mut self, stage: StageId) {
        self.current_stage = Some(stage);
        self.visited.push(stage);
    }

    pub(crate) fn record_attempt(&mut self) {
        self.counters.attempts += 1;
        self.counters.iteration_count += 1;
    }

    pub(crate) fn record_review_attempt(&mut self) -> u32 {
        self.counters.review_attempts += 1;
        self.counters.review_attempts
    }

    pub(crate) fn record_plan_adjustment(&mut self) -> u32 {
        self.counters.plan_adjustments += 1;
        self.counters.plan_adjustments
    }

    pub(crate) fn record_coordination_round(&mut self) -> u32 {
        self.counters.coordination_rounds += 1;
        self.counters.coordination_rounds
    }

    pub(crate) fn set_scores(&mut self, completion_score: f64, understanding_score: f64) {
        self.completion_score = completion_score;
        self.understanding_score = understanding_score;
    }

    pub(crate) fn set_pending_completion(&mut self, reason: CompletionReason) {
        self.pending_completion = Some(reason);
    }

    pub(crate) fn take_pending_completion(&mut self) -> Option<CompletionReason> {
        self.pending_completion.take()
    }

    /// The plan text the caller should present: the planner agent's output in the
    /// coordinator loop, otherwise the study workflow's plan overview
    pub fn final_plan(&self) -> Option<&str> {
        match self.results.agent_outputs.get(&AgentKind::Planner) {
            Some(AgentOutput::Plan { plan, .. }) => Some(plan.as_str()),
            _ => self.plan.as_ref().map(|plan| plan.overview.as_str()),
        }
    }
}
