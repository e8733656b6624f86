//! Stages of the study workflow and its graph

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::{engine::Router, Stage, StageId, WorkflowEngine};
use crate::{
    agents::{is_empty_value, Advisor, NoteWriter, Planner, ProfileAnalyzer, StudyAgents},
    config::WorkflowConfig,
    state::{SessionProgress, SharedState, TaskFocus, WorkflowStatus},
    Result, StudypalError,
};

/// Focus score a session assigns to a task that does not carry its own
pub const DEFAULT_FOCUS_SCORE: f64 = 0.8;

pub struct AnalyzeProfileStage {
    analyzer: Arc<ProfileAnalyzer>,
}

impl AnalyzeProfileStage {
    pub fn new(analyzer: Arc<ProfileAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl Stage for AnalyzeProfileStage {
    fn id(&self) -> StageId {
        StageId::AnalyzeProfile
    }

    fn check_input(&self, state: &SharedState) -> Result<()> {
        if is_empty_value(&state.profile) {
            return Err(StudypalError::InputError(
                "No student profile provided".to_string(),
            ));
        }
        Ok(())
    }

    async fn invoke(&self, state: &mut SharedState) -> Result<()> {
        let analysis = self.analyzer.analyze_study_profile(&state.profile).await?;
        // The analysis replaces the raw profile for every later stage
        state.profile = serde_json::to_value(&analysis)?;
        state.results.profile_analysis = Some(analysis);
        Ok(())
    }
}

pub struct ProcessMaterialStage {
    note_writer: Arc<NoteWriter>,
}

impl ProcessMaterialStage {
    pub fn new(note_writer: Arc<NoteWriter>) -> Self {
        Self { note_writer }
    }
}

#[async_trait]
impl Stage for ProcessMaterialStage {
    fn id(&self) -> StageId {
        StageId::ProcessMaterial
    }

    async fn invoke(&self, state: &mut SharedState) -> Result<()> {
        let summary = self.note_writer.summarize(&state.study_material).await?;
        tracing::debug!(
            "[WORKFLOW] Summary {} with {} key points",
            state.summaries().len() + 1,
            summary.key_points.len()
        );
        state.append_summary(summary);
        Ok(())
    }
}

pub struct CreatePlanStage {
    planner: Arc<Planner>,
}

impl CreatePlanStage {
    pub fn new(planner: Arc<Planner>) -> Self {
        Self { planner }
    }
}

#[async_trait]
impl Stage for CreatePlanStage {
    fn id(&self) -> StageId {
        StageId::CreatePlan
    }

    async fn invoke(&self, state: &mut SharedState) -> Result<()> {
        let plan = self
            .planner
            .create_study_plan(&state.profile, &state.study_material, state.summaries())
            .await?;
        tracing::info!("[WORKFLOW] Plan created with {} tasks", plan.tasks.len());
        state.plan = Some(plan);
        Ok(())
    }
}

/// Works through the current session's tasks and records how it went
pub struct ExecuteSessionStage;

#[async_trait]
impl Stage for ExecuteSessionStage {
    fn id(&self) -> StageId {
        StageId::ExecuteSession
    }

    async fn invoke(&self, state: &mut SharedState) -> Result<()> {
        let plan = state
            .plan
            .as_mut()
            .ok_or_else(|| StudypalError::StageError("No study plan to execute".to_string()))?;

        let start_time = Utc::now();
        let session_tasks = std::mem::take(&mut plan.current_session.tasks);

        let mut focus_scores = Vec::with_capacity(session_tasks.len());
        for task in &session_tasks {
            plan.mark_completed(&task.id);
            focus_scores.push(TaskFocus {
                task_id: task.id.clone(),
                focus_score: task.expected_focus.unwrap_or(DEFAULT_FOCUS_SCORE),
                completed: true,
            });
        }
        plan.advance_session();

        state.progress = Some(SessionProgress {
            start_time,
            completed_task_count: focus_scores.len() as u32,
            focus_scores,
            end_time: Some(Utc::now()),
        });
        Ok(())
    }
}

pub struct EvaluateProgressStage {
    advisor: Arc<Advisor>,
}

impl EvaluateProgressStage {
    pub fn new(advisor: Arc<Advisor>) -> Self {
        Self { advisor }
    }
}

#[async_trait]
impl Stage for EvaluateProgressStage {
    fn id(&self) -> StageId {
        StageId::EvaluateProgress
    }

    async fn invoke(&self, state: &mut SharedState) -> Result<()> {
        state.set_status(WorkflowStatus::Reviewing);
        let evaluation = self
            .advisor
            .evaluate_progress(state.plan.as_ref(), state.progress.as_ref())
            .await?;
        state.evaluation = Some(evaluation);
        Ok(())
    }
}

pub struct ProvideFeedbackStage {
    advisor: Arc<Advisor>,
}

impl ProvideFeedbackStage {
    pub fn new(advisor: Arc<Advisor>) -> Self {
        Self { advisor }
    }
}

#[async_trait]
impl Stage for ProvideFeedbackStage {
    fn id(&self) -> StageId {
        StageId::ProvideFeedback
    }

    async fn invoke(&self, state: &mut SharedState) -> Result<()> {
        let feedback = self
            .advisor
            .provide_recommendations(state.plan.as_ref(), state.progress.as_ref(), &state.profile)
            .await?;
        state.append_feedback(feedback);
        Ok(())
    }
}

impl WorkflowEngine {
    /// The primary study workflow:
    /// `analyzeProfile -> processMaterial -> createPlan -> executeSession -> evaluateProgress`,
    /// then review / re-plan / feedback, and from feedback either another session or the end.
    pub fn study_workflow(agents: &StudyAgents, config: WorkflowConfig) -> Result<WorkflowEngine> {
        WorkflowEngine::builder()
            .add_stage(AnalyzeProfileStage::new(agents.profile_analyzer.clone()))
            .add_stage(ProcessMaterialStage::new(agents.note_writer.clone()))
            .add_stage(CreatePlanStage::new(agents.planner.clone()))
            .add_stage(ExecuteSessionStage)
            .add_stage(EvaluateProgressStage::new(agents.advisor.clone()))
            .add_stage(ProvideFeedbackStage::new(agents.advisor.clone()))
            .add_edge(StageId::AnalyzeProfile, StageId::ProcessMaterial)
            .add_edge(StageId::ProcessMaterial, StageId::CreatePlan)
            .add_edge(StageId::CreatePlan, StageId::ExecuteSession)
            .add_edge(StageId::ExecuteSession, StageId::EvaluateProgress)
            .add_conditional_edge(StageId::EvaluateProgress, Router::Progress)
            .add_conditional_edge(StageId::ProvideFeedback, Router::Feedback)
            .entry(StageId::AnalyzeProfile)
            .config(config)
            .build()
    }
}
