//! Routing policy - decides where the workflow goes after a decision stage

use crate::{
    config::WorkflowConfig,
    state::{CompletionReason, SharedState, WorkflowStatus},
};

/// A routing policy could not evaluate the state
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    #[error("focus score for task '{task_id}' must be within [0, 1], got {score}")]
    InvalidFocusScore { task_id: String, score: f64 },

    #[error("no coordinator analysis recorded in results")]
    MissingAnalysis,
}

/// Quality metrics recomputed at every progress evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressMetrics {
    pub completion_score: f64,
    pub understanding_score: f64,
}

impl ProgressMetrics {
    /// Completion is the share of plan tasks marked completed; understanding is the
    /// mean focus score of the latest session. Both are 0 when there is nothing to measure.
    pub fn from_state(state: &SharedState) -> Result<Self, RoutingError> {
        let completion_score = match &state.plan {
            Some(plan) if !plan.tasks.is_empty() => {
                plan.completed_count() as f64 / plan.tasks.len() as f64
            }
            _ => 0.0,
        };

        let focus_scores = state
            .progress
            .as_ref()
            .map(|progress| progress.focus_scores.as_slice())
            .unwrap_or_default();

        for focus in focus_scores {
            if !focus.focus_score.is_finite() || !(0.0..=1.0).contains(&focus.focus_score) {
                return Err(RoutingError::InvalidFocusScore {
                    task_id: focus.task_id.clone(),
                    score: focus.focus_score,
                });
            }
        }

        let understanding_score = if focus_scores.is_empty() {
            0.0
        } else {
            focus_scores.iter().map(|f| f.focus_score).sum::<f64>() / focus_scores.len() as f64
        };

        Ok(Self {
            completion_score,
            understanding_score,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressRoute {
    /// Back to material processing for another review pass
    ReviewMaterial,
    /// Back to planning for a re-plan
    AdjustPlan,
    Complete(CompletionReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackRoute {
    NextSession,
    Complete(CompletionReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinationRoute {
    /// Required agents are still missing output; ask the coordinator again
    Reassess,
    Complete(CompletionReason),
}

/// Decision functions evaluated at the workflow's decision stages.
///
/// Each counter has exactly one increment site here: `attempts` and `iterationCount` in
/// [`RoutingPolicy::route_progress`], `reviewAttempts` and `planAdjustments` in its review and
/// re-plan branches, and `coordinationRounds` in [`RoutingPolicy::route_coordination`].
#[derive(Debug, Clone, Default)]
pub struct RoutingPolicy {
    config: WorkflowConfig,
}

impl RoutingPolicy {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// The global termination predicate. Ceilings are checked before quality thresholds
    /// so a run that exhausts a ceiling is reported as such.
    pub fn termination_reason(&self, state: &SharedState) -> Option<CompletionReason> {
        let counters = state.counters();
        let config = &self.config;

        if state.status() == WorkflowStatus::Failed {
            Some(CompletionReason::RunFailed)
        } else if counters.attempts >= config.max_attempts {
            Some(CompletionReason::AttemptCeiling)
        } else if counters.iteration_count >= config.recursion_limit {
            Some(CompletionReason::IterationCeiling)
        } else if counters.review_attempts >= config.max_review_attempts {
            Some(CompletionReason::ReviewCeiling)
        } else if counters.plan_adjustments >= config.max_plan_adjustments {
            Some(CompletionReason::PlanAdjustmentCeiling)
        } else if state.completion_score() >= config.min_completion_rate {
            Some(CompletionReason::CompletionThreshold)
        } else if state.understanding_score() >= config.min_understanding_level {
            Some(CompletionReason::UnderstandingThreshold)
        } else {
            None
        }
    }

    /// Invoked after `evaluateProgress`
    pub fn route_progress(&self, state: &mut SharedState) -> Result<ProgressRoute, RoutingError> {
        state.record_attempt();

        let metrics = ProgressMetrics::from_state(state)?;
        state.set_scores(metrics.completion_score, metrics.understanding_score);

        let counters = state.counters();
        tracing::debug!(
            "[ROUTING] Progress - attempts: {}, completion: {:.2}, understanding: {:.2}",
            counters.attempts,
            metrics.completion_score,
            metrics.understanding_score
        );

        if let Some(reason) = self.termination_reason(state) {
            return Ok(ProgressRoute::Complete(reason));
        }

        let mut fallthrough = CompletionReason::CompletionThreshold;

        if metrics.understanding_score < self.config.min_understanding_level {
            if state.record_review_attempt() <= self.config.max_review_attempts {
                return Ok(ProgressRoute::ReviewMaterial);
            }
            fallthrough = CompletionReason::ReviewCeiling;
        }

        if metrics.completion_score < self.config.min_completion_rate {
            if state.record_plan_adjustment() <= self.config.max_plan_adjustments {
                return Ok(ProgressRoute::AdjustPlan);
            }
            fallthrough = CompletionReason::PlanAdjustmentCeiling;
        }

        Ok(ProgressRoute::Complete(fallthrough))
    }

    /// Invoked after `provideFeedback`
    pub fn route_feedback(&self, state: &SharedState) -> FeedbackRoute {
        if let Some(reason) = self.termination_reason(state) {
            return FeedbackRoute::Complete(reason);
        }

        match state.feedback().last() {
            None => FeedbackRoute::Complete(CompletionReason::NoFeedback),
            Some(latest) if latest.session_complete => {
                FeedbackRoute::Complete(CompletionReason::SessionComplete)
            }
            Some(_) => FeedbackRoute::NextSession,
        }
    }

    /// Invoked after the concurrent execute stage of the coordinator loop
    pub fn route_coordination(
        &self,
        state: &mut SharedState,
    ) -> Result<CoordinationRoute, RoutingError> {
        let rounds = state.record_coordination_round();

        let analysis = state
            .results
            .coordinator_analysis
            .as_ref()
            .ok_or(RoutingError::MissingAnalysis)?;
        let executed = state.results.executed_agents();

        if analysis.required_agents.is_subset(&executed) {
            return Ok(CoordinationRoute::Complete(CompletionReason::AgentsSatisfied));
        }

        if rounds >= self.config.max_coordination_rounds {
            let missing: Vec<_> = analysis
                .required_agents
                .difference(&executed)
                .map(|kind| kind.as_str())
                .collect();
            tracing::warn!(
                "[ROUTING] Coordination ceiling reached after {} rounds, still missing: {}",
                rounds,
                missing.join(", ")
            );
            return Ok(CoordinationRoute::Complete(CompletionReason::CoordinationCeiling));
        }

        Ok(CoordinationRoute::Reassess)
    }
}
