use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{list_items, render, StudyAgent};
use crate::{
    brain::TextGenerator,
    state::{
        AgentKind, AgentOutput, Feedback, ProgressEvaluation, SessionProgress, SharedState,
        StudyPlan,
    },
    Result,
};

const SYSTEM_PROMPT: &str = "You are an Academic Strategy Advisor with a deep understanding \
of learning psychology and ADHD support strategies.";

static SESSION_COMPLETE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bsession\s+(?:is\s+)?complete\b").expect("valid session complete regex")
});

/// Evaluates progress and gives feedback and guidance
pub struct Advisor {
    generator: Arc<dyn TextGenerator>,
}

impl Advisor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn evaluate_progress(
        &self,
        plan: Option<&StudyPlan>,
        progress: Option<&SessionProgress>,
    ) -> Result<ProgressEvaluation> {
        let prompt = format!(
            "Evaluate this study progress and list the next steps.\n\n{}",
            progress_context(plan, progress)
        );
        let assessment = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;

        Ok(ProgressEvaluation {
            next_steps: list_items(&assessment),
            assessment,
            evaluated_at: Utc::now(),
        })
    }

    pub async fn provide_recommendations(
        &self,
        plan: Option<&StudyPlan>,
        progress: Option<&SessionProgress>,
        profile: &serde_json::Value,
    ) -> Result<Feedback> {
        let prompt = format!(
            "Provide feedback and recommendations for the next study session. \
             If the student has finished everything, say the session is complete.\n\n\
             {}\n\nProfile:\n{}",
            progress_context(plan, progress),
            render(profile)
        );
        let message = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;

        let plan_done = plan.is_some_and(StudyPlan::all_tasks_completed);
        let session_complete = plan_done || SESSION_COMPLETE_REGEX.is_match(&message);

        Ok(Feedback {
            session_complete,
            recommendations: list_items(&message),
            message,
            created_at: Utc::now(),
        })
    }
}

#[async_trait]
impl StudyAgent for Advisor {
    fn kind(&self) -> AgentKind {
        AgentKind::Advisor
    }

    async fn run(&self, state: &SharedState) -> Result<AgentOutput> {
        let mut prompt = format!(
            "Request: {}\n\nProfile:\n{}\n\nGive academic guidance for this request.",
            state.request.as_deref().unwrap_or("general academic guidance"),
            render(&state.profile)
        );
        if let Some(AgentOutput::Plan { plan, .. }) = state.results.agent_outputs.get(&AgentKind::Planner) {
            prompt.push_str("\n\nCurrent plan:\n");
            prompt.push_str(plan);
        }

        let guidance = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        Ok(AgentOutput::Guidance {
            recommendations: list_items(&guidance),
            guidance,
        })
    }
}

fn progress_context(plan: Option<&StudyPlan>, progress: Option<&SessionProgress>) -> String {
    let mut context = match plan {
        Some(plan) => format!(
            "Plan: {} of {} tasks completed",
            plan.completed_count(),
            plan.tasks.len()
        ),
        None => "Plan: none".to_string(),
    };

    if let Some(progress) = progress {
        let scores: Vec<String> = progress
            .focus_scores
            .iter()
            .map(|f| format!("{} ({:.2})", f.task_id, f.focus_score))
            .collect();
        context.push_str(&format!(
            "\nLatest session: {} tasks completed, focus scores: {}",
            progress.completed_task_count,
            scores.join(", ")
        ));
    }

    context
}
