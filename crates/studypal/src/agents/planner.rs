use std::sync::Arc;

use async_trait::async_trait;

use super::{extract_json, is_empty_value, list_items, render, StudyAgent};
use crate::{
    brain::TextGenerator,
    state::{AgentKind, AgentOutput, PlanTask, SharedState, StudyPlan, Summary},
    Result,
};

const SYSTEM_PROMPT: &str = "You are an Academic Planning Specialist. You create flexible, \
ADHD-friendly study plans that accommodate varying attention spans and energy levels.";

const TASK_FORMAT: &str = "Return the plan's tasks as a JSON array of objects with \
\"title\" and \"durationMinutes\" fields, followed by any notes.";

/// Drafts study plans
pub struct Planner {
    generator: Arc<dyn TextGenerator>,
}

impl Planner {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn create_study_plan(
        &self,
        profile: &serde_json::Value,
        material: &serde_json::Value,
        summaries: &[Summary],
    ) -> Result<StudyPlan> {
        let summary_text = summaries
            .last()
            .map(|summary| summary.content.as_str())
            .unwrap_or("none yet");

        let prompt = format!(
            "Create a personalized study plan.\n\nProfile:\n{}\n\nMaterial:\n{}\n\n\
             Latest summary:\n{}\n\n{}",
            render(profile),
            render(material),
            summary_text,
            TASK_FORMAT
        );

        let response = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        let tasks = parse_tasks(&response);
        if tasks.is_empty() {
            tracing::warn!("[AGENT] Planner response contained no tasks");
        }

        let subject = material
            .get("subject")
            .and_then(|v| v.as_str())
            .map(String::from);

        Ok(StudyPlan::new(subject, response, tasks))
    }
}

#[async_trait]
impl StudyAgent for Planner {
    fn kind(&self) -> AgentKind {
        AgentKind::Planner
    }

    async fn run(&self, state: &SharedState) -> Result<AgentOutput> {
        let mut prompt = format!(
            "Request: {}\n\nProfile:\n{}",
            state.request.as_deref().unwrap_or("create a study plan"),
            render(&state.profile)
        );
        if let Some(analysis) = &state.results.profile_analysis {
            prompt.push_str(&format!(
                "\n\nRecommended session structure: {}\nFocus strategies: {}",
                analysis.session_structure,
                analysis.focus_strategies.join(", ")
            ));
        }
        if !is_empty_value(&state.calendar) {
            prompt.push_str(&format!("\n\nCalendar:\n{}", render(&state.calendar)));
        }
        if !is_empty_value(&state.tasks) {
            prompt.push_str(&format!("\n\nOpen tasks:\n{}", render(&state.tasks)));
        }
        prompt.push_str("\n\n");
        prompt.push_str(TASK_FORMAT);

        let plan = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        let tasks = parse_tasks(&plan);
        Ok(AgentOutput::Plan { plan, tasks })
    }
}

/// Tasks from a JSON array in the response, or from its list lines when there is none
pub(crate) fn parse_tasks(response: &str) -> Vec<PlanTask> {
    let from_json = extract_json(response).and_then(|value| {
        let items = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => match map.remove("tasks") {
                Some(serde_json::Value::Array(items)) => items,
                _ => return None,
            },
            _ => return None,
        };
        Some(items.iter().filter_map(task_fields).collect::<Vec<_>>())
    });

    let fields = match from_json {
        Some(fields) if !fields.is_empty() => fields,
        _ => list_items(response)
            .into_iter()
            .map(|title| (title, None, None))
            .collect(),
    };

    fields
        .into_iter()
        .enumerate()
        .map(|(idx, (title, duration_minutes, expected_focus))| PlanTask {
            id: format!("task-{}", idx + 1),
            title,
            completed: false,
            duration_minutes,
            expected_focus,
        })
        .collect()
}

fn task_fields(item: &serde_json::Value) -> Option<(String, Option<u32>, Option<f64>)> {
    if let Some(title) = item.as_str() {
        return Some((title.to_string(), None, None));
    }

    let title = ["title", "task", "name"]
        .iter()
        .find_map(|key| item.get(*key).and_then(|v| v.as_str()))?
        .to_string();
    let duration = ["durationMinutes", "duration_minutes", "duration"]
        .iter()
        .find_map(|key| item.get(*key).and_then(|v| v.as_u64()))
        .and_then(|minutes| u32::try_from(minutes).ok());
    let focus = ["expectedFocus", "expected_focus"]
        .iter()
        .find_map(|key| item.get(*key).and_then(|v| v.as_f64()))
        .filter(|focus| {
            let valid = focus.is_finite() && (0.0..=1.0).contains(focus);
            if !valid {
                tracing::warn!(
                    "[AGENT] Ignoring expectedFocus {} for task '{}', expected a value in [0, 1]",
                    focus,
                    title
                );
            }
            valid
        });

    Some((title, duration, focus))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tasks_from_json_array() {
        let response = r#"```json
[{"title": "Review limits", "durationMinutes": 25},
 {"task": "Practice derivatives", "expectedFocus": 0.5},
 "Flashcards"]
```
Stay hydrated."#;

        let tasks = parse_tasks(response);

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].id, "task-1");
        assert_eq!(tasks[0].duration_minutes, Some(25));
        assert_eq!(tasks[1].title, "Practice derivatives");
        assert_eq!(tasks[1].expected_focus, Some(0.5));
        assert_eq!(tasks[2].title, "Flashcards");
        assert!(tasks.iter().all(|t| !t.completed));
    }

    #[test]
    fn test_parse_tasks_from_tasks_object() {
        let tasks = parse_tasks(r#"{"tasks": [{"name": "Read chapter 3"}]}"#);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Read chapter 3");
    }

    #[test]
    fn test_parse_tasks_falls_back_to_list_lines() {
        let response = "Plan for the week:\n1. Read chapter 1\n2. Summarize notes\n- Quiz yourself";
        let titles: Vec<_> = parse_tasks(response).into_iter().map(|t| t.title).collect();

        assert_eq!(titles, vec!["Read chapter 1", "Summarize notes", "Quiz yourself"]);
    }

    #[test]
    fn test_parse_tasks_drops_out_of_range_focus() {
        let tasks = parse_tasks(
            r#"[{"title": "a", "expectedFocus": 8},
                {"title": "b", "expected_focus": -0.1},
                {"title": "c", "expectedFocus": 1.0}]"#,
        );

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].expected_focus, None);
        assert_eq!(tasks[1].expected_focus, None);
        assert_eq!(tasks[2].expected_focus, Some(1.0));
    }

    #[test]
    fn test_parse_tasks_drops_oversized_duration() {
        let tasks = parse_tasks(r#"[{"title": "a", "durationMinutes": 4294967296}]"#);

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].duration_minutes, None);
    }

    #[test]
    fn test_parse_tasks_empty_response() {
        assert!(parse_tasks("No plan today.").is_empty());
    }
}
