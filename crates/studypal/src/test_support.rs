//! Scripted collaborators shared by the engine scenario tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::brain::{ProviderError, TextGenerator};

pub const PROFILE_ANALYZER: &str = "Learning Profile Analyzer";
pub const NOTE_WRITER: &str = "Study Material Specialist";
pub const PLANNER: &str = "Academic Planning Specialist";
pub const ADVISOR: &str = "Academic Strategy Advisor";
pub const COORDINATOR: &str = "ReACT framework";

/// Replies with the response of the first needle found in the system prompt,
/// then in the user prompt; falls back to a fixed default.
pub struct ScriptedGenerator {
    script: Vec<(String, String)>,
    default_response: String,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            script: Vec::new(),
            default_response: "- keep going".to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on(mut self, needle: &str, response: &str) -> Self {
        self.script.push((needle.to_string(), response.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn respond(&self, text: &str) -> Option<&str> {
        self.script
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, response)| response.as_str())
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .respond(system)
            .or_else(|| self.respond(user))
            .unwrap_or(&self.default_response);
        Ok(response.to_string())
    }
}

/// Fails every call with an API error
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
        Err(ProviderError::ApiError {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }
}

/// Three tasks, no focus hints
pub const THREE_TASK_PLAN: &str = r#"```json
[
  {"title": "Read chapter 1", "durationMinutes": 25},
  {"title": "Practice problems", "durationMinutes": 25},
  {"title": "Flashcards", "durationMinutes": 15}
]
```"#;

/// Five tasks that each come back with low focus
pub const LOW_FOCUS_PLAN: &str = r#"[
  {"title": "Read chapter 1", "expectedFocus": 0.3},
  {"title": "Read chapter 2", "expectedFocus": 0.3},
  {"title": "Practice problems", "expectedFocus": 0.3},
  {"title": "Flashcards", "expectedFocus": 0.3},
  {"title": "Mock exam", "expectedFocus": 0.3}
]"#;

pub fn study_generator(plan: &str) -> ScriptedGenerator {
    ScriptedGenerator::new()
        .on(
            PROFILE_ANALYZER,
            "Session structure: 25 minute blocks\nEnvironment: library\n\
             Learning methods:\n- diagrams\nFocus strategies:\n- timers",
        )
        .on(NOTE_WRITER, "- limits\n- derivatives")
        .on(PLANNER, plan)
        .on(ADVISOR, "Good work.\n- review derivatives")
}

pub fn sample_profile() -> serde_json::Value {
    serde_json::json!({
        "id": "student-1",
        "personal_info": {"major": "Mathematics", "academic_year": 2},
        "learning_preferences": {"learning_style": "visual"}
    })
}

pub fn sample_material() -> serde_json::Value {
    serde_json::json!({"subject": "Calculus", "content": "Limits and derivatives"})
}
