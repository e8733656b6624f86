use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::{is_empty_value, list_items, render, StudyAgent};
use crate::{
    brain::TextGenerator,
    state::{AgentKind, AgentOutput, SharedState, Summary},
    Result, StudypalError,
};

const SYSTEM_PROMPT: &str = "You are a Study Material Specialist. You turn course material \
into concise, well-structured study notes with the key concepts called out as bullet points.";

/// Summarises study material and writes notes for the coordinator loop
pub struct NoteWriter {
    generator: Arc<dyn TextGenerator>,
}

impl NoteWriter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn summarize(&self, material: &serde_json::Value) -> Result<Summary> {
        if is_empty_value(material) {
            return Err(StudypalError::InputError(
                "No study material provided".to_string(),
            ));
        }

        let prompt = format!(
            "Summarize this study material. List the key points as bullet points.\n\n{}",
            render(material)
        );
        let content = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;

        Ok(Summary {
            key_points: list_items(&content),
            content,
            created_at: Utc::now(),
        })
    }
}

#[async_trait]
impl StudyAgent for NoteWriter {
    fn kind(&self) -> AgentKind {
        AgentKind::NoteWriter
    }

    async fn run(&self, state: &SharedState) -> Result<AgentOutput> {
        let learning_style = state
            .results
            .profile_analysis
            .as_ref()
            .map(|analysis| analysis.learning_methods.join(", "))
            .or_else(|| {
                state
                    .profile
                    .pointer("/learning_preferences/learning_style")
                    .and_then(|v| v.as_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| "not specified".to_string());

        let mut prompt = format!(
            "Request: {}\nLearning style: {}\n\nWrite study notes tailored to this request.",
            state.request.as_deref().unwrap_or("general study support"),
            learning_style
        );
        if !is_empty_value(&state.study_material) {
            prompt.push_str("\n\nMaterial:\n");
            prompt.push_str(&render(&state.study_material));
        }

        let notes = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        Ok(AgentOutput::Notes { notes })
    }
}
