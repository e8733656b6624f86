//! Study agents - prompt builders and response parsers around a [`TextGenerator`]
//!
//! The adapters here are the only place that talks to the text-generation collaborator.
//! Each one turns a slice of [`SharedState`] into a prompt and the reply into a typed record.

mod advisor;
mod note_writer;
mod planner;
mod profile_analyzer;

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

pub use advisor::Advisor;
pub use note_writer::NoteWriter;
pub use planner::Planner;
pub use profile_analyzer::ProfileAnalyzer;

use crate::{
    brain::TextGenerator,
    state::{AgentKind, AgentOutput, SharedState},
    Result,
};

/// An agent the concurrent executor can schedule.
///
/// Agents only see a read-only snapshot of the state and return their output; the
/// executor is the one that merges it back.
#[async_trait]
pub trait StudyAgent: Send + Sync {
    fn kind(&self) -> AgentKind;

    async fn run(&self, state: &SharedState) -> Result<AgentOutput>;
}

/// All adapters sharing one generator
#[derive(Clone)]
pub struct StudyAgents {
    pub profile_analyzer: Arc<ProfileAnalyzer>,
    pub note_writer: Arc<NoteWriter>,
    pub planner: Arc<Planner>,
    pub advisor: Arc<Advisor>,
}

impl StudyAgents {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            profile_analyzer: Arc::new(ProfileAnalyzer::new(generator.clone())),
            note_writer: Arc::new(NoteWriter::new(generator.clone())),
            planner: Arc::new(Planner::new(generator.clone())),
            advisor: Arc::new(Advisor::new(generator)),
        }
    }

    /// The agents the coordinator can require, keyed by their kind
    pub fn concurrent_agents(&self) -> Vec<Arc<dyn StudyAgent>> {
        vec![
            self.planner.clone() as Arc<dyn StudyAgent>,
            self.note_writer.clone() as Arc<dyn StudyAgent>,
            self.advisor.clone() as Arc<dyn StudyAgent>,
        ]
    }
}

static LIST_ITEM_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").expect("valid list item regex")
});

static FENCED_BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid fenced block regex")
});

/// Bullet and numbered lines of a response, markers stripped
pub(crate) fn list_items(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| LIST_ITEM_REGEX.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_matches('*').trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// First JSON document in a response, fenced or inline
pub(crate) fn extract_json(text: &str) -> Option<serde_json::Value> {
    if let Some(caps) = FENCED_BLOCK_REGEX.captures(text) {
        if let Some(value) = caps
            .get(1)
            .and_then(|body| serde_json::from_str(body.as_str().trim()).ok())
        {
            return Some(value);
        }
    }

    let start = text.find(['[', '{'])?;
    let close = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// True for null, blank strings and empty collections
pub(crate) fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

pub(crate) fn render(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_items_strip_markers() {
        let text = "Intro line\n- first\n* second\n2. third\n3) fourth\n• fifth\nnot a list";
        assert_eq!(
            list_items(text),
            vec!["first", "second", "third", "fourth", "fifth"]
        );
    }

    #[test]
    fn test_extract_json_prefers_fenced_block() {
        let text = "Here is the plan:\n```json\n[{\"title\": \"Read\"}]\n```\nGood luck {not json}";
        let value = extract_json(text).unwrap();
        assert_eq!(value[0]["title"], "Read");
    }

    #[test]
    fn test_extract_json_inline() {
        let text = "Plan: {\"tasks\": [\"a\", \"b\"]} done";
        let value = extract_json(text).unwrap();
        assert_eq!(value["tasks"][1], "b");

        assert!(extract_json("no json here").is_none());
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&serde_json::Value::Null));
        assert!(is_empty_value(&serde_json::json!({})));
        assert!(is_empty_value(&serde_json::json!("  ")));
        assert!(!is_empty_value(&serde_json::json!({"major": "CS"})));
        assert!(!is_empty_value(&serde_json::json!(0)));
    }
}
