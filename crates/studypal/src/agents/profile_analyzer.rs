use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{is_empty_value, list_items, render};
use crate::{brain::TextGenerator, state::ProfileAnalysis, Result, StudypalError};

const SYSTEM_PROMPT: &str = "You are a Learning Profile Analyzer. You study a student's \
academic profile and recommend practical, ADHD-friendly study strategies.";

const DEFAULT_SESSION_STRUCTURE: &str = "25-30 minute sessions with 5-10 minute breaks";
const DEFAULT_ENVIRONMENT: &str = "quiet, well-lit space with an organized workspace";
const DEFAULT_LEARNING_METHODS: [&str; 3] = ["visual learning", "mind mapping", "color coding"];
const DEFAULT_FOCUS_STRATEGIES: [&str; 3] =
    ["Pomodoro technique", "body doubling", "background music"];

static SECTION_HEADING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#+\s*|\d+[.)]\s*)?\**\s*(session|environment|learning method|focus)[^:\n]*:?\**\s*:?\s*(.*)$",
    )
    .expect("valid section heading regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Session,
    Environment,
    LearningMethods,
    FocusStrategies,
}

#[derive(Default)]
struct Sections {
    session: Vec<String>,
    environment: Vec<String>,
    learning_methods: Vec<String>,
    focus_strategies: Vec<String>,
}

impl Sections {
    fn slot(&mut self, section: Section) -> &mut Vec<String> {
        match section {
            Section::Session => &mut self.session,
            Section::Environment => &mut self.environment,
            Section::LearningMethods => &mut self.learning_methods,
            Section::FocusStrategies => &mut self.focus_strategies,
        }
    }
}

/// Turns a raw student profile into a structured [`ProfileAnalysis`]
pub struct ProfileAnalyzer {
    generator: Arc<dyn TextGenerator>,
}

impl ProfileAnalyzer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn analyze_study_profile(&self, profile: &serde_json::Value) -> Result<ProfileAnalysis> {
        if is_empty_value(profile) {
            return Err(StudypalError::InputError(
                "No student profile provided".to_string(),
            ));
        }

        let prompt = format!(
            "Analyze this student's academic profile for personalized learning strategies.\n\n\
             Profile:\n{}\n\n\
             Provide specific analysis on:\n\
             1. Session structure\n\
             2. Environment setup\n\
             3. Learning methods\n\
             4. Focus strategies",
            render(profile)
        );

        let response = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        tracing::debug!("[AGENT] Profile analysis received ({} chars)", response.len());

        Ok(structure_analysis(profile, &response))
    }
}

fn structure_analysis(profile: &serde_json::Value, response: &str) -> ProfileAnalysis {
    let mut sections = Sections::default();
    let mut current: Option<Section> = None;

    for line in response.lines() {
        if let Some(caps) = SECTION_HEADING_REGEX.captures(line) {
            let keyword = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
            let section = match keyword.as_str() {
                "session" => Section::Session,
                "environment" => Section::Environment,
                "learning method" => Section::LearningMethods,
                _ => Section::FocusStrategies,
            };
            current = Some(section);

            let inline = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            if !inline.is_empty() {
                sections.slot(section).push(inline.to_string());
            }
            continue;
        }

        if let Some(section) = current {
            let items = list_items(line);
            if let Some(item) = items.into_iter().next() {
                sections.slot(section).push(item);
            } else if !line.trim().is_empty() {
                sections.slot(section).push(line.trim().to_string());
            }
        }
    }

    let or_default_list = |items: Vec<String>, defaults: &[&str]| {
        if items.is_empty() {
            defaults.iter().map(|s| s.to_string()).collect()
        } else {
            items
        }
    };
    let or_default_text = |items: Vec<String>, default: &str| {
        if items.is_empty() {
            default.to_string()
        } else {
            items.join("; ")
        }
    };

    let user_id = profile
        .get("user_id")
        .or_else(|| profile.get("id"))
        .and_then(|v| v.as_str())
        .map(String::from);

    ProfileAnalysis {
        user_id,
        session_structure: or_default_text(sections.session, DEFAULT_SESSION_STRUCTURE),
        environment: or_default_text(sections.environment, DEFAULT_ENVIRONMENT),
        learning_methods: or_default_list(sections.learning_methods, &DEFAULT_LEARNING_METHODS),
        focus_strategies: or_default_list(sections.focus_strategies, &DEFAULT_FOCUS_STRATEGIES),
        summary: response.trim().to_string(),
        analyzed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_parsed_from_headings() {
        let response = "## Session structure\n- 20 minute blocks\n\
                        ## Learning methods\n- flashcards\n- practice problems\n\
                        Focus strategies: noise-cancelling headphones";
        let profile = serde_json::json!({"user_id": "student_123"});

        let analysis = structure_analysis(&profile, response);

        assert_eq!(analysis.user_id.as_deref(), Some("student_123"));
        assert_eq!(analysis.session_structure, "20 minute blocks");
        assert_eq!(analysis.learning_methods, vec!["flashcards", "practice problems"]);
        assert_eq!(analysis.focus_strategies, vec!["noise-cancelling headphones"]);
        assert_eq!(analysis.environment, DEFAULT_ENVIRONMENT);
    }

    #[test]
    fn test_unstructured_response_uses_defaults() {
        let analysis = structure_analysis(&serde_json::json!({"major": "CS"}), "Study more.");

        assert_eq!(analysis.user_id, None);
        assert_eq!(analysis.session_structure, DEFAULT_SESSION_STRUCTURE);
        assert_eq!(analysis.learning_methods.len(), 3);
        assert_eq!(analysis.focus_strategies[0], "Pomodoro technique");
        assert_eq!(analysis.summary, "Study more.");
    }
}
