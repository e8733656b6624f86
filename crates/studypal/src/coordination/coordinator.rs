//! Coordinator and profile stages of the coordinator loop

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    agents::{is_empty_value, ProfileAnalyzer},
    brain::TextGenerator,
    state::{AgentKind, CoordinatorAnalysis, SharedState},
    workflow::{Stage, StageId},
    Result, StudypalError,
};

const SYSTEM_PROMPT: &str = "You are a coordinator using the ReACT framework. Analyze the \
query, deploy the minimal set of required agents, and verify their results.

SEMANTIC ACTIONS:
1. Understand schedule and constraints
2. Extract key user info and needs
3. Determine focus areas
4. Select minimal required agents (PLANNER, NOTEWRITER, ADVISOR)
5. Verify agent outputs

FORMAT:
Thought: [Analyze query and context]
Action: [Select initial agent]
Observation: [Review agent output]
Decision: [Complete/Need next agent]";

/// Decides which agents the concurrent executor must run
pub struct CoordinatorStage {
    generator: Arc<dyn TextGenerator>,
}

impl CoordinatorStage {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for CoordinatorStage {
    fn id(&self) -> StageId {
        StageId::Coordinator
    }

    fn check_input(&self, state: &SharedState) -> Result<()> {
        match state.request.as_deref().map(str::trim) {
            Some(request) if !request.is_empty() => Ok(()),
            _ => Err(StudypalError::InputError(
                "No request provided for coordination".to_string(),
            )),
        }
    }

    async fn invoke(&self, state: &mut SharedState) -> Result<()> {
        let context = analyze_context(state);
        let prompt = format!(
            "Current request: {}\nContext: {}",
            state.request.as_deref().unwrap_or_default(),
            serde_json::to_string_pretty(&context)?
        );

        let mut analysis = match self.generator.generate(SYSTEM_PROMPT, &prompt).await {
            Ok(response) => parse_coordinator_response(&response),
            Err(e) => {
                tracing::warn!("[COORDINATOR] Generation failed, defaulting to planner: {}", e);
                CoordinatorAnalysis::planner_only("Fallback after coordinator failure")
            }
        };

        // Agents required by an earlier round stay required
        if let Some(previous) = &state.results.coordinator_analysis {
            for kind in &previous.required_agents {
                if !analysis.required_agents.contains(kind) {
                    let priority = previous.priority.get(kind).copied().unwrap_or(u32::MAX);
                    let group = analysis.concurrent_groups.len();
                    analysis.require(*kind, priority, group);
                }
            }
        }

        tracing::info!(
            "[COORDINATOR] Round {} requires: {}",
            state.counters().coordination_rounds + 1,
            analysis
                .required_agents
                .iter()
                .map(AgentKind::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        state.results.coordinator_analysis = Some(analysis);
        Ok(())
    }
}

/// Compact view of the request context handed to the coordinator
pub fn analyze_context(state: &SharedState) -> serde_json::Value {
    let profile = &state.profile;
    let request = state.request.as_deref().unwrap_or_default().to_lowercase();

    let course = profile
        .pointer("/academic_info/current_courses")
        .and_then(|v| v.as_array())
        .and_then(|courses| {
            courses.iter().find(|course| {
                course
                    .get("name")
                    .and_then(|v| v.as_str())
                    .is_some_and(|name| !name.is_empty() && request.contains(&name.to_lowercase()))
            })
        })
        .cloned();

    let count = |value: &serde_json::Value, key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| items.len())
            .unwrap_or(0)
    };

    serde_json::json!({
        "student": {
            "major": profile.pointer("/personal_info/major").and_then(|v| v.as_str()).unwrap_or("Unknown"),
            "year": profile.pointer("/personal_info/academic_year"),
            "learningStyle": profile.pointer("/learning_preferences/learning_style"),
        },
        "course": course,
        "upcomingEvents": count(&state.calendar, "events"),
        "activeTasks": count(&state.tasks, "tasks"),
        "studyPatterns": profile.pointer("/learning_preferences/study_patterns"),
    })
}

/// Parse a coordinator response into an analysis. PLANNER is always required.
pub fn parse_coordinator_response(response: &str) -> CoordinatorAnalysis {
    let lower = response.to_lowercase();
    let mut analysis = CoordinatorAnalysis::planner_only("Default coordination");

    if lower.contains("need next agent") {
        let next = if lower.contains("note") {
            AgentKind::NoteWriter
        } else {
            AgentKind::Advisor
        };
        analysis.require(next, 2, 1);
        analysis.reasoning = response.trim().to_string();
    } else if response.contains("Thought:") && response.contains("Decision:") {
        if lower.contains("note") {
            analysis.require(AgentKind::NoteWriter, 2, 0);
        }
        if response.contains("Advisor") || lower.contains("guidance") {
            analysis.require(AgentKind::Advisor, 3, 1);
        }
        analysis.reasoning = thought_section(response);
    } else if !response.trim().is_empty() {
        analysis.reasoning = response.trim().to_string();
    }

    analysis
}

fn thought_section(response: &str) -> String {
    response
        .split_once("Thought:")
        .map(|(_, rest)| rest)
        .map(|rest| rest.split_once("Action:").map(|(thought, _)| thought).unwrap_or(rest))
        .map(|thought| thought.split("Decision:").next().unwrap_or(thought))
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Profile analysis for the coordinator loop; keeps the raw profile intact
pub struct ProfileAnalysisStage {
    analyzer: Arc<ProfileAnalyzer>,
}

impl ProfileAnalysisStage {
    pub fn new(analyzer: Arc<ProfileAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl Stage for ProfileAnalysisStage {
    fn id(&self) -> StageId {
        StageId::ProfileAnalyzer
    }

    async fn invoke(&self, state: &mut SharedState) -> Result<()> {
        if is_empty_value(&state.profile) {
            tracing::warn!("[COORDINATOR] No profile to analyze, skipping profile analysis");
            return Ok(());
        }

        let analysis = self.analyzer.analyze_study_profile(&state.profile).await?;
        state.results.profile_analysis = Some(analysis);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn test_need_next_agent_with_notes() {
        let analysis = parse_coordinator_response(
            "Thought: student wants notes\nDecision: Need next agent for note taking",
        );

        assert_eq!(
            analysis.required_agents,
            BTreeSet::from([AgentKind::Planner, AgentKind::NoteWriter])
        );
        assert_eq!(
            analysis.concurrent_groups,
            vec![
                BTreeSet::from([AgentKind::Planner]),
                BTreeSet::from([AgentKind::NoteWriter])
            ]
        );
    }

    #[test]
    fn test_need_next_agent_defaults_to_advisor() {
        let analysis = parse_coordinator_response("Decision: need next agent");
        assert!(analysis.required_agents.contains(&AgentKind::Advisor));
        assert_eq!(analysis.concurrent_groups.len(), 2);
    }

    #[test]
    fn test_react_format_groups_note_writer_with_planner() {
        let response = "Thought: exam prep with notes and guidance\n\
                        Action: deploy PLANNER\n\
                        Observation: ok\n\
                        Decision: Complete";
        let analysis = parse_coordinator_response(response);

        assert_eq!(analysis.required_agents.len(), 3);
        assert!(analysis.concurrent_groups[0].contains(&AgentKind::NoteWriter));
        assert!(analysis.concurrent_groups[1].contains(&AgentKind::Advisor));
        assert_eq!(analysis.reasoning, "exam prep with notes and guidance");
        assert_eq!(analysis.priority.get(&AgentKind::Advisor), Some(&3));
    }

    #[test]
    fn test_free_text_requires_planner_only() {
        let analysis = parse_coordinator_response("Just make a plan.");
        assert_eq!(analysis.required_agents, BTreeSet::from([AgentKind::Planner]));
        assert_eq!(analysis.reasoning, "Just make a plan.");
    }

    #[test]
    fn test_context_matches_course_from_request() {
        let state = SharedState::for_coordination(
            "Help me prepare for Linear Algebra",
            serde_json::json!({
                "personal_info": {"major": "Mathematics", "academic_year": 2},
                "academic_info": {"current_courses": [
                    {"name": "Calculus II"},
                    {"name": "Linear Algebra"}
                ]}
            }),
            serde_json::json!({"events": [{}, {}]}),
            serde_json::json!({"tasks": [{}]}),
        );

        let context = analyze_context(&state);

        assert_eq!(context["student"]["major"], "Mathematics");
        assert_eq!(context["course"]["name"], "Linear Algebra");
        assert_eq!(context["upcomingEvents"], 2);
        assert_eq!(context["activeTasks"], 1);
    }

    #[test]
    fn test_context_with_empty_profile() {
        let state = SharedState::for_coordination(
            "plan my week",
            serde_json::Value::Null,
            serde_json::Value::Null,
            serde_json::Value::Null,
        );
        let context = analyze_context(&state);

        assert_eq!(context["student"]["major"], "Unknown");
        assert!(context["course"].is_null());
        assert_eq!(context["activeTasks"], 0);
    }
}
