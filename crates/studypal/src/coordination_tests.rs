//! Concurrent executor and coordinator loop scenarios

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    agents::{StudyAgent, StudyAgents},
    config::{ExecutorConfig, WorkflowConfig},
    coordination::{ConcurrentGroupExecutor, CoordinatorStage, ProfileAnalysisStage},
    state::{AgentKind, AgentOutput, CompletionReason, CoordinatorAnalysis, SharedState, WorkflowStatus},
    test_support::{sample_profile, FailingGenerator, ScriptedGenerator, COORDINATOR, THREE_TASK_PLAN},
    workflow::{StageId, WorkflowEngine},
    Result, StudypalError,
};

enum Behaviour {
    Succeed,
    Fail,
    Panic,
    Sleep(Duration),
}

/// Agent with a fixed behaviour that logs when it ran
struct TestAgent {
    kind: AgentKind,
    behaviour: Behaviour,
    log: Arc<Mutex<Vec<AgentKind>>>,
}

impl TestAgent {
    fn new(kind: AgentKind, behaviour: Behaviour) -> Arc<Self> {
        Self::logged(kind, behaviour, Arc::default())
    }

    fn logged(kind: AgentKind, behaviour: Behaviour, log: Arc<Mutex<Vec<AgentKind>>>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behaviour,
            log,
        })
    }
}

#[async_trait]
impl StudyAgent for TestAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn run(&self, state: &SharedState) -> Result<AgentOutput> {
        self.log.lock().unwrap().push(self.kind);
        match &self.behaviour {
            Behaviour::Succeed => {}
            Behaviour::Fail => {
                return Err(StudypalError::StageError(format!("{} broke", self.kind)));
            }
            Behaviour::Panic => panic!("{} panicked", self.kind),
            Behaviour::Sleep(delay) => tokio::time::sleep(*delay).await,
        }

        let seen = state.results.executed_agents();
        Ok(match self.kind {
            AgentKind::Planner => AgentOutput::Plan {
                plan: "study plan".to_string(),
                tasks: Vec::new(),
            },
            AgentKind::NoteWriter => AgentOutput::Notes {
                notes: "notes".to_string(),
            },
            AgentKind::Advisor => AgentOutput::Guidance {
                guidance: format!("saw {} earlier outputs", seen.len()),
                recommendations: Vec::new(),
            },
        })
    }
}

fn analysis(required: &[&str], groups: &[Vec<&str>]) -> CoordinatorAnalysis {
    CoordinatorAnalysis::from_names(required, groups)
}

fn state_with(analysis: CoordinatorAnalysis) -> SharedState {
    let mut state = SharedState::new();
    state.results.coordinator_analysis = Some(analysis);
    state
}

fn executor() -> ConcurrentGroupExecutor {
    ConcurrentGroupExecutor::new(ExecutorConfig::default()).unwrap()
}

#[tokio::test]
async fn test_failing_agent_does_not_affect_sibling() {
    let executor = executor()
        .with_agent(TestAgent::new(AgentKind::Planner, Behaviour::Fail))
        .with_agent(TestAgent::new(AgentKind::NoteWriter, Behaviour::Succeed));
    let mut state = state_with(analysis(
        &["PLANNER", "NOTEWRITER"],
        &[vec!["PLANNER", "NOTEWRITER"]],
    ));

    executor.execute(&mut state).await;

    let outputs = &state.results.agent_outputs;
    assert!(!outputs.contains_key(&AgentKind::Planner));
    assert!(matches!(
        outputs.get(&AgentKind::NoteWriter),
        Some(AgentOutput::Notes { .. })
    ));
    assert_eq!(state.status(), WorkflowStatus::Processing);
}

#[tokio::test]
async fn test_panicking_agent_is_isolated() {
    let executor = executor()
        .with_agent(TestAgent::new(AgentKind::Planner, Behaviour::Succeed))
        .with_agent(TestAgent::new(AgentKind::Advisor, Behaviour::Panic));
    let mut state = state_with(analysis(&["planner", "advisor"], &[vec!["planner", "advisor"]]));

    executor.execute(&mut state).await;

    assert_eq!(
        state.results.executed_agents(),
        BTreeSet::from([AgentKind::Planner])
    );
}

#[tokio::test]
async fn test_later_group_sees_earlier_group_outputs() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = executor()
        .with_agent(TestAgent::logged(AgentKind::Planner, Behaviour::Succeed, log.clone()))
        .with_agent(TestAgent::logged(AgentKind::NoteWriter, Behaviour::Succeed, log.clone()))
        .with_agent(TestAgent::logged(AgentKind::Advisor, Behaviour::Succeed, log.clone()));
    let mut state = state_with(analysis(
        &["PLANNER", "NOTEWRITER", "ADVISOR"],
        &[vec!["PLANNER", "NOTEWRITER"], vec!["ADVISOR"]],
    ));

    executor.execute(&mut state).await;

    let log = log.lock().unwrap().clone();
    assert_eq!(log.len(), 3);
    assert_eq!(log[2], AgentKind::Advisor);
    assert!(matches!(
        state.results.agent_outputs.get(&AgentKind::Advisor),
        Some(AgentOutput::Guidance { guidance, .. }) if guidance == "saw 2 earlier outputs"
    ));
}

#[tokio::test]
async fn test_agents_in_one_group_share_the_group_snapshot() {
    let executor = executor()
        .with_agent(TestAgent::new(AgentKind::Planner, Behaviour::Succeed))
        .with_agent(TestAgent::new(AgentKind::Advisor, Behaviour::Succeed));
    let mut state = state_with(analysis(&["PLANNER", "ADVISOR"], &[vec!["PLANNER", "ADVISOR"]]));

    executor.execute(&mut state).await;

    assert!(matches!(
        state.results.agent_outputs.get(&AgentKind::Advisor),
        Some(AgentOutput::Guidance { guidance, .. }) if guidance == "saw 0 earlier outputs"
    ));
}

#[tokio::test]
async fn test_missing_analysis_merges_fallback_plan() {
    let mut state = SharedState::new();

    executor().execute(&mut state).await;

    assert_eq!(
        state.results.agent_outputs.get(&AgentKind::Planner),
        Some(&AgentOutput::fallback_plan())
    );
    assert_eq!(state.final_plan(), Some("Emergency fallback plan"));
}

#[tokio::test]
async fn test_unregistered_agent_is_skipped() {
    let executor = executor().with_agent(TestAgent::new(AgentKind::Planner, Behaviour::Succeed));
    let mut state = state_with(analysis(&["PLANNER", "ADVISOR"], &[vec!["PLANNER"], vec!["ADVISOR"]]));

    executor.execute(&mut state).await;

    assert_eq!(state.results.agent_outputs.len(), 1);
    assert!(state.results.agent_outputs.contains_key(&AgentKind::Planner));
}

#[tokio::test]
async fn test_ungrouped_required_agent_still_runs() {
    let executor = executor()
        .with_agent(TestAgent::new(AgentKind::Planner, Behaviour::Succeed))
        .with_agent(TestAgent::new(AgentKind::NoteWriter, Behaviour::Succeed));
    let mut state = state_with(analysis(&["PLANNER", "NOTEWRITER"], &[vec!["PLANNER"]]));

    executor.execute(&mut state).await;

    assert!(state.results.agent_outputs.contains_key(&AgentKind::NoteWriter));
}

#[tokio::test]
async fn test_grouped_but_not_required_agent_is_not_run() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = executor()
        .with_agent(TestAgent::logged(AgentKind::Planner, Behaviour::Succeed, log.clone()))
        .with_agent(TestAgent::logged(AgentKind::Advisor, Behaviour::Succeed, log.clone()));
    let mut state = state_with(analysis(&["PLANNER"], &[vec!["PLANNER", "ADVISOR"]]));

    executor.execute(&mut state).await;

    assert_eq!(*log.lock().unwrap(), vec![AgentKind::Planner]);
}

#[tokio::test]
async fn test_slow_agent_times_out() {
    let config = ExecutorConfig {
        parallelism_limit: 2,
        stage_timeout_secs: Some(1),
    };
    let executor = ConcurrentGroupExecutor::new(config)
        .unwrap()
        .with_agent(TestAgent::new(AgentKind::Planner, Behaviour::Succeed))
        .with_agent(TestAgent::new(
            AgentKind::NoteWriter,
            Behaviour::Sleep(Duration::from_secs(5)),
        ));
    let mut state = state_with(analysis(
        &["PLANNER", "NOTEWRITER"],
        &[vec!["PLANNER", "NOTEWRITER"]],
    ));

    executor.execute(&mut state).await;

    assert!(state.results.agent_outputs.contains_key(&AgentKind::Planner));
    assert!(!state.results.agent_outputs.contains_key(&AgentKind::NoteWriter));
}

#[tokio::test]
async fn test_repeated_execution_is_idempotent() {
    let executor = executor()
        .with_agent(TestAgent::new(AgentKind::Planner, Behaviour::Succeed))
        .with_agent(TestAgent::new(AgentKind::NoteWriter, Behaviour::Succeed));
    let mut state = state_with(analysis(
        &["PLANNER", "NOTEWRITER"],
        &[vec!["PLANNER"], vec!["NOTEWRITER"]],
    ));

    executor.execute(&mut state).await;
    let first = state.results.agent_outputs.clone();
    executor.execute(&mut state).await;

    assert_eq!(state.results.agent_outputs, first);
}

#[test]
fn test_zero_parallelism_is_rejected() {
    let config = ExecutorConfig {
        parallelism_limit: 0,
        stage_timeout_secs: None,
    };
    assert!(matches!(
        ConcurrentGroupExecutor::new(config),
        Err(StudypalError::ConfigError(_))
    ));
}

fn coordination_seed(request: &str) -> SharedState {
    SharedState::for_coordination(
        request,
        sample_profile(),
        serde_json::json!({"events": []}),
        serde_json::json!({"tasks": []}),
    )
}

#[tokio::test]
async fn test_coordinator_loop_completes_when_agents_satisfied() {
    let generator = ScriptedGenerator::new()
        .on(
            COORDINATOR,
            "Thought: the student wants notes and guidance for the exam\n\
             Action: deploy PLANNER\n\
             Observation: pending\n\
             Decision: Complete",
        )
        .on("Academic Planning Specialist", THREE_TASK_PLAN)
        .shared();
    let agents = StudyAgents::new(generator.clone());
    let engine = WorkflowEngine::coordinator_loop(
        generator,
        &agents,
        ExecutorConfig::default(),
        WorkflowConfig::default(),
    )
    .unwrap();

    let state = engine.run(coordination_seed("Help me prepare for my exam")).await;

    assert_eq!(state.status(), WorkflowStatus::Complete);
    assert_eq!(state.completion(), Some(CompletionReason::AgentsSatisfied));
    assert_eq!(
        state.visited(),
        &[StageId::Coordinator, StageId::ProfileAnalyzer, StageId::Execute]
    );
    assert_eq!(state.results.agent_outputs.len(), 3);
    assert_eq!(state.counters().coordination_rounds, 1);
    assert!(state.results.profile_analysis.is_some());
    // The raw profile is left in place
    assert_eq!(state.profile, sample_profile());
    assert!(state.final_plan().is_some());
}

#[tokio::test]
async fn test_coordinator_failure_falls_back_to_planner() {
    let generator = Arc::new(FailingGenerator);
    let executor = ConcurrentGroupExecutor::new(ExecutorConfig::default())
        .unwrap()
        .with_agent(TestAgent::new(AgentKind::Planner, Behaviour::Succeed));
    let scripted = ScriptedGenerator::new().shared();
    let agents = StudyAgents::new(scripted);
    let engine = WorkflowEngine::coordinator_loop_with(
        CoordinatorStage::new(generator),
        ProfileAnalysisStage::new(agents.profile_analyzer.clone()),
        executor,
        WorkflowConfig::default(),
    )
    .unwrap();

    let state = engine.run(coordination_seed("plan my week")).await;

    assert_eq!(state.completion(), Some(CompletionReason::AgentsSatisfied));
    let analysis = state.results.coordinator_analysis.as_ref().unwrap();
    assert_eq!(analysis.reasoning, "Fallback after coordinator failure");
    assert_eq!(state.final_plan(), Some("study plan"));
}

#[tokio::test]
async fn test_unsatisfiable_requirement_hits_coordination_ceiling() {
    let generator = ScriptedGenerator::new()
        .on(COORDINATOR, "Decision: need next agent")
        .shared();
    // ADVISOR is required every round but never registered
    let executor = ConcurrentGroupExecutor::new(ExecutorConfig::default())
        .unwrap()
        .with_agent(TestAgent::new(AgentKind::Planner, Behaviour::Succeed));
    let agents = StudyAgents::new(generator.clone());
    let config = WorkflowConfig {
        max_coordination_rounds: 3,
        ..WorkflowConfig::default()
    };
    let engine = WorkflowEngine::coordinator_loop_with(
        CoordinatorStage::new(generator),
        ProfileAnalysisStage::new(agents.profile_analyzer.clone()),
        executor,
        config,
    )
    .unwrap();

    let state = engine.run(coordination_seed("I need guidance")).await;

    assert_eq!(state.status(), WorkflowStatus::Complete);
    assert_eq!(state.completion(), Some(CompletionReason::CoordinationCeiling));
    assert!(state.completion().unwrap().is_ceiling());
    assert_eq!(state.counters().coordination_rounds, 3);
    assert_eq!(state.visited().len(), 9);
    assert!(!state.results.agent_outputs.contains_key(&AgentKind::Advisor));
}

#[tokio::test]
async fn test_coordinator_loop_requires_request() {
    let generator = ScriptedGenerator::new().shared();
    let agents = StudyAgents::new(generator.clone());
    let engine = WorkflowEngine::coordinator_loop(
        generator.clone(),
        &agents,
        ExecutorConfig::default(),
        WorkflowConfig::default(),
    )
    .unwrap();

    let state = engine.run(coordination_seed("   ")).await;

    assert_eq!(state.status(), WorkflowStatus::Failed);
    assert!(state.error().unwrap().contains("No request provided"));
    assert_eq!(generator.calls(), 0);
}
