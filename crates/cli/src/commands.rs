//! CLI subcommand handlers

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use studypal::{
    data::clean_json_content, DataManager, OpenAIProvider, SharedState, StudyAgents,
    TextGenerator, WorkflowEngine,
};

use crate::{config::Config, output::OutputHandler};

/// Days ahead of now that count as upcoming calendar events
const UPCOMING_EVENT_DAYS: i64 = 7;

fn generator(config: &Config) -> Result<Arc<dyn TextGenerator>> {
    let provider = OpenAIProvider::new(config.llm.clone())?;
    if !provider.is_configured() {
        anyhow::bail!(
            "No API key found; set the {} environment variable",
            config.llm.api_key_env
        );
    }
    Ok(Arc::new(provider))
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&clean_json_content(&content))
        .with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Study material from a JSON document, or plain text wrapped as `content`
fn read_material(path: &Path, subject: Option<&str>) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut material = match serde_json::from_str::<serde_json::Value>(&clean_json_content(&content)) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        _ => serde_json::json!({ "content": content.trim() }),
    };
    if let (Some(subject), Some(map)) = (subject, material.as_object_mut()) {
        map.insert("subject".to_string(), subject.into());
    }
    Ok(material)
}

/// Run the primary study workflow
pub async fn study(
    config: &Config,
    output: &OutputHandler,
    profile: &Path,
    material: &Path,
    subject: Option<&str>,
) -> Result<bool> {
    let profile = read_json(profile)?;
    let material = read_material(material, subject)?;

    let agents = StudyAgents::new(generator(config)?);
    let engine = WorkflowEngine::study_workflow(&agents, config.workflow.clone())?;

    output.print_info("Running study workflow...");
    let state = engine.run(SharedState::for_study(profile, material)).await;

    let succeeded = output.print_outcome(&state);
    if succeeded {
        output.print_study_result(&state);
    }
    Ok(succeeded)
}

/// Run the coordinator loop for one student and request
pub async fn coordinate(
    config: &Config,
    output: &OutputHandler,
    files: (&Path, &Path, &Path),
    student: &str,
    request: &str,
) -> Result<bool> {
    let (profile, calendar, tasks) = files;
    let data = DataManager::from_files(profile, calendar, tasks)?;

    let profile = data
        .student_profile(student)
        .cloned()
        .with_context(|| format!("Student profile not found: {}", student))?;
    let events = data.upcoming_events(UPCOMING_EVENT_DAYS);
    let active = data.active_tasks();
    output.print_info(&format!(
        "{} upcoming events, {} active tasks",
        events.len(),
        active.len()
    ));

    let generator = generator(config)?;
    let agents = StudyAgents::new(generator.clone());
    let engine = WorkflowEngine::coordinator_loop(
        generator,
        &agents,
        config.executor.clone(),
        config.workflow.clone(),
    )?;

    output.print_info("Running coordinator...");
    let state = engine
        .run(SharedState::for_coordination(
            request,
            profile,
            serde_json::json!({ "events": events }),
            serde_json::json!({ "tasks": active }),
        ))
        .await;

    let succeeded = output.print_outcome(&state);
    if succeeded {
        output.print_coordination_result(&state);
    }
    Ok(succeeded)
}

/// Show the effective configuration
pub fn show_config(config: &Config, output: &OutputHandler) -> Result<()> {
    output.print_header("Configuration");
    println!(
        "  {} {}",
        "File:".dimmed(),
        Config::config_path().display()
    );
    println!();
    println!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_plain_text_material_is_wrapped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Limits and continuity").unwrap();

        let material = read_material(file.path(), Some("Calculus")).unwrap();

        assert_eq!(material["content"], "Limits and continuity");
        assert_eq!(material["subject"], "Calculus");
    }

    #[test]
    fn test_json_material_keeps_its_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"subject\": \"Physics\", \"chapters\": [1, 2,]}}").unwrap();

        let material = read_material(file.path(), None).unwrap();

        assert_eq!(material["subject"], "Physics");
        assert_eq!(material["chapters"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_profile_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_json(&dir.path().join("missing.json")).is_err());
    }
}
