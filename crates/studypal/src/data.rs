//! Seed data loading for profiles, calendar events and tasks

use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::{Result, StudypalError};

static LINE_COMMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*//.*$").expect("valid line comment regex"));
static BLOCK_COMMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment regex"));
static TRAILING_COMMA_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("valid trailing comma regex"));

/// Profile, calendar and task documents for a coordination run
#[derive(Debug, Clone, Default)]
pub struct DataManager {
    profiles: Value,
    calendar: Value,
    tasks: Value,
}

impl DataManager {
    /// Parse the three documents, tolerating comments and trailing commas
    pub fn load(profile_json: &str, calendar_json: &str, task_json: &str) -> Result<Self> {
        Ok(Self {
            profiles: parse_document("profile", profile_json)?,
            calendar: parse_document("calendar", calendar_json)?,
            tasks: parse_document("task", task_json)?,
        })
    }

    pub fn from_files(
        profile_path: impl AsRef<Path>,
        calendar_path: impl AsRef<Path>,
        task_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let profile = std::fs::read_to_string(profile_path)?;
        let calendar = std::fs::read_to_string(calendar_path)?;
        let tasks = std::fs::read_to_string(task_path)?;
        Self::load(&profile, &calendar, &tasks)
    }

    pub fn calendar(&self) -> &Value {
        &self.calendar
    }

    pub fn tasks(&self) -> &Value {
        &self.tasks
    }

    /// Profile with the given id from the `profiles` array
    pub fn student_profile(&self, student_id: &str) -> Option<&Value> {
        self.profiles
            .get("profiles")
            .and_then(|v| v.as_array())?
            .iter()
            .find(|profile| profile.get("id").and_then(|v| v.as_str()) == Some(student_id))
    }

    pub fn upcoming_events(&self, days: i64) -> Vec<Value> {
        self.upcoming_events_at(Utc::now(), days)
    }

    /// Events whose `start.dateTime` lies within `[now, now + days]`
    pub fn upcoming_events_at(&self, now: DateTime<Utc>, days: i64) -> Vec<Value> {
        let until = now + Duration::days(days);
        entries(&self.calendar, "events")
            .filter(|event| {
                let start = event
                    .pointer("/start/dateTime")
                    .and_then(|v| v.as_str())
                    .and_then(parse_datetime);
                match start {
                    Some(start) => start >= now && start <= until,
                    None => {
                        tracing::warn!("[DATA] Could not process event, skipping: {}", event);
                        false
                    }
                }
            })
            .cloned()
            .collect()
    }

    pub fn active_tasks(&self) -> Vec<Value> {
        self.active_tasks_at(Utc::now())
    }

    /// Tasks still `needsAction` whose `due` lies after `now`
    pub fn active_tasks_at(&self, now: DateTime<Utc>) -> Vec<Value> {
        entries(&self.tasks, "tasks")
            .filter_map(|task| {
                let due = task.get("due").and_then(|v| v.as_str()).and_then(parse_datetime);
                let status = task.get("status").and_then(|v| v.as_str());
                match (due, status) {
                    (Some(due), Some(status)) => {
                        (status == "needsAction" && due > now).then(|| task.clone())
                    }
                    _ => {
                        tracing::warn!("[DATA] Could not process task, skipping: {}", task);
                        None
                    }
                }
            })
            .collect()
    }
}

/// Strip comment lines, block comments and trailing commas from a JSON document
pub fn clean_json_content(content: &str) -> String {
    let without_lines = LINE_COMMENT_REGEX.replace_all(content, "");
    let without_blocks = BLOCK_COMMENT_REGEX.replace_all(&without_lines, "");
    TRAILING_COMMA_REGEX
        .replace_all(&without_blocks, "$1")
        .trim()
        .to_string()
}

fn parse_document(label: &str, content: &str) -> Result<Value> {
    let cleaned = clean_json_content(content);
    if cleaned.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&cleaned)
        .map_err(|e| StudypalError::InputError(format!("Invalid {} data: {}", label, e)))
}

fn entries<'a>(document: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    document
        .get(key)
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
}

/// RFC 3339 timestamps, or naive timestamps taken as UTC
fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
