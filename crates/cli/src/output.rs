//! Output formatting and terminal rendering

use colored::Colorize;
use studypal::{SharedState, WorkflowStatus};

/// Output handler for terminal display
pub struct OutputHandler {
    pub verbose: bool,
}

impl OutputHandler {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Print a section header
    pub fn print_header(&self, text: &str) {
        println!();
        println!("{}", format!("▶ {}", text).bright_yellow().bold());
        println!("{}", "─".repeat(60).dimmed());
    }

    /// Print a success message
    pub fn print_success(&self, text: &str) {
        println!("{} {}", "✓".bright_green(), text.bright_white());
    }

    /// Print an error message
    pub fn print_error(&self, text: &str) {
        println!("{} {}", "✗".bright_red(), text.bright_red());
    }

    /// Print a warning message
    pub fn print_warning(&self, text: &str) {
        println!("{} {}", "⚠".bright_yellow(), text.yellow());
    }

    /// Print an info message
    pub fn print_info(&self, text: &str) {
        println!("{} {}", "ℹ".bright_blue(), text);
    }

    fn print_field(&self, label: &str, value: &str) {
        println!("  {} {}", format!("{}:", label).dimmed(), value);
    }

    /// Status, completion reason and counters of a finished run.
    /// Returns false when the run failed.
    pub fn print_outcome(&self, state: &SharedState) -> bool {
        self.print_header("Run Outcome");
        self.print_field("Run", &state.run_id.to_string());

        match (state.status(), state.completion()) {
            (WorkflowStatus::Complete, Some(reason)) => {
                let status = format!("complete ({})", reason);
                if reason.is_ceiling() {
                    self.print_warning(&status);
                } else {
                    self.print_success(&status);
                }
            }
            _ => {
                self.print_error(&format!("{}", state.status()));
                if let Some(error) = state.error() {
                    println!("{}", error);
                }
                return false;
            }
        }

        let counters = state.counters();
        self.print_field(
            "Stages",
            &state
                .visited()
                .iter()
                .map(|stage| stage.as_str())
                .collect::<Vec<_>>()
                .join(" → "),
        );
        if self.verbose {
            self.print_field("Attempts", &counters.attempts.to_string());
            self.print_field("Review attempts", &counters.review_attempts.to_string());
            self.print_field("Plan adjustments", &counters.plan_adjustments.to_string());
            self.print_field("Coordination rounds", &counters.coordination_rounds.to_string());
            self.print_field("Completion score", &format!("{:.2}", state.completion_score()));
            self.print_field(
                "Understanding score",
                &format!("{:.2}", state.understanding_score()),
            );
        }
        true
    }

    /// Plan, progress and the latest feedback of the study workflow
    pub fn print_study_result(&self, state: &SharedState) {
        if let Some(plan) = &state.plan {
            self.print_header(&format!(
                "Study Plan{}",
                plan.subject
                    .as_deref()
                    .map(|subject| format!(" - {}", subject))
                    .unwrap_or_default()
            ));
            for task in &plan.tasks {
                let marker = if task.completed {
                    "✓".bright_green()
                } else {
                    "○".dimmed()
                };
                println!("  {} {}", marker, task.title);
            }
            println!(
                "  {}",
                format!("{}/{} tasks completed", plan.completed_count(), plan.tasks.len()).dimmed()
            );
        }

        if let Some(feedback) = state.feedback().last() {
            self.print_header("Feedback");
            println!("{}", feedback.message);
        }
    }

    /// Final plan and per-agent outputs of the coordinator loop
    pub fn print_coordination_result(&self, state: &SharedState) {
        if let Some(analysis) = &state.results.coordinator_analysis {
            self.print_header("Coordinator");
            self.print_field(
                "Required agents",
                &analysis
                    .required_agents
                    .iter()
                    .map(|kind| kind.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            if self.verbose && !analysis.reasoning.is_empty() {
                println!("{}", analysis.reasoning.dimmed());
            }
        }

        self.print_header("Final Plan");
        match state.final_plan() {
            Some(plan) => println!("{}", plan),
            None => self.print_info("No plan was produced."),
        }

        if self.verbose {
            for (kind, output) in &state.results.agent_outputs {
                self.print_header(&format!("Agent output: {}", kind));
                match serde_json::to_string_pretty(output) {
                    Ok(rendered) => println!("{}", rendered),
                    Err(e) => self.print_warning(&format!("Could not render output: {}", e)),
                }
            }
        }
    }
}
