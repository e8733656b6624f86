//! Studypal CLI - study workflows and agent coordination from the terminal
//!
//! Loads seed files, builds an engine against an OpenAI-compatible endpoint,
//! runs it and prints the outcome.

mod commands;
mod config;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Studypal CLI - personalised study plans
#[derive(Parser)]
#[command(name = "studypal")]
#[command(author = "Studypal Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build personalised study plans from profile, calendar and task data")]
#[command(long_about = r#"
Studypal runs a cyclic study workflow or an agent coordinator over your seed data.

Examples:
  studypal study --profile profile.json --material notes.md --subject Calculus
  studypal coordinate --profile profiles.json --calendar calendar.json \
      --tasks tasks.json --student s1 --request "Help me prepare for finals"
  studypal config --show
"#)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.studypal/config.toml)
    #[arg(long, env = "STUDYPAL_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the study workflow for one profile and material
    Study {
        /// Student profile JSON
        #[arg(long)]
        profile: PathBuf,

        /// Study material, JSON or plain text
        #[arg(long)]
        material: PathBuf,

        /// Subject of the material
        #[arg(long)]
        subject: Option<String>,
    },

    /// Let the coordinator pick and run the agents for a request
    Coordinate {
        /// Profiles JSON with a `profiles` array
        #[arg(long)]
        profile: PathBuf,

        /// Calendar JSON with an `events` array
        #[arg(long)]
        calendar: PathBuf,

        /// Tasks JSON with a `tasks` array
        #[arg(long)]
        tasks: PathBuf,

        /// Student id to look up in the profiles
        #[arg(long)]
        student: String,

        /// What the student asks for
        #[arg(long)]
        request: String,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("studypal={},studypal_cli={},warn", log_level, log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };
    let output = output::OutputHandler::new(cli.verbose);

    let succeeded = match cli.command {
        Commands::Study {
            profile,
            material,
            subject,
        } => commands::study(&config, &output, &profile, &material, subject.as_deref()).await?,
        Commands::Coordinate {
            profile,
            calendar,
            tasks,
            student,
            request,
        } => {
            commands::coordinate(
                &config,
                &output,
                (&profile, &calendar, &tasks),
                &student,
                &request,
            )
            .await?
        }
        Commands::Config { show } => {
            if show {
                commands::show_config(&config, &output)?;
            } else {
                output.print_info(&format!(
                    "Edit {} and use --show to print the effective configuration",
                    config::Config::config_path().display()
                ));
            }
            true
        }
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
