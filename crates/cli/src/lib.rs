pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "storedesk",
    about = "Storedesk operator CLI",
    long_about = "Operate the Storedesk assistant: migrations, config inspection, readiness checks, interaction reports, and keyword promotion.",
    after_help = "Examples:\n  storedesk doctor --json\n  storedesk report weekly\n  storedesk promote --min-score 0.5"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, intent catalog, LLM settings, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Summarize logged interactions for a period (daily, weekly, monthly)")]
    Report {
        #[arg(default_value = "weekly")]
        period: String,
    },
    #[command(about = "List mined keyword phrases scoring above a threshold, grouped by intent")]
    Promote {
        #[arg(long, help = "Minimum score; defaults to learning.report_min_score")]
        min_score: Option<f64>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Report { period } => commands::report::run(&period),
        Command::Promote { min_score } => commands::promote::run(min_score),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
