use storedesk_agent::{InteractionLedger, LearningThresholds};
use storedesk_core::config::AppConfig;
use storedesk_core::domain::interaction::{InteractionReport, ReportPeriod};

use crate::commands::{build_runtime, load_config, migrated_pool, CommandResult, StepFailure};

pub fn run(period: &str) -> CommandResult {
    let period: ReportPeriod = match period.parse() {
        Ok(period) => period,
        Err(message) => return CommandResult::failure("report", "invalid_argument", message, 64),
    };
    let config = match load_config("report") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("report") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(load_report(&config, period));

    match result {
        Ok(report) => {
            let data = serde_json::to_value(&report).ok();
            CommandResult::success_with_data("report", summarize(&report), data)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("report", error_class, message, exit_code)
        }
    }
}

async fn load_report(
    config: &AppConfig,
    period: ReportPeriod,
) -> Result<InteractionReport, StepFailure> {
    let pool = migrated_pool(config).await?;
    let ledger = InteractionLedger::from_pool(pool, LearningThresholds::from(&config.learning));
    let report = ledger.report(period).await;
    ledger.shutdown().await;
    report.map_err(|error| ("report_query", error.to_string(), 6))
}

fn summarize(report: &InteractionReport) -> String {
    format!(
        "{} report: {} interactions, {:.0}% successful, average confidence {:.2}",
        report.period.as_str(),
        report.total,
        report.success_rate * 100.0,
        report.average_confidence
    )
}

