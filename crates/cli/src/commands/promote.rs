use std::collections::BTreeMap;

use storedesk_agent::{InteractionLedger, LearningThresholds};
use storedesk_core::config::AppConfig;

use crate::commands::{build_runtime, load_config, migrated_pool, CommandResult, StepFailure};

/// Lists mined keyword phrases scoring strictly above `min_score`, grouped by
/// intent. Without a threshold the configured report minimum applies.
pub fn run(min_score: Option<f64>) -> CommandResult {
    if let Some(score) = min_score {
        if !score.is_finite() || score < 0.0 {
            return CommandResult::failure(
                "promote",
                "invalid_argument",
                format!("--min-score must be a non-negative number, got {score}"),
                64,
            );
        }
    }
    let config = match load_config("promote") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("promote") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let min_score = min_score.unwrap_or(config.learning.report_min_score);

    let result = runtime.block_on(load_promoted(&config, min_score));

    match result {
        Ok(promoted) => {
            let data = serde_json::json!({ "min_score": min_score, "keywords": promoted });
            CommandResult::success_with_data("promote", summarize(&promoted, min_score), Some(data))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("promote", error_class, message, exit_code)
        }
    }
}

async fn load_promoted(
    config: &AppConfig,
    min_score: f64,
) -> Result<BTreeMap<String, Vec<String>>, StepFailure> {
    let pool = migrated_pool(config).await?;
    let ledger = InteractionLedger::from_pool(pool, LearningThresholds::from(&config.learning));
    let promoted = ledger.promote(min_score).await;
    ledger.shutdown().await;
    promoted.map_err(|error| ("keyword_query", error.to_string(), 6))
}

fn summarize(promoted: &BTreeMap<String, Vec<String>>, min_score: f64) -> String {
    let phrases: usize = promoted.values().map(Vec::len).sum();
    format!(
        "{phrases} keyword phrases across {} intents scored above {min_score}",
        promoted.len()
    )
}
