use std::sync::Arc;

use storedesk_agent::{
    AgentRuntime, InteractionLedger, LearningThresholds, ProviderError, ResilienceChain,
    RuntimeSettings, SessionRegistry, TaskHandlerRegistry,
};
use storedesk_core::catalog::{CatalogError, IntentCatalog};
use storedesk_core::config::{AppConfig, ConfigError, LoadOptions};
use storedesk_db::{connect_with_config, migrations, DbPool, RepositoryError};
use thiserror::Error;
use tracing::info;

/// Weight given to promoted keyword phrases merged into the catalog. Lower
/// than a curated phrase so a learned phrase alone never wins arbitration.
pub const LEARNED_PHRASE_WEIGHT: f64 = 6.0;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("loading promoted keywords failed: {0}")]
    LearnedKeywords(#[source] RepositoryError),
    #[error("completion provider setup failed: {0}")]
    Provider(#[from] ProviderError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let ledger = Arc::new(InteractionLedger::from_pool(
        db_pool.clone(),
        LearningThresholds::from(&config.learning),
    ));

    let mut catalog = IntentCatalog::load_or_builtin(config.catalog.path.as_deref())?;
    if let Some(min_score) = config.catalog.learned_min_score {
        let promoted = ledger.promote(min_score).await.map_err(BootstrapError::LearnedKeywords)?;
        let merged = catalog.merge_learned(&promoted, LEARNED_PHRASE_WEIGHT);
        info!(
            event_name = "system.bootstrap.learned_keywords_merged",
            correlation_id = "bootstrap",
            min_score,
            merged,
            "promoted keyword phrases merged into intent catalog"
        );
    }
    info!(
        event_name = "system.bootstrap.catalog_loaded",
        correlation_id = "bootstrap",
        intents = catalog.intents.len(),
        task_types = catalog.task_types.len(),
        "intent catalog loaded"
    );

    let chain = ResilienceChain::from_config(&config.llm)?;
    let runtime = AgentRuntime::new(
        Arc::new(catalog),
        SessionRegistry::from_config(&config.context),
        TaskHandlerRegistry::default(),
        chain,
        ledger,
        RuntimeSettings::from_config(&config),
    );

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use storedesk_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use storedesk_core::domain::interaction::InteractionDraft;
    use storedesk_agent::{InteractionLedger, LearningThresholds};
    use tempfile::TempDir;

    use crate::bootstrap::{bootstrap, bootstrap_with_config};

    fn file_database(dir: &TempDir) -> String {
        format!("sqlite://{}?mode=rwc", dir.path().join("storedesk.db").display())
    }

    #[tokio::test]
    async fn bootstrap_applies_ledger_schema() {
        let dir = TempDir::new().expect("tempdir");
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(file_database(&dir)),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with defaults");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('interaction_log', 'keyword_suggestion')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 2);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_database_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://not-sqlite".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn promoted_keywords_are_merged_when_enabled() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = AppConfig::default();
        config.database.url = file_database(&dir);

        let seeded = bootstrap_with_config(config.clone()).await.expect("first bootstrap");
        let ledger = InteractionLedger::from_pool(seeded.db_pool.clone(), LearningThresholds::default());
        for _ in 0..5 {
            ledger
                .log_at(
                    InteractionDraft {
                        user_id: "U1".to_string(),
                        message: "how much inventory remains".to_string(),
                        intent_type: "check_stock".to_string(),
                        confidence: 0.95,
                        response: "40 units".to_string(),
                        success: true,
                        feedback: None,
                    },
                    Utc::now(),
                )
                .await;
        }
        seeded.db_pool.close().await;

        config.catalog.learned_min_score = Some(0.3);
        let app = bootstrap_with_config(config).await.expect("second bootstrap");
        let check_stock = app.runtime.catalog().intent("check_stock").expect("check_stock intent");
        assert!(check_stock.phrases.iter().any(|phrase| phrase.text == "inventory remains"));
        app.db_pool.close().await;
    }
}
