use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use storedesk_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// One rendered setting: dotted key, environment override (if any), value.
struct Field {
    key: &'static str,
    env_key: Option<&'static str>,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: Option<&'static str>, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let unset = |value: Option<&str>| value.unwrap_or("<unset>").to_string();
    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        Field::new("database.url", Some("STOREDESK_DATABASE_URL"), config.database.url.clone()),
        Field::new(
            "database.max_connections",
            Some("STOREDESK_DATABASE_MAX_CONNECTIONS"),
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            Some("STOREDESK_DATABASE_TIMEOUT_SECS"),
            config.database.timeout_secs.to_string(),
        ),
        Field::new("llm.provider", Some("STOREDESK_LLM_PROVIDER"), format!("{:?}", config.llm.provider)),
        Field::new("llm.model", Some("STOREDESK_LLM_MODEL"), config.llm.model.clone()),
        Field::new("llm.base_url", Some("STOREDESK_LLM_BASE_URL"), unset(config.llm.base_url.as_deref())),
        Field::new("llm.api_key", Some("STOREDESK_LLM_API_KEY"), api_key),
        Field::new(
            "llm.timeout_secs",
            Some("STOREDESK_LLM_TIMEOUT_SECS"),
            config.llm.timeout_secs.to_string(),
        ),
        Field::new("llm.fallback_model", Some("STOREDESK_LLM_FALLBACK_MODEL"), config.llm.fallback_model()),
        Field::new(
            "llm.fallback_base_url",
            Some("STOREDESK_LLM_FALLBACK_BASE_URL"),
            unset(config.llm.fallback_base_url()),
        ),
        Field::new(
            "llm.fallback_timeout_secs",
            Some("STOREDESK_LLM_FALLBACK_TIMEOUT_SECS"),
            config.llm.fallback_timeout_secs.to_string(),
        ),
        Field::new(
            "context.freshness_minutes",
            Some("STOREDESK_CONTEXT_FRESHNESS_MINUTES"),
            config.context.freshness_minutes.to_string(),
        ),
        Field::new(
            "context.max_sessions",
            Some("STOREDESK_CONTEXT_MAX_SESSIONS"),
            config.context.max_sessions.to_string(),
        ),
        Field::new("context.history_turns", None, config.context.history_turns.to_string()),
        Field::new(
            "learning.problem_confidence",
            None,
            config.learning.problem_confidence.to_string(),
        ),
        Field::new(
            "learning.success_confidence",
            None,
            config.learning.success_confidence.to_string(),
        ),
        Field::new("learning.report_min_score", None, config.learning.report_min_score.to_string()),
        Field::new("learning.report_limit", None, config.learning.report_limit.to_string()),
        Field::new(
            "catalog.path",
            Some("STOREDESK_CATALOG_PATH"),
            config
                .catalog
                .path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<builtin>".to_string()),
        ),
        Field::new(
            "catalog.learned_min_score",
            None,
            config
                .catalog
                .learned_min_score
                .map(|score| score.to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
        ),
        Field::new(
            "server.bind_address",
            Some("STOREDESK_SERVER_BIND_ADDRESS"),
            config.server.bind_address.clone(),
        ),
        Field::new("server.port", Some("STOREDESK_SERVER_PORT"), config.server.port.to_string()),
        Field::new("logging.level", Some("STOREDESK_LOGGING_LEVEL"), config.logging.level.clone()),
        Field::new(
            "logging.format",
            Some("STOREDESK_LOGGING_FORMAT"),
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("storedesk.toml"), PathBuf::from("config/storedesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
