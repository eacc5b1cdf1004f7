use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub context: ContextConfig,
    pub learning: LearningConfig,
    pub catalog: CatalogConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    /// Secondary model tried once the primary call fails. Defaults to `model`.
    pub fallback_model: Option<String>,
    pub fallback_base_url: Option<String>,
    pub fallback_timeout_secs: u64,
}

impl LlmConfig {
    pub fn fallback_model(&self) -> &str {
        self.fallback_model.as_deref().unwrap_or(&self.model)
    }

    pub fn fallback_base_url(&self) -> Option<&str> {
        self.fallback_base_url.as_deref().or(self.base_url.as_deref())
    }
}

#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub freshness_minutes: i64,
    pub max_sessions: usize,
    pub history_turns: usize,
}

#[derive(Clone, Debug)]
pub struct LearningConfig {
    pub problem_confidence: f64,
    pub success_confidence: f64,
    pub report_min_score: f64,
    pub report_limit: u32,
}

#[derive(Clone, Debug, Default)]
pub struct CatalogConfig {
    pub path: Option<PathBuf>,
    /// When set, keywords promoted at or above this score are merged into the
    /// catalog at startup.
    pub learned_min_score: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub catalog_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://storedesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                fallback_model: None,
                fallback_base_url: None,
                fallback_timeout_secs: 30,
            },
            context: ContextConfig { freshness_minutes: 30, max_sessions: 1_000, history_turns: 5 },
            learning: LearningConfig {
                problem_confidence: 0.7,
                success_confidence: 0.9,
                report_min_score: 0.3,
                report_limit: 20,
            },
            catalog: CatalogConfig::default(),
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("storedesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(fallback_model) = llm.fallback_model {
                self.llm.fallback_model = Some(fallback_model);
            }
            if let Some(fallback_base_url) = llm.fallback_base_url {
                self.llm.fallback_base_url = Some(fallback_base_url);
            }
            if let Some(fallback_timeout_secs) = llm.fallback_timeout_secs {
                self.llm.fallback_timeout_secs = fallback_timeout_secs;
            }
        }

        if let Some(context) = patch.context {
            if let Some(freshness_minutes) = context.freshness_minutes {
                self.context.freshness_minutes = freshness_minutes;
            }
            if let Some(max_sessions) = context.max_sessions {
                self.context.max_sessions = max_sessions;
            }
            if let Some(history_turns) = context.history_turns {
                self.context.history_turns = history_turns;
            }
        }

        if let Some(learning) = patch.learning {
            if let Some(problem_confidence) = learning.problem_confidence {
                self.learning.problem_confidence = problem_confidence;
            }
            if let Some(success_confidence) = learning.success_confidence {
                self.learning.success_confidence = success_confidence;
            }
            if let Some(report_min_score) = learning.report_min_score {
                self.learning.report_min_score = report_min_score;
            }
            if let Some(report_limit) = learning.report_limit {
                self.learning.report_limit = report_limit;
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(path) = catalog.path {
                self.catalog.path = Some(path);
            }
            if let Some(learned_min_score) = catalog.learned_min_score {
                self.catalog.learned_min_score = Some(learned_min_score);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STOREDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("STOREDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_value("STOREDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("STOREDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_value("STOREDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STOREDESK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("STOREDESK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("STOREDESK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("STOREDESK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("STOREDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_value("STOREDESK_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("STOREDESK_LLM_FALLBACK_MODEL") {
            self.llm.fallback_model = Some(value);
        }
        if let Some(value) = read_env("STOREDESK_LLM_FALLBACK_BASE_URL") {
            self.llm.fallback_base_url = Some(value);
        }
        if let Some(value) = read_env("STOREDESK_LLM_FALLBACK_TIMEOUT_SECS") {
            self.llm.fallback_timeout_secs =
                parse_value("STOREDESK_LLM_FALLBACK_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STOREDESK_CONTEXT_FRESHNESS_MINUTES") {
            self.context.freshness_minutes =
                parse_value("STOREDESK_CONTEXT_FRESHNESS_MINUTES", &value)?;
        }
        if let Some(value) = read_env("STOREDESK_CONTEXT_MAX_SESSIONS") {
            self.context.max_sessions = parse_value("STOREDESK_CONTEXT_MAX_SESSIONS", &value)?;
        }

        if let Some(value) = read_env("STOREDESK_CATALOG_PATH") {
            self.catalog.path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("STOREDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("STOREDESK_SERVER_PORT") {
            self.server.port = parse_value("STOREDESK_SERVER_PORT", &value)?;
        }

        let log_level =
            read_env("STOREDESK_LOGGING_LEVEL").or_else(|| read_env("STOREDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STOREDESK_LOGGING_FORMAT").or_else(|| read_env("STOREDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(catalog_path) = overrides.catalog_path {
            self.catalog.path = Some(catalog_path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_context(&self.context)?;
        validate_learning(&self.learning)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("storedesk.toml"), PathBuf::from("config/storedesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if llm.fallback_timeout_secs == 0 || llm.fallback_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.fallback_timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    for base_url in [llm.base_url.as_deref(), llm.fallback_base_url.as_deref()].into_iter().flatten()
    {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "llm base url `{base_url}` must start with http:// or https://"
            )));
        }
    }

    Ok(())
}

fn validate_context(context: &ContextConfig) -> Result<(), ConfigError> {
    if context.freshness_minutes <= 0 {
        return Err(ConfigError::Validation(
            "context.freshness_minutes must be greater than zero".to_string(),
        ));
    }
    if context.max_sessions == 0 {
        return Err(ConfigError::Validation(
            "context.max_sessions must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_learning(learning: &LearningConfig) -> Result<(), ConfigError> {
    let in_unit_range = |value: f64| (0.0..=1.0).contains(&value);
    if !in_unit_range(learning.problem_confidence) || !in_unit_range(learning.success_confidence)
    {
        return Err(ConfigError::Validation(
            "learning confidence thresholds must be in range 0.0..=1.0".to_string(),
        ));
    }
    if learning.problem_confidence > learning.success_confidence {
        return Err(ConfigError::Validation(
            "learning.problem_confidence must not exceed learning.success_confidence".to_string(),
        ));
    }
    if learning.report_limit == 0 {
        return Err(ConfigError::Validation(
            "learning.report_limit must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    context: Option<ContextPatch>,
    learning: Option<LearningPatch>,
    catalog: Option<CatalogPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    fallback_model: Option<String>,
    fallback_base_url: Option<String>,
    fallback_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ContextPatch {
    freshness_minutes: Option<i64>,
    max_sessions: Option<usize>,
    history_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LearningPatch {
    problem_confidence: Option<f64>,
    success_confidence: Option<f64>,
    report_min_score: Option<f64>,
    report_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    path: Option<PathBuf>,
    learned_min_score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        ensure(config.context.freshness_minutes == 30, "default freshness window is 30 minutes")?;
        ensure(config.llm.fallback_model() == "llama3.1", "fallback model defaults to model")?;
        ensure(
            (config.learning.problem_confidence - 0.7).abs() < f64::EPSILON,
            "problem confidence defaults to 0.7",
        )?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "compact is default format")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_STOREDESK_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("storedesk.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "open_ai"
api_key = "${TEST_STOREDESK_LLM_KEY}"
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
fallback_model = "gpt-4o"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            ensure(config.llm.fallback_model() == "gpt-4o", "fallback model should come from file")
        })();

        clear_vars(&["TEST_STOREDESK_LLM_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STOREDESK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("STOREDESK_CONTEXT_FRESHNESS_MINUTES", "45");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("storedesk.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[context]
freshness_minutes = 10
max_sessions = 50

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.context.freshness_minutes == 45, "env freshness should win over file")?;
            ensure(config.context.max_sessions == 50, "file max_sessions should win over default")
        })();

        clear_vars(&["STOREDESK_DATABASE_URL", "STOREDESK_CONTEXT_FRESHNESS_MINUTES"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::Anthropic),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("llm.api_key")
        );
        ensure(has_message, "validation failure should mention llm.api_key")
    }

    #[test]
    fn invalid_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STOREDESK_CONTEXT_MAX_SESSIONS", "lots");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override failure".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "STOREDESK_CONTEXT_MAX_SESSIONS", "override key should be named")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["STOREDESK_CONTEXT_MAX_SESSIONS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STOREDESK_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")
        })();

        clear_vars(&["STOREDESK_LLM_API_KEY"]);
        result
    }
}
