pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;

pub use catalog::{CatalogError, IntentCatalog, IntentEntry, TaskTypeEntry, WeightedTerm};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::entity::{EntityCategory, EntityMention};
pub use domain::interaction::{
    InteractionClass, InteractionDraft, InteractionId, InteractionRecord, InteractionReport,
    IntentCount, KeywordSuggestion, ReportPeriod,
};
pub use domain::task::{
    IntentDecision, IntentSource, SubTask, SubTaskKind, SubTaskPayload, TaskType, GENERAL_INTENT,
};
pub use errors::ErrorCategory;
