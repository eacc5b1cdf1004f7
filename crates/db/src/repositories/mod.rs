use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use storedesk_core::domain::interaction::{
    IntentCount, InteractionId, InteractionRecord, KeywordSuggestion,
};

pub mod interaction;
pub mod keyword;
pub mod memory;

pub use interaction::SqlInteractionRepository;
pub use keyword::SqlKeywordSuggestionRepository;
pub use memory::{InMemoryInteractionRepository, InMemoryKeywordSuggestionRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Append-only store of resolved turns.
#[async_trait]
pub trait InteractionRepository: Send + Sync {
    async fn insert(&self, record: InteractionRecord) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: &InteractionId,
    ) -> Result<Option<InteractionRecord>, RepositoryError>;

    /// Sets feedback on a record that has none yet. Returns `false` when the
    /// record is missing or already carries feedback.
    async fn attach_feedback(
        &self,
        id: &InteractionId,
        feedback: &str,
    ) -> Result<bool, RepositoryError>;

    /// Records with `since <= timestamp <= until`, oldest first.
    async fn list_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<InteractionRecord>, RepositoryError>;

    /// Per-intent counts inside the window, most frequent first.
    async fn intent_distribution(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<IntentCount>, RepositoryError>;

    async fn close(&self) {}
}

#[async_trait]
pub trait KeywordSuggestionRepository: Send + Sync {
    /// Creates the `(intent_type, keyword)` entry or bumps its score by
    /// `increment`. The increment must be atomic per key.
    async fn reinforce(
        &self,
        intent_type: &str,
        keyword: &str,
        increment: f64,
        seen_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn find(
        &self,
        intent_type: &str,
        keyword: &str,
    ) -> Result<Option<KeywordSuggestion>, RepositoryError>;

    /// Suggestions scoring strictly above `min_score`, best first.
    async fn top(
        &self,
        min_score: f64,
        limit: Option<u32>,
    ) -> Result<Vec<KeywordSuggestion>, RepositoryError>;

    async fn close(&self) {}
}

/// Fixed-width RFC3339 so stored timestamps sort lexicographically.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}
