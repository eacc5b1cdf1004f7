use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use storedesk_core::domain::interaction::{
    IntentCount, InteractionId, InteractionRecord, KeywordSuggestion,
};

use super::{InteractionRepository, KeywordSuggestionRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryInteractionRepository {
    records: RwLock<HashMap<String, InteractionRecord>>,
}

#[async_trait::async_trait]
impl InteractionRepository for InMemoryInteractionRepository {
    async fn insert(&self, record: InteractionRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.insert(record.id.0.clone(), record);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &InteractionId,
    ) -> Result<Option<InteractionRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(&id.0).cloned())
    }

    async fn attach_feedback(
        &self,
        id: &InteractionId,
        feedback: &str,
    ) -> Result<bool, RepositoryError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id.0) {
            Some(record) if record.feedback.is_none() => {
                record.feedback = Some(feedback.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<InteractionRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut matching: Vec<InteractionRecord> = records
            .values()
            .filter(|record| record.timestamp >= since && record.timestamp <= until)
            .cloned()
            .collect();
        matching.sort_by_key(|record| record.timestamp);
        Ok(matching)
    }

    async fn intent_distribution(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<IntentCount>, RepositoryError> {
        let records = self.records.read().await;
        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for record in records.values() {
            if record.timestamp >= since && record.timestamp <= until {
                *counts.entry(record.intent_type.as_str()).or_default() += 1;
            }
        }

        let mut distribution: Vec<IntentCount> = counts
            .into_iter()
            .map(|(intent_type, count)| IntentCount { intent_type: intent_type.to_string(), count })
            .collect();
        distribution
            .sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.intent_type.cmp(&b.intent_type)));
        Ok(distribution)
    }
}

/// Keyword store guarded by a single write lock, which keeps increments atomic.
#[derive(Default)]
pub struct InMemoryKeywordSuggestionRepository {
    suggestions: RwLock<HashMap<(String, String), KeywordSuggestion>>,
}

#[async_trait::async_trait]
impl KeywordSuggestionRepository for InMemoryKeywordSuggestionRepository {
    async fn reinforce(
        &self,
        intent_type: &str,
        keyword: &str,
        increment: f64,
        seen_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut suggestions = self.suggestions.write().await;
        suggestions
            .entry((intent_type.to_string(), keyword.to_string()))
            .and_modify(|suggestion| {
                suggestion.score += increment;
                suggestion.occurrences = suggestion.occurrences.saturating_add(1);
                suggestion.last_seen = seen_at;
            })
            .or_insert_with(|| KeywordSuggestion {
                intent_type: intent_type.to_string(),
                keyword: keyword.to_string(),
                score: increment,
                occurrences: 1,
                first_seen: seen_at,
                last_seen: seen_at,
            });
        Ok(())
    }

    async fn find(
        &self,
        intent_type: &str,
        keyword: &str,
    ) -> Result<Option<KeywordSuggestion>, RepositoryError> {
        let suggestions = self.suggestions.read().await;
        Ok(suggestions.get(&(intent_type.to_string(), keyword.to_string())).cloned())
    }

    async fn top(
        &self,
        min_score: f64,
        limit: Option<u32>,
    ) -> Result<Vec<KeywordSuggestion>, RepositoryError> {
        let suggestions = self.suggestions.read().await;
        let mut ranked: Vec<KeywordSuggestion> =
            suggestions.values().filter(|s| s.score > min_score).cloned().collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.intent_type.cmp(&b.intent_type))
                .then_with(|| a.keyword.cmp(&b.keyword))
        });
        if let Some(limit) = limit {
            ranked.truncate(limit as usize);
        }
        Ok(ranked)
    }
}
