use chrono::{DateTime, Utc};
use sqlx::Row;

use storedesk_core::domain::interaction::KeywordSuggestion;

use super::{decode_timestamp, encode_timestamp, KeywordSuggestionRepository, RepositoryError};
use crate::DbPool;

pub struct SqlKeywordSuggestionRepository {
    pool: DbPool,
}

impl SqlKeywordSuggestionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_suggestion(row: &sqlx::sqlite::SqliteRow) -> Result<KeywordSuggestion, RepositoryError> {
    let intent_type: String =
        row.try_get("intent_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let keyword: String =
        row.try_get("keyword").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let score: f64 = row.try_get("score").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let occurrences: i64 =
        row.try_get("occurrences").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let first_seen: String =
        row.try_get("first_seen").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_seen: String =
        row.try_get("last_seen").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(KeywordSuggestion {
        intent_type,
        keyword,
        score,
        occurrences: u32::try_from(occurrences).unwrap_or(u32::MAX),
        first_seen: decode_timestamp(&first_seen)?,
        last_seen: decode_timestamp(&last_seen)?,
    })
}

#[async_trait::async_trait]
impl KeywordSuggestionRepository for SqlKeywordSuggestionRepository {
    async fn reinforce(
        &self,
        intent_type: &str,
        keyword: &str,
        increment: f64,
        seen_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let seen_at = encode_timestamp(seen_at);
        // Single statement so concurrent miners never lose an increment.
        sqlx::query(
            "INSERT INTO keyword_suggestion
                (intent_type, keyword, score, occurrences, first_seen, last_seen)
             VALUES (?, ?, ?, 1, ?, ?)
             ON CONFLICT(intent_type, keyword) DO UPDATE SET
                score = score + excluded.score,
                occurrences = occurrences + 1,
                last_seen = excluded.last_seen",
        )
        .bind(intent_type)
        .bind(keyword)
        .bind(increment)
        .bind(&seen_at)
        .bind(&seen_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(
        &self,
        intent_type: &str,
        keyword: &str,
    ) -> Result<Option<KeywordSuggestion>, RepositoryError> {
        let row = sqlx::query(
            "SELECT intent_type, keyword, score, occurrences, first_seen, last_seen
             FROM keyword_suggestion
             WHERE intent_type = ? AND keyword = ?",
        )
        .bind(intent_type)
        .bind(keyword)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_suggestion).transpose()
    }

    async fn top(
        &self,
        min_score: f64,
        limit: Option<u32>,
    ) -> Result<Vec<KeywordSuggestion>, RepositoryError> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(i64::from).unwrap_or(-1);
        let rows = sqlx::query(
            "SELECT intent_type, keyword, score, occurrences, first_seen, last_seen
             FROM keyword_suggestion
             WHERE score > ?
             ORDER BY score DESC, intent_type ASC, keyword ASC
             LIMIT ?",
        )
        .bind(min_score)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_suggestion).collect::<Result<Vec<_>, _>>()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::SqlKeywordSuggestionRepository;
    use crate::migrations::run_pending;
    use crate::repositories::KeywordSuggestionRepository;
    use crate::connect_with_settings;

    async fn repo() -> SqlKeywordSuggestionRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        SqlKeywordSuggestionRepository::new(pool)
    }

    #[tokio::test]
    async fn reinforce_upserts_and_accumulates_score() {
        let repo = repo().await;
        let now = Utc::now();

        repo.reinforce("update_price", "the price", 0.1, now).await.expect("first");
        repo.reinforce("update_price", "the price", 0.1, now).await.expect("second");

        let suggestion =
            repo.find("update_price", "the price").await.expect("find").expect("suggestion");
        assert!((suggestion.score - 0.2).abs() < 1e-9);
        assert_eq!(suggestion.occurrences, 2);
        assert!(repo.find("update_price", "missing").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn concurrent_reinforcement_is_not_lost() {
        let repo = Arc::new(repo().await);
        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.reinforce("check_stock", "check stock", 0.1, Utc::now()).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("reinforce");
        }

        let suggestion =
            repo.find("check_stock", "check stock").await.expect("find").expect("suggestion");
        assert!((suggestion.score - 1.0).abs() < 1e-9);
        assert_eq!(suggestion.occurrences, 10);
    }

    #[tokio::test]
    async fn top_filters_orders_and_limits() {
        let repo = repo().await;
        let now = Utc::now();
        for _ in 0..5 {
            repo.reinforce("check_stock", "check stock", 0.1, now).await.expect("reinforce");
        }
        for _ in 0..4 {
            repo.reinforce("order_status", "order status", 0.1, now).await.expect("reinforce");
        }
        repo.reinforce("order_status", "status of", 0.1, now).await.expect("reinforce");

        let top = repo.top(0.3, None).await.expect("top");
        let keywords: Vec<&str> = top.iter().map(|s| s.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["check stock", "order status"]);

        let limited = repo.top(0.0, Some(1)).await.expect("top limited");
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].keyword, "check stock");
    }
}
