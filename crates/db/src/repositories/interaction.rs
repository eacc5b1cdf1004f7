use chrono::{DateTime, Utc};
use sqlx::Row;

use storedesk_core::domain::interaction::{IntentCount, InteractionId, InteractionRecord};

use super::{decode_timestamp, encode_timestamp, InteractionRepository, RepositoryError};
use crate::DbPool;

pub struct SqlInteractionRepository {
    pool: DbPool,
}

impl SqlInteractionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_interaction(row: &sqlx::sqlite::SqliteRow) -> Result<InteractionRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message: String =
        row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let intent_type: String =
        row.try_get("intent_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let confidence: f64 =
        row.try_get("confidence").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let response: String =
        row.try_get("response").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let timestamp: String =
        row.try_get("timestamp").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let success: bool =
        row.try_get("success").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let feedback: Option<String> =
        row.try_get("feedback").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(InteractionRecord {
        id: InteractionId(id),
        user_id,
        message,
        intent_type,
        confidence,
        response,
        timestamp: decode_timestamp(&timestamp)?,
        success,
        feedback,
    })
}

#[async_trait::async_trait]
impl InteractionRepository for SqlInteractionRepository {
    async fn insert(&self, record: InteractionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO interaction_log
                (id, user_id, message, intent_type, confidence, response, timestamp, success, feedback)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.user_id)
        .bind(&record.message)
        .bind(&record.intent_type)
        .bind(record.confidence)
        .bind(&record.response)
        .bind(encode_timestamp(record.timestamp))
        .bind(record.success)
        .bind(&record.feedback)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &InteractionId,
    ) -> Result<Option<InteractionRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, message, intent_type, confidence, response, timestamp, success, feedback
             FROM interaction_log
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_interaction).transpose()
    }

    async fn attach_feedback(
        &self,
        id: &InteractionId,
        feedback: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE interaction_log
             SET feedback = ?
             WHERE id = ? AND feedback IS NULL",
        )
        .bind(feedback)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<InteractionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, message, intent_type, confidence, response, timestamp, success, feedback
             FROM interaction_log
             WHERE timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp ASC",
        )
        .bind(encode_timestamp(since))
        .bind(encode_timestamp(until))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_interaction).collect::<Result<Vec<_>, _>>()
    }

    async fn intent_distribution(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<IntentCount>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT intent_type, COUNT(*) AS count
             FROM interaction_log
             WHERE timestamp >= ? AND timestamp <= ?
             GROUP BY intent_type
             ORDER BY count DESC, intent_type ASC",
        )
        .bind(encode_timestamp(since))
        .bind(encode_timestamp(until))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let intent_type: String = row
                    .try_get("intent_type")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let count: i64 =
                    row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(IntentCount { intent_type, count: count.max(0) as u64 })
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
