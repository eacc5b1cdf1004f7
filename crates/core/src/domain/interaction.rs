use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionId(pub String);

impl InteractionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for InteractionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inputs for one ledger append.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionDraft {
    pub user_id: String,
    pub message: String,
    pub intent_type: String,
    pub confidence: f64,
    pub response: String,
    pub success: bool,
    pub feedback: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: InteractionId,
    pub user_id: String,
    pub message: String,
    pub intent_type: String,
    pub confidence: f64,
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub feedback: Option<String>,
}

impl InteractionRecord {
    pub fn from_draft(draft: InteractionDraft, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: InteractionId::generate(),
            user_id: draft.user_id,
            message: draft.message,
            intent_type: draft.intent_type,
            confidence: draft.confidence,
            response: draft.response,
            timestamp,
            success: draft.success,
            feedback: draft.feedback,
        }
    }
}

/// Learning outcome of a single interaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionClass {
    Successful,
    Problematic,
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeywordSuggestion {
    pub intent_type: String,
    pub keyword: String,
    pub score: f64,
    pub occurrences: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl ReportPeriod {
    pub fn window(&self) -> Duration {
        match self {
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::days(7),
            Self::Monthly => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for ReportPeriod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(Self::Daily),
            "weekly" | "week" => Ok(Self::Weekly),
            "monthly" | "month" => Ok(Self::Monthly),
            other => Err(format!("unsupported report period `{other}` (expected daily|weekly|monthly)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentCount {
    pub intent_type: String,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionReport {
    pub period: ReportPeriod,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub total: u64,
    pub successful: u64,
    pub problematic: u64,
    pub other: u64,
    pub success_rate: f64,
    pub average_confidence: f64,
    pub intent_distribution: Vec<IntentCount>,
    pub top_keywords: Vec<KeywordSuggestion>,
}
