//! Interaction ledger and keyword learning.
//!
//! Every resolved sub-task is appended to the ledger. Successful,
//! high-confidence records are mined for 2 to 5 word phrases that reinforce
//! keyword suggestions per intent; suggestions that accumulate enough score
//! can be promoted back into the intent catalog.
//!
//! Storage failures are logged and swallowed on the turn path so the operator
//! always gets a reply.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use storedesk_core::catalog::normalize_for_matching;
use storedesk_core::config::{AppConfig, LearningConfig};
use storedesk_core::domain::interaction::{
    InteractionClass, InteractionDraft, InteractionId, InteractionRecord, InteractionReport,
    ReportPeriod,
};
use storedesk_db::{
    DbPool, InMemoryInteractionRepository, InMemoryKeywordSuggestionRepository,
    InteractionRepository, KeywordSuggestionRepository, RepositoryError,
    SqlInteractionRepository, SqlKeywordSuggestionRepository,
};

/// Score added to a keyword suggestion per reinforcing observation.
pub const KEYWORD_INCREMENT: f64 = 0.1;
pub const MIN_PHRASE_WORDS: usize = 2;
pub const MAX_PHRASE_WORDS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LearningThresholds {
    /// Below this confidence a record is problematic.
    pub problem_confidence: f64,
    /// Above this confidence a successful record is mined.
    pub success_confidence: f64,
    pub report_min_score: f64,
    pub report_limit: u32,
}

impl Default for LearningThresholds {
    fn default() -> Self {
        Self::from(&AppConfig::default().learning)
    }
}

impl From<&LearningConfig> for LearningThresholds {
    fn from(config: &LearningConfig) -> Self {
        Self {
            problem_confidence: config.problem_confidence,
            success_confidence: config.success_confidence,
            report_min_score: config.report_min_score,
            report_limit: config.report_limit,
        }
    }
}

pub struct InteractionLedger {
    interactions: Arc<dyn InteractionRepository>,
    keywords: Arc<dyn KeywordSuggestionRepository>,
    thresholds: LearningThresholds,
}

impl InteractionLedger {
    pub fn new(
        interactions: Arc<dyn InteractionRepository>,
        keywords: Arc<dyn KeywordSuggestionRepository>,
        thresholds: LearningThresholds,
    ) -> Self {
        Self { interactions, keywords, thresholds }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryInteractionRepository::default()),
            Arc::new(InMemoryKeywordSuggestionRepository::default()),
            LearningThresholds::default(),
        )
    }

    pub fn from_pool(pool: DbPool, thresholds: LearningThresholds) -> Self {
        Self::new(
            Arc::new(SqlInteractionRepository::new(pool.clone())),
            Arc::new(SqlKeywordSuggestionRepository::new(pool)),
            thresholds,
        )
    }

    pub fn thresholds(&self) -> LearningThresholds {
        self.thresholds
    }

    pub fn classify(&self, success: bool, confidence: f64) -> InteractionClass {
        if !success || confidence < self.thresholds.problem_confidence {
            InteractionClass::Problematic
        } else if confidence > self.thresholds.success_confidence {
            InteractionClass::Successful
        } else {
            InteractionClass::Other
        }
    }

    /// Appends one interaction. Never fails: a storage error is logged and
    /// the generated id is still returned.
    pub async fn log(&self, draft: InteractionDraft) -> InteractionId {
        self.log_at(draft, Utc::now()).await
    }

    pub async fn log_at(&self, draft: InteractionDraft, now: DateTime<Utc>) -> InteractionId {
        let record = InteractionRecord::from_draft(draft, now);
        let id = record.id.clone();
        let class = self.classify(record.success, record.confidence);

        if let Err(error) = self.interactions.insert(record.clone()).await {
            warn!(
                event_name = "ledger.write_failed",
                interaction_id = %id,
                intent_type = %record.intent_type,
                error = %error,
                "failed to append interaction"
            );
            return id;
        }

        debug!(
            event_name = "ledger.appended",
            interaction_id = %id,
            intent_type = %record.intent_type,
            class = ?class,
            "interaction appended"
        );

        if class == InteractionClass::Successful {
            if let Err(error) = self.mine(&record).await {
                warn!(
                    event_name = "ledger.mining_failed",
                    interaction_id = %id,
                    error = %error,
                    "failed to reinforce keyword suggestions"
                );
            }
        }

        id
    }

    /// Reinforces every distinct 2 to 5 word phrase of the record's message.
    /// Returns how many phrases were reinforced.
    pub async fn mine(&self, record: &InteractionRecord) -> Result<usize, RepositoryError> {
        let phrases = keyword_phrases(&record.message);
        for phrase in &phrases {
            self.keywords
                .reinforce(&record.intent_type, phrase, KEYWORD_INCREMENT, record.timestamp)
                .await?;
        }
        Ok(phrases.len())
    }

    pub async fn attach_feedback(&self, id: &InteractionId, feedback: &str) -> bool {
        match self.interactions.attach_feedback(id, feedback).await {
            Ok(attached) => attached,
            Err(error) => {
                warn!(
                    event_name = "ledger.feedback_failed",
                    interaction_id = %id,
                    error = %error,
                    "failed to attach feedback"
                );
                false
            }
        }
    }

    pub async fn find(&self, id: &InteractionId) -> Result<Option<InteractionRecord>, RepositoryError> {
        self.interactions.find_by_id(id).await
    }

    pub async fn report(&self, period: ReportPeriod) -> Result<InteractionReport, RepositoryError> {
        self.report_at(period, Utc::now()).await
    }

    pub async fn report_at(
        &self,
        period: ReportPeriod,
        now: DateTime<Utc>,
    ) -> Result<InteractionReport, RepositoryError> {
        let since = now - period.window();
        let records = self.interactions.list_between(since, now).await?;
        let intent_distribution = self.interactions.intent_distribution(since, now).await?;
        let top_keywords = self
            .keywords
            .top(self.thresholds.report_min_score, Some(self.thresholds.report_limit))
            .await?;

        let mut report = empty_report(period, since, now);
        for record in &records {
            match self.classify(record.success, record.confidence) {
                InteractionClass::Successful => report.successful += 1,
                InteractionClass::Problematic => report.problematic += 1,
                InteractionClass::Other => report.other += 1,
            }
        }
        report.total = records.len() as u64;
        if report.total > 0 {
            report.success_rate = report.successful as f64 / report.total as f64;
            report.average_confidence =
                records.iter().map(|record| record.confidence).sum::<f64>() / report.total as f64;
        }
        report.intent_distribution = intent_distribution;
        report.top_keywords = top_keywords;
        Ok(report)
    }

    /// Report for the turn path: an empty report replaces a storage failure.
    pub async fn periodic_report(&self, period: ReportPeriod) -> InteractionReport {
        let now = Utc::now();
        match self.report_at(period, now).await {
            Ok(report) => report,
            Err(error) => {
                warn!(
                    event_name = "ledger.report_failed",
                    period = period.as_str(),
                    error = %error,
                    "failed to build interaction report"
                );
                empty_report(period, now - period.window(), now)
            }
        }
    }

    /// Keyword suggestions scoring strictly above `min_score`, grouped by intent.
    pub async fn promote(
        &self,
        min_score: f64,
    ) -> Result<BTreeMap<String, Vec<String>>, RepositoryError> {
        let suggestions = self.keywords.top(min_score, None).await?;
        let mut promoted: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for suggestion in suggestions {
            promoted.entry(suggestion.intent_type).or_default().push(suggestion.keyword);
        }
        Ok(promoted)
    }

    pub async fn shutdown(&self) {
        self.interactions.close().await;
        self.keywords.close().await;
    }
}

/// Distinct contiguous word n-grams of the message, shortest first.
pub fn keyword_phrases(message: &str) -> Vec<String> {
    let normalized = normalize_for_matching(message);
    let words: Vec<&str> = normalized.split(' ').filter(|word| !word.is_empty()).collect();

    let mut seen = BTreeSet::new();
    let mut phrases = Vec::new();
    for length in MIN_PHRASE_WORDS..=MAX_PHRASE_WORDS {
        for window in words.windows(length) {
            let phrase = window.join(" ");
            if seen.insert(phrase.clone()) {
                phrases.push(phrase);
            }
        }
    }
    phrases
}

fn empty_report(period: ReportPeriod, since: DateTime<Utc>, until: DateTime<Utc>) -> InteractionReport {
    InteractionReport {
        period,
        since,
        until,
        total: 0,
        successful: 0,
        problematic: 0,
        other: 0,
        success_rate: 0.0,
        average_confidence: 0.0,
        intent_distribution: Vec::new(),
        top_keywords: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    use storedesk_core::domain::interaction::{
        IntentCount, InteractionClass, InteractionDraft, InteractionId, InteractionRecord,
        ReportPeriod,
    };
    use storedesk_db::{
        InMemoryKeywordSuggestionRepository, InteractionRepository, RepositoryError,
    };

    use super::{keyword_phrases, InteractionLedger, LearningThresholds};

    fn draft(message: &str, intent: &str, confidence: f64, success: bool) -> InteractionDraft {
        InteractionDraft {
            user_id: "U1".to_string(),
            message: message.to_string(),
            intent_type: intent.to_string(),
            confidence,
            response: "ok".to_string(),
            success,
            feedback: None,
        }
    }

    #[test]
    fn phrases_cover_two_to_five_words() {
        let phrases = keyword_phrases("Update the price of Blue Mug");
        assert!(phrases.contains(&"update the".to_string()));
        assert!(phrases.contains(&"the price of blue mug".to_string()));
        assert!(phrases.iter().all(|phrase| {
            let words = phrase.split(' ').count();
            (2..=5).contains(&words)
        }));
        assert!(keyword_phrases("stock").is_empty());
    }

    #[test]
    fn classification_uses_thresholds() {
        let ledger = InteractionLedger::in_memory();
        assert_eq!(ledger.classify(false, 0.99), InteractionClass::Problematic);
        assert_eq!(ledger.classify(true, 0.5), InteractionClass::Problematic);
        assert_eq!(ledger.classify(true, 0.8), InteractionClass::Other);
        assert_eq!(ledger.classify(true, 0.9), InteractionClass::Other);
        assert_eq!(ledger.classify(true, 0.95), InteractionClass::Successful);
    }

    #[tokio::test]
    async fn successful_log_mines_keyword_suggestions() {
        let keywords = Arc::new(InMemoryKeywordSuggestionRepository::default());
        let ledger = InteractionLedger::new(
            Arc::new(storedesk_db::InMemoryInteractionRepository::default()),
            keywords.clone(),
            LearningThresholds::default(),
        );

        let id = ledger
            .log(draft("update the price of Blue Mug", "update_price", 0.95, true))
            .await;
        assert!(ledger.find(&id).await.expect("lookup").is_some());

        let promoted = ledger.promote(0.0).await.expect("promote");
        let phrases = promoted.get("update_price").expect("suggestions for update_price");
        assert!(phrases.contains(&"the price of".to_string()));

        ledger.log(draft("update the price of Red Mug", "update_price", 0.95, true)).await;
        let promoted = ledger.promote(0.15).await.expect("promote");
        assert_eq!(
            promoted.get("update_price").map(Vec::len),
            Some(keyword_phrases("update the price of").len())
        );
    }

    #[tokio::test]
    async fn low_confidence_logs_are_not_mined() {
        let ledger = InteractionLedger::in_memory();
        ledger.log(draft("check stock of Blue Mug", "check_stock", 0.85, true)).await;
        ledger.log(draft("check stock of Blue Mug", "check_stock", 0.99, false)).await;
        assert!(ledger.promote(0.0).await.expect("promote").is_empty());
    }

    #[tokio::test]
    async fn weekly_report_counts_add_up() {
        let ledger = InteractionLedger::in_memory();
        let now = Utc::now();
        ledger.log_at(draft("check stock", "check_stock", 0.95, true), now).await;
        ledger.log_at(draft("check stock", "check_stock", 0.8, true), now).await;
        ledger.log_at(draft("huh", "general", 0.5, false), now).await;
        ledger.log_at(draft("old", "general", 0.5, false), now - Duration::days(8)).await;

        let report = ledger.report_at(ReportPeriod::Weekly, now).await.expect("report");
        assert_eq!(report.total, 3);
        assert_eq!(report.total, report.successful + report.problematic + report.other);
        assert_eq!((report.successful, report.problematic, report.other), (1, 1, 1));
        assert!((report.success_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!((report.average_confidence - (0.95 + 0.8 + 0.5) / 3.0).abs() < 1e-9);
        assert_eq!(
            report.intent_distribution,
            vec![
                IntentCount { intent_type: "check_stock".to_string(), count: 2 },
                IntentCount { intent_type: "general".to_string(), count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn empty_report_has_zero_success_rate() {
        let report = InteractionLedger::in_memory().periodic_report(ReportPeriod::Daily).await;
        assert_eq!(report.total, 0);
        assert_eq!(report.success_rate, 0.0);
    }

    #[tokio::test]
    async fn feedback_attaches_once() {
        let ledger = InteractionLedger::in_memory();
        let id = ledger.log(draft("check stock", "check_stock", 0.95, true)).await;
        assert!(ledger.attach_feedback(&id, "great").await);
        assert!(!ledger.attach_feedback(&id, "changed my mind").await);
        assert!(!ledger.attach_feedback(&InteractionId("missing".into()), "x").await);
    }

    struct BrokenInteractions;

    #[async_trait]
    impl InteractionRepository for BrokenInteractions {
        async fn insert(&self, _record: InteractionRecord) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("disk full".to_string()))
        }

        async fn find_by_id(
            &self,
            _id: &InteractionId,
        ) -> Result<Option<InteractionRecord>, RepositoryError> {
            Err(RepositoryError::Decode("disk full".to_string()))
        }

        async fn attach_feedback(
            &self,
            _id: &InteractionId,
            _feedback: &str,
        ) -> Result<bool, RepositoryError> {
            Err(RepositoryError::Decode("disk full".to_string()))
        }

        async fn list_between(
            &self,
            _since: DateTime<Utc>,
            _until: DateTime<Utc>,
        ) -> Result<Vec<InteractionRecord>, RepositoryError> {
            Err(RepositoryError::Decode("disk full".to_string()))
        }

        async fn intent_distribution(
            &self,
            _since: DateTime<Utc>,
            _until: DateTime<Utc>,
        ) -> Result<Vec<IntentCount>, RepositoryError> {
            Err(RepositoryError::Decode("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn storage_failures_never_reach_the_caller() {
        let ledger = InteractionLedger::new(
            Arc::new(BrokenInteractions),
            Arc::new(InMemoryKeywordSuggestionRepository::default()),
            LearningThresholds::default(),
        );

        let id = ledger.log(draft("check stock", "check_stock", 0.95, true)).await;
        assert!(!id.0.is_empty());
        assert!(!ledger.attach_feedback(&id, "ok").await);
        assert!(ledger.report(ReportPeriod::Daily).await.is_err());
        assert_eq!(ledger.periodic_report(ReportPeriod::Daily).await.total, 0);
    }
}
