use std::sync::Arc;

use storedesk_core::catalog::{contains_term, normalize_for_matching, IntentCatalog};
use storedesk_core::domain::task::{IntentDecision, IntentSource, SubTask, TaskType};

/// A specific intent must score strictly above this many catalog points to
/// beat the coarse classifier.
pub const SPECIFIC_THRESHOLD: f64 = 15.0;

/// Score that maps to full confidence for a specific win.
pub const FULL_CONFIDENCE_SCORE: f64 = 20.0;

/// Broad, high-recall task-type classifier.
pub trait TaskClassifier: Send + Sync {
    fn classify(&self, text: &str) -> TaskType;
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntentScore {
    pub intent_type: String,
    pub task_type: TaskType,
    pub score: f64,
}

/// Narrow, high-precision intent scorer.
pub trait IntentScorer: Send + Sync {
    fn best(&self, text: &str) -> Option<IntentScore>;
}

/// Counts task-type keywords; the most hits wins and ties go to the entry
/// listed first in the catalog.
#[derive(Clone, Debug)]
pub struct KeywordTaskClassifier {
    catalog: Arc<IntentCatalog>,
}

impl KeywordTaskClassifier {
    pub fn new(catalog: Arc<IntentCatalog>) -> Self {
        Self { catalog }
    }
}

impl TaskClassifier for KeywordTaskClassifier {
    fn classify(&self, text: &str) -> TaskType {
        let normalized = normalize_for_matching(text);
        let mut best: Option<(TaskType, usize)> = None;

        for entry in &self.catalog.task_types {
            let hits =
                entry.keywords.iter().filter(|keyword| contains_term(&normalized, keyword)).count();
            if hits > 0 && best.map(|(_, best_hits)| hits > best_hits).unwrap_or(true) {
                best = Some((entry.task_type, hits));
            }
        }

        best.map(|(task_type, _)| task_type).unwrap_or(TaskType::General)
    }
}

/// Sums the weights of every catalog phrase and keyword found in the text.
#[derive(Clone, Debug)]
pub struct CatalogIntentScorer {
    catalog: Arc<IntentCatalog>,
}

impl CatalogIntentScorer {
    pub fn new(catalog: Arc<IntentCatalog>) -> Self {
        Self { catalog }
    }
}

impl IntentScorer for CatalogIntentScorer {
    fn best(&self, text: &str) -> Option<IntentScore> {
        let normalized = normalize_for_matching(text);
        let mut best: Option<IntentScore> = None;

        for entry in &self.catalog.intents {
            let score: f64 = entry
                .terms()
                .filter(|term| contains_term(&normalized, &term.text))
                .map(|term| term.weight)
                .sum();
            if score <= 0.0 {
                continue;
            }
            if best.as_ref().map(|current| score > current.score).unwrap_or(true) {
                best = Some(IntentScore {
                    intent_type: entry.intent_type.clone(),
                    task_type: entry.task_type,
                    score,
                });
            }
        }

        best
    }
}

#[derive(Clone, Debug)]
pub struct IntentArbiter<C = KeywordTaskClassifier, S = CatalogIntentScorer> {
    classifier: C,
    scorer: S,
}

impl IntentArbiter<KeywordTaskClassifier, CatalogIntentScorer> {
    pub fn from_catalog(catalog: Arc<IntentCatalog>) -> Self {
        Self::new(KeywordTaskClassifier::new(catalog.clone()), CatalogIntentScorer::new(catalog))
    }
}

impl<C, S> IntentArbiter<C, S>
where
    C: TaskClassifier,
    S: IntentScorer,
{
    pub fn new(classifier: C, scorer: S) -> Self {
        Self { classifier, scorer }
    }

    /// Never fails: without a confident specific intent the coarse task type
    /// is returned with the general intent.
    pub fn decide(&self, text: &str) -> IntentDecision {
        if let Some(specific) = self.scorer.best(text) {
            if specific.score > SPECIFIC_THRESHOLD {
                return IntentDecision {
                    task_type: specific.task_type,
                    intent_type: specific.intent_type,
                    confidence: (specific.score / FULL_CONFIDENCE_SCORE).min(1.0),
                    source: IntentSource::Specific,
                };
            }
        }

        IntentDecision::general(self.classifier.classify(text))
    }

    /// Decides every sub-task in order and stamps the chosen intent on it.
    pub fn decide_all(&self, sub_tasks: Vec<SubTask>) -> Vec<(SubTask, IntentDecision)> {
        sub_tasks
            .into_iter()
            .map(|mut sub_task| {
                let decision = self.decide(&sub_task.text());
                sub_task.intent_type = Some(decision.intent_type.clone());
                (sub_task, decision)
            })
            .collect()
    }
}
