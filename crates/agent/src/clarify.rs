use storedesk_core::catalog::IntentCatalog;
use storedesk_core::domain::task::{IntentDecision, TaskType};
use storedesk_core::errors::ErrorCategory;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClarificationDecision {
    Proceed,
    Clarify { reason_code: &'static str, user_message: String, examples: Vec<String> },
}

impl ClarificationDecision {
    pub fn is_clarify(&self) -> bool {
        matches!(self, Self::Clarify { .. })
    }

    /// Text shown to the operator; empty for [`ClarificationDecision::Proceed`].
    pub fn render(&self) -> String {
        match self {
            Self::Proceed => String::new(),
            Self::Clarify { user_message, examples, .. } if examples.is_empty() => {
                user_message.clone()
            }
            Self::Clarify { user_message, examples, .. } => {
                let lines: Vec<String> =
                    examples.iter().map(|example| format!("- {example}")).collect();
                format!("{user_message}\nYou could try:\n{}", lines.join("\n"))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClarificationPolicy {
    pub max_examples: usize,
}

impl Default for ClarificationPolicy {
    fn default() -> Self {
        Self { max_examples: 3 }
    }
}

impl ClarificationPolicy {
    /// Coarse-only decisions get a rephrase hint; specific ones proceed.
    pub fn for_decision(
        &self,
        decision: &IntentDecision,
        catalog: &IntentCatalog,
    ) -> ClarificationDecision {
        if !decision.is_general() {
            return ClarificationDecision::Proceed;
        }

        let user_message = if decision.task_type == TaskType::General {
            ErrorCategory::Misunderstanding.user_message().to_string()
        } else {
            format!(
                "I think this is about {}, but I'm not sure exactly what you need.",
                decision.task_type.as_str()
            )
        };

        ClarificationDecision::Clarify {
            reason_code: "intent_unclear",
            user_message,
            examples: self.examples(decision.task_type, catalog),
        }
    }

    /// Shown after the completion chain fell back to a canned reply.
    pub fn for_canned(&self, task_type: TaskType, catalog: &IntentCatalog) -> ClarificationDecision {
        ClarificationDecision::Clarify {
            reason_code: "completion_unavailable",
            user_message: "Could you rephrase your request?".to_string(),
            examples: self.examples(task_type, catalog),
        }
    }

    fn examples(&self, task_type: TaskType, catalog: &IntentCatalog) -> Vec<String> {
        catalog.examples_for(task_type).iter().take(self.max_examples).cloned().collect()
    }
}
