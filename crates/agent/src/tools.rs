use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use storedesk_core::domain::entity::EntityMention;
use storedesk_core::domain::task::{IntentDecision, SubTask, TaskType};

use crate::pronouns::UnderstandingHints;

/// Intent key matching every intent of a task type.
pub const WILDCARD_INTENT: &str = "*";

#[derive(Clone, Debug, PartialEq)]
pub struct HandlerRequest {
    pub user_id: String,
    pub sub_task: SubTask,
    pub decision: IntentDecision,
    pub hints: UnderstandingHints,
}

impl HandlerRequest {
    pub fn hint_map(&self) -> BTreeMap<String, String> {
        self.hints.to_map()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Final text, plus any entities the handler touched.
    Reply { text: String, entities: Vec<EntityMention> },
    /// The handler wants the completion chain to phrase the answer.
    NeedsCompletion { prompt: String },
    /// A permission denial is a normal result, not an error.
    Denied { message: String },
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid payload: {0}")]
    Validation(String),
    #[error("handler failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, request: &HandlerRequest) -> Result<HandlerOutcome, HandlerError>;
}

#[derive(Default)]
pub struct TaskHandlerRegistry {
    handlers: HashMap<(TaskType, String), Arc<dyn TaskHandler>>,
}

impl TaskHandlerRegistry {
    pub fn register<H>(&mut self, task_type: TaskType, intent_type: &str, handler: H)
    where
        H: TaskHandler + 'static,
    {
        self.handlers.insert((task_type, intent_type.to_string()), Arc::new(handler));
    }

    /// Handles every intent of `task_type` that has no exact registration.
    pub fn register_fallback<H>(&mut self, task_type: TaskType, handler: H)
    where
        H: TaskHandler + 'static,
    {
        self.register(task_type, WILDCARD_INTENT, handler);
    }

    pub fn resolve(&self, task_type: TaskType, intent_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers
            .get(&(task_type, intent_type.to_string()))
            .or_else(|| self.handlers.get(&(task_type, WILDCARD_INTENT.to_string())))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use storedesk_core::domain::task::TaskType;

    use super::{HandlerError, HandlerOutcome, HandlerRequest, TaskHandler, TaskHandlerRegistry};

    struct Named(&'static str);

    #[async_trait]
    impl TaskHandler for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn handle(&self, _request: &HandlerRequest) -> Result<HandlerOutcome, HandlerError> {
            Ok(HandlerOutcome::Reply { text: self.0.to_string(), entities: Vec::new() })
        }
    }

    #[test]
    fn exact_registration_beats_wildcard() {
        let mut registry = TaskHandlerRegistry::default();
        assert!(registry.is_empty());
        registry.register(TaskType::Inventory, "check_stock", Named("stock"));
        registry.register_fallback(TaskType::Inventory, Named("inventory"));
        assert_eq!(registry.len(), 2);

        let exact = registry.resolve(TaskType::Inventory, "check_stock").expect("exact handler");
        assert_eq!(exact.name(), "stock");
        let wildcard = registry.resolve(TaskType::Inventory, "general").expect("wildcard handler");
        assert_eq!(wildcard.name(), "inventory");
        assert!(registry.resolve(TaskType::Order, "order_status").is_none());
    }
}
