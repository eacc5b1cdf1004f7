use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use storedesk_core::catalog::IntentCatalog;
use storedesk_core::config::AppConfig;
use storedesk_core::domain::entity::EntityMention;
use storedesk_core::domain::interaction::{InteractionDraft, InteractionId};
use storedesk_core::domain::task::{
    IntentDecision, IntentSource, SubTask, SubTaskKind, TaskType,
};
use storedesk_core::errors::ErrorCategory;

use crate::arbiter::IntentArbiter;
use crate::clarify::{ClarificationDecision, ClarificationPolicy};
use crate::context::{extract_entities, ChatTurn, ConversationContext};
use crate::decomposer::decompose;
use crate::learning::InteractionLedger;
use crate::pronouns::{resolve, understand, UnderstandingHints};
use crate::resilience::{CompletionPath, CompletionRequest, CompletionTimeouts, ResilienceChain};
use crate::sessions::SessionRegistry;
use crate::tools::{HandlerError, HandlerOutcome, HandlerRequest, TaskHandlerRegistry};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub user_id: String,
    /// Defaults to `user_id` when absent.
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub utterance: String,
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
}

impl TurnRequest {
    pub fn new(user_id: impl Into<String>, utterance: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: None,
            utterance: utterance.into(),
            chat_history: Vec::new(),
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_history(mut self, chat_history: Vec<ChatTurn>) -> Self {
        self.chat_history = chat_history;
        self
    }

    pub fn conversation_key(&self) -> &str {
        self.conversation_id.as_deref().unwrap_or(&self.user_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubTaskReply {
    pub order: usize,
    pub kind: SubTaskKind,
    pub text: String,
    pub task_type: TaskType,
    pub intent_type: String,
    pub confidence: f64,
    pub source: IntentSource,
    pub reply: String,
    pub success: bool,
    pub completion_path: Option<CompletionPath>,
    pub interaction_id: InteractionId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub conversation_id: String,
    pub correlation_id: String,
    pub resolved_utterance: String,
    pub reply: String,
    pub sub_tasks: Vec<SubTaskReply>,
}

#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub timeouts: CompletionTimeouts,
    /// Raw history turns considered for hydration.
    pub history_turns: usize,
    pub clarification: ClarificationPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timeouts: CompletionTimeouts::from_config(&config.llm),
            history_turns: config.context.history_turns,
            clarification: ClarificationPolicy::default(),
        }
    }
}

struct Dispatched {
    reply: String,
    success: bool,
    completion_path: Option<CompletionPath>,
    entities: Vec<EntityMention>,
}

pub struct AgentRuntime {
    catalog: Arc<IntentCatalog>,
    arbiter: IntentArbiter,
    sessions: SessionRegistry,
    handlers: TaskHandlerRegistry,
    chain: ResilienceChain,
    ledger: Arc<InteractionLedger>,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        catalog: Arc<IntentCatalog>,
        sessions: SessionRegistry,
        handlers: TaskHandlerRegistry,
        chain: ResilienceChain,
        ledger: Arc<InteractionLedger>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            arbiter: IntentArbiter::from_catalog(Arc::clone(&catalog)),
            catalog,
            sessions,
            handlers,
            chain,
            ledger,
            settings,
        }
    }

    pub fn catalog(&self) -> &IntentCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &InteractionLedger {
        &self.ledger
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Pronoun resolution, decomposition and arbitration for one utterance.
    /// Pure with respect to `context`.
    pub fn resolve_and_decompose(
        &self,
        utterance: &str,
        context: &ConversationContext,
    ) -> Vec<(SubTask, IntentDecision)> {
        self.arbiter.decide_all(decompose(&resolve(utterance, context)))
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> TurnResponse {
        let correlation_id = Uuid::new_v4().to_string();
        let conversation_id = request.conversation_key().to_string();
        info!(
            event_name = "agent.turn.received",
            correlation_id = %correlation_id,
            conversation_id = %conversation_id,
            user_id = %request.user_id,
            history_turns = request.chat_history.len(),
            "turn received"
        );

        let mut context = self.sessions.acquire(&conversation_id).await;
        let history_start = request.chat_history.len().saturating_sub(self.settings.history_turns);
        let hydrated = context.hydrate_from_history(&request.chat_history[history_start..]);
        if hydrated > 0 {
            info!(
                event_name = "agent.context.hydrated",
                correlation_id = %correlation_id,
                entities = hydrated,
                "conversation context hydrated from history"
            );
        }

        let hints = understand(&request.utterance, &context);
        let resolved_utterance = resolve(&request.utterance, &context);
        let decisions = self.arbiter.decide_all(decompose(&resolved_utterance));

        let mut sub_tasks = Vec::with_capacity(decisions.len());
        let mut touched: Vec<EntityMention> = extract_entities(&resolved_utterance);

        for (sub_task, decision) in decisions {
            let text = sub_task.text();
            let dispatched = self
                .dispatch(&request.user_id, &sub_task, &decision, &hints, &correlation_id)
                .await;

            let interaction_id = self
                .ledger
                .log(InteractionDraft {
                    user_id: request.user_id.clone(),
                    message: text.clone(),
                    intent_type: decision.intent_type.clone(),
                    confidence: decision.confidence,
                    response: dispatched.reply.clone(),
                    success: dispatched.success,
                    feedback: None,
                })
                .await;

            info!(
                event_name = "agent.sub_task.resolved",
                correlation_id = %correlation_id,
                order = sub_task.order,
                task_type = decision.task_type.as_str(),
                intent_type = %decision.intent_type,
                confidence = decision.confidence,
                success = dispatched.success,
                interaction_id = %interaction_id,
                "sub-task resolved"
            );

            let now = Utc::now();
            context.record_intent(&decision.intent_type, &text, now);
            touched.extend(dispatched.entities);

            sub_tasks.push(SubTaskReply {
                order: sub_task.order,
                kind: sub_task.task_type,
                text,
                task_type: decision.task_type,
                intent_type: decision.intent_type,
                confidence: decision.confidence,
                source: decision.source,
                reply: dispatched.reply,
                success: dispatched.success,
                completion_path: dispatched.completion_path,
                interaction_id,
            });
        }

        context.record_mentions(&touched, Utc::now());
        drop(context);

        let reply = sub_tasks
            .iter()
            .map(|sub_task| sub_task.reply.as_str())
            .filter(|reply| !reply.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        TurnResponse { conversation_id, correlation_id, resolved_utterance, reply, sub_tasks }
    }

    async fn dispatch(
        &self,
        user_id: &str,
        sub_task: &SubTask,
        decision: &IntentDecision,
        hints: &UnderstandingHints,
        correlation_id: &str,
    ) -> Dispatched {
        let clarification =
            self.settings.clarification.for_decision(decision, &self.catalog);

        // Nothing recognizable at all: ask instead of guessing.
        if decision.is_general() && decision.task_type == TaskType::General {
            return Dispatched {
                reply: clarification.render(),
                success: false,
                completion_path: None,
                entities: Vec::new(),
            };
        }

        let mut dispatched = match self.handlers.resolve(decision.task_type, &decision.intent_type) {
            Some(handler) => {
                let request = HandlerRequest {
                    user_id: user_id.to_string(),
                    sub_task: sub_task.clone(),
                    decision: decision.clone(),
                    hints: hints.clone(),
                };
                match handler.handle(&request).await {
                    Ok(HandlerOutcome::Reply { text, entities }) => Dispatched {
                        reply: text,
                        success: true,
                        completion_path: None,
                        entities,
                    },
                    Ok(HandlerOutcome::Denied { message }) => Dispatched {
                        reply: message,
                        success: true,
                        completion_path: None,
                        entities: Vec::new(),
                    },
                    Ok(HandlerOutcome::NeedsCompletion { prompt }) => {
                        self.complete(prompt, sub_task, decision.task_type).await
                    }
                    Err(error) => {
                        let category = match &error {
                            HandlerError::Validation(_) => ErrorCategory::Validation,
                            HandlerError::Failed(_) => ErrorCategory::ProviderGeneral,
                        };
                        warn!(
                            event_name = "agent.handler.failed",
                            correlation_id,
                            handler = handler.name(),
                            error_category = category.as_str(),
                            error = %error,
                            "task handler failed"
                        );
                        let mut reply = category.user_message().to_string();
                        if clarification.is_clarify() {
                            reply = format!("{reply}\n{}", clarification.render());
                        }
                        Dispatched {
                            reply,
                            success: false,
                            completion_path: None,
                            entities: Vec::new(),
                        }
                    }
                }
            }
            None => {
                let prompt = completion_prompt(sub_task, decision, hints);
                self.complete(prompt, sub_task, decision.task_type).await
            }
        };

        if dispatched.success {
            if let ClarificationDecision::Clarify { examples, .. } = &clarification {
                if !examples.is_empty() {
                    dispatched.reply = format!(
                        "{}\n\nIf that is not what you meant, try for example: {}",
                        dispatched.reply,
                        examples.join("; ")
                    );
                }
            }
        }
        dispatched
    }

    async fn complete(&self, prompt: String, sub_task: &SubTask, task_type: TaskType) -> Dispatched {
        let request = CompletionRequest::new(prompt).with_original_request(sub_task.text());
        let outcome = self.chain.complete(request, self.settings.timeouts).await;

        if outcome.path == CompletionPath::Canned {
            let clarification = self.settings.clarification.for_canned(task_type, &self.catalog);
            return Dispatched {
                reply: format!("{}\n{}", outcome.text, clarification.render()),
                success: false,
                completion_path: Some(outcome.path),
                entities: Vec::new(),
            };
        }

        Dispatched {
            reply: outcome.text,
            success: true,
            completion_path: Some(outcome.path),
            entities: Vec::new(),
        }
    }
}

/// Prompt used when no handler owns the sub-task.
pub fn completion_prompt(
    sub_task: &SubTask,
    decision: &IntentDecision,
    hints: &UnderstandingHints,
) -> String {
    let mut prompt = format!(
        "You are a storefront assistant. Answer briefly and in plain text.\n\
         Task type: {}\nIntent: {}\n",
        decision.task_type, decision.intent_type
    );
    let context = hints.to_map();
    if !context.is_empty() {
        let lines: Vec<String> =
            context.iter().map(|(key, value)| format!("{key}: {value}")).collect();
        prompt.push_str(&format!("Conversation context:\n{}\n", lines.join("\n")));
    }
    prompt.push_str(&format!("Request: {}", sub_task.text()));
    prompt
}
