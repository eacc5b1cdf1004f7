//! Conversational core of the storedesk assistant.
//!
//! A turn flows through the crate in a fixed order:
//! 1. **Session** (`sessions`) - acquire the per-conversation context and
//!    hydrate it once from the transport's chat history
//! 2. **Reference resolution** (`pronouns`) - rewrite pronouns into the
//!    entities remembered in `context`
//! 3. **Decomposition** (`decomposer`) - split the utterance into ordered
//!    sub-tasks
//! 4. **Arbitration** (`arbiter`) - pick a task type and intent per sub-task
//! 5. **Dispatch** (`tools`) - run the registered task handler, or ask the
//!    completion chain (`resilience`) when none exists
//! 6. **Learning** (`learning`) - append every sub-task to the interaction
//!    ledger and mine confident ones for keyword phrases
//!
//! `AgentRuntime` (see `runtime`) drives the whole loop. Everything except
//! the completion call and the ledger writes is synchronous and pure.

pub mod arbiter;
pub mod clarify;
pub mod context;
pub mod decomposer;
pub mod learning;
pub mod llm;
pub mod pronouns;
pub mod render;
pub mod resilience;
pub mod runtime;
pub mod sessions;
pub mod tools;

pub use arbiter::IntentArbiter;
pub use context::{ChatTurn, ConversationContext, TurnRole};
pub use learning::{InteractionLedger, LearningThresholds};
pub use llm::{CompletionProvider, HttpCompletionProvider, ProviderError, ProviderReply};
pub use resilience::{CompletionOutcome, CompletionPath, CompletionTimeouts, ResilienceChain};
pub use runtime::{AgentRuntime, RuntimeSettings, SubTaskReply, TurnRequest, TurnResponse};
pub use sessions::SessionRegistry;
pub use tools::{HandlerError, HandlerOutcome, HandlerRequest, TaskHandler, TaskHandlerRegistry};
