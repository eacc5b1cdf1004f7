use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use storedesk_agent::{
    AgentRuntime, ChatTurn, CompletionPath, CompletionProvider, HandlerError, HandlerOutcome,
    HandlerRequest, InteractionLedger, LearningThresholds, ProviderError, ResilienceChain,
    RuntimeSettings, SessionRegistry, TaskHandler, TaskHandlerRegistry, TurnRequest,
};
use storedesk_core::catalog::IntentCatalog;
use storedesk_core::domain::interaction::ReportPeriod;
use storedesk_core::domain::task::{SubTaskKind, TaskType};

struct Scripted {
    replies: Mutex<VecDeque<Result<Value, u16>>>,
    prompts: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(replies: Vec<Result<Value, u16>>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies.into()), prompts: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl CompletionProvider for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<Value, ProviderError> {
        self.prompts.lock().expect("prompt lock").push(prompt.to_string());
        match self.replies.lock().expect("reply lock").pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(status)) => Err(ProviderError::Http { status, message: "scripted".into() }),
            None => Err(ProviderError::Transport("script exhausted".into())),
        }
    }
}

struct StockLookup;

#[async_trait]
impl TaskHandler for StockLookup {
    fn name(&self) -> &str {
        "stock_lookup"
    }

    async fn handle(&self, request: &HandlerRequest) -> Result<HandlerOutcome, HandlerError> {
        let text = request.sub_task.text();
        if text.trim().is_empty() {
            return Err(HandlerError::Validation("empty stock request".into()));
        }
        Ok(HandlerOutcome::Reply { text: format!("In stock: {text}"), entities: Vec::new() })
    }
}

async fn sql_ledger() -> Arc<InteractionLedger> {
    let pool = storedesk_db::connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .expect("in-memory pool");
    storedesk_db::migrations::run_pending(&pool).await.expect("migrations");
    Arc::new(InteractionLedger::from_pool(pool, LearningThresholds::default()))
}

fn runtime(chain: ResilienceChain, ledger: Arc<InteractionLedger>) -> AgentRuntime {
    let mut handlers = TaskHandlerRegistry::default();
    handlers.register(TaskType::Inventory, "check_stock", StockLookup);
    AgentRuntime::new(
        Arc::new(IntentCatalog::builtin().expect("builtin catalog")),
        SessionRegistry::default(),
        handlers,
        chain,
        ledger,
        RuntimeSettings::default(),
    )
}

#[tokio::test]
async fn multi_part_turn_runs_sub_tasks_in_order_and_logs_each() {
    let primary = Scripted::new(vec![Ok(json!({ "response": "Here are your **recent** orders" }))]);
    let fallback = Scripted::new(vec![]);
    let ledger = sql_ledger().await;
    let runtime = runtime(ResilienceChain::with_fallback(primary.clone(), fallback), ledger.clone());

    let response = runtime
        .handle_turn(TurnRequest::new("U1", "check stock of \"Blue Mug\" and list recent orders"))
        .await;

    assert_eq!(response.sub_tasks.len(), 2);
    assert_eq!(response.sub_tasks[0].order, 0);
    assert_eq!(response.sub_tasks[1].order, 1);
    assert!(response.sub_tasks[0].reply.starts_with("In stock:"));
    assert_eq!(response.sub_tasks[1].completion_path, Some(CompletionPath::Primary));
    assert!(response.reply.contains("Here are your *recent* orders"));

    for sub_task in &response.sub_tasks {
        let record = ledger
            .find(&sub_task.interaction_id)
            .await
            .expect("lookup")
            .expect("every sub-task is logged");
        assert_eq!(record.intent_type, sub_task.intent_type);
    }

    let report = ledger.report(ReportPeriod::Daily).await.expect("report");
    assert_eq!(report.total, 2);
    assert_eq!(report.total, report.successful + report.problematic + report.other);
}

#[tokio::test]
async fn history_hydration_lets_the_first_turn_use_pronouns() {
    let primary = Scripted::new(vec![Ok(json!("Order shipped"))]);
    let runtime = runtime(
        ResilienceChain::with_fallback(primary.clone(), Scripted::new(vec![])),
        Arc::new(InteractionLedger::in_memory()),
    );

    let request = TurnRequest::new("U7", "where is it now?")
        .in_conversation("thread-1")
        .with_history(vec![
            ChatTurn::user("did order #4521 ship?"),
            ChatTurn::assistant("Let me check order #4521."),
        ]);
    let response = runtime.handle_turn(request).await;

    assert_eq!(response.conversation_id, "thread-1");
    assert_eq!(response.resolved_utterance, "where is order #4521 now?");
    let prompts = primary.prompts.lock().expect("prompt lock");
    assert!(prompts[0].contains("order #4521"));
}

#[tokio::test]
async fn quota_failure_falls_back_then_cans_with_examples() {
    let primary = Scripted::new(vec![Err(429), Err(429)]);
    let fallback = Scripted::new(vec![Ok(json!({ "text": "fallback says hi" })), Err(500)]);
    let runtime = runtime(
        ResilienceChain::with_fallback(primary, fallback),
        Arc::new(InteractionLedger::in_memory()),
    );

    let first = runtime.handle_turn(TurnRequest::new("U1", "list recent orders")).await;
    assert_eq!(first.sub_tasks[0].completion_path, Some(CompletionPath::Fallback));
    assert!(first.sub_tasks[0].success);

    let second = runtime.handle_turn(TurnRequest::new("U1", "list recent orders")).await;
    let sub_task = &second.sub_tasks[0];
    assert_eq!(sub_task.completion_path, Some(CompletionPath::Canned));
    assert!(!sub_task.success);
    assert!(second.reply.contains("quota"));
    assert!(second.reply.contains("list recent orders"));
}

#[tokio::test]
async fn comparison_turn_produces_lookup_lookup_compare() {
    let primary = Scripted::new(vec![
        Ok(json!("Red Mug: ceramic")),
        Ok(json!("Blue Mug: enamel")),
        Ok(json!("Blue Mug sells better")),
    ]);
    let runtime = runtime(
        ResilienceChain::with_fallback(primary, Scripted::new(vec![])),
        Arc::new(InteractionLedger::in_memory()),
    );

    let response = runtime
        .handle_turn(TurnRequest::new("U1", "which is better, Red Mug or Blue Mug?"))
        .await;
    let kinds: Vec<SubTaskKind> = response.sub_tasks.iter().map(|sub_task| sub_task.kind).collect();
    assert_eq!(kinds, vec![SubTaskKind::InfoLookup, SubTaskKind::InfoLookup, SubTaskKind::Compare]);
    assert!(response.reply.starts_with("Red Mug: ceramic"));
}

#[tokio::test]
async fn successful_specific_turns_feed_keyword_promotion() {
    let ledger = sql_ledger().await;
    let runtime = runtime(
        ResilienceChain::with_fallback(Scripted::new(vec![]), Scripted::new(vec![])),
        ledger.clone(),
    );

    for _ in 0..4 {
        runtime.handle_turn(TurnRequest::new("U1", "check stock levels please")).await;
    }

    let promoted = ledger.promote(0.3).await.expect("promote");
    let phrases = promoted.get("check_stock").expect("check_stock phrases");
    assert!(phrases.contains(&"stock levels".to_string()));
    ledger.shutdown().await;
}
