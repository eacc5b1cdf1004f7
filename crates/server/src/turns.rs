use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use storedesk_agent::{AgentRuntime, TurnRequest, TurnResponse};
use storedesk_core::domain::interaction::{InteractionReport, ReportPeriod};
use tracing::{error, info};

#[derive(Clone)]
pub struct TurnState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
pub struct PromotedQuery {
    pub min_score: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromotedKeywords {
    pub min_score: f64,
    pub keywords: BTreeMap<String, Vec<String>>,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/v1/turns", post(create_turn))
        .route("/v1/reports/{period}", get(report))
        .route("/v1/keywords/promoted", get(promoted_keywords))
        .with_state(TurnState { runtime })
}

fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError { error: message.into() }))
}

pub async fn create_turn(
    State(state): State<TurnState>,
    Json(request): Json<TurnRequest>,
) -> ApiResult<TurnResponse> {
    if request.user_id.trim().is_empty() {
        return Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, "user_id must not be empty"));
    }
    if request.utterance.trim().is_empty() {
        return Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, "utterance must not be empty"));
    }

    let response = state.runtime.handle_turn(request).await;
    info!(
        event_name = "server.turn.completed",
        correlation_id = %response.correlation_id,
        conversation_id = %response.conversation_id,
        sub_tasks = response.sub_tasks.len(),
        "turn completed"
    );
    Ok(Json(response))
}

pub async fn report(
    State(state): State<TurnState>,
    Path(period): Path<String>,
) -> ApiResult<InteractionReport> {
    let period: ReportPeriod =
        period.parse().map_err(|message: String| api_error(StatusCode::BAD_REQUEST, message))?;

    state.runtime.ledger().report(period).await.map(Json).map_err(|e| {
        error!(
            event_name = "server.report.failed",
            period = period.as_str(),
            error = %e,
            "interaction report failed"
        );
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "report could not be built")
    })
}

pub async fn promoted_keywords(
    State(state): State<TurnState>,
    Query(query): Query<PromotedQuery>,
) -> ApiResult<PromotedKeywords> {
    let ledger = state.runtime.ledger();
    let min_score = query.min_score.unwrap_or(ledger.thresholds().report_min_score);
    if !min_score.is_finite() || min_score < 0.0 {
        return Err(api_error(StatusCode::BAD_REQUEST, "min_score must be a non-negative number"));
    }

    let keywords = ledger.promote(min_score).await.map_err(|e| {
        error!(event_name = "server.promote.failed", error = %e, "keyword promotion failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "promoted keywords could not be loaded")
    })?;
    Ok(Json(PromotedKeywords { min_score, keywords }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use storedesk_agent::{
        AgentRuntime, CompletionProvider, InteractionLedger, ProviderError, ResilienceChain,
        RuntimeSettings, SessionRegistry, TaskHandlerRegistry, TurnResponse,
    };
    use storedesk_core::catalog::IntentCatalog;
    use tower::ServiceExt;

    use super::{router, ApiError, PromotedKeywords};

    struct Canned;

    #[async_trait]
    impl CompletionProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _prompt: &str) -> Result<Value, ProviderError> {
            Ok(json!({ "text": "Blue Mug has 12 units" }))
        }
    }

    fn app() -> Router {
        let runtime = AgentRuntime::new(
            Arc::new(IntentCatalog::builtin().expect("builtin catalog")),
            SessionRegistry::default(),
            TaskHandlerRegistry::default(),
            ResilienceChain::with_fallback(Arc::new(Canned), Arc::new(Canned)),
            Arc::new(InteractionLedger::in_memory()),
            RuntimeSettings::default(),
        );
        router(Arc::new(runtime))
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), 1 << 20).await.expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn post_turn(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/turns")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn post_turn_returns_reply_and_sub_tasks() {
        let response = app()
            .oneshot(post_turn(json!({ "user_id": "U1", "utterance": "check stock" })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let turn: TurnResponse = body_json(response).await;
        assert_eq!(turn.conversation_id, "U1");
        assert_eq!(turn.reply, "Blue Mug has 12 units");
        assert_eq!(turn.sub_tasks[0].intent_type, "check_stock");
    }

    #[tokio::test]
    async fn empty_utterance_is_rejected() {
        let response = app()
            .oneshot(post_turn(json!({ "user_id": "U1", "utterance": "   " })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let error: ApiError = body_json(response).await;
        assert!(error.error.contains("utterance"));
    }

    #[tokio::test]
    async fn report_reflects_logged_turns() {
        let app = app();
        app.clone()
            .oneshot(post_turn(json!({ "user_id": "U1", "utterance": "check stock" })))
            .await
            .expect("turn");

        let response = app
            .oneshot(Request::get("/v1/reports/weekly").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let report: Value = body_json(response).await;
        assert_eq!(report["period"], "weekly");
        assert_eq!(report["total"], 1);
        assert_eq!(report["successful"], 1);
    }

    #[tokio::test]
    async fn unknown_report_period_is_bad_request() {
        let response = app()
            .oneshot(Request::get("/v1/reports/hourly").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn promoted_keywords_honor_min_score() {
        let app = app();
        for _ in 0..4 {
            app.clone()
                .oneshot(post_turn(json!({ "user_id": "U1", "utterance": "check stock levels" })))
                .await
                .expect("turn");
        }

        let response = app
            .clone()
            .oneshot(
                Request::get("/v1/keywords/promoted?min_score=0.35").body(Body::empty()).expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let promoted: PromotedKeywords = body_json(response).await;
        assert_eq!(promoted.min_score, 0.35);
        assert!(promoted.keywords["check_stock"].contains(&"stock levels".to_string()));

        let none = app
            .oneshot(Request::get("/v1/keywords/promoted?min_score=5").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let promoted: PromotedKeywords = body_json(none).await;
        assert!(promoted.keywords.is_empty());
    }
}
