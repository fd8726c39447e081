//! Envelope workflow API.
//!
//! | Method | Path | |
//! |---|---|---|
//! | POST | `/envelopes` | create an envelope |
//! | GET | `/envelopes/{id}` | envelope and workflow position |
//! | GET | `/envelopes/{id}/transitions` | transitions the caller may start |
//! | POST | `/envelopes/{id}/transition` | start a transition |
//! | GET | `/envelopes/{id}/history` | transition history keyed by timestamp |
//! | GET | `/envelopes/{id}/workflow-graph` | JSON graph of the workflow |
//! | PUT | `/envelopes/{id}/state` | force the current state (admin) |
//! | POST | `/envelopes/{id}/qa-result` | apply an automatic QA verdict (admin) |

use crate::actor::Actor;
use crate::error::{ApiError, workflow_status};
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::SecondsFormat;
use reportek_core::EnvelopeId;
use reportek_reporting::{Envelope, QaResult, announce_auto_qa_status, auto_qa, reference};
use reportek_workflow::{Assignment, BearerEvent, JsonGraph};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Builds the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/envelopes", post(create_envelope))
        .route("/envelopes/{id}", get(get_envelope))
        .route("/envelopes/{id}/transitions", get(available_transitions))
        .route("/envelopes/{id}/transition", post(start_transition))
        .route("/envelopes/{id}/history", get(history))
        .route("/envelopes/{id}/workflow-graph", get(workflow_graph))
        .route("/envelopes/{id}/state", put(force_state))
        .route("/envelopes/{id}/qa-result", post(qa_result))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_id(id: &str) -> Result<EnvelopeId, ApiError> {
    EnvelopeId::from_str(id).map_err(|e| ApiError::InvalidId {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateEnvelope {
    pub name: String,
    /// Defaults to the reference workflow.
    #[serde(default)]
    pub workflow: Option<String>,
}

/// An envelope as returned by the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnvelopeView {
    pub id: EnvelopeId,
    pub name: String,
    pub workflow: String,
    pub current_state: String,
    pub previous_state: Option<String>,
    pub finalized: bool,
    pub assignment: Assignment,
    pub auto_qa_complete: bool,
    pub auto_qa_ok: bool,
    /// Notification group for live updates.
    pub channel: String,
}

impl From<&Envelope> for EnvelopeView {
    fn from(envelope: &Envelope) -> Self {
        Self {
            id: envelope.id,
            name: envelope.name.clone(),
            workflow: envelope.workflow.workflow.clone(),
            current_state: envelope.workflow.current_state.clone(),
            previous_state: envelope.workflow.previous_state.clone(),
            finalized: envelope.finalized,
            assignment: envelope.assignment,
            auto_qa_complete: envelope.auto_qa_complete,
            auto_qa_ok: envelope.auto_qa_ok,
            channel: envelope.channel(),
        }
    }
}

async fn create_envelope(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(request): Json<CreateEnvelope>,
) -> Result<(StatusCode, Json<EnvelopeView>), ApiError> {
    let name = request.workflow.as_deref().unwrap_or(reference::NAME);
    let workflow = state
        .catalog
        .get(name)
        .ok_or_else(|| ApiError::InvalidRequest {
            details: format!("no workflow named '{name}'"),
        })?;

    let envelope = Envelope::new(request.name, workflow.definition());
    state.envelopes.create(&envelope).await?;
    info!(envelope = %envelope.id, workflow = name, actor = %actor.kind, "created envelope");

    Ok((StatusCode::CREATED, Json(EnvelopeView::from(&envelope))))
}

async fn get_envelope(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EnvelopeView>, ApiError> {
    let envelope = state.envelopes.get(parse_id(&id)?).await?;
    Ok(Json(EnvelopeView::from(&envelope)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvailableTransitions {
    pub current_state: String,
    pub transitions: Vec<String>,
}

async fn available_transitions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
) -> Result<Json<AvailableTransitions>, ApiError> {
    let machine = state.machine(parse_id(&id)?).await?;
    let transitions = machine.available_transitions(&actor).await?;
    let current_state = machine.snapshot().await?.instance.current_state;
    Ok(Json(AvailableTransitions {
        current_state,
        transitions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub transition_name: String,
}

/// Outcome of a transition request; `error` is set when it failed.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub transition: String,
    pub current_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn start_transition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(request): Json<TransitionRequest>,
) -> Result<(StatusCode, Json<TransitionResponse>), ApiError> {
    let machine = state.machine(parse_id(&id)?).await?;
    let outcome = machine
        .start_transition(&request.transition_name, &actor)
        .await;
    let current_state = machine.snapshot().await?.instance.current_state;

    let (status, error) = match outcome {
        Ok(_) => (StatusCode::OK, None),
        Err(err) => (workflow_status(&err), Some(err.to_string())),
    };
    Ok((
        status,
        Json(TransitionResponse {
            transition: request.transition_name,
            current_state,
            error,
        }),
    ))
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub transition: String,
    pub from_state: String,
    pub to_state: String,
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BTreeMap<String, HistoryEntry>>, ApiError> {
    let machine = state.machine(parse_id(&id)?).await?;
    let entries = machine
        .history()
        .await?
        .into_iter()
        .map(|event| {
            (
                event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                HistoryEntry {
                    transition: event.transition,
                    from_state: event.from_state,
                    to_state: event.to_state,
                },
            )
        })
        .collect();
    Ok(Json(entries))
}

async fn workflow_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JsonGraph>, ApiError> {
    let machine = state.machine(parse_id(&id)?).await?;
    Ok(Json(machine.graph().await?))
}

#[derive(Debug, Deserialize)]
pub struct ForceState {
    pub state: String,
}

async fn force_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    actor: Actor,
    Json(request): Json<ForceState>,
) -> Result<Json<EnvelopeView>, ApiError> {
    actor.require_admin()?;
    let id = parse_id(&id)?;
    let machine = state.machine(id).await?;
    machine.force_state(&request.state).await?;
    let envelope = state.envelopes.get(id).await?;
    Ok(Json(EnvelopeView::from(&envelope)))
}

async fn qa_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    actor: Actor,
    Json(result): Json<QaResult>,
) -> Result<Json<TransitionResponse>, ApiError> {
    actor.require_admin()?;
    let id = parse_id(&id)?;
    let machine = state.machine(id).await?;
    if machine.workflow().name() != auto_qa::NAME {
        return Err(ApiError::InvalidRequest {
            details: format!(
                "workflow '{}' does not take QA results",
                machine.workflow().name()
            ),
        });
    }

    let event = reportek_reporting::handle_qa_result(&machine, &result, state.qa_wait).await?;
    let envelope = state.envelopes.record_auto_qa(id, result.valid).await?;
    if let Err(e) = announce_auto_qa_status(
        state.engine.notifier().as_ref(),
        &envelope,
        BearerEvent::CompletedAutoQa,
    )
    .await
    {
        warn!(envelope = %id, error = %e, "failed to announce auto QA status");
    }

    Ok(Json(TransitionResponse {
        transition: event.transition,
        current_state: envelope.workflow.current_state,
        error: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ACTOR_HEADER, USER_HEADER};
    use crate::memory::MemoryEnvelopeStore;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use reportek_core::UserId;
    use reportek_reporting::{MockQaService, QaWait, WorkflowCatalog};
    use reportek_workflow::Engine;
    use reportek_workflow::memory::{MemoryHistoryLog, RecordingNotifier};
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        notifier: RecordingNotifier,
    }

    fn app() -> TestApp {
        let envelopes = MemoryEnvelopeStore::new();
        let notifier = RecordingNotifier::new();
        let engine = Engine::new(
            Arc::new(envelopes.clone()),
            Arc::new(MemoryHistoryLog::new()),
            Arc::new(notifier.clone()),
        );
        let catalog =
            WorkflowCatalog::standard(Arc::new(MockQaService::new())).expect("catalog");
        let state = AppState::new(engine, catalog, Arc::new(envelopes)).with_qa_wait(QaWait {
            attempts: 1,
            interval: Duration::from_millis(1),
        });
        TestApp {
            router: router(Arc::new(state)),
            notifier,
        }
    }

    async fn call(
        router: &Router,
        method: &str,
        uri: &str,
        actor: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            request = request
                .header(ACTOR_HEADER, actor)
                .header(USER_HEADER, UserId::new().to_string());
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }

    async fn create(router: &Router, workflow: &str) -> String {
        let (status, body) = call(
            router,
            "POST",
            "/envelopes",
            Some("reporter"),
            Some(serde_json::json!({"name": "Q1 deliveries", "workflow": workflow})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().expect("id").to_string()
    }

    #[tokio::test]
    async fn creates_envelope_on_initial_state() {
        let app = app();
        let id = create(&app.router, reference::NAME).await;

        let (status, body) = call(&app.router, "GET", &format!("/envelopes/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_state"], "draft");
        assert_eq!(body["workflow"], "reference");
        assert_eq!(body["finalized"], false);
    }

    #[tokio::test]
    async fn unknown_workflow_is_rejected() {
        let app = app();
        let (status, body) = call(
            &app.router,
            "POST",
            "/envelopes",
            Some("reporter"),
            Some(serde_json::json!({"name": "Q1", "workflow": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("error").contains("nope"));
    }

    #[tokio::test]
    async fn lists_transitions_for_actor() {
        let app = app();
        let id = create(&app.router, reference::NAME).await;
        let uri = format!("/envelopes/{id}/transitions");

        let (_, reporter) = call(&app.router, "GET", &uri, Some("reporter"), None).await;
        assert_eq!(reporter["current_state"], "draft");
        assert_eq!(
            reporter["transitions"],
            serde_json::json!(["delete_auto_qa_results"])
        );

        let (_, client) = call(&app.router, "GET", &uri, Some("client"), None).await;
        assert_eq!(client["transitions"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn missing_or_system_actor_is_rejected() {
        let app = app();
        let id = create(&app.router, reference::NAME).await;
        let uri = format!("/envelopes/{id}/transitions");

        let (status, _) = call(&app.router, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app.router, "GET", &uri, Some("system"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn transition_statuses() {
        let app = app();
        let id = create(&app.router, auto_qa::NAME).await;
        let uri = format!("/envelopes/{id}/transition");

        let (status, body) = call(
            &app.router,
            "POST",
            &uri,
            Some("admin"),
            Some(serde_json::json!({"transition_name": "teleport"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["transition"], "teleport");
        assert_eq!(body["current_state"], "draft");
        assert!(body["error"].is_string());

        let (status, body) = call(
            &app.router,
            "POST",
            &uri,
            Some("admin"),
            Some(serde_json::json!({"transition_name": "accept"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(body["current_state"], "draft");

        let (status, body) = call(
            &app.router,
            "POST",
            &uri,
            Some("admin"),
            Some(serde_json::json!({"transition_name": "send_to_qa"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_state"], "auto_qa");
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn qa_result_moves_envelope_and_announces() {
        let app = app();
        let id = create(&app.router, auto_qa::NAME).await;
        call(
            &app.router,
            "POST",
            &format!("/envelopes/{id}/transition"),
            Some("admin"),
            Some(serde_json::json!({"transition_name": "send_to_qa"})),
        )
        .await;

        let (status, body) = call(
            &app.router,
            "POST",
            &format!("/envelopes/{id}/qa-result"),
            Some("admin"),
            Some(serde_json::json!({"id": "qa-0001", "valid": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transition"], "pass_qa");
        assert_eq!(body["current_state"], "review");

        let (_, envelope) = call(&app.router, "GET", &format!("/envelopes/{id}"), None, None).await;
        assert_eq!(envelope["auto_qa_complete"], true);
        assert_eq!(envelope["auto_qa_ok"], true);
        assert!(
            app.notifier
                .topics()
                .await
                .contains(&"envelope.completed_auto_qa".to_string())
        );
    }

    #[tokio::test]
    async fn qa_result_requires_auto_qa_workflow() {
        let app = app();
        let id = create(&app.router, reference::NAME).await;
        let (status, _) = call(
            &app.router,
            "POST",
            &format!("/envelopes/{id}/qa-result"),
            Some("admin"),
            Some(serde_json::json!({"id": "qa-0001", "valid": true})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_and_graph() {
        let app = app();
        let id = create(&app.router, reference::NAME).await;
        call(
            &app.router,
            "POST",
            &format!("/envelopes/{id}/transition"),
            Some("reporter"),
            Some(serde_json::json!({"transition_name": "delete_auto_qa_results"})),
        )
        .await;

        let (status, history) =
            call(&app.router, "GET", &format!("/envelopes/{id}/history"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        let entries: Vec<&serde_json::Value> =
            history.as_object().expect("object").values().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["transition"], "delete_auto_qa_results");
        assert_eq!(entries[1]["transition"], "send_to_auto_qa");

        let (status, graph) = call(
            &app.router,
            "GET",
            &format!("/envelopes/{id}/workflow-graph"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let current: Vec<&str> = graph["graph"]["nodes"]
            .as_array()
            .expect("nodes")
            .iter()
            .filter(|n| n["metadata"]["current"] == true)
            .filter_map(|n| n["id"].as_str())
            .collect();
        assert_eq!(current, ["qa_pending"]);
    }

    #[tokio::test]
    async fn force_state_is_admin_only() {
        let app = app();
        let id = create(&app.router, reference::NAME).await;
        let uri = format!("/envelopes/{id}/state");

        let (status, _) = call(
            &app.router,
            "PUT",
            &uri,
            Some("reporter"),
            Some(serde_json::json!({"state": "released"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &app.router,
            "PUT",
            &uri,
            Some("admin"),
            Some(serde_json::json!({"state": "released"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_state"], "released");

        let (status, _) = call(
            &app.router,
            "PUT",
            &uri,
            Some("admin"),
            Some(serde_json::json!({"state": "limbo"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_envelope_is_not_found() {
        let app = app();
        let uri = format!("/envelopes/{}/history", EnvelopeId::new());
        let (status, _) = call(&app.router, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
