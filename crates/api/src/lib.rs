//! `api` crate — HTTP trigger boundary.
//!
//! Routes:
//!   GET    /health
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows
//!   GET    /api/v1/workflows/:id
//!   POST   /api/v1/workflows/:id/trigger
//!   POST   /api/v1/forms/:id
//!   GET    /api/v1/runs/:id

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use engine::RunStore;
use queue::RunQueue;

pub use error::ApiError;

use handlers::{runs, triggers, workflows};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RunStore>,
    pub queue: RunQueue,
}

impl AppState {
    pub fn new(store: Arc<dyn RunStore>, queue: RunQueue) -> Self {
        Self { store, queue }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/workflows", post(workflows::create).get(workflows::list))
        .route("/workflows/:id", get(workflows::get))
        .route("/workflows/:id/trigger", post(triggers::http))
        .route("/forms/:id", post(triggers::form))
        .route("/runs/:id", get(runs::get));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Serve the API on `bind` until `shutdown` fires.
pub async fn serve(bind: &str, state: AppState, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use tower::ServiceExt;

    use actions::models::ValidateRulesInput;
    use actions::{Action, ActionInput, Workflow, WorkflowState};
    use engine::{MemoryStore, Run, RunState};

    fn app() -> (Router, Arc<MemoryStore>, RunQueue) {
        let store = Arc::new(MemoryStore::new());
        let queue = RunQueue::new();
        let app = router(AppState::new(store.clone(), queue.clone()));
        (app, store, queue)
    }

    fn workflow(state: WorkflowState) -> Workflow {
        let a = Action::new(ActionInput::ValidateRules(ValidateRulesInput { rules: vec![] }));
        Workflow::new("api", state, vec![a])
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _, _) = app();
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_then_fetch_workflow() {
        let (app, _, _) = app();
        let wf = workflow(WorkflowState::ActiveExternalTrigger);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/workflows", serde_json::to_value(&wf).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(get_request(&format!("/api/v1/workflows/{}", wf.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], "api");
    }

    #[tokio::test]
    async fn created_at_is_stamped_by_the_server() {
        let (app, store, _) = app();
        let before = chrono::Utc::now();
        let body = json!({
            "name": "minimal",
            "state": "inactive",
            "actions": [],
            "created_at": "2001-01-01T00:00:00Z",
        });

        let response = app
            .oneshot(json_request("POST", "/api/v1/workflows", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let saved: Workflow = serde_json::from_value(body_json(response).await).unwrap();
        assert!(saved.created_at >= before);
        assert!(saved.tenant_id.is_nil());
        let stored = store.get_workflow(saved.id).await.unwrap();
        assert_eq!(stored.created_at, saved.created_at);
    }

    #[tokio::test]
    async fn replacing_a_workflow_keeps_its_creation_time() {
        let (app, store, _) = app();
        let original = workflow(WorkflowState::Inactive);
        store.save_workflow(&original).await.unwrap();

        let mut update = original.clone();
        update.name = "renamed".into();
        update.created_at = original.created_at - chrono::Duration::days(365);

        let response = app
            .oneshot(json_request("POST", "/api/v1/workflows", serde_json::to_value(&update).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let stored = store.get_workflow(original.id).await.unwrap();
        assert_eq!(stored.name, "renamed");
        assert_eq!(stored.created_at, original.created_at);
    }

    #[tokio::test]
    async fn cyclic_workflow_is_rejected() {
        let (app, store, _) = app();
        let mut wf = workflow(WorkflowState::ActiveExternalTrigger);
        let id = wf.actions[0].id;
        wf.actions[0].run_after.push(id);

        let response = app
            .oneshot(json_request("POST", "/api/v1/workflows", serde_json::to_value(&wf).unwrap()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].as_str().unwrap().contains("cycle"));
        assert!(store.list_workflows().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recurring_workflow_needs_a_valid_cron_expression() {
        let (app, _, _) = app();
        let wf = workflow(WorkflowState::ActiveRecurring).with_cron("whenever");

        let response = app
            .oneshot(json_request("POST", "/api/v1/workflows", serde_json::to_value(&wf).unwrap()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn http_trigger_creates_and_enqueues_a_run() {
        let (app, store, queue) = app();
        let wf = workflow(WorkflowState::ActiveExternalTrigger);
        store.save_workflow(&wf).await.unwrap();

        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/workflows/{}/trigger", wf.id),
                json!({ "email": "someone@example.com" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let run: Run = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(run.state, RunState::NotStarted);
        assert_eq!(run.trigger_input["email"], "someone@example.com");
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn form_submission_uses_form_fields_as_trigger_input() {
        let (app, store, queue) = app();
        let wf = workflow(WorkflowState::ActiveExternalTrigger);
        store.save_workflow(&wf).await.unwrap();

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/forms/{}", wf.id))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=Ada&plan=pro"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let run: Run = serde_json::from_value(body_json(response).await).unwrap();
        let expected = HashMap::from([
            ("name".to_string(), "Ada".to_string()),
            ("plan".to_string(), "pro".to_string()),
        ]);
        assert_eq!(run.trigger_input, expected);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn trigger_on_workflow_without_external_trigger_conflicts() {
        let (app, store, queue) = app();
        let wf = workflow(WorkflowState::Inactive);
        store.save_workflow(&wf).await.unwrap();

        let response = app
            .oneshot(json_request("POST", &format!("/api/v1/workflows/{}/trigger", wf.id), json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (app, _, _) = app();
        let id = uuid::Uuid::new_v4();

        for request in [
            get_request(&format!("/api/v1/workflows/{id}")),
            get_request(&format!("/api/v1/runs/{id}")),
            json_request("POST", &format!("/api/v1/workflows/{id}/trigger"), json!({})),
        ] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }
}
