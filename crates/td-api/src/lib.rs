//! REST API
//!
//! Exposes the address flow, the config entries it creates and the states
//! published by the outage sensors, using axum.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use td_config_entries::{ConfigEntries, ConfigEntry};
use td_flow::{FlowManager, FlowManagerError, FlowResult};
use td_sensor::SensorRegistry;
use td_state_store::StateStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub flows: Arc<FlowManager>,
    pub config_entries: Arc<ConfigEntries>,
    pub states: Arc<StateStore>,
    pub sensors: Arc<SensorRegistry>,
}

/// API status response
#[derive(Serialize)]
struct ApiStatus {
    message: &'static str,
}

/// State response for a single entity
#[derive(Serialize)]
pub struct StateResponse {
    pub entity_id: String,
    pub state: String,
    pub attributes: HashMap<String, serde_json::Value>,
    pub last_changed: String,
    pub last_updated: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Request to start a config flow
#[derive(Deserialize)]
pub struct StartFlowRequest {
    pub handler: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
}

fn flow_error(e: FlowManagerError) -> ApiError {
    let status = match e {
        FlowManagerError::UnknownFlow(_) | FlowManagerError::UnknownHandler(_) => {
            StatusCode::NOT_FOUND
        }
        FlowManagerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        FlowManagerError::Entries(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/", get(api_status))
        .route("/api/health", get(health_check))
        // State endpoints
        .route("/api/states", get(get_states))
        .route("/api/states/:entity_id", get(get_state))
        // Config entries
        .route("/api/config/config_entries/entry", get(list_config_entries))
        .route(
            "/api/config/config_entries/entry/:entry_id",
            delete(delete_config_entry),
        )
        // Address flows
        .route(
            "/api/config/config_entries/flow",
            post(start_config_flow).get(list_config_flows),
        )
        .route(
            "/api/config/config_entries/flow/:flow_id",
            get(get_config_flow)
                .post(progress_config_flow)
                .delete(cancel_config_flow),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server; returns when `shutdown` resolves
pub async fn start_server(
    state: AppState,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

// ==================== Handlers ====================

/// GET /api/ - Returns API status
async fn api_status() -> Json<ApiStatus> {
    Json(ApiStatus {
        message: "API running.",
    })
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// GET /api/states - Returns all sensor states
async fn get_states(State(state): State<AppState>) -> Json<Vec<StateResponse>> {
    Json(state.states.all().iter().map(state_to_response).collect())
}

fn state_to_response(s: &td_core::State) -> StateResponse {
    StateResponse {
        entity_id: s.entity_id.to_string(),
        state: s.state.clone(),
        attributes: s.attributes.clone(),
        last_changed: s.last_changed.to_rfc3339(),
        last_updated: s.last_updated.to_rfc3339(),
    }
}

/// GET /api/states/{entity_id} - Returns a single sensor state
async fn get_state(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<StateResponse>, ApiError> {
    state
        .states
        .get(&entity_id)
        .map(|s| Json(state_to_response(&s)))
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("Entity not found: {}", entity_id),
            )
        })
}

/// GET /api/config/config_entries/entry - List configured addresses
async fn list_config_entries(State(state): State<AppState>) -> Json<Vec<ConfigEntry>> {
    Json(state.config_entries.get_by_domain(td_core::DOMAIN))
}

/// DELETE /api/config/config_entries/entry/{entry_id} - Remove an entry and its sensor
async fn delete_config_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Response {
    info!("HTTP DELETE config entry: {}", entry_id);

    match state.config_entries.remove(&entry_id).await {
        Ok(_entry) => {
            state.sensors.unload_entry(&entry_id).await;
            (
                StatusCode::OK,
                Json(serde_json::json!({ "require_restart": false })),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Failed to delete config entry {}: {}", entry_id, e);
            api_error(
                StatusCode::NOT_FOUND,
                format!("Invalid entry specified: {}", entry_id),
            )
            .into_response()
        }
    }
}

/// GET /api/config/config_entries/flow - In-progress flows
async fn list_config_flows(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.flows.list_flows().await)
}

/// POST /api/config/config_entries/flow - Start a new address flow
async fn start_config_flow(
    State(state): State<AppState>,
    Json(request): Json<StartFlowRequest>,
) -> Result<Json<FlowResult>, ApiError> {
    info!("HTTP POST start config flow for handler: {}", request.handler);
    state
        .flows
        .start_flow(&request.handler)
        .await
        .map(Json)
        .map_err(flow_error)
}

/// GET /api/config/config_entries/flow/{flow_id} - Current form of a flow
async fn get_config_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
) -> Result<Json<FlowResult>, ApiError> {
    state
        .flows
        .progress_flow(&flow_id, None)
        .await
        .map(Json)
        .map_err(flow_error)
}

/// POST /api/config/config_entries/flow/{flow_id} - Submit user input
///
/// A flow that creates an entry also sets up the entry's sensor.
async fn progress_config_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    Json(user_input): Json<serde_json::Value>,
) -> Result<Json<FlowResult>, ApiError> {
    let result = state
        .flows
        .progress_flow(&flow_id, Some(user_input))
        .await
        .map_err(flow_error)?;

    if result.is_create_entry() {
        if let Some(entry) = result.entry_id().and_then(|id| state.config_entries.get(id)) {
            if let Err(e) = state.sensors.setup_entry(&entry).await {
                warn!("Failed to set up sensor for entry {}: {}", entry.entry_id, e);
            }
        }
    }

    Ok(Json(result))
}

/// DELETE /api/config/config_entries/flow/{flow_id} - Cancel a flow
async fn cancel_config_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
) -> Result<Json<FlowResult>, ApiError> {
    info!("HTTP DELETE (cancel) config flow: {}", flow_id);
    state
        .flows
        .abort_flow(&flow_id)
        .await
        .map(Json)
        .map_err(flow_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use td_config_entries::Storage;
    use td_core::{Candidate, MockClock, Stage};
    use td_flow::FlowOptions;
    use td_geo::{Outage, StaticLookup};
    use td_sensor::SensorSettings;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn create_test_state(dir: &TempDir) -> AppState {
        let lookup = Arc::new(
            StaticLookup::new()
                .with_candidates(Stage::City, "Kra", vec![Candidate::new("1", "Kraków")])
                .with_candidates(Stage::Street, "Flo", vec![Candidate::new("77", "Floriańska")])
                .with_candidates(Stage::HouseNumber, "12", vec![Candidate::new("12", "12")])
                .with_outages(vec![Outage::new("Planned maintenance")]),
        );
        let config_entries = Arc::new(ConfigEntries::new(Arc::new(Storage::new(dir.path()))));
        let states = Arc::new(StateStore::new());
        let sensors = Arc::new(SensorRegistry::new(
            lookup.clone(),
            Arc::new(MockClock::new()),
            states.clone(),
            SensorSettings::default(),
        ));
        let flows = Arc::new(FlowManager::new(
            lookup,
            config_entries.clone(),
            FlowOptions::default(),
        ));

        AppState {
            flows,
            config_entries,
            states,
            sensors,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_api_status() {
        let dir = TempDir::new().unwrap();
        let app = create_router(create_test_state(&dir));

        let (status, json) = send(&app, "GET", "/api/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "API running.");
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = TempDir::new().unwrap();
        let app = create_router(create_test_state(&dir));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_state_not_found() {
        let dir = TempDir::new().unwrap();
        let app = create_router(create_test_state(&dir));

        let (status, json) = send(&app, "GET", "/api/states/sensor.missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["message"].as_str().unwrap().contains("sensor.missing"));
    }

    #[tokio::test]
    async fn test_unknown_handler() {
        let dir = TempDir::new().unwrap();
        let app = create_router(create_test_state(&dir));

        let (status, _) = send(
            &app,
            "POST",
            "/api/config/config_entries/flow",
            Some(json!({"handler": "hue"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_flow_creates_entry_and_sensor() {
        let dir = TempDir::new().unwrap();
        let state = create_test_state(&dir);
        let app = create_router(state.clone());

        let (status, form) = send(
            &app,
            "POST",
            "/api/config/config_entries/flow",
            Some(json!({"handler": "tauron_dystrybucja"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(form["type"], "form");
        assert_eq!(form["step_id"], "city");
        let flow_uri = format!(
            "/api/config/config_entries/flow/{}",
            form["flow_id"].as_str().unwrap()
        );

        let (_, form) = send(&app, "POST", &flow_uri, Some(json!({"city": "Kr"}))).await;
        assert_eq!(form["errors"]["city"], "too_short");

        let steps = [
            json!({"city": "Kra"}),
            json!({"selection": "1"}),
            json!({"street": "Flo"}),
            json!({"selection": "77"}),
            json!({"house_number": "12"}),
            json!({"selection": "12"}),
        ];
        for step in steps {
            let (status, form) = send(&app, "POST", &flow_uri, Some(step)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(form["type"], "form");
            assert!(form["errors"].is_null(), "unexpected errors: {}", form);
        }

        let (_, form) = send(&app, "GET", &flow_uri, None).await;
        assert_eq!(form["step_id"], "flat_number");
        assert_eq!(form["last_step"], true);

        let (status, done) = send(
            &app,
            "POST",
            &flow_uri,
            Some(json!({"flat_number": "", "poll_interval": 30})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["type"], "create_entry");
        assert_eq!(done["title"], "Kraków, Floriańska 12");
        let entry_id = done["result"]["entry_id"].as_str().unwrap().to_string();

        let sensor = state.sensors.get(&entry_id).unwrap();
        assert_eq!(sensor.poll_interval(), 30);
        let entity_uri = format!("/api/states/{}", sensor.entity_id());
        let (status, _) = send(&app, "GET", &entity_uri, None).await;
        assert_eq!(status, StatusCode::OK);

        // the finished flow is gone
        let (status, _) = send(&app, "GET", &flow_uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, entries) = send(&app, "GET", "/api/config/config_entries/entry", None).await;
        assert_eq!(entries.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/api/config/config_entries/entry/{}", entry_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.sensors.get(&entry_id).is_none());
        let (status, _) = send(&app, "GET", &entity_uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_flow() {
        let dir = TempDir::new().unwrap();
        let app = create_router(create_test_state(&dir));

        let (_, form) = send(
            &app,
            "POST",
            "/api/config/config_entries/flow",
            Some(json!({"handler": "tauron_dystrybucja"})),
        )
        .await;
        let flow_uri = format!(
            "/api/config/config_entries/flow/{}",
            form["flow_id"].as_str().unwrap()
        );

        let (_, flows) = send(&app, "GET", "/api/config/config_entries/flow", None).await;
        assert_eq!(flows.as_array().unwrap().len(), 1);

        let (status, aborted) = send(&app, "DELETE", &flow_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(aborted["type"], "abort");
        assert_eq!(aborted["reason"], "user_cancelled");

        let (status, _) = send(&app, "DELETE", &flow_uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let dir = TempDir::new().unwrap();
        let app = create_router(create_test_state(&dir));

        let (_, form) = send(
            &app,
            "POST",
            "/api/config/config_entries/flow",
            Some(json!({"handler": "tauron_dystrybucja"})),
        )
        .await;
        let flow_uri = format!(
            "/api/config/config_entries/flow/{}",
            form["flow_id"].as_str().unwrap()
        );

        let (status, _) = send(&app, "POST", &flow_uri, Some(json!(["Kraków"]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_unknown_entry() {
        let dir = TempDir::new().unwrap();
        let app = create_router(create_test_state(&dir));

        let (status, _) = send(
            &app,
            "DELETE",
            "/api/config/config_entries/entry/01MISSING",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
