//! REST API Handlers
//!
//! One JSON endpoint per extension operation plus the registry listing and
//! the liveness/readiness probes.

use crate::array::{RegistryStats, SystemSummary};
use crate::controlplane::connectivity::ValidateConnectivityRequest;
use crate::controlplane::group_snapshot::CreateVolumeGroupSnapshotRequest;
use crate::controlplane::remote_volume::CreateVolumeRequest;
use crate::controlplane::replication::ReplicationAction;
use crate::controlplane::service::{ExtensionService, Parameters};
use crate::error::{Error, StatusCode as OperationStatus};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Body of the calls that act on a volume handle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeHandleRequest {
    #[serde(default)]
    pub volume_handle: String,
    #[serde(default)]
    pub parameters: Parameters,
}

/// Body of the calls that act on an existing protection group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionGroupRequest {
    #[serde(default)]
    pub protection_group_attributes: Parameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteActionRequest {
    pub action: String,
    #[serde(default)]
    pub protection_group_attributes: Parameters,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemsResponse {
    pub systems: Vec<SystemSummary>,
    pub stats: RegistryStats,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// HTTP status an operation error is reported with
pub fn http_status(code: OperationStatus) -> StatusCode {
    match code {
        OperationStatus::InvalidArgument => StatusCode::BAD_REQUEST,
        OperationStatus::NotFound => StatusCode::NOT_FOUND,
        OperationStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        OperationStatus::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(operation: &str, e: Error) -> Response {
    let code = e.code();
    (
        http_status(code),
        Json(ApiErrorResponse {
            error: code.to_string(),
            message: e.message(),
            details: Some(format!("{} failed", operation)),
        }),
    )
        .into_response()
}

fn respond<T: Serialize>(operation: &str, status: StatusCode, result: crate::Result<T>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => error_response(operation, e),
    }
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    service: Arc<ExtensionService>,
}

impl RestRouter {
    pub fn new(service: Arc<ExtensionService>) -> Self {
        Self { service }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            service: self.service,
        };

        Router::new()
            // Replication endpoints
            .route("/v1/replication/capabilities", get(get_capabilities))
            .route("/v1/replication/remote-volumes", post(create_remote_volume))
            .route(
                "/v1/replication/protection-groups",
                post(create_protection_group),
            )
            .route(
                "/v1/replication/protection-groups/:id/delete",
                post(delete_protection_group),
            )
            .route(
                "/v1/replication/protection-groups/:id/status",
                post(get_protection_group_status),
            )
            .route(
                "/v1/replication/protection-groups/:id/actions",
                post(execute_action),
            )
            // Volume endpoints
            .route("/v1/volumes", post(create_volume))
            .route("/v1/volume-group-snapshots", post(create_volume_group_snapshot))
            // Node health monitor
            .route("/v1/podmon/validate-connectivity", post(validate_connectivity))
            // Registry
            .route("/v1/systems", get(list_systems))
            // Health endpoints
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<ExtensionService>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn get_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.service.get_replication_capabilities()))
}

async fn create_remote_volume(
    State(state): State<AppState>,
    Json(request): Json<VolumeHandleRequest>,
) -> Response {
    info!("Creating remote volume for {}", request.volume_handle);
    let result = state
        .service
        .create_remote_volume(&request.volume_handle, &request.parameters)
        .await;
    respond("create_remote_volume", StatusCode::CREATED, result)
}

async fn create_protection_group(
    State(state): State<AppState>,
    Json(request): Json<VolumeHandleRequest>,
) -> Response {
    info!("Creating protection group for {}", request.volume_handle);
    let result = state
        .service
        .create_storage_protection_group(&request.volume_handle, &request.parameters)
        .await;
    respond("create_storage_protection_group", StatusCode::CREATED, result)
}

async fn delete_protection_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ProtectionGroupRequest>,
) -> Response {
    info!("Deleting protection group {}", id);
    match state
        .service
        .delete_storage_protection_group(&id, &request.protection_group_attributes)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response("delete_storage_protection_group", e),
    }
}

async fn get_protection_group_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ProtectionGroupRequest>,
) -> Response {
    debug!("Fetching status of protection group {}", id);
    let result = state
        .service
        .get_storage_protection_group_status(&id, &request.protection_group_attributes)
        .await;
    respond("get_storage_protection_group_status", StatusCode::OK, result)
}

async fn execute_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ExecuteActionRequest>,
) -> Response {
    let action: ReplicationAction = match request.action.parse() {
        Ok(action) => action,
        Err(e) => return error_response("execute_action", e),
    };
    info!("Executing {} on protection group {}", action, id);
    let result = state
        .service
        .execute_action(&id, &request.protection_group_attributes, action)
        .await;
    respond("execute_action", StatusCode::OK, result)
}

async fn create_volume(
    State(state): State<AppState>,
    Json(request): Json<CreateVolumeRequest>,
) -> Response {
    info!("Creating volume {}", request.name);
    let result = state.service.create_volume(request).await;
    respond("create_volume", StatusCode::CREATED, result)
}

async fn create_volume_group_snapshot(
    State(state): State<AppState>,
    Json(request): Json<CreateVolumeGroupSnapshotRequest>,
) -> Response {
    info!("Creating volume group snapshot {}", request.name);
    let result = state.service.create_volume_group_snapshot(&request).await;
    respond("create_volume_group_snapshot", StatusCode::CREATED, result)
}

async fn validate_connectivity(
    State(state): State<AppState>,
    Json(request): Json<ValidateConnectivityRequest>,
) -> Response {
    let result = state
        .service
        .validate_volume_host_connectivity(&request)
        .await;
    respond("validate_volume_host_connectivity", StatusCode::OK, result)
}

async fn list_systems(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.service.registry();
    (
        StatusCode::OK,
        Json(SystemsResponse {
            systems: registry.systems(),
            stats: registry.stats(),
        }),
    )
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.service.registry().any_probed() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no system probed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{InMemoryArray, SystemRegistry};

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(http_status(OperationStatus::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(http_status(OperationStatus::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            http_status(OperationStatus::Unavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            http_status(OperationStatus::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_status() {
        let response = error_response(
            "create_volume_group_snapshot",
            Error::InvalidArgument("SourceVolumeIDs cannot be empty".into()),
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_systems_response_body() {
        let registry = SystemRegistry::empty();
        registry.register("sysA", Arc::new(InMemoryArray::new("sysA")));
        registry.require_probe("sysA").await.unwrap();

        let body = serde_json::to_value(SystemsResponse {
            systems: registry.systems(),
            stats: registry.stats(),
        })
        .unwrap();
        assert_eq!(body["systems"][0]["systemId"], "sysA");
        assert_eq!(body["systems"][0]["probed"], true);
        assert_eq!(body["stats"]["systems"], 1);
        assert_eq!(body["stats"]["probeAttempts"], 1);
    }
}
