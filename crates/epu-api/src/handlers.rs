use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use epu_domain::{DefinitionId, Domain, DomainDefinition, DomainId, Heartbeat, LaunchId, NodeId};
use epu_management::{InstanceInfoMessage, SensorInfoMessage};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

/// Domain-mutating routes take the caller's identity from this header
/// rather than folding it into the JSON body, so the body shape stays
/// payload-only (config, subscriber name, ...).
const CALLER_HEADER: &str = "x-epu-caller";

fn caller(headers: &axum::http::HeaderMap) -> String {
    headers.get(CALLER_HEADER).and_then(|v| v.to_str().ok()).unwrap_or("").to_string()
}

// ── Liveness/readiness ──────────────────────────────────────────────────────

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.list_domains().await?;
    Ok(StatusCode::OK)
}

// ── Domain definitions ───────────────────────────────────────────────────────

pub async fn add_domain_definition(
    State(state): State<AppState>,
    Json(def): Json<DomainDefinition>,
) -> Result<StatusCode, ApiError> {
    state.management.add_domain_definition(def).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn remove_domain_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = DefinitionId::new(id).map_err(|e| ApiError::bad_request("INVALID_DEFINITION_ID", e.to_string()))?;
    state.management.remove_domain_definition(&id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn list_domain_definitions(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let defs = state.management.list_domain_definitions().await?;
    Ok(Json(json!(defs)))
}

pub async fn describe_domain_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = DefinitionId::new(id).map_err(|e| ApiError::bad_request("INVALID_DEFINITION_ID", e.to_string()))?;
    let def = state.management.describe_domain_definition(&id).await?;
    Ok(Json(json!(def)))
}

pub async fn update_domain_definition(
    State(state): State<AppState>,
    Path(_id): Path<String>,
    Json(def): Json<DomainDefinition>,
) -> Result<StatusCode, ApiError> {
    state.management.update_domain_definition(def).await?;
    Ok(StatusCode::ACCEPTED)
}

// ── Domains ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddDomainBody {
    pub domain_id: String,
    pub definition_id: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub subscribers: Vec<String>,
}

pub async fn add_domain(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(body): Json<AddDomainBody>,
) -> Result<StatusCode, ApiError> {
    let domain_id = DomainId::new(body.domain_id).map_err(|e| ApiError::bad_request("INVALID_DOMAIN_ID", e.to_string()))?;
    let definition_id =
        DefinitionId::new(body.definition_id).map_err(|e| ApiError::bad_request("INVALID_DEFINITION_ID", e.to_string()))?;
    state
        .management
        .add_domain(&caller(&headers), domain_id, definition_id, body.config, body.subscribers)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn remove_domain(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = DomainId::new(id).map_err(|e| ApiError::bad_request("INVALID_DOMAIN_ID", e.to_string()))?;
    state.management.remove_domain(&caller(&headers), &id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn list_domains(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let domains: Vec<Domain> = state.management.list_domains().await?;
    Ok(Json(json!(domains)))
}

pub async fn describe_domain(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = DomainId::new(id).map_err(|e| ApiError::bad_request("INVALID_DOMAIN_ID", e.to_string()))?;
    let domain = state.management.describe_domain(&id).await?;
    Ok(Json(json!(domain)))
}

pub async fn reconfigure_domain(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Path(id): Path<String>,
    Json(config): Json<Value>,
) -> Result<StatusCode, ApiError> {
    let id = DomainId::new(id).map_err(|e| ApiError::bad_request("INVALID_DOMAIN_ID", e.to_string()))?;
    state.management.reconfigure_domain(&caller(&headers), &id, config).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct SubscriberBody {
    pub subscriber: String,
}

pub async fn subscribe_domain(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<SubscriberBody>,
) -> Result<StatusCode, ApiError> {
    let id = DomainId::new(id).map_err(|e| ApiError::bad_request("INVALID_DOMAIN_ID", e.to_string()))?;
    state.management.subscribe_domain(&caller(&headers), &id, body.subscriber).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn unsubscribe_domain(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Path((id, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let id = DomainId::new(id).map_err(|e| ApiError::bad_request("INVALID_DOMAIN_ID", e.to_string()))?;
    state.management.unsubscribe_domain(&caller(&headers), &id, &name).await?;
    Ok(StatusCode::ACCEPTED)
}

// ── Heartbeat / sensor ingestion ─────────────────────────────────────────────

pub async fn heartbeat(State(state): State<AppState>, Json(hb): Json<Heartbeat>) -> Result<StatusCode, ApiError> {
    state.management.ou_heartbeat(hb).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn sensor_info(
    State(state): State<AppState>,
    Json(msg): Json<SensorInfoMessage>,
) -> Result<StatusCode, ApiError> {
    state.management.sensor_info(msg).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn instance_info(
    State(state): State<AppState>,
    Json(msg): Json<InstanceInfoMessage>,
) -> Result<StatusCode, ApiError> {
    state.management.instance_info(msg).await?;
    Ok(StatusCode::ACCEPTED)
}

// ── Provisioner ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ProvisionBody {
    pub request: epu_domain::ProvisionRequest,
}

pub async fn provision(
    State(state): State<AppState>,
    Json(body): Json<ProvisionBody>,
) -> Result<Json<Value>, ApiError> {
    let (launch, nodes) = state.provisioner.prepare_provision(body.request).await?;
    state.provisioner.execute_provision(&launch.launch_id).await?;
    Ok(Json(json!({ "launch": launch, "nodes": nodes })))
}

#[derive(Debug, Deserialize)]
pub struct NodeIdsBody {
    pub node_ids: Vec<String>,
}

pub async fn terminate_nodes(
    State(state): State<AppState>,
    Json(body): Json<NodeIdsBody>,
) -> Result<StatusCode, ApiError> {
    let ids: Vec<NodeId> = body.node_ids.into_iter().map(NodeId::from).collect();
    state.provisioner.terminate_nodes(&ids).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct LaunchIdsBody {
    pub launch_ids: Vec<String>,
}

pub async fn terminate_launches(
    State(state): State<AppState>,
    Json(body): Json<LaunchIdsBody>,
) -> Result<StatusCode, ApiError> {
    let ids: Vec<LaunchId> = body.launch_ids.into_iter().map(LaunchId::from).collect();
    state.provisioner.terminate_launches(&ids).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn terminate_all(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.provisioner.terminate_all().await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn check_terminate_all(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let done = state.provisioner.check_terminate_all().await?;
    Ok(Json(json!({ "terminate_all_complete": done })))
}

pub async fn dump_state(
    State(state): State<AppState>,
    Json(body): Json<NodeIdsBody>,
) -> Result<StatusCode, ApiError> {
    let ids: Vec<NodeId> = body.node_ids.into_iter().map(NodeId::from).collect();
    state.provisioner.dump_state(&ids).await?;
    Ok(StatusCode::ACCEPTED)
}
