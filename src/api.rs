//! HTTP API and websocket endpoint.

use anyhow::Result;
use axum::{
    async_trait,
    extract::{ws::WebSocketUpgrade, FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Local, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::{
    InventoryPart, MaintenancePlan, MaintenanceTask, NewInventoryPart, NewWorkOrder, OrgId,
    UserId, WorkOrder,
};
use crate::scheduler::{ScanReport, Scheduler};
use crate::services::{
    InventoryService, InventoryUpdate, MaintenancePlanService, PlanRequest, ServiceError,
    WorkOrderService, WorkOrderUpdate,
};
use crate::storage::Storage;
use crate::websocket::{start_session, Hub};

/// Standard API response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: &'static str,
}

impl ResponseMeta {
    fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: ResponseMeta::now(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(msg: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.to_string()),
            meta: ResponseMeta::now(),
        }
    }
}

/// Errors surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ApiResponse::<()>::error(&msg))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound(_) => ApiError::NotFound(e.to_string()),
            ServiceError::InvalidInput(_) => ApiError::BadRequest(e.to_string()),
            ServiceError::Store(e) => {
                error!(error = %e, "store failure");
                ApiError::Internal("internal error".to_string())
            }
        }
    }
}

/// Caller identity established by the upstream gateway.
///
/// Read from `X-Organization-Id` / `X-User-Id`, falling back to the
/// `organization_id` / `user_id` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub organization_id: OrgId,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Default, Deserialize)]
struct IdentityQuery {
    organization_id: Option<i64>,
    user_id: Option<i64>,
}

fn header_id(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = Query::<IdentityQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        let organization_id = header_id(&parts.headers, "x-organization-id")
            .or(query.organization_id)
            .filter(|id| *id > 0)
            .ok_or(ApiError::Unauthorized)?;
        let user_id = header_id(&parts.headers, "x-user-id")
            .or(query.user_id)
            .filter(|id| *id > 0);

        Ok(Identity {
            organization_id,
            user_id,
        })
    }
}

/// Application state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub hub: Hub,
    pub scheduler: Arc<Scheduler>,
    pub work_orders: WorkOrderService,
    pub inventory: InventoryService,
    pub plans: MaintenancePlanService,
    pub config: Arc<Config>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(storage: Storage, hub: Hub, scheduler: Arc<Scheduler>, config: Config) -> Self {
        Self {
            work_orders: WorkOrderService::new(storage.clone(), hub.clone()),
            inventory: InventoryService::new(storage.clone(), hub.clone()),
            plans: MaintenancePlanService::new(storage.clone()),
            storage,
            hub,
            scheduler,
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/health", get(health_handler))
        .route("/api/work-orders", post(create_work_order_handler))
        .route("/api/work-orders/:id", put(update_work_order_handler))
        .route(
            "/api/inventory",
            get(list_inventory_handler).post(create_inventory_handler),
        )
        .route("/api/inventory/low-stock", get(low_stock_handler))
        .route(
            "/api/inventory/:id",
            put(update_inventory_handler).delete(delete_inventory_handler),
        )
        .route("/api/inventory/:id/deduct", post(deduct_inventory_handler))
        .route("/api/scheduler/run", post(run_scheduler_handler))
        .route("/api/maintenance/tasks", get(list_tasks_handler))
        .route("/api/maintenance/tasks/:id", get(get_task_handler))
        .route(
            "/api/maintenance/plans",
            get(list_plans_handler).post(create_plan_handler),
        )
        .route(
            "/api/maintenance/plans/:id",
            get(get_plan_handler).delete(delete_plan_handler),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the web server until `shutdown` resolves.
pub async fn run_server<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = state.config.bind_addr().parse()?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Web server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// WebSocket upgrade handler.
async fn websocket_handler(
    identity: Identity,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let capacity = state.config.client_queue_capacity;
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let user_id = identity.user_id.unwrap_or_default();
        match start_session(
            &state.hub,
            identity.organization_id,
            user_id,
            stream,
            sink,
            capacity,
        )
        .await
        {
            Ok(key) => debug!(
                org_id = identity.organization_id,
                user_id,
                session_id = %key.id,
                "websocket client connected"
            ),
            Err(e) => warn!(
                org_id = identity.organization_id,
                error = %e,
                "could not register websocket client"
            ),
        }
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub organizations: usize,
    pub scheduler_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_connections: Option<usize>,
}

async fn health_handler(
    State(state): State<AppState>,
    identity: Option<Identity>,
) -> Json<ApiResponse<HealthResponse>> {
    let stats = state.hub.stats().await;
    let status = if stats.is_ok() { "healthy" } else { "degraded" };
    let stats = stats.unwrap_or_default();

    let organization_connections = match identity {
        Some(identity) => state
            .hub
            .organization_connection_count(identity.organization_id)
            .await
            .ok(),
        None => None,
    };

    Json(ApiResponse::success(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds().max(0) as u64,
        connections: stats.connections,
        organizations: stats.organizations,
        scheduler_running: state.scheduler.is_running(),
        organization_connections,
    }))
}

async fn create_work_order_handler(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<NewWorkOrder>,
) -> Result<(StatusCode, Json<ApiResponse<WorkOrder>>), ApiError> {
    let wo = state
        .work_orders
        .create(identity.organization_id, identity.user_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(wo))))
}

async fn update_work_order_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
    Json(body): Json<WorkOrderUpdate>,
) -> Result<Json<ApiResponse<WorkOrder>>, ApiError> {
    let wo = state
        .work_orders
        .update(identity.organization_id, id, body)
        .await?;
    Ok(Json(ApiResponse::success(wo)))
}

async fn update_inventory_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
    Json(body): Json<InventoryUpdate>,
) -> Result<Json<ApiResponse<InventoryPart>>, ApiError> {
    let part = state
        .inventory
        .update(identity.organization_id, id, body)
        .await?;
    Ok(Json(ApiResponse::success(part)))
}

#[derive(Debug, Deserialize)]
pub struct DeductRequest {
    pub quantity: i64,
}

async fn deduct_inventory_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
    Json(body): Json<DeductRequest>,
) -> Result<Json<ApiResponse<InventoryPart>>, ApiError> {
    let part = state
        .inventory
        .deduct(identity.organization_id, id, body.quantity)
        .await?;
    Ok(Json(ApiResponse::success(part)))
}

async fn list_inventory_handler(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ApiResponse<Vec<InventoryPart>>>, ApiError> {
    let parts = state.inventory.list(identity.organization_id).await?;
    Ok(Json(ApiResponse::success(parts)))
}

async fn create_inventory_handler(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<NewInventoryPart>,
) -> Result<(StatusCode, Json<ApiResponse<InventoryPart>>), ApiError> {
    let part = state.inventory.create(identity.organization_id, body).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(part))))
}

async fn delete_inventory_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.inventory.delete(identity.organization_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn low_stock_handler(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ApiResponse<Vec<InventoryPart>>>, ApiError> {
    let parts = state.inventory.low_stock(identity.organization_id).await?;
    Ok(Json(ApiResponse::success(parts)))
}

/// Run one scan pass now for the caller's organization, outside the regular cadence.
async fn run_scheduler_handler(
    State(state): State<AppState>,
    identity: Identity,
) -> Json<ApiResponse<ScanReport>> {
    info!(org_id = identity.organization_id, "manual maintenance scan requested");
    let report = state
        .scheduler
        .scanner()
        .run_once_for(identity.organization_id, Local::now().date_naive())
        .await;
    Json(ApiResponse::success(report))
}

async fn list_tasks_handler(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ApiResponse<Vec<MaintenanceTask>>>, ApiError> {
    let tasks = state
        .storage
        .list_maintenance_tasks(identity.organization_id)
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(ApiResponse::success(tasks)))
}

async fn get_task_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<MaintenanceTask>>, ApiError> {
    let task = state
        .storage
        .get_maintenance_task(id, identity.organization_id)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| ApiError::NotFound("maintenance task not found".to_string()))?;
    Ok(Json(ApiResponse::success(task)))
}

async fn list_plans_handler(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ApiResponse<Vec<MaintenancePlan>>>, ApiError> {
    let plans = state.plans.list(identity.organization_id).await?;
    Ok(Json(ApiResponse::success(plans)))
}

async fn create_plan_handler(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<PlanRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MaintenancePlan>>), ApiError> {
    let plan = state.plans.create(identity.organization_id, body).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(plan))))
}

async fn get_plan_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<MaintenancePlan>>, ApiError> {
    let plan = state.plans.get(identity.organization_id, id).await?;
    Ok(Json(ApiResponse::success(plan)))
}

async fn delete_plan_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.plans.delete(identity.organization_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
