//! Workflow endpoint handlers.
//!
//! Create, update and delete act on behalf of the staff member named in
//! `X-Staff-Id`; update and delete are limited to the workflow's creator.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::models::workflow::{ListWorkflowsQuery, WorkflowRequest, WorkflowResponse};
use domain::models::WorkflowExecution;
use shared::pagination::{Page, PageRequest};

use super::PageQuery;
use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::StaffId;

/// POST /api/v1/shops/:shop_id/workflows
pub async fn create_workflow(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
    StaffId(staff_id): StaffId,
    Json(request): Json<WorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowResponse>), ApiError> {
    let workflow = state
        .services
        .workflows
        .create(shop_id, staff_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(workflow.into())))
}

/// GET /api/v1/shops/:shop_id/workflows?activeOnly=true
pub async fn list_workflows(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
    Query(query): Query<ListWorkflowsQuery>,
) -> Result<Json<Page<WorkflowResponse>>, ApiError> {
    let page = PageRequest::from_query(query.cursor.as_deref(), query.limit)?;
    let workflows = state
        .services
        .workflows
        .list(shop_id, query.active_only, page)
        .await?;
    Ok(Json(workflows.map(WorkflowResponse::from)))
}

/// GET /api/v1/shops/:shop_id/workflows/:workflow_id
pub async fn get_workflow(
    State(state): State<AppState>,
    Path((shop_id, workflow_id)): Path<(i64, i64)>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let workflow = state.services.workflows.get(shop_id, workflow_id).await?;
    Ok(Json(workflow.into()))
}

/// PUT /api/v1/shops/:shop_id/workflows/:workflow_id
pub async fn update_workflow(
    State(state): State<AppState>,
    Path((shop_id, workflow_id)): Path<(i64, i64)>,
    StaffId(staff_id): StaffId,
    Json(request): Json<WorkflowRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let workflow = state
        .services
        .workflows
        .update(shop_id, staff_id, workflow_id, request)
        .await?;
    Ok(Json(workflow.into()))
}

/// DELETE /api/v1/shops/:shop_id/workflows/:workflow_id
pub async fn delete_workflow(
    State(state): State<AppState>,
    Path((shop_id, workflow_id)): Path<(i64, i64)>,
    StaffId(staff_id): StaffId,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .workflows
        .delete(shop_id, staff_id, workflow_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/shops/:shop_id/workflows/:workflow_id/activate
pub async fn activate_workflow(
    State(state): State<AppState>,
    Path((shop_id, workflow_id)): Path<(i64, i64)>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let workflow = state
        .services
        .workflows
        .activate(shop_id, workflow_id)
        .await?;
    Ok(Json(workflow.into()))
}

/// POST /api/v1/shops/:shop_id/workflows/:workflow_id/deactivate
pub async fn deactivate_workflow(
    State(state): State<AppState>,
    Path((shop_id, workflow_id)): Path<(i64, i64)>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let workflow = state
        .services
        .workflows
        .deactivate(shop_id, workflow_id)
        .await?;
    Ok(Json(workflow.into()))
}

/// GET /api/v1/shops/:shop_id/workflows/:workflow_id/executions
pub async fn list_executions(
    State(state): State<AppState>,
    Path((shop_id, workflow_id)): Path<(i64, i64)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<WorkflowExecution>>, ApiError> {
    let page = query.page_request()?;
    let executions = state
        .services
        .workflows
        .list_executions(shop_id, workflow_id, page)
        .await?;
    Ok(Json(executions))
}

/// Run the workflow now, outside its schedule.
///
/// POST /api/v1/shops/:shop_id/workflows/:workflow_id/run
pub async fn run_workflow(
    State(state): State<AppState>,
    Path((shop_id, workflow_id)): Path<(i64, i64)>,
) -> Result<(StatusCode, Json<WorkflowExecution>), ApiError> {
    let execution = state.services.workflows.run(shop_id, workflow_id).await?;
    Ok((StatusCode::CREATED, Json(execution)))
}
