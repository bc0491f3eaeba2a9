//! 分组与成员关系的 HTTP 处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    auth::RequestContext,
    authz::{PageRequest, ResourceType},
    error::AppError,
    handlers::ResourceParams,
    middleware::AppState,
    models::{AddGroupRequest, ClusterGroupsRequest, GroupClustersRequest},
};

// ==================== Groups ====================

/// 列出分组
pub async fn list_groups(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
    Query(page): Query<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let groups = state.groups.groups(&ctx, &org_id, &page).await?;

    Ok(Json(json!({
        "groups": groups,
        "count": groups.len()
    })))
}

/// 创建分组
pub async fn add_group(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
    Json(req): Json<AddGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let group = state.groups.add_group(&ctx, &org_id, req).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// 按 uuid 或名称查询分组
pub async fn get_group(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, _)): Path<(String, String)>,
    params: ResourceParams,
) -> Result<impl IntoResponse, AppError> {
    let attributes = params.attributes(ResourceType::Group);
    let group = state.groups.group(&ctx, &org_id, &attributes).await?;
    Ok(Json(json!({ "group": group })))
}

pub async fn remove_group(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, uuid)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    state.groups.remove_group(&ctx, &org_id, &uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_group_by_name(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    state
        .groups
        .remove_group_by_name(&ctx, &org_id, &name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Membership ====================

/// 批量分配分组
pub async fn assign_cluster_groups(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
    Json(req): Json<ClusterGroupsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .membership
        .assign(&ctx, &org_id, &req.group_uuids, &req.cluster_ids)
        .await?;
    Ok(Json(result))
}

/// 批量解除分组
pub async fn unassign_cluster_groups(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
    Json(req): Json<ClusterGroupsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .membership
        .unassign(&ctx, &org_id, &req.group_uuids, &req.cluster_ids)
        .await?;
    Ok(Json(result))
}

pub async fn group_clusters(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, uuid)): Path<(String, String)>,
    Json(req): Json<GroupClustersRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .membership
        .group_clusters(&ctx, &org_id, &uuid, &req.cluster_ids)
        .await?;
    Ok(Json(result))
}

pub async fn ungroup_clusters(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, uuid)): Path<(String, String)>,
    Json(req): Json<GroupClustersRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .membership
        .ungroup_clusters(&ctx, &org_id, &uuid, &req.cluster_ids)
        .await?;
    Ok(Json(result))
}
