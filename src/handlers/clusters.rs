//! 集群的 HTTP 处理器

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
    models::{EditClusterGroupsRequest, RegisterClusterRequest, UpdateRegStateRequest},
};

/// 列出集群（附带活跃度分类）
pub async fn list_clusters(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
    Query(page): Query<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let clusters = state.clusters.clusters(&ctx, &org_id, &page).await?;

    Ok(Json(json!({
        "clusters": clusters,
        "count": clusters.len()
    })))
}

/// 注册集群
pub async fn register_cluster(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
    Json(req): Json<RegisterClusterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cluster = state.clusters.register_cluster(&ctx, &org_id, req).await?;
    Ok((StatusCode::CREATED, Json(cluster)))
}

pub async fn list_inactive_clusters(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let clusters = state.clusters.inactive_clusters(&ctx, &org_id).await?;
    Ok(Json(json!({
        "clusters": clusters,
        "count": clusters.len()
    })))
}

pub async fn list_zombie_clusters(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let clusters = state.clusters.zombie_clusters(&ctx, &org_id).await?;
    Ok(Json(json!({
        "clusters": clusters,
        "count": clusters.len()
    })))
}

/// 按集群 id 或名称查询
pub async fn get_cluster(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, _)): Path<(String, String)>,
    params: ResourceParams,
) -> Result<impl IntoResponse, AppError> {
    let attributes = params.attributes(ResourceType::Cluster);
    let cluster = state.clusters.cluster(&ctx, &org_id, &attributes).await?;
    Ok(Json(json!({ "cluster": cluster })))
}

pub async fn delete_cluster(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, cluster_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    state
        .clusters
        .delete_cluster(&ctx, &org_id, &cluster_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 更新注册状态
pub async fn update_reg_state(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, cluster_id)): Path<(String, String)>,
    Json(req): Json<UpdateRegStateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cluster = state
        .clusters
        .update_reg_state(&ctx, &org_id, &cluster_id, req.reg_state)
        .await?;
    Ok(Json(cluster))
}

/// 整体替换集群的分组
pub async fn edit_cluster_groups(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, cluster_id)): Path<(String, String)>,
    Json(req): Json<EditClusterGroupsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .membership
        .replace(&ctx, &org_id, &cluster_id, &req.group_uuids)
        .await?;
    Ok(Json(result))
}

/// 分组到达该集群的订阅
pub async fn list_cluster_subscriptions(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, _)): Path<(String, String)>,
    params: ResourceParams,
) -> Result<impl IntoResponse, AppError> {
    let attributes = params.attributes(ResourceType::Cluster);
    let subscriptions = state
        .subscriptions
        .subscriptions_by_cluster_id(&ctx, &org_id, &attributes)
        .await?;
    Ok(Json(json!({
        "subscriptions": subscriptions,
        "count": subscriptions.len()
    })))
}
