//! 频道的 HTTP 处理器

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
    models::{AddChannelRequest, AddChannelVersionRequest},
};

/// 列出频道
pub async fn list_channels(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
    Query(page): Query<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let channels = state.channels.channels(&ctx, &org_id, &page).await?;

    Ok(Json(json!({
        "channels": channels,
        "count": channels.len()
    })))
}

/// 创建频道
pub async fn add_channel(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
    Json(req): Json<AddChannelRequest>,
) -> Result<impl IntoResponse, AppError> {
    let channel = state.channels.add_channel(&ctx, &org_id, req).await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

/// 按 uuid 或名称查询频道
pub async fn get_channel(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, _)): Path<(String, String)>,
    params: ResourceParams,
) -> Result<impl IntoResponse, AppError> {
    let attributes = params.attributes(ResourceType::Channel);
    let channel = state.channels.channel(&ctx, &org_id, &attributes).await?;
    Ok(Json(json!({ "channel": channel })))
}

/// 添加频道版本
pub async fn add_channel_version(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, uuid)): Path<(String, String)>,
    Json(req): Json<AddChannelVersionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let version = state
        .channels
        .add_channel_version(&ctx, &org_id, &uuid, req)
        .await?;
    Ok((StatusCode::CREATED, Json(version)))
}
