//! 订阅的 HTTP 处理器

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
    models::AddSubscriptionRequest,
};

/// 列出订阅（附带下发视图与同步计数）
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
    Query(page): Query<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subscriptions = state
        .subscriptions
        .subscriptions(&ctx, &org_id, &page)
        .await?;

    Ok(Json(json!({
        "subscriptions": subscriptions,
        "count": subscriptions.len()
    })))
}

/// 创建订阅
pub async fn add_subscription(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
    Json(req): Json<AddSubscriptionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = state
        .subscriptions
        .add_subscription(&ctx, &org_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// 按 uuid 或名称查询订阅
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, _)): Path<(String, String)>,
    params: ResourceParams,
) -> Result<impl IntoResponse, AppError> {
    let attributes = params.attributes(ResourceType::Subscription);
    let subscription = state
        .subscriptions
        .subscription(&ctx, &org_id, &attributes)
        .await?;
    Ok(Json(json!({ "subscription": subscription })))
}

pub async fn remove_subscription(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, uuid)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    state
        .subscriptions
        .remove_subscription(&ctx, &org_id, &uuid)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
