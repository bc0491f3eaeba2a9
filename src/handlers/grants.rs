//! 细粒度授权条目管理（仅组织 ADMIN）

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{
    auth::RequestContext, authz::Grant, error::AppError, middleware::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddGrantRequest {
    pub identity_id: String,
    #[serde(flatten)]
    pub grant: Grant,
}

fn require_admin(ctx: &RequestContext, org_id: &str) -> Result<(), AppError> {
    if ctx.identity.is_admin() && ctx.org_id == org_id {
        return Ok(());
    }
    tracing::warn!(parent: &ctx.span, target_org = %org_id, "Grant management denied");
    Err(AppError::Forbidden(
        "You are not allowed to manage grants in this organization.".to_string(),
    ))
}

/// 添加授权条目
pub async fn add_grant(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(org_id): Path<String>,
    Json(req): Json<AddGrantRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&ctx, &org_id)?;
    if req.identity_id.trim().is_empty() {
        return Err(AppError::validation("identityId must not be empty"));
    }

    state.grants.grant(&org_id, &req.identity_id, req.grant);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "identityId": req.identity_id,
            "grants": state.grants.grants_for(&org_id, &req.identity_id)
        })),
    ))
}

pub async fn list_grants(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, identity_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&ctx, &org_id)?;
    Ok(Json(json!({
        "identityId": identity_id,
        "grants": state.grants.grants_for(&org_id, &identity_id)
    })))
}

/// 撤销身份的全部授权
pub async fn revoke_grants(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((org_id, identity_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&ctx, &org_id)?;
    let revoked = state.grants.revoke_all(&org_id, &identity_id);
    tracing::info!(parent: &ctx.span, identity_id = %identity_id, revoked, "Grants revoked");
    Ok(Json(json!({ "revoked": revoked })))
}
