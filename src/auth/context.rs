//! 请求上下文
//! 每个已认证请求构造一次，显式传入各个服务

use axum::extract::FromRequestParts;

use crate::error::AppError;
use crate::models::Identity;

/// 请求上下文（附加到请求扩展）
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub req_id: String,
    /// 调用方身份
    pub identity: Identity,
    /// 调用方所属组织
    pub org_id: String,
    /// 审计日志使用的 span，已标注 req_id / org_id / identity_id
    pub span: tracing::Span,
}

impl RequestContext {
    pub fn new(req_id: impl Into<String>, identity: Identity) -> Self {
        let req_id = req_id.into();
        let span = tracing::info_span!(
            "request",
            req_id = %req_id,
            org_id = %identity.org_id,
            identity_id = %identity.id,
        );
        Self {
            req_id,
            org_id: identity.org_id.clone(),
            identity,
            span,
        }
    }
}

// 实现 FromRequestParts 以便在 handler 中直接提取 RequestContext
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| AppError::authentication("Request is not authenticated"))
    }
}
