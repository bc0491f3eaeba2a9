//! 调用方身份解析
//! Bearer 令牌（交互式调用方）或 org key 请求头（代理/集群调用方）

use std::sync::Arc;

use axum::http::HeaderMap;

use super::jwt::JwtService;
use super::middleware::extract_token;
use super::org_key::OrgKeyGenerator;
use crate::error::{AppError, Result};
use crate::models::Identity;
use crate::store::ModelStore;

pub struct IdentityResolver {
    store: Arc<dyn ModelStore>,
    jwt_service: Arc<JwtService>,
    org_key_header: String,
}

impl IdentityResolver {
    pub fn new(
        store: Arc<dyn ModelStore>,
        jwt_service: Arc<JwtService>,
        org_key_header: impl Into<String>,
    ) -> Self {
        Self {
            store,
            jwt_service,
            org_key_header: org_key_header.into().to_lowercase(),
        }
    }

    /// 解析请求的调用方身份
    ///
    /// 携带 Bearer 令牌时只按令牌解析，令牌无效不会回退到 org key。
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Identity> {
        if let Some(token) = extract_token(headers) {
            return self.resolve_token(&token).await;
        }

        if let Some(key) = headers
            .get(self.org_key_header.as_str())
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
        {
            return self.resolve_org_key(key).await;
        }

        Err(AppError::authentication("No credentials were provided"))
    }

    async fn resolve_token(&self, token: &str) -> Result<Identity> {
        let claims = self.jwt_service.validate_token(token)?;

        let user = self
            .store
            .find_user(&claims.sub)
            .await?
            .ok_or_else(|| AppError::authentication("Unknown user"))?;

        // 令牌签发后用户可能已换组织
        if user.org_id != claims.org_id {
            tracing::warn!(
                user_id = %user.id,
                token_org = %claims.org_id,
                user_org = %user.org_id,
                "Token organization does not match user"
            );
            return Err(AppError::authentication("Invalid or expired token"));
        }

        Ok(Identity::from_user(&user))
    }

    async fn resolve_org_key(&self, key: &str) -> Result<Identity> {
        let key_hash = OrgKeyGenerator::hash(key);

        match self.store.find_org_by_key_hash(&key_hash).await? {
            Some(org) => {
                tracing::debug!(org_id = %org.id, "Resolved org key caller");
                Ok(Identity::for_org_key(&org.id))
            }
            None => Err(AppError::authentication("Invalid org key")),
        }
    }
}
