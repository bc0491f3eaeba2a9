//! HTTP 处理器模块

pub mod channels;
pub mod clusters;
pub mod grants;
pub mod groups;
pub mod health;
pub mod subscriptions;

use std::collections::HashMap;

use axum::extract::{FromRequestParts, Query, RawPathParams};

use crate::authz::{self, Attributes, ResourceType};
use crate::error::AppError;

/// 单个资源请求的路径参数与查询参数
#[derive(Debug, Clone, Default)]
pub struct ResourceParams {
    path: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl ResourceParams {
    /// 推导授权属性；路径参数能确定资源时忽略查询参数
    pub fn attributes(&self, resource_type: ResourceType) -> Attributes {
        let from_path = authz::extract(resource_type, &borrowed(&self.path));
        if !from_path.is_empty() {
            return from_path;
        }
        authz::extract(resource_type, &borrowed(&self.query))
    }
}

fn borrowed(params: &[(String, String)]) -> Vec<(&str, &str)> {
    params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

impl<S> FromRequestParts<S> for ResourceParams
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let path = RawPathParams::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let Query(query) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        Ok(Self {
            path,
            query: query.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(path: &[(&str, &str)], query: &[(&str, &str)]) -> ResourceParams {
        let owned = |pairs: &[(&str, &str)]| -> Vec<(String, String)> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        ResourceParams {
            path: owned(path),
            query: owned(query),
        }
    }

    #[test]
    fn test_path_params_identify_resource() {
        let attrs = params(&[("org_id", "org-1"), ("uuid", "ch-1")], &[("name", "other")])
            .attributes(ResourceType::Channel);
        assert_eq!(attrs.id(ResourceType::Channel), Some("ch-1"));
        assert!(attrs.name(ResourceType::Channel).is_none());
    }

    #[test]
    fn test_query_params_used_when_path_is_silent() {
        let attrs = params(&[("org_id", "org-1")], &[("clusterName", "edge-1")])
            .attributes(ResourceType::Cluster);
        assert_eq!(attrs.name(ResourceType::Cluster), Some("edge-1"));
    }

    #[test]
    fn test_no_params_is_collection_scope() {
        assert!(params(&[("org_id", "org-1")], &[])
            .attributes(ResourceType::Group)
            .is_empty());
    }
}
