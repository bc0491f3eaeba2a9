//! 策略后端
//!
//! 授权引擎负责租户隔离与属性一致性检查，最终的允许/拒绝交给策略后端。
//! 后端在启动时按配置从注册表中选定，不在运行时动态加载。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::{Action, Attributes, ResourceType};
use crate::config::AuthzConfig;
use crate::error::{AppError, Result};
use crate::models::{Identity, IdentityKind};

#[async_trait]
pub trait PolicyBackend: Send + Sync {
    /// 属性为空表示集合范围的检查
    async fn check(
        &self,
        identity: &Identity,
        org_id: &str,
        action: Action,
        resource_type: ResourceType,
        attributes: &Attributes,
    ) -> Result<bool>;

    fn name(&self) -> &'static str;
}

/// 粗粒度回退策略：同组织成员即可操作
#[derive(Debug, Default)]
pub struct OrgMemberPolicy;

#[async_trait]
impl PolicyBackend for OrgMemberPolicy {
    async fn check(
        &self,
        identity: &Identity,
        org_id: &str,
        _action: Action,
        _resource_type: ResourceType,
        _attributes: &Attributes,
    ) -> Result<bool> {
        Ok(identity.org_id == org_id)
    }

    fn name(&self) -> &'static str {
        "org_member"
    }
}

/// 授权条目匹配的资源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ResourceSelector {
    /// 该类型的所有资源，也覆盖集合范围的检查
    Any,
    Id(String),
    /// 名称，支持末尾 `*` 前缀匹配
    Name(String),
}

impl ResourceSelector {
    fn matches(&self, resource_type: ResourceType, attributes: &Attributes) -> bool {
        match self {
            ResourceSelector::Any => true,
            ResourceSelector::Id(id) => attributes.id(resource_type) == Some(id.as_str()),
            ResourceSelector::Name(pattern) => attributes
                .name(resource_type)
                .is_some_and(|name| match pattern.strip_suffix('*') {
                    Some(prefix) => name.starts_with(prefix),
                    None => name == pattern,
                }),
        }
    }
}

/// 单条授权
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// 空列表表示所有动作
    #[serde(default)]
    pub actions: Vec<Action>,
    pub resource_type: ResourceType,
    pub selector: ResourceSelector,
}

impl Grant {
    fn allows(&self, action: Action, resource_type: ResourceType, attributes: &Attributes) -> bool {
        if self.resource_type != resource_type {
            return false;
        }
        if !self.actions.is_empty() && !self.actions.contains(&action) {
            return false;
        }
        if attributes.is_empty() {
            return self.selector == ResourceSelector::Any;
        }
        self.selector.matches(resource_type, attributes)
    }
}

/// 进程内细粒度策略：按 (组织, 身份) 保存授权条目
///
/// 组织 ADMIN 拥有全部权限；org key 调用方（集群代理）拥有集群上的全部权限。
#[derive(Debug, Default)]
pub struct GrantPolicy {
    grants: DashMap<(String, String), Vec<Grant>>,
}

impl GrantPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, org_id: &str, identity_id: &str, grant: Grant) {
        tracing::info!(
            org_id = %org_id,
            identity_id = %identity_id,
            resource_type = %grant.resource_type,
            "Grant added"
        );
        self.grants
            .entry((org_id.to_string(), identity_id.to_string()))
            .or_default()
            .push(grant);
    }

    /// 撤销身份的全部授权，返回撤销条数
    pub fn revoke_all(&self, org_id: &str, identity_id: &str) -> usize {
        self.grants
            .remove(&(org_id.to_string(), identity_id.to_string()))
            .map(|(_, grants)| grants.len())
            .unwrap_or(0)
    }

    pub fn grants_for(&self, org_id: &str, identity_id: &str) -> Vec<Grant> {
        self.grants
            .get(&(org_id.to_string(), identity_id.to_string()))
            .map(|g| g.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PolicyBackend for GrantPolicy {
    async fn check(
        &self,
        identity: &Identity,
        org_id: &str,
        action: Action,
        resource_type: ResourceType,
        attributes: &Attributes,
    ) -> Result<bool> {
        if identity.org_id != org_id {
            return Ok(false);
        }
        if identity.is_admin() {
            return Ok(true);
        }
        if identity.kind == IdentityKind::OrgKey && resource_type == ResourceType::Cluster {
            return Ok(true);
        }

        Ok(self
            .grants
            .get(&(org_id.to_string(), identity.id.clone()))
            .is_some_and(|grants| {
                grants
                    .iter()
                    .any(|g| g.allows(action, resource_type, attributes))
            }))
    }

    fn name(&self) -> &'static str {
        "grants"
    }
}

/// 可选的策略后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyBackendKind {
    OrgMember,
    Grants,
}

impl PolicyBackendKind {
    pub fn from_config(config: &AuthzConfig) -> Self {
        if config.fga_enabled {
            PolicyBackendKind::Grants
        } else {
            PolicyBackendKind::OrgMember
        }
    }
}

/// 策略后端注册表
pub struct PolicyRegistry {
    backends: HashMap<PolicyBackendKind, Arc<dyn PolicyBackend>>,
    grants: Arc<GrantPolicy>,
}

impl PolicyRegistry {
    /// 注册内置后端
    pub fn builtin() -> Self {
        let grants = Arc::new(GrantPolicy::new());
        let mut backends: HashMap<PolicyBackendKind, Arc<dyn PolicyBackend>> = HashMap::new();
        backends.insert(PolicyBackendKind::OrgMember, Arc::new(OrgMemberPolicy));
        backends.insert(PolicyBackendKind::Grants, grants.clone());
        Self { backends, grants }
    }

    pub fn select(&self, kind: PolicyBackendKind) -> Result<Arc<dyn PolicyBackend>> {
        self.backends.get(&kind).cloned().ok_or_else(|| {
            AppError::Config(format!("policy backend {:?} is not registered", kind))
        })
    }

    /// 授权管理接口使用的进程内授权表
    pub fn grants(&self) -> Arc<GrantPolicy> {
        self.grants.clone()
    }
}
