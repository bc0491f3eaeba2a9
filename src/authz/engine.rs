//! 授权引擎
//!
//! 租户隔离与属性一致性检查在引擎内完成，最终决定交给策略后端。
//! 集合接口逐项过滤而不报错，分页在过滤之后进行。

use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;

use super::{Action, Attributes, PolicyBackend, ResourceType};
use crate::auth::RequestContext;
use crate::error::{AppError, Result};
use crate::models::{Channel, Cluster, Group, Identity, Subscription};
use crate::store::ModelStore;

/// 集合过滤时并发评估的候选数
const FILTER_CONCURRENCY: usize = 16;

/// 可授权的资源
pub trait AuthzResource: Send {
    const RESOURCE_TYPE: ResourceType;

    fn org_id(&self) -> &str;
    fn resource_id(&self) -> &str;
    fn resource_name(&self) -> &str;

    fn attributes(&self) -> Attributes {
        Attributes::for_resource(Self::RESOURCE_TYPE, self.resource_id(), self.resource_name())
    }
}

impl AuthzResource for Channel {
    const RESOURCE_TYPE: ResourceType = ResourceType::Channel;
    fn org_id(&self) -> &str {
        &self.org_id
    }
    fn resource_id(&self) -> &str {
        &self.uuid
    }
    fn resource_name(&self) -> &str {
        &self.name
    }
}

impl AuthzResource for Cluster {
    const RESOURCE_TYPE: ResourceType = ResourceType::Cluster;
    fn org_id(&self) -> &str {
        &self.org_id
    }
    fn resource_id(&self) -> &str {
        &self.cluster_id
    }
    fn resource_name(&self) -> &str {
        &self.name
    }
}

impl AuthzResource for Group {
    const RESOURCE_TYPE: ResourceType = ResourceType::Group;
    fn org_id(&self) -> &str {
        &self.org_id
    }
    fn resource_id(&self) -> &str {
        &self.uuid
    }
    fn resource_name(&self) -> &str {
        &self.name
    }
}

impl AuthzResource for Subscription {
    const RESOURCE_TYPE: ResourceType = ResourceType::Subscription;
    fn org_id(&self) -> &str {
        &self.org_id
    }
    fn resource_id(&self) -> &str {
        &self.uuid
    }
    fn resource_name(&self) -> &str {
        &self.name
    }
}

/// 授权结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// 身份已知，权限不足
    Forbidden,
    /// 属性指向的资源在该组织中不存在
    NotFound,
}

/// 批量操作中的单个目标
#[derive(Debug, Clone)]
pub struct BulkTarget {
    pub action: Action,
    pub resource_type: ResourceType,
    pub attributes: Attributes,
}

impl BulkTarget {
    pub fn by_id(action: Action, resource_type: ResourceType, id: &str) -> Self {
        Self {
            action,
            resource_type,
            attributes: Attributes::by_id(resource_type, id),
        }
    }
}

/// 分页参数
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    /// 游标：返回该 id 之后的条目
    pub starting_after: Option<String>,
}

pub(crate) fn forbidden_message(
    action: Action,
    resource_type: ResourceType,
    attributes: &Attributes,
) -> String {
    match attributes.identifier(resource_type) {
        Some(identifier) => format!("You are not allowed to {} {}.", action, identifier),
        None => format!("You are not allowed to {} this {}.", action, resource_type),
    }
}

pub(crate) fn not_found_message(resource_type: ResourceType, attributes: &Attributes) -> String {
    match attributes.identifier(resource_type) {
        Some(identifier) => format!("The {} {} was not found.", resource_type, identifier),
        None => format!("The {} was not found.", resource_type),
    }
}

pub struct AuthzEngine {
    store: Arc<dyn ModelStore>,
    policy: Arc<dyn PolicyBackend>,
    page_size_max: usize,
}

impl AuthzEngine {
    pub fn new(
        store: Arc<dyn ModelStore>,
        policy: Arc<dyn PolicyBackend>,
        page_size_max: usize,
    ) -> Self {
        Self {
            store,
            policy,
            page_size_max,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// 按属性在组织内查找目标资源，返回其完整属性
    async fn resolve_target(
        &self,
        org_id: &str,
        resource_type: ResourceType,
        attributes: &Attributes,
    ) -> Result<Option<Attributes>> {
        let id = attributes.id(resource_type);
        let name = attributes.name(resource_type);

        let resolved = match resource_type {
            ResourceType::Channel => match (id, name) {
                (Some(id), _) => self.store.find_channel(org_id, id).await?,
                (None, Some(name)) => self.store.find_channel_by_name(org_id, name).await?,
                (None, None) => None,
            }
            .map(|c| c.attributes()),
            ResourceType::Cluster => match (id, name) {
                (Some(id), _) => self.store.find_cluster(org_id, id).await?,
                (None, Some(name)) => self.store.find_cluster_by_name(org_id, name).await?,
                (None, None) => None,
            }
            .map(|c| c.attributes()),
            ResourceType::Group => match (id, name) {
                (Some(id), _) => self.store.find_group(org_id, id).await?,
                (None, Some(name)) => self.store.find_group_by_name(org_id, name).await?,
                (None, None) => None,
            }
            .map(|g| g.attributes()),
            ResourceType::Subscription => match (id, name) {
                (Some(id), _) => self.store.find_subscription(org_id, id).await?,
                (None, Some(name)) => self.store.find_subscription_by_name(org_id, name).await?,
                (None, None) => None,
            }
            .map(|s| s.attributes()),
        };

        Ok(resolved)
    }

    /// 单资源授权判定
    pub async fn decide(
        &self,
        identity: &Identity,
        org_id: &str,
        action: Action,
        resource_type: ResourceType,
        attributes: &Attributes,
    ) -> Result<Decision> {
        // 租户隔离先于策略后端
        if identity.org_id != org_id {
            return Ok(Decision::Forbidden);
        }

        let attributes = if attributes.is_empty() {
            attributes.clone()
        } else {
            match self.resolve_target(org_id, resource_type, attributes).await? {
                Some(resolved) => resolved,
                None => return Ok(Decision::NotFound),
            }
        };

        let allowed = self
            .policy
            .check(identity, org_id, action, resource_type, &attributes)
            .await?;

        Ok(if allowed {
            Decision::Allow
        } else {
            Decision::Forbidden
        })
    }

    pub async fn is_authorized(
        &self,
        identity: &Identity,
        org_id: &str,
        action: Action,
        resource_type: ResourceType,
        attributes: &Attributes,
    ) -> Result<bool> {
        Ok(self
            .decide(identity, org_id, action, resource_type, attributes)
            .await?
            == Decision::Allow)
    }

    /// 授权检查，拒绝时返回错误
    ///
    /// 目标不存在时返回 NotFound，权限不足时返回 Forbidden。
    pub async fn authorize(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        action: Action,
        resource_type: ResourceType,
        attributes: &Attributes,
    ) -> Result<()> {
        match self
            .decide(&ctx.identity, org_id, action, resource_type, attributes)
            .await?
        {
            Decision::Allow => Ok(()),
            Decision::NotFound => Err(AppError::NotFound(not_found_message(
                resource_type,
                attributes,
            ))),
            Decision::Forbidden => {
                tracing::warn!(
                    parent: &ctx.span,
                    action = %action,
                    resource_type = %resource_type,
                    target = attributes.identifier(resource_type).unwrap_or("*"),
                    policy = self.policy.name(),
                    "Permission denied"
                );
                Err(AppError::Forbidden(forbidden_message(
                    action,
                    resource_type,
                    attributes,
                )))
            }
        }
    }

    /// 单对象查询的授权
    ///
    /// 目标不存在返回 `Ok(false)`（调用方返回空结果，不报错），权限不足返回 Forbidden。
    pub async fn authorize_lookup(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        action: Action,
        resource_type: ResourceType,
        attributes: &Attributes,
    ) -> Result<bool> {
        match self
            .authorize(ctx, org_id, action, resource_type, attributes)
            .await
        {
            Ok(()) => Ok(true),
            Err(AppError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 集合过滤：静默剔除无权访问的条目
    pub async fn filter_authorized<T: AuthzResource>(
        &self,
        identity: &Identity,
        org_id: &str,
        action: Action,
        candidates: Vec<T>,
    ) -> Result<Vec<T>> {
        if identity.org_id != org_id {
            return Ok(Vec::new());
        }

        let policy = self.policy.clone();
        let mut checks = futures::stream::iter(
            candidates.into_iter().filter(|c| c.org_id() == org_id),
        )
        .map(|candidate| {
            let policy = policy.clone();
            async move {
                let attributes = candidate.attributes();
                let allowed = policy
                    .check(identity, org_id, action, T::RESOURCE_TYPE, &attributes)
                    .await;
                (candidate, allowed)
            }
        })
        .buffered(FILTER_CONCURRENCY);

        let mut allowed = Vec::new();
        while let Some((candidate, verdict)) = checks.next().await {
            if verdict? {
                allowed.push(candidate);
            }
        }
        Ok(allowed)
    }

    /// 过滤后分页
    ///
    /// 游标不在过滤后的结果中（已删除或无权访问）时返回空页，不从头开始。
    pub fn paginate<T: AuthzResource>(&self, items: Vec<T>, page: &PageRequest) -> Vec<T> {
        let after = match &page.starting_after {
            Some(cursor) => match items.iter().position(|item| item.resource_id() == cursor) {
                Some(pos) => pos + 1,
                None => return Vec::new(),
            },
            None => 0,
        };
        let limit = page
            .limit
            .unwrap_or(self.page_size_max)
            .min(self.page_size_max);

        items
            .into_iter()
            .skip(after + page.skip.unwrap_or(0))
            .take(limit)
            .collect()
    }

    /// 批量操作的两阶段授权
    ///
    /// 第一阶段检查租户与目标存在性，失败时返回不区分条目的 QueryError；
    /// 第二阶段逐项调用策略后端，失败时返回指明条目的 ForbiddenError。
    pub async fn authorize_bulk(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        operation: &str,
        targets: &[BulkTarget],
    ) -> Result<()> {
        if ctx.identity.org_id != org_id {
            tracing::warn!(
                parent: &ctx.span,
                operation = %operation,
                target_org = %org_id,
                "Bulk operation across organizations rejected"
            );
            return Err(AppError::query(operation, &ctx.req_id));
        }

        let mut resolved = Vec::with_capacity(targets.len());
        for target in targets {
            match self
                .resolve_target(org_id, target.resource_type, &target.attributes)
                .await?
            {
                Some(attributes) => resolved.push((target, attributes)),
                None => {
                    tracing::warn!(
                        parent: &ctx.span,
                        operation = %operation,
                        resource_type = %target.resource_type,
                        target = target.attributes.identifier(target.resource_type).unwrap_or("*"),
                        "Bulk operation references unknown resource"
                    );
                    return Err(AppError::query(operation, &ctx.req_id));
                }
            }
        }

        for (target, attributes) in resolved {
            let allowed = self
                .policy
                .check(
                    &ctx.identity,
                    org_id,
                    target.action,
                    target.resource_type,
                    &attributes,
                )
                .await?;
            if !allowed {
                tracing::warn!(
                    parent: &ctx.span,
                    operation = %operation,
                    action = %target.action,
                    resource_type = %target.resource_type,
                    target = attributes.identifier(target.resource_type).unwrap_or("*"),
                    "Permission denied"
                );
                return Err(AppError::Forbidden(forbidden_message(
                    target.action,
                    target.resource_type,
                    &attributes,
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{Grant, GrantPolicy, OrgMemberPolicy, ResourceSelector};
    use crate::models::{IdentityKind, OrgRole};
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn member(id: &str, org: &str) -> Identity {
        Identity {
            id: id.to_string(),
            org_id: org.to_string(),
            kind: IdentityKind::User,
            role: Some(OrgRole::Member),
            email: None,
        }
    }

    fn channel(uuid: &str, org: &str, name: &str) -> Channel {
        Channel {
            uuid: uuid.to_string(),
            org_id: org.to_string(),
            name: name.to_string(),
            owner: "owner".to_string(),
            versions: vec![],
            created: Utc::now(),
        }
    }

    async fn engine_with(policy: Arc<dyn PolicyBackend>) -> (AuthzEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.create_channel(channel("ch-a", "org-1", "alpha")).await.unwrap();
        store.create_channel(channel("ch-b", "org-1", "beta")).await.unwrap();
        (AuthzEngine::new(store.clone(), policy, 2), store)
    }

    #[tokio::test]
    async fn test_tenant_isolation_ignores_policy() {
        let (engine, _) = engine_with(Arc::new(OrgMemberPolicy)).await;
        let outsider = member("u9", "org-2");

        let decision = engine
            .decide(
                &outsider,
                "org-1",
                Action::Read,
                ResourceType::Channel,
                &Attributes::by_id(ResourceType::Channel, "ch-a"),
            )
            .await
            .unwrap();
        assert_eq!(decision, Decision::Forbidden);

        let filtered = engine
            .filter_authorized(&outsider, "org-1", Action::Read, vec![channel("ch-a", "org-1", "alpha")])
            .await
            .unwrap();
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_named_resource_is_not_found() {
        let (engine, _) = engine_with(Arc::new(OrgMemberPolicy)).await;
        let decision = engine
            .decide(
                &member("u1", "org-1"),
                "org-1",
                Action::Read,
                ResourceType::Channel,
                &Attributes::by_name(ResourceType::Channel, "missing"),
            )
            .await
            .unwrap();
        assert_eq!(decision, Decision::NotFound);
    }

    #[tokio::test]
    async fn test_filter_drops_denied_and_foreign() {
        let grants = Arc::new(GrantPolicy::new());
        grants.grant(
            "org-1",
            "u1",
            Grant {
                actions: vec![Action::Read],
                resource_type: ResourceType::Channel,
                selector: ResourceSelector::Id("ch-a".to_string()),
            },
        );
        let (engine, _) = engine_with(grants).await;

        let filtered = engine
            .filter_authorized(
                &member("u1", "org-1"),
                "org-1",
                Action::Read,
                vec![
                    channel("ch-a", "org-1", "alpha"),
                    channel("ch-b", "org-1", "beta"),
                    channel("ch-x", "org-2", "alpha"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].uuid, "ch-a");

        let empty: Vec<Channel> = engine
            .filter_authorized(&member("u1", "org-1"), "org-1", Action::Read, vec![])
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_paginate_after_filter() {
        let (engine, _) = engine_with(Arc::new(OrgMemberPolicy)).await;
        let items = vec![
            channel("a", "org-1", "a"),
            channel("b", "org-1", "b"),
            channel("c", "org-1", "c"),
            channel("d", "org-1", "d"),
        ];

        // page_size_max = 2 caps the limit
        let page = engine.paginate(
            items.clone(),
            &PageRequest {
                limit: Some(10),
                ..Default::default()
            },
        );
        assert_eq!(page.len(), 2);

        let page = engine.paginate(
            items.clone(),
            &PageRequest {
                starting_after: Some("b".to_string()),
                ..Default::default()
            },
        );
        let ids: Vec<&str> = page.iter().map(|c| c.uuid.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);

        // 未知游标得到空页
        let page = engine.paginate(
            items.clone(),
            &PageRequest {
                starting_after: Some("gone".to_string()),
                ..Default::default()
            },
        );
        assert!(page.is_empty());

        let page = engine.paginate(
            items,
            &PageRequest {
                skip: Some(3),
                ..Default::default()
            },
        );
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_messages() {
        let named = Attributes::by_name(ResourceType::Channel, "alpha");
        assert_eq!(
            forbidden_message(Action::Read, ResourceType::Channel, &named),
            "You are not allowed to read alpha."
        );
        assert_eq!(
            forbidden_message(Action::Create, ResourceType::Group, &Attributes::new()),
            "You are not allowed to create this group."
        );
        assert!(not_found_message(ResourceType::Channel, &named).contains("not found"));
    }
}
