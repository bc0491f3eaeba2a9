//! 分组服务

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::RequestContext;
use crate::authz::{Action, Attributes, AuthzEngine, PageRequest, ResourceType};
use crate::error::{AppError, Result};
use crate::models::{AddGroupRequest, Group, GroupDetail};
use crate::store::ModelStore;

pub struct GroupService {
    store: Arc<dyn ModelStore>,
    authz: Arc<AuthzEngine>,
}

impl GroupService {
    pub fn new(store: Arc<dyn ModelStore>, authz: Arc<AuthzEngine>) -> Self {
        Self { store, authz }
    }

    /// 创建分组，名称在组织内唯一
    pub async fn add_group(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        req: AddGroupRequest,
    ) -> Result<Group> {
        req.validate()?;
        self.authz
            .authorize(ctx, org_id, Action::Create, ResourceType::Group, &Attributes::new())
            .await?;

        let group = self
            .store
            .create_group(Group {
                uuid: Uuid::new_v4().to_string(),
                org_id: org_id.to_string(),
                name: req.name,
                owner: ctx.identity.id.clone(),
                created: Utc::now(),
            })
            .await?;

        tracing::info!(parent: &ctx.span, group = %group.uuid, name = %group.name, "Group created");
        Ok(group)
    }

    pub async fn remove_group(&self, ctx: &RequestContext, org_id: &str, uuid: &str) -> Result<()> {
        self.authz
            .authorize(
                ctx,
                org_id,
                Action::Delete,
                ResourceType::Group,
                &Attributes::by_id(ResourceType::Group, uuid),
            )
            .await?;

        let group = self
            .store
            .find_group(org_id, uuid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("The group {} was not found.", uuid)))?;
        self.delete(ctx, group).await
    }

    pub async fn remove_group_by_name(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        name: &str,
    ) -> Result<()> {
        self.authz
            .authorize(
                ctx,
                org_id,
                Action::Delete,
                ResourceType::Group,
                &Attributes::by_name(ResourceType::Group, name),
            )
            .await?;

        let group = self
            .store
            .find_group_by_name(org_id, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("The group {} was not found.", name)))?;
        self.delete(ctx, group).await
    }

    async fn delete(&self, ctx: &RequestContext, group: Group) -> Result<()> {
        // 被订阅引用的分组不允许删除
        let referencing = self
            .store
            .subscriptions_for_groups(&group.org_id, std::slice::from_ref(&group.name))
            .await?;
        if !referencing.is_empty() {
            return Err(AppError::Validation(format!(
                "{} subscriptions depend on the group {}. Remove them before deleting the group.",
                referencing.len(),
                group.name
            )));
        }

        self.store.delete_group(&group.org_id, &group.uuid).await?;
        tracing::info!(parent: &ctx.span, group = %group.uuid, name = %group.name, "Group removed");
        Ok(())
    }

    /// 列出调用方可读的分组
    pub async fn groups(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        page: &PageRequest,
    ) -> Result<Vec<Group>> {
        let candidates = self.store.list_groups(org_id).await?;
        let allowed = self
            .authz
            .filter_authorized(&ctx.identity, org_id, Action::Read, candidates)
            .await?;
        Ok(self.authz.paginate(allowed, page))
    }

    /// 按 uuid 或名称查询；不存在时返回 None
    pub async fn group(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        attributes: &Attributes,
    ) -> Result<Option<GroupDetail>> {
        let rt = ResourceType::Group;
        if attributes.identifier(rt).is_none() {
            return Err(AppError::validation("A group uuid or name is required"));
        }
        if !self
            .authz
            .authorize_lookup(ctx, org_id, Action::Read, rt, attributes)
            .await?
        {
            return Ok(None);
        }
        let group = match attributes.id(rt) {
            Some(uuid) => self.store.find_group(org_id, uuid).await?,
            None => match attributes.name(rt) {
                Some(name) => self.store.find_group_by_name(org_id, name).await?,
                None => None,
            },
        };
        match group {
            Some(group) => Ok(Some(self.group_detail(group).await?)),
            None => Ok(None),
        }
    }

    /// 分组详情：成员集群与引用它的订阅
    pub async fn group_detail(&self, group: Group) -> Result<GroupDetail> {
        let clusters = self
            .store
            .clusters_in_groups(&group.org_id, std::slice::from_ref(&group.uuid))
            .await?;
        let subscriptions = self
            .store
            .subscriptions_for_groups(&group.org_id, std::slice::from_ref(&group.name))
            .await?;

        let cluster_json: Vec<serde_json::Value> = clusters
            .iter()
            .map(|c| {
                serde_json::json!({
                    "clusterId": c.cluster_id,
                    "name": c.name,
                    "regState": c.reg_state,
                })
            })
            .collect();
        let subscription_json: Vec<serde_json::Value> = subscriptions
            .iter()
            .map(|s| {
                serde_json::json!({
                    "uuid": s.uuid,
                    "name": s.name,
                    "channelUuid": s.channel_uuid,
                    "versionUuid": s.version_uuid,
                })
            })
            .collect();

        Ok(GroupDetail {
            uuid: group.uuid,
            org_id: group.org_id,
            name: group.name,
            owner: group.owner,
            created: group.created,
            cluster_count: clusters.len(),
            subscription_count: subscriptions.len(),
            subscriptions: serde_json::Value::Array(subscription_json),
            clusters: serde_json::Value::Array(cluster_json),
        })
    }
}
