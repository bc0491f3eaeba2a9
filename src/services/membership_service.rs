//! 分组/集群成员关系维护
//!
//! 所有成员变更都是幂等的批量操作：已建立的组合不重复计数，不存在的组合移除时忽略。
//! 变更之后为受影响订阅的 (订阅, 集群) 组合调度同步。

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::sync_queue::{SyncQueue, SyncTask};
use crate::auth::RequestContext;
use crate::authz::{Action, AuthzEngine, BulkTarget, ResourceType};
use crate::error::{AppError, Result};
use crate::models::{GroupRef, MembershipResult};
use crate::store::{MembershipPair, ModelStore};

/// 集群 id 允许的字符；不允许首尾空白与 shell 元字符
static CLUSTER_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:\-]*$").expect("valid cluster id regex"));

pub fn validate_cluster_ids(cluster_ids: &[String]) -> Result<()> {
    if cluster_ids.is_empty() {
        return Err(AppError::validation("No clusters were passed"));
    }
    if let Some(bad) = cluster_ids.iter().find(|id| !CLUSTER_ID_PATTERN.is_match(id)) {
        return Err(AppError::Validation(format!(
            "The cluster id {:?} contains illegal characters.",
            bad
        )));
    }
    Ok(())
}

fn require_clusters(cluster_ids: &[String]) -> Result<()> {
    if cluster_ids.is_empty() {
        return Err(AppError::validation("No clusters were passed"));
    }
    Ok(())
}

fn require_groups(group_uuids: &[String]) -> Result<()> {
    if group_uuids.is_empty() {
        return Err(AppError::validation("No group uuids were passed"));
    }
    Ok(())
}

fn dedup(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn targets(action: Action, group_uuids: &[String], cluster_ids: &[String]) -> Vec<BulkTarget> {
    group_uuids
        .iter()
        .map(|uuid| BulkTarget::by_id(action, ResourceType::Group, uuid))
        .chain(
            cluster_ids
                .iter()
                .map(|id| BulkTarget::by_id(action, ResourceType::Cluster, id)),
        )
        .collect()
}

pub struct MembershipService {
    store: Arc<dyn ModelStore>,
    authz: Arc<AuthzEngine>,
    sync_queue: Arc<SyncQueue>,
}

impl MembershipService {
    pub fn new(
        store: Arc<dyn ModelStore>,
        authz: Arc<AuthzEngine>,
        sync_queue: Arc<SyncQueue>,
    ) -> Self {
        Self {
            store,
            authz,
            sync_queue,
        }
    }

    async fn group_refs(&self, org_id: &str, group_uuids: &[String]) -> Result<Vec<GroupRef>> {
        Ok(self
            .store
            .find_groups(org_id, group_uuids)
            .await?
            .iter()
            .map(|g| g.to_ref())
            .collect())
    }

    /// assignClusterGroups：为每个尚未建立的 (分组, 集群) 组合建立成员关系
    pub async fn assign(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        group_uuids: &[String],
        cluster_ids: &[String],
    ) -> Result<MembershipResult> {
        require_clusters(cluster_ids)?;
        require_groups(group_uuids)?;
        let (group_uuids, cluster_ids) = (dedup(group_uuids), dedup(cluster_ids));

        self.authz
            .authorize_bulk(
                ctx,
                org_id,
                "assignClusterGroups",
                &targets(Action::Attach, &group_uuids, &cluster_ids),
            )
            .await?;

        let groups = self.group_refs(org_id, &group_uuids).await?;
        let added = self
            .store
            .add_group_memberships(org_id, &groups, &cluster_ids)
            .await?;

        self.after_change(ctx, org_id, "assignClusterGroups", &added)
            .await
    }

    /// unassignClusterGroups：移除成员关系，不存在的组合忽略
    pub async fn unassign(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        group_uuids: &[String],
        cluster_ids: &[String],
    ) -> Result<MembershipResult> {
        require_clusters(cluster_ids)?;
        require_groups(group_uuids)?;
        let (group_uuids, cluster_ids) = (dedup(group_uuids), dedup(cluster_ids));

        self.authz
            .authorize_bulk(
                ctx,
                org_id,
                "unassignClusterGroups",
                &targets(Action::Detach, &group_uuids, &cluster_ids),
            )
            .await?;

        let removed = self
            .store
            .remove_group_memberships(org_id, &group_uuids, &cluster_ids)
            .await?;

        self.after_change(ctx, org_id, "unassignClusterGroups", &removed)
            .await
    }

    /// editClusterGroups：将集群的分组整体替换为给定集合（可为空）
    pub async fn replace(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        cluster_id: &str,
        group_uuids: &[String],
    ) -> Result<MembershipResult> {
        let group_uuids = dedup(group_uuids);
        let cluster_ids = [cluster_id.to_string()];

        self.authz
            .authorize_bulk(
                ctx,
                org_id,
                "editClusterGroups",
                &targets(Action::Attach, &group_uuids, &cluster_ids),
            )
            .await?;

        let groups = self.group_refs(org_id, &group_uuids).await?;
        let diff = self
            .store
            .set_cluster_groups(org_id, cluster_id, &groups)
            .await?;

        let changed: Vec<MembershipPair> = diff.added.into_iter().chain(diff.removed).collect();
        self.after_change(ctx, org_id, "editClusterGroups", &changed)
            .await
    }

    /// groupClusters：单个分组对多个集群（旧接口）
    pub async fn group_clusters(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        group_uuid: &str,
        cluster_ids: &[String],
    ) -> Result<MembershipResult> {
        validate_cluster_ids(cluster_ids)?;
        let cluster_ids = dedup(cluster_ids);
        let group_uuids = [group_uuid.to_string()];

        self.authz
            .authorize_bulk(
                ctx,
                org_id,
                "groupClusters",
                &targets(Action::Attach, &group_uuids, &cluster_ids),
            )
            .await?;

        let groups = self.group_refs(org_id, &group_uuids).await?;
        let added = self
            .store
            .add_group_memberships(org_id, &groups, &cluster_ids)
            .await?;

        self.after_change(ctx, org_id, "groupClusters", &added).await
    }

    /// unGroupClusters：从单个分组移除多个集群（旧接口）
    pub async fn ungroup_clusters(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        group_uuid: &str,
        cluster_ids: &[String],
    ) -> Result<MembershipResult> {
        validate_cluster_ids(cluster_ids)?;
        let cluster_ids = dedup(cluster_ids);
        let group_uuids = [group_uuid.to_string()];

        self.authz
            .authorize_bulk(
                ctx,
                org_id,
                "unGroupClusters",
                &targets(Action::Detach, &group_uuids, &cluster_ids),
            )
            .await?;

        let removed = self
            .store
            .remove_group_memberships(org_id, &group_uuids, &cluster_ids)
            .await?;

        self.after_change(ctx, org_id, "unGroupClusters", &removed)
            .await
    }

    async fn after_change(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        operation: &str,
        changed: &[MembershipPair],
    ) -> Result<MembershipResult> {
        let scheduled = self.schedule_resync(ctx, org_id, changed).await?;

        tracing::info!(
            parent: &ctx.span,
            operation = %operation,
            modified = changed.len(),
            sync_tasks = scheduled,
            "Group membership updated"
        );

        Ok(MembershipResult {
            modified: changed.len() as u64,
        })
    }

    /// 为可达集合发生变化的订阅调度同步，返回调度的任务数
    async fn schedule_resync(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        changed: &[MembershipPair],
    ) -> Result<usize> {
        if changed.is_empty() {
            return Ok(0);
        }

        let group_uuids = dedup(
            &changed
                .iter()
                .map(|p| p.group_uuid.clone())
                .collect::<Vec<_>>(),
        );
        let groups = self.store.find_groups(org_id, &group_uuids).await?;
        let group_names: Vec<String> = groups.iter().map(|g| g.name.clone()).collect();
        let subscriptions = self
            .store
            .subscriptions_for_groups(org_id, &group_names)
            .await?;

        let mut scheduled = 0;
        for subscription in &subscriptions {
            let reached: HashSet<&str> = changed
                .iter()
                .filter(|pair| {
                    groups
                        .iter()
                        .any(|g| g.uuid == pair.group_uuid && subscription.references_group(&g.name))
                })
                .map(|pair| pair.cluster_id.as_str())
                .collect();

            for cluster_id in reached {
                self.sync_queue.schedule(SyncTask {
                    subscription_uuid: subscription.uuid.clone(),
                    cluster_id: cluster_id.to_string(),
                    org_id: org_id.to_string(),
                    actor_id: ctx.identity.id.clone(),
                    owner_id: subscription.owner.clone(),
                });
                scheduled += 1;
            }
        }
        Ok(scheduled)
    }
}
