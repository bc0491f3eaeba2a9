//! 模型存储层
//! 组织、用户、集群、分组、频道、订阅的 CRUD 与批量成员变更原语

use async_trait::async_trait;
use thiserror::Error;

use crate::error::AppError;
use crate::models::{
    Channel, ChannelVersion, Cluster, Group, GroupRef, Organization, RegState, Subscription,
    SyncedIdentity, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unexpected(anyhow::Error::new(e))
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) => AppError::Validation(msg),
            StoreError::Unexpected(err) => {
                tracing::error!(error = ?err, "Model store failure");
                AppError::Store(err.to_string())
            }
        }
    }
}

/// 一条 (分组, 集群) 成员关系
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MembershipPair {
    pub group_uuid: String,
    pub cluster_id: String,
}

/// 整体替换成员关系后的差异
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub added: Vec<MembershipPair>,
    pub removed: Vec<MembershipPair>,
}

impl MembershipDiff {
    pub fn modified(&self) -> u64 {
        (self.added.len() + self.removed.len()) as u64
    }
}

#[async_trait]
pub trait ModelStore: Send + Sync {
    // ==================== Organizations / Users ====================
    async fn create_org(&self, org: Organization) -> StoreResult<Organization>;
    async fn find_org(&self, org_id: &str) -> StoreResult<Option<Organization>>;
    async fn find_org_by_key_hash(&self, key_hash: &str) -> StoreResult<Option<Organization>>;
    async fn create_user(&self, user: User) -> StoreResult<User>;
    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    // ==================== Clusters ====================
    async fn create_cluster(&self, cluster: Cluster) -> StoreResult<Cluster>;
    async fn find_cluster(&self, org_id: &str, cluster_id: &str) -> StoreResult<Option<Cluster>>;
    async fn find_cluster_by_name(&self, org_id: &str, name: &str)
        -> StoreResult<Option<Cluster>>;
    async fn list_clusters(&self, org_id: &str) -> StoreResult<Vec<Cluster>>;
    async fn clusters_in_groups(
        &self,
        org_id: &str,
        group_uuids: &[String],
    ) -> StoreResult<Vec<Cluster>>;
    async fn update_reg_state(
        &self,
        org_id: &str,
        cluster_id: &str,
        state: RegState,
    ) -> StoreResult<Cluster>;
    async fn delete_cluster(&self, org_id: &str, cluster_id: &str) -> StoreResult<bool>;

    // ==================== Membership ====================
    /// 为每个尚未建立的 (分组, 集群) 组合添加成员投影，返回实际新增的组合
    async fn add_group_memberships(
        &self,
        org_id: &str,
        groups: &[GroupRef],
        cluster_ids: &[String],
    ) -> StoreResult<Vec<MembershipPair>>;
    /// 移除成员投影，返回实际移除的组合
    async fn remove_group_memberships(
        &self,
        org_id: &str,
        group_uuids: &[String],
        cluster_ids: &[String],
    ) -> StoreResult<Vec<MembershipPair>>;
    /// 将集群的分组成员关系整体替换为给定集合
    async fn set_cluster_groups(
        &self,
        org_id: &str,
        cluster_id: &str,
        groups: &[GroupRef],
    ) -> StoreResult<MembershipDiff>;

    // ==================== Identity sync ====================
    async fn upsert_synced_identity(
        &self,
        org_id: &str,
        cluster_id: &str,
        record: SyncedIdentity,
    ) -> StoreResult<()>;
    /// 删除集群上某身份的同步记录，返回是否存在
    async fn remove_synced_identity(
        &self,
        org_id: &str,
        cluster_id: &str,
        identity_id: &str,
    ) -> StoreResult<bool>;

    // ==================== Groups ====================
    async fn create_group(&self, group: Group) -> StoreResult<Group>;
    async fn find_group(&self, org_id: &str, uuid: &str) -> StoreResult<Option<Group>>;
    async fn find_group_by_name(&self, org_id: &str, name: &str) -> StoreResult<Option<Group>>;
    async fn find_groups(&self, org_id: &str, uuids: &[String]) -> StoreResult<Vec<Group>>;
    async fn find_groups_by_name(&self, org_id: &str, names: &[String])
        -> StoreResult<Vec<Group>>;
    async fn list_groups(&self, org_id: &str) -> StoreResult<Vec<Group>>;
    /// 删除分组并清除所有集群上的成员投影
    async fn delete_group(&self, org_id: &str, uuid: &str) -> StoreResult<bool>;

    // ==================== Channels ====================
    async fn create_channel(&self, channel: Channel) -> StoreResult<Channel>;
    async fn find_channel(&self, org_id: &str, uuid: &str) -> StoreResult<Option<Channel>>;
    async fn find_channel_by_name(&self, org_id: &str, name: &str)
        -> StoreResult<Option<Channel>>;
    async fn list_channels(&self, org_id: &str) -> StoreResult<Vec<Channel>>;
    async fn add_channel_version(
        &self,
        org_id: &str,
        uuid: &str,
        version: ChannelVersion,
    ) -> StoreResult<Channel>;

    // ==================== Subscriptions ====================
    async fn create_subscription(&self, subscription: Subscription) -> StoreResult<Subscription>;
    async fn find_subscription(&self, org_id: &str, uuid: &str)
        -> StoreResult<Option<Subscription>>;
    async fn find_subscription_by_name(
        &self,
        org_id: &str,
        name: &str,
    ) -> StoreResult<Option<Subscription>>;
    async fn list_subscriptions(&self, org_id: &str) -> StoreResult<Vec<Subscription>>;
    /// 引用任一给定分组名称的订阅
    async fn subscriptions_for_groups(
        &self,
        org_id: &str,
        group_names: &[String],
    ) -> StoreResult<Vec<Subscription>>;
    async fn delete_subscription(&self, org_id: &str, uuid: &str) -> StoreResult<bool>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}

// ==================== 两种后端共享的成员变更计算 ====================

/// 向集群添加分组投影，已存在的 uuid 不重复添加
pub(crate) fn add_groups_to_cluster(cluster: &mut Cluster, groups: &[GroupRef]) -> Vec<MembershipPair> {
    let mut added = Vec::new();
    for group in groups {
        if cluster.in_group(&group.uuid) {
            continue;
        }
        cluster.groups.push(group.clone());
        added.push(MembershipPair {
            group_uuid: group.uuid.clone(),
            cluster_id: cluster.cluster_id.clone(),
        });
    }
    added
}

pub(crate) fn remove_groups_from_cluster(
    cluster: &mut Cluster,
    group_uuids: &[String],
) -> Vec<MembershipPair> {
    let mut removed = Vec::new();
    let cluster_id = cluster.cluster_id.clone();
    cluster.groups.retain(|g| {
        if group_uuids.contains(&g.uuid) {
            removed.push(MembershipPair {
                group_uuid: g.uuid.clone(),
                cluster_id: cluster_id.clone(),
            });
            false
        } else {
            true
        }
    });
    removed
}

pub(crate) fn replace_cluster_groups(cluster: &mut Cluster, groups: &[GroupRef]) -> MembershipDiff {
    let keep: Vec<String> = groups.iter().map(|g| g.uuid.clone()).collect();
    let stale: Vec<String> = cluster
        .groups
        .iter()
        .filter(|g| !keep.contains(&g.uuid))
        .map(|g| g.uuid.clone())
        .collect();

    let removed = remove_groups_from_cluster(cluster, &stale);
    let added = add_groups_to_cluster(cluster, groups);
    MembershipDiff { added, removed }
}

pub(crate) fn upsert_identity_record(cluster: &mut Cluster, record: SyncedIdentity) {
    match cluster.synced_identities.iter_mut().find(|s| s.id == record.id) {
        Some(existing) => *existing = record,
        None => cluster.synced_identities.push(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cluster(id: &str) -> Cluster {
        Cluster {
            cluster_id: id.to_string(),
            org_id: "org".to_string(),
            name: id.to_string(),
            registration: serde_json::json!({}),
            reg_state: RegState::Registered,
            groups: vec![],
            synced_identities: vec![],
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    fn group(uuid: &str) -> GroupRef {
        GroupRef {
            uuid: uuid.to_string(),
            name: format!("name-{}", uuid),
        }
    }

    #[test]
    fn test_add_groups_is_idempotent() {
        let mut c = cluster("c1");
        assert_eq!(add_groups_to_cluster(&mut c, &[group("g1")]).len(), 1);
        assert_eq!(add_groups_to_cluster(&mut c, &[group("g1")]).len(), 0);
        assert_eq!(c.groups.len(), 1);
    }

    #[test]
    fn test_replace_cluster_groups_diff() {
        let mut c = cluster("c1");
        add_groups_to_cluster(&mut c, &[group("g1"), group("g2")]);

        let diff = replace_cluster_groups(&mut c, &[group("g2"), group("g3")]);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].group_uuid, "g3");
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].group_uuid, "g1");
        assert_eq!(diff.modified(), 2);

        let uuids: Vec<&str> = c.groups.iter().map(|g| g.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["g2", "g3"]);
    }

    #[test]
    fn test_upsert_identity_record_replaces() {
        let mut c = cluster("c1");
        upsert_identity_record(
            &mut c,
            SyncedIdentity::new("u1", crate::models::SyncStatus::Pending, None),
        );
        upsert_identity_record(
            &mut c,
            SyncedIdentity::new("u1", crate::models::SyncStatus::Failed, None),
        );
        assert_eq!(c.synced_identities.len(), 1);
        assert_eq!(
            c.synced_identities[0].sync_status,
            crate::models::SyncStatus::Failed
        );
    }
}
