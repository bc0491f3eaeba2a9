//! 订阅下发视图与身份同步状态聚合
//!
//! 订阅保存的是分组名称，读取时先按名称解析出分组，再取分组的成员集群。
//! 每个可达集群贡献一个 (集群, 所有者) 组合，状态取集群上所有者的同步记录，
//! 没有记录时为 unknown。

use std::collections::HashSet;
use std::sync::Arc;

use super::sync_queue::SyncQueue;
use crate::error::Result;
use crate::models::{
    Cluster, ClusterSyncView, Group, GroupObj, IdentitySyncStatus, Subscription,
    SubscriptionDetail, SyncStatus,
};
use crate::store::ModelStore;

pub struct RolloutService {
    store: Arc<dyn ModelStore>,
    sync_queue: Arc<SyncQueue>,
}

/// 集群上订阅所有者的同步状态
fn owner_status(cluster: &Cluster, owner: &str) -> SyncStatus {
    cluster
        .synced_identity(owner)
        .map(|record| record.sync_status)
        .unwrap_or(SyncStatus::Unknown)
}

impl RolloutService {
    pub fn new(store: Arc<dyn ModelStore>, sync_queue: Arc<SyncQueue>) -> Self {
        Self { store, sync_queue }
    }

    /// 按订阅中的顺序解析分组；已不存在的名称跳过
    async fn resolve_groups(&self, subscription: &Subscription) -> Result<Vec<Group>> {
        let mut groups = self
            .store
            .find_groups_by_name(&subscription.org_id, &subscription.groups)
            .await?;
        groups.sort_by_key(|g| {
            subscription
                .groups
                .iter()
                .position(|name| name == &g.name)
                .unwrap_or(usize::MAX)
        });
        Ok(groups)
    }

    /// 订阅引用的分组及其成员集群
    pub async fn compute_group_objs(&self, subscription: &Subscription) -> Result<Vec<GroupObj>> {
        let groups = self.resolve_groups(subscription).await?;

        let mut objs = Vec::with_capacity(groups.len());
        for group in groups {
            let clusters = self
                .store
                .clusters_in_groups(&subscription.org_id, std::slice::from_ref(&group.uuid))
                .await?
                .into_iter()
                .map(|cluster| ClusterSyncView {
                    sync_status: owner_status(&cluster, &subscription.owner),
                    cluster_id: cluster.cluster_id,
                    name: cluster.name,
                    synced_identities: cluster.synced_identities,
                })
                .collect();

            objs.push(GroupObj {
                uuid: group.uuid,
                name: group.name,
                clusters,
            });
        }
        Ok(objs)
    }

    /// 可达集群（去重）
    pub async fn reachable_clusters(&self, subscription: &Subscription) -> Result<Vec<Cluster>> {
        let groups = self.resolve_groups(subscription).await?;
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let uuids: Vec<String> = groups.into_iter().map(|g| g.uuid).collect();
        let clusters = self
            .store
            .clusters_in_groups(&subscription.org_id, &uuids)
            .await?;

        let mut seen = HashSet::new();
        Ok(clusters
            .into_iter()
            .filter(|c| seen.insert(c.cluster_id.clone()))
            .collect())
    }

    /// 同步状态计数，四项之和等于可达组合数
    pub async fn compute_sync_status(
        &self,
        subscription: &Subscription,
    ) -> Result<IdentitySyncStatus> {
        let mut status = IdentitySyncStatus::default();
        for cluster in self.reachable_clusters(subscription).await? {
            status.record(owner_status(&cluster, &subscription.owner));
        }
        status.propagation_pending = self.sync_queue.propagation_pending(&subscription.uuid);
        Ok(status)
    }

    /// 订阅详情：频道/版本名称、分组视图与同步计数
    pub async fn subscription_detail(
        &self,
        subscription: Subscription,
    ) -> Result<SubscriptionDetail> {
        let channel = self
            .store
            .find_channel(&subscription.org_id, &subscription.channel_uuid)
            .await?;
        let (channel_name, version_name) = match &channel {
            Some(channel) => (
                Some(channel.name.clone()),
                channel
                    .version(&subscription.version_uuid)
                    .map(|v| v.name.clone()),
            ),
            None => (None, None),
        };

        let group_objs = self.compute_group_objs(&subscription).await?;
        let identity_sync_status = self.compute_sync_status(&subscription).await?;

        Ok(SubscriptionDetail {
            subscription,
            channel_name,
            version_name,
            group_objs,
            identity_sync_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::models::{RegState, SyncedIdentity};
    use crate::services::sync_queue::UnavailableSyncer;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn group(uuid: &str, name: &str) -> Group {
        Group {
            uuid: uuid.to_string(),
            org_id: "org".to_string(),
            name: name.to_string(),
            owner: "owner".to_string(),
            created: Utc::now(),
        }
    }

    fn cluster(id: &str, groups: &[&Group]) -> Cluster {
        Cluster {
            cluster_id: id.to_string(),
            org_id: "org".to_string(),
            name: id.to_string(),
            registration: serde_json::json!({}),
            reg_state: RegState::Registered,
            groups: groups.iter().map(|g| g.to_ref()).collect(),
            synced_identities: vec![],
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    fn subscription(groups: &[&str]) -> Subscription {
        Subscription {
            uuid: "s1".to_string(),
            org_id: "org".to_string(),
            name: "sub".to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            channel_uuid: "ch".to_string(),
            version_uuid: "v".to_string(),
            owner: "owner".to_string(),
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    async fn service(store: Arc<MemoryStore>) -> RolloutService {
        let queue = SyncQueue::start(
            store.clone(),
            Arc::new(UnavailableSyncer),
            &SyncConfig {
                queue_capacity: 4,
                worker_count: 1,
            },
        );
        RolloutService::new(store, queue)
    }

    #[tokio::test]
    async fn test_cluster_in_two_groups_counts_once() {
        let store = Arc::new(MemoryStore::new());
        let (edge, prod) = (group("g1", "edge"), group("g2", "prod"));
        store.create_group(edge.clone()).await.unwrap();
        store.create_group(prod.clone()).await.unwrap();
        store.create_cluster(cluster("c1", &[&edge, &prod])).await.unwrap();
        store.create_cluster(cluster("c2", &[&prod])).await.unwrap();
        store
            .upsert_synced_identity(
                "org",
                "c2",
                SyncedIdentity::new("owner", SyncStatus::Failed, None),
            )
            .await
            .unwrap();

        let rollout = service(store).await;
        let sub = subscription(&["prod", "edge"]);

        let status = rollout.compute_sync_status(&sub).await.unwrap();
        assert_eq!(status.total(), 2);
        assert_eq!(status.failed_count, 1);
        assert_eq!(status.unknown_count, 1);

        let objs = rollout.compute_group_objs(&sub).await.unwrap();
        let names: Vec<&str> = objs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["prod", "edge"]);
        assert_eq!(objs[0].clusters.len(), 2);
        assert_eq!(objs[1].clusters.len(), 1);
    }

    #[tokio::test]
    async fn test_other_identity_record_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let edge = group("g1", "edge");
        store.create_group(edge.clone()).await.unwrap();
        store.create_cluster(cluster("c1", &[&edge])).await.unwrap();
        store
            .upsert_synced_identity(
                "org",
                "c1",
                SyncedIdentity::new("someone-else", SyncStatus::Synced, None),
            )
            .await
            .unwrap();

        let rollout = service(store).await;
        let status = rollout
            .compute_sync_status(&subscription(&["edge"]))
            .await
            .unwrap();
        assert_eq!(status.unknown_count, 1);
        assert_eq!(status.synced_count, 0);
    }

    #[tokio::test]
    async fn test_missing_group_name_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let rollout = service(store).await;
        let sub = subscription(&["gone"]);

        assert!(rollout.compute_group_objs(&sub).await.unwrap().is_empty());
        assert_eq!(rollout.compute_sync_status(&sub).await.unwrap().total(), 0);
    }
}
