//! In-memory implementation of the model store.
//!
//! All collections live behind a single `tokio::sync::RwLock`, so every bulk
//! membership primitive is applied under one write lock and is atomic with
//! respect to concurrent readers. State is lost on restart; this backend is
//! used for local development and tests.

use super::{
    add_groups_to_cluster, remove_groups_from_cluster, replace_cluster_groups,
    upsert_identity_record, MembershipDiff, MembershipPair, ModelStore, StoreError, StoreResult,
};
use crate::models::{
    Channel, ChannelVersion, Cluster, Group, GroupRef, Organization, RegState, Subscription,
    SyncedIdentity, User,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    orgs: HashMap<String, Organization>,
    users: HashMap<String, User>,
    clusters: HashMap<String, Cluster>,
    groups: HashMap<String, Group>,
    channels: HashMap<String, Channel>,
    subscriptions: HashMap<String, Subscription>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 列表结果按名称排序，保证分页游标稳定
fn sorted_by_name<T: Clone>(items: impl Iterator<Item = T>, name: impl Fn(&T) -> &str) -> Vec<T> {
    let mut out: Vec<T> = items.collect();
    out.sort_by(|a, b| name(a).cmp(name(b)));
    out
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn create_org(&self, org: Organization) -> StoreResult<Organization> {
        let mut state = self.state.write().await;
        if state.orgs.contains_key(&org.id) {
            return Err(StoreError::Conflict(format!("organization {} already exists", org.id)));
        }
        state.orgs.insert(org.id.clone(), org.clone());
        Ok(org)
    }

    async fn find_org(&self, org_id: &str) -> StoreResult<Option<Organization>> {
        Ok(self.state.read().await.orgs.get(org_id).cloned())
    }

    async fn find_org_by_key_hash(&self, key_hash: &str) -> StoreResult<Option<Organization>> {
        let state = self.state.read().await;
        Ok(state.orgs.values().find(|o| o.holds_key_hash(key_hash)).cloned())
    }

    async fn create_user(&self, user: User) -> StoreResult<User> {
        let mut state = self.state.write().await;
        state.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(user_id).cloned())
    }

    async fn create_cluster(&self, cluster: Cluster) -> StoreResult<Cluster> {
        let mut state = self.state.write().await;
        let duplicate = state
            .clusters
            .values()
            .any(|c| c.org_id == cluster.org_id && (c.name == cluster.name || c.cluster_id == cluster.cluster_id));
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "Another cluster already exists with the same registration name {}",
                cluster.name
            )));
        }
        state.clusters.insert(cluster.cluster_id.clone(), cluster.clone());
        Ok(cluster)
    }

    async fn find_cluster(&self, org_id: &str, cluster_id: &str) -> StoreResult<Option<Cluster>> {
        let state = self.state.read().await;
        Ok(state
            .clusters
            .get(cluster_id)
            .filter(|c| c.org_id == org_id)
            .cloned())
    }

    async fn find_cluster_by_name(
        &self,
        org_id: &str,
        name: &str,
    ) -> StoreResult<Option<Cluster>> {
        let state = self.state.read().await;
        Ok(state
            .clusters
            .values()
            .find(|c| c.org_id == org_id && c.name == name)
            .cloned())
    }

    async fn list_clusters(&self, org_id: &str) -> StoreResult<Vec<Cluster>> {
        let state = self.state.read().await;
        Ok(sorted_by_name(
            state.clusters.values().filter(|c| c.org_id == org_id).cloned(),
            |c| &c.name,
        ))
    }

    async fn clusters_in_groups(
        &self,
        org_id: &str,
        group_uuids: &[String],
    ) -> StoreResult<Vec<Cluster>> {
        let state = self.state.read().await;
        Ok(sorted_by_name(
            state
                .clusters
                .values()
                .filter(|c| c.org_id == org_id)
                .filter(|c| group_uuids.iter().any(|g| c.in_group(g)))
                .cloned(),
            |c| &c.name,
        ))
    }

    async fn update_reg_state(
        &self,
        org_id: &str,
        cluster_id: &str,
        reg_state: RegState,
    ) -> StoreResult<Cluster> {
        let mut state = self.state.write().await;
        let cluster = state
            .clusters
            .get_mut(cluster_id)
            .filter(|c| c.org_id == org_id)
            .ok_or_else(|| StoreError::NotFound(format!("cluster {}", cluster_id)))?;
        cluster.reg_state = reg_state;
        cluster.updated = Utc::now();
        Ok(cluster.clone())
    }

    async fn delete_cluster(&self, org_id: &str, cluster_id: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let owned = state
            .clusters
            .get(cluster_id)
            .is_some_and(|c| c.org_id == org_id);
        if owned {
            state.clusters.remove(cluster_id);
        }
        Ok(owned)
    }

    async fn add_group_memberships(
        &self,
        org_id: &str,
        groups: &[GroupRef],
        cluster_ids: &[String],
    ) -> StoreResult<Vec<MembershipPair>> {
        let mut state = self.state.write().await;
        let mut changed = Vec::new();
        for cluster_id in cluster_ids {
            if let Some(cluster) = state
                .clusters
                .get_mut(cluster_id)
                .filter(|c| c.org_id == org_id)
            {
                changed.extend(add_groups_to_cluster(cluster, groups));
            }
        }
        Ok(changed)
    }

    async fn remove_group_memberships(
        &self,
        org_id: &str,
        group_uuids: &[String],
        cluster_ids: &[String],
    ) -> StoreResult<Vec<MembershipPair>> {
        let mut state = self.state.write().await;
        let mut changed = Vec::new();
        for cluster_id in cluster_ids {
            if let Some(cluster) = state
                .clusters
                .get_mut(cluster_id)
                .filter(|c| c.org_id == org_id)
            {
                changed.extend(remove_groups_from_cluster(cluster, group_uuids));
            }
        }
        Ok(changed)
    }

    async fn set_cluster_groups(
        &self,
        org_id: &str,
        cluster_id: &str,
        groups: &[GroupRef],
    ) -> StoreResult<MembershipDiff> {
        let mut state = self.state.write().await;
        let cluster = state
            .clusters
            .get_mut(cluster_id)
            .filter(|c| c.org_id == org_id)
            .ok_or_else(|| StoreError::NotFound(format!("cluster {}", cluster_id)))?;
        Ok(replace_cluster_groups(cluster, groups))
    }

    async fn upsert_synced_identity(
        &self,
        org_id: &str,
        cluster_id: &str,
        record: SyncedIdentity,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let cluster = state
            .clusters
            .get_mut(cluster_id)
            .filter(|c| c.org_id == org_id)
            .ok_or_else(|| StoreError::NotFound(format!("cluster {}", cluster_id)))?;
        upsert_identity_record(cluster, record);
        Ok(())
    }

    async fn remove_synced_identity(
        &self,
        org_id: &str,
        cluster_id: &str,
        identity_id: &str,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let Some(cluster) = state
            .clusters
            .get_mut(cluster_id)
            .filter(|c| c.org_id == org_id)
        else {
            return Ok(false);
        };
        let before = cluster.synced_identities.len();
        cluster.synced_identities.retain(|s| s.id != identity_id);
        Ok(cluster.synced_identities.len() != before)
    }

    async fn create_group(&self, group: Group) -> StoreResult<Group> {
        let mut state = self.state.write().await;
        if state
            .groups
            .values()
            .any(|g| g.org_id == group.org_id && g.name == group.name)
        {
            return Err(StoreError::Conflict(format!(
                "The group name {} already exists.",
                group.name
            )));
        }
        state.groups.insert(group.uuid.clone(), group.clone());
        Ok(group)
    }

    async fn find_group(&self, org_id: &str, uuid: &str) -> StoreResult<Option<Group>> {
        let state = self.state.read().await;
        Ok(state.groups.get(uuid).filter(|g| g.org_id == org_id).cloned())
    }

    async fn find_group_by_name(&self, org_id: &str, name: &str) -> StoreResult<Option<Group>> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .values()
            .find(|g| g.org_id == org_id && g.name == name)
            .cloned())
    }

    async fn find_groups(&self, org_id: &str, uuids: &[String]) -> StoreResult<Vec<Group>> {
        let state = self.state.read().await;
        Ok(sorted_by_name(
            uuids
                .iter()
                .filter_map(|u| state.groups.get(u))
                .filter(|g| g.org_id == org_id)
                .cloned(),
            |g| &g.name,
        ))
    }

    async fn find_groups_by_name(
        &self,
        org_id: &str,
        names: &[String],
    ) -> StoreResult<Vec<Group>> {
        let state = self.state.read().await;
        Ok(sorted_by_name(
            state
                .groups
                .values()
                .filter(|g| g.org_id == org_id && names.contains(&g.name))
                .cloned(),
            |g| &g.name,
        ))
    }

    async fn list_groups(&self, org_id: &str) -> StoreResult<Vec<Group>> {
        let state = self.state.read().await;
        Ok(sorted_by_name(
            state.groups.values().filter(|g| g.org_id == org_id).cloned(),
            |g| &g.name,
        ))
    }

    async fn delete_group(&self, org_id: &str, uuid: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let owned = state.groups.get(uuid).is_some_and(|g| g.org_id == org_id);
        if !owned {
            return Ok(false);
        }
        state.groups.remove(uuid);
        let stale = [uuid.to_string()];
        for cluster in state.clusters.values_mut().filter(|c| c.org_id == org_id) {
            remove_groups_from_cluster(cluster, &stale);
        }
        Ok(true)
    }

    async fn create_channel(&self, channel: Channel) -> StoreResult<Channel> {
        let mut state = self.state.write().await;
        if state
            .channels
            .values()
            .any(|c| c.org_id == channel.org_id && c.name == channel.name)
        {
            return Err(StoreError::Conflict(format!(
                "The channel name {} already exists.",
                channel.name
            )));
        }
        state.channels.insert(channel.uuid.clone(), channel.clone());
        Ok(channel)
    }

    async fn find_channel(&self, org_id: &str, uuid: &str) -> StoreResult<Option<Channel>> {
        let state = self.state.read().await;
        Ok(state.channels.get(uuid).filter(|c| c.org_id == org_id).cloned())
    }

    async fn find_channel_by_name(
        &self,
        org_id: &str,
        name: &str,
    ) -> StoreResult<Option<Channel>> {
        let state = self.state.read().await;
        Ok(state
            .channels
            .values()
            .find(|c| c.org_id == org_id && c.name == name)
            .cloned())
    }

    async fn list_channels(&self, org_id: &str) -> StoreResult<Vec<Channel>> {
        let state = self.state.read().await;
        Ok(sorted_by_name(
            state.channels.values().filter(|c| c.org_id == org_id).cloned(),
            |c| &c.name,
        ))
    }

    async fn add_channel_version(
        &self,
        org_id: &str,
        uuid: &str,
        version: ChannelVersion,
    ) -> StoreResult<Channel> {
        let mut state = self.state.write().await;
        let channel = state
            .channels
            .get_mut(uuid)
            .filter(|c| c.org_id == org_id)
            .ok_or_else(|| StoreError::NotFound(format!("channel {}", uuid)))?;
        if channel.versions.iter().any(|v| v.name == version.name) {
            return Err(StoreError::Conflict(format!(
                "The version name {} already exists.",
                version.name
            )));
        }
        channel.versions.push(version);
        Ok(channel.clone())
    }

    async fn create_subscription(&self, subscription: Subscription) -> StoreResult<Subscription> {
        let mut state = self.state.write().await;
        if state
            .subscriptions
            .values()
            .any(|s| s.org_id == subscription.org_id && s.name == subscription.name)
        {
            return Err(StoreError::Conflict(format!(
                "The subscription name {} already exists.",
                subscription.name
            )));
        }
        state
            .subscriptions
            .insert(subscription.uuid.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn find_subscription(
        &self,
        org_id: &str,
        uuid: &str,
    ) -> StoreResult<Option<Subscription>> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .get(uuid)
            .filter(|s| s.org_id == org_id)
            .cloned())
    }

    async fn find_subscription_by_name(
        &self,
        org_id: &str,
        name: &str,
    ) -> StoreResult<Option<Subscription>> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .find(|s| s.org_id == org_id && s.name == name)
            .cloned())
    }

    async fn list_subscriptions(&self, org_id: &str) -> StoreResult<Vec<Subscription>> {
        let state = self.state.read().await;
        Ok(sorted_by_name(
            state
                .subscriptions
                .values()
                .filter(|s| s.org_id == org_id)
                .cloned(),
            |s| &s.name,
        ))
    }

    async fn subscriptions_for_groups(
        &self,
        org_id: &str,
        group_names: &[String],
    ) -> StoreResult<Vec<Subscription>> {
        let state = self.state.read().await;
        Ok(sorted_by_name(
            state
                .subscriptions
                .values()
                .filter(|s| s.org_id == org_id)
                .filter(|s| group_names.iter().any(|g| s.references_group(g)))
                .cloned(),
            |s| &s.name,
        ))
    }

    async fn delete_subscription(&self, org_id: &str, uuid: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let owned = state
            .subscriptions
            .get(uuid)
            .is_some_and(|s| s.org_id == org_id);
        if owned {
            state.subscriptions.remove(uuid);
        }
        Ok(owned)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStatus;

    fn cluster(org: &str, id: &str) -> Cluster {
        Cluster {
            cluster_id: id.to_string(),
            org_id: org.to_string(),
            name: format!("cluster-{}", id),
            registration: serde_json::json!({}),
            reg_state: RegState::Registering,
            groups: vec![],
            synced_identities: vec![],
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    fn group_ref(uuid: &str) -> GroupRef {
        GroupRef {
            uuid: uuid.to_string(),
            name: format!("group-{}", uuid),
        }
    }

    #[tokio::test]
    async fn test_membership_ignores_foreign_clusters() {
        let store = MemoryStore::new();
        store.create_cluster(cluster("org-a", "c1")).await.unwrap();
        store.create_cluster(cluster("org-b", "c2")).await.unwrap();

        let changed = store
            .add_group_memberships(
                "org-a",
                &[group_ref("g1")],
                &["c1".to_string(), "c2".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].cluster_id, "c1");
        let foreign = store.find_cluster("org-b", "c2").await.unwrap().unwrap();
        assert!(foreign.groups.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_cluster_name_conflicts() {
        let store = MemoryStore::new();
        store.create_cluster(cluster("org-a", "c1")).await.unwrap();
        let mut dup = cluster("org-a", "c9");
        dup.name = "cluster-c1".to_string();

        let result = store.create_cluster(dup).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_group_strips_projection() {
        let store = MemoryStore::new();
        store.create_cluster(cluster("org-a", "c1")).await.unwrap();
        store
            .create_group(Group {
                uuid: "g1".to_string(),
                org_id: "org-a".to_string(),
                name: "group-g1".to_string(),
                owner: "u1".to_string(),
                created: Utc::now(),
            })
            .await
            .unwrap();
        store
            .add_group_memberships("org-a", &[group_ref("g1")], &["c1".to_string()])
            .await
            .unwrap();

        assert!(store.delete_group("org-a", "g1").await.unwrap());
        let c1 = store.find_cluster("org-a", "c1").await.unwrap().unwrap();
        assert!(c1.groups.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_synced_identity_requires_cluster() {
        let store = MemoryStore::new();
        let result = store
            .upsert_synced_identity(
                "org-a",
                "missing",
                SyncedIdentity::new("u1", SyncStatus::Pending, None),
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
