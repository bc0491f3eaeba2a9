//! PostgreSQL implementation of the model store.
//!
//! 嵌入式字段（集群分组投影、同步记录、频道版本、订阅分组名）以 JSONB 保存。
//! 批量成员变更在单个事务中 `SELECT ... FOR UPDATE` 后整体写回。

use super::{
    add_groups_to_cluster, remove_groups_from_cluster, replace_cluster_groups,
    upsert_identity_record, MembershipDiff, MembershipPair, ModelStore, StoreError, StoreResult,
};
use crate::models::{
    Channel, ChannelVersion, Cluster, Group, GroupRef, OrgKeyEntry, OrgRole, Organization,
    RegState, Subscription, SyncedIdentity, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool, Postgres, Transaction};

const UNIQUE_VIOLATION: &str = "23505";

/// 唯一约束冲突映射为 Conflict，其余错误原样上抛
fn map_unique(err: sqlx::Error, conflict: impl FnOnce() -> String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(conflict())
        }
        _ => StoreError::from(err),
    }
}

#[derive(sqlx::FromRow)]
struct OrgRow {
    id: String,
    name: String,
    org_keys: Json<Vec<String>>,
    org_keys2: Json<Vec<OrgKeyEntry>>,
    created: DateTime<Utc>,
}

impl From<OrgRow> for Organization {
    fn from(row: OrgRow) -> Self {
        Organization {
            id: row.id,
            name: row.name,
            org_keys: row.org_keys.0,
            org_keys2: row.org_keys2.0,
            created: row.created,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    org_id: String,
    email: String,
    role: String,
    created: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let role = if row.role.eq_ignore_ascii_case("admin") {
            OrgRole::Admin
        } else {
            OrgRole::Member
        };
        User {
            id: row.id,
            org_id: row.org_id,
            email: row.email,
            role,
            created: row.created,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ClusterRow {
    cluster_id: String,
    org_id: String,
    name: String,
    registration: Json<serde_json::Value>,
    reg_state: String,
    groups: Json<Vec<GroupRef>>,
    synced_identities: Json<Vec<SyncedIdentity>>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl From<ClusterRow> for Cluster {
    fn from(row: ClusterRow) -> Self {
        Cluster {
            cluster_id: row.cluster_id,
            org_id: row.org_id,
            name: row.name,
            registration: row.registration.0,
            reg_state: RegState::parse(&row.reg_state).unwrap_or(RegState::Registering),
            groups: row.groups.0,
            synced_identities: row.synced_identities.0,
            created: row.created,
            updated: row.updated,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    uuid: String,
    org_id: String,
    name: String,
    owner: String,
    created: DateTime<Utc>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            uuid: row.uuid,
            org_id: row.org_id,
            name: row.name,
            owner: row.owner,
            created: row.created,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    uuid: String,
    org_id: String,
    name: String,
    owner: String,
    versions: Json<Vec<ChannelVersion>>,
    created: DateTime<Utc>,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Channel {
            uuid: row.uuid,
            org_id: row.org_id,
            name: row.name,
            owner: row.owner,
            versions: row.versions.0,
            created: row.created,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    uuid: String,
    org_id: String,
    name: String,
    groups: Json<Vec<String>>,
    channel_uuid: String,
    version_uuid: String,
    owner: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            uuid: row.uuid,
            org_id: row.org_id,
            name: row.name,
            groups: row.groups.0,
            channel_uuid: row.channel_uuid,
            version_uuid: row.version_uuid,
            owner: row.owner,
            created: row.created,
            updated: row.updated,
        }
    }
}

pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 锁定给定集群行，供批量成员变更在事务内修改
    async fn lock_clusters(
        tx: &mut Transaction<'_, Postgres>,
        org_id: &str,
        cluster_ids: &[String],
    ) -> StoreResult<Vec<Cluster>> {
        let rows = sqlx::query_as::<_, ClusterRow>(
            r#"
            SELECT * FROM clusters
            WHERE org_id = $1 AND cluster_id = ANY($2)
            ORDER BY cluster_id
            FOR UPDATE
            "#,
        )
        .bind(org_id)
        .bind(cluster_ids)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(Cluster::from).collect())
    }

    async fn write_cluster_groups(
        tx: &mut Transaction<'_, Postgres>,
        cluster: &Cluster,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE clusters SET groups = $3 WHERE org_id = $1 AND cluster_id = $2")
            .bind(&cluster.org_id)
            .bind(&cluster.cluster_id)
            .bind(Json(&cluster.groups))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ModelStore for PgStore {
    async fn create_org(&self, org: Organization) -> StoreResult<Organization> {
        let row = sqlx::query_as::<_, OrgRow>(
            r#"
            INSERT INTO organizations (id, name, org_keys, org_keys2, created)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&org.id)
        .bind(&org.name)
        .bind(Json(&org.org_keys))
        .bind(Json(&org.org_keys2))
        .bind(org.created)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique(e, || format!("organization {} already exists", org.id)))?;

        Ok(row.into())
    }

    async fn find_org(&self, org_id: &str) -> StoreResult<Option<Organization>> {
        let row = sqlx::query_as::<_, OrgRow>("SELECT * FROM organizations WHERE id = $1")
            .bind(org_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Organization::from))
    }

    async fn find_org_by_key_hash(&self, key_hash: &str) -> StoreResult<Option<Organization>> {
        let row = sqlx::query_as::<_, OrgRow>(
            r#"
            SELECT * FROM organizations
            WHERE org_keys ? $1
               OR EXISTS (
                   SELECT 1 FROM jsonb_array_elements(org_keys2) k
                   WHERE k->>'keyHash' = $1
               )
            LIMIT 1
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Organization::from))
    }

    async fn create_user(&self, user: User) -> StoreResult<User> {
        let role = match user.role {
            OrgRole::Admin => "ADMIN",
            OrgRole::Member => "MEMBER",
        };
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, org_id, email, role, created)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, role = EXCLUDED.role
            RETURNING *
            "#,
        )
        .bind(&user.id)
        .bind(&user.org_id)
        .bind(&user.email)
        .bind(role)
        .bind(user.created)
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(User::from))
    }

    async fn create_cluster(&self, cluster: Cluster) -> StoreResult<Cluster> {
        let row = sqlx::query_as::<_, ClusterRow>(
            r#"
            INSERT INTO clusters (
                cluster_id, org_id, name, registration, reg_state,
                groups, synced_identities, created, updated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&cluster.cluster_id)
        .bind(&cluster.org_id)
        .bind(&cluster.name)
        .bind(Json(&cluster.registration))
        .bind(cluster.reg_state.as_str())
        .bind(Json(&cluster.groups))
        .bind(Json(&cluster.synced_identities))
        .bind(cluster.created)
        .bind(cluster.updated)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            map_unique(e, || {
                format!(
                    "Another cluster already exists with the same registration name {}",
                    cluster.name
                )
            })
        })?;
        Ok(row.into())
    }

    async fn find_cluster(&self, org_id: &str, cluster_id: &str) -> StoreResult<Option<Cluster>> {
        let row = sqlx::query_as::<_, ClusterRow>(
            "SELECT * FROM clusters WHERE org_id = $1 AND cluster_id = $2",
        )
        .bind(org_id)
        .bind(cluster_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Cluster::from))
    }

    async fn find_cluster_by_name(
        &self,
        org_id: &str,
        name: &str,
    ) -> StoreResult<Option<Cluster>> {
        let row =
            sqlx::query_as::<_, ClusterRow>("SELECT * FROM clusters WHERE org_id = $1 AND name = $2")
                .bind(org_id)
                .bind(name)
                .fetch_optional(&self.db)
                .await?;
        Ok(row.map(Cluster::from))
    }

    async fn list_clusters(&self, org_id: &str) -> StoreResult<Vec<Cluster>> {
        let rows =
            sqlx::query_as::<_, ClusterRow>("SELECT * FROM clusters WHERE org_id = $1 ORDER BY name")
                .bind(org_id)
                .fetch_all(&self.db)
                .await?;
        Ok(rows.into_iter().map(Cluster::from).collect())
    }

    async fn clusters_in_groups(
        &self,
        org_id: &str,
        group_uuids: &[String],
    ) -> StoreResult<Vec<Cluster>> {
        let rows = sqlx::query_as::<_, ClusterRow>(
            r#"
            SELECT * FROM clusters c
            WHERE c.org_id = $1
              AND EXISTS (
                  SELECT 1 FROM jsonb_array_elements(c.groups) g
                  WHERE g->>'uuid' = ANY($2)
              )
            ORDER BY c.name
            "#,
        )
        .bind(org_id)
        .bind(group_uuids)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Cluster::from).collect())
    }

    async fn update_reg_state(
        &self,
        org_id: &str,
        cluster_id: &str,
        reg_state: RegState,
    ) -> StoreResult<Cluster> {
        let row = sqlx::query_as::<_, ClusterRow>(
            r#"
            UPDATE clusters SET reg_state = $3, updated = NOW()
            WHERE org_id = $1 AND cluster_id = $2
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(cluster_id)
        .bind(reg_state.as_str())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("cluster {}", cluster_id)))?;
        Ok(row.into())
    }

    async fn delete_cluster(&self, org_id: &str, cluster_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM clusters WHERE org_id = $1 AND cluster_id = $2")
            .bind(org_id)
            .bind(cluster_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_group_memberships(
        &self,
        org_id: &str,
        groups: &[GroupRef],
        cluster_ids: &[String],
    ) -> StoreResult<Vec<MembershipPair>> {
        let mut tx = self.db.begin().await?;
        let mut changed = Vec::new();
        for mut cluster in Self::lock_clusters(&mut tx, org_id, cluster_ids).await? {
            let added = add_groups_to_cluster(&mut cluster, groups);
            if !added.is_empty() {
                Self::write_cluster_groups(&mut tx, &cluster).await?;
                changed.extend(added);
            }
        }
        tx.commit().await?;
        Ok(changed)
    }

    async fn remove_group_memberships(
        &self,
        org_id: &str,
        group_uuids: &[String],
        cluster_ids: &[String],
    ) -> StoreResult<Vec<MembershipPair>> {
        let mut tx = self.db.begin().await?;
        let mut changed = Vec::new();
        for mut cluster in Self::lock_clusters(&mut tx, org_id, cluster_ids).await? {
            let removed = remove_groups_from_cluster(&mut cluster, group_uuids);
            if !removed.is_empty() {
                Self::write_cluster_groups(&mut tx, &cluster).await?;
                changed.extend(removed);
            }
        }
        tx.commit().await?;
        Ok(changed)
    }

    async fn set_cluster_groups(
        &self,
        org_id: &str,
        cluster_id: &str,
        groups: &[GroupRef],
    ) -> StoreResult<MembershipDiff> {
        let mut tx = self.db.begin().await?;
        let mut cluster = Self::lock_clusters(&mut tx, org_id, &[cluster_id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("cluster {}", cluster_id)))?;

        let diff = replace_cluster_groups(&mut cluster, groups);
        if diff.modified() > 0 {
            Self::write_cluster_groups(&mut tx, &cluster).await?;
        }
        tx.commit().await?;
        Ok(diff)
    }

    async fn upsert_synced_identity(
        &self,
        org_id: &str,
        cluster_id: &str,
        record: SyncedIdentity,
    ) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        let mut cluster = Self::lock_clusters(&mut tx, org_id, &[cluster_id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("cluster {}", cluster_id)))?;

        upsert_identity_record(&mut cluster, record);
        sqlx::query(
            "UPDATE clusters SET synced_identities = $3 WHERE org_id = $1 AND cluster_id = $2",
        )
        .bind(org_id)
        .bind(cluster_id)
        .bind(Json(&cluster.synced_identities))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_synced_identity(
        &self,
        org_id: &str,
        cluster_id: &str,
        identity_id: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE clusters
            SET synced_identities = COALESCE(
                (SELECT jsonb_agg(s) FROM jsonb_array_elements(synced_identities) s
                 WHERE s->>'id' <> $3),
                '[]'::jsonb
            )
            WHERE org_id = $1 AND cluster_id = $2
              AND EXISTS (
                  SELECT 1 FROM jsonb_array_elements(synced_identities) s
                  WHERE s->>'id' = $3
              )
            "#,
        )
        .bind(org_id)
        .bind(cluster_id)
        .bind(identity_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_group(&self, group: Group) -> StoreResult<Group> {
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            INSERT INTO groups (uuid, org_id, name, owner, created)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&group.uuid)
        .bind(&group.org_id)
        .bind(&group.name)
        .bind(&group.owner)
        .bind(group.created)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique(e, || format!("The group name {} already exists.", group.name)))?;
        Ok(row.into())
    }

    async fn find_group(&self, org_id: &str, uuid: &str) -> StoreResult<Option<Group>> {
        let row = sqlx::query_as::<_, GroupRow>("SELECT * FROM groups WHERE org_id = $1 AND uuid = $2")
            .bind(org_id)
            .bind(uuid)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Group::from))
    }

    async fn find_group_by_name(&self, org_id: &str, name: &str) -> StoreResult<Option<Group>> {
        let row = sqlx::query_as::<_, GroupRow>("SELECT * FROM groups WHERE org_id = $1 AND name = $2")
            .bind(org_id)
            .bind(name)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Group::from))
    }

    async fn find_groups(&self, org_id: &str, uuids: &[String]) -> StoreResult<Vec<Group>> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT * FROM groups WHERE org_id = $1 AND uuid = ANY($2) ORDER BY name",
        )
        .bind(org_id)
        .bind(uuids)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Group::from).collect())
    }

    async fn find_groups_by_name(
        &self,
        org_id: &str,
        names: &[String],
    ) -> StoreResult<Vec<Group>> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT * FROM groups WHERE org_id = $1 AND name = ANY($2) ORDER BY name",
        )
        .bind(org_id)
        .bind(names)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Group::from).collect())
    }

    async fn list_groups(&self, org_id: &str) -> StoreResult<Vec<Group>> {
        let rows = sqlx::query_as::<_, GroupRow>("SELECT * FROM groups WHERE org_id = $1 ORDER BY name")
            .bind(org_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Group::from).collect())
    }

    async fn delete_group(&self, org_id: &str, uuid: &str) -> StoreResult<bool> {
        let mut tx = self.db.begin().await?;
        let result = sqlx::query("DELETE FROM groups WHERE org_id = $1 AND uuid = $2")
            .bind(org_id)
            .bind(uuid)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let stale = [uuid.to_string()];
        let members: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT cluster_id FROM clusters c
            WHERE c.org_id = $1
              AND EXISTS (SELECT 1 FROM jsonb_array_elements(c.groups) g WHERE g->>'uuid' = $2)
            "#,
        )
        .bind(org_id)
        .bind(uuid)
        .fetch_all(&mut *tx)
        .await?;

        for mut cluster in Self::lock_clusters(&mut tx, org_id, &members).await? {
            remove_groups_from_cluster(&mut cluster, &stale);
            Self::write_cluster_groups(&mut tx, &cluster).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn create_channel(&self, channel: Channel) -> StoreResult<Channel> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            INSERT INTO channels (uuid, org_id, name, owner, versions, created)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&channel.uuid)
        .bind(&channel.org_id)
        .bind(&channel.name)
        .bind(&channel.owner)
        .bind(Json(&channel.versions))
        .bind(channel.created)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            map_unique(e, || format!("The channel name {} already exists.", channel.name))
        })?;
        Ok(row.into())
    }

    async fn find_channel(&self, org_id: &str, uuid: &str) -> StoreResult<Option<Channel>> {
        let row =
            sqlx::query_as::<_, ChannelRow>("SELECT * FROM channels WHERE org_id = $1 AND uuid = $2")
                .bind(org_id)
                .bind(uuid)
                .fetch_optional(&self.db)
                .await?;
        Ok(row.map(Channel::from))
    }

    async fn find_channel_by_name(
        &self,
        org_id: &str,
        name: &str,
    ) -> StoreResult<Option<Channel>> {
        let row =
            sqlx::query_as::<_, ChannelRow>("SELECT * FROM channels WHERE org_id = $1 AND name = $2")
                .bind(org_id)
                .bind(name)
                .fetch_optional(&self.db)
                .await?;
        Ok(row.map(Channel::from))
    }

    async fn list_channels(&self, org_id: &str) -> StoreResult<Vec<Channel>> {
        let rows =
            sqlx::query_as::<_, ChannelRow>("SELECT * FROM channels WHERE org_id = $1 ORDER BY name")
                .bind(org_id)
                .fetch_all(&self.db)
                .await?;
        Ok(rows.into_iter().map(Channel::from).collect())
    }

    async fn add_channel_version(
        &self,
        org_id: &str,
        uuid: &str,
        version: ChannelVersion,
    ) -> StoreResult<Channel> {
        let mut tx = self.db.begin().await?;
        let mut channel: Channel = sqlx::query_as::<_, ChannelRow>(
            "SELECT * FROM channels WHERE org_id = $1 AND uuid = $2 FOR UPDATE",
        )
        .bind(org_id)
        .bind(uuid)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("channel {}", uuid)))?
        .into();

        if channel.versions.iter().any(|v| v.name == version.name) {
            return Err(StoreError::Conflict(format!(
                "The version name {} already exists.",
                version.name
            )));
        }
        channel.versions.push(version);

        sqlx::query("UPDATE channels SET versions = $3 WHERE org_id = $1 AND uuid = $2")
            .bind(org_id)
            .bind(uuid)
            .bind(Json(&channel.versions))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(channel)
    }

    async fn create_subscription(&self, subscription: Subscription) -> StoreResult<Subscription> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            INSERT INTO subscriptions (
                uuid, org_id, name, groups, channel_uuid, version_uuid, owner, created, updated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&subscription.uuid)
        .bind(&subscription.org_id)
        .bind(&subscription.name)
        .bind(Json(&subscription.groups))
        .bind(&subscription.channel_uuid)
        .bind(&subscription.version_uuid)
        .bind(&subscription.owner)
        .bind(subscription.created)
        .bind(subscription.updated)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            map_unique(e, || {
                format!("The subscription name {} already exists.", subscription.name)
            })
        })?;
        Ok(row.into())
    }

    async fn find_subscription(
        &self,
        org_id: &str,
        uuid: &str,
    ) -> StoreResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions WHERE org_id = $1 AND uuid = $2",
        )
        .bind(org_id)
        .bind(uuid)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Subscription::from))
    }

    async fn find_subscription_by_name(
        &self,
        org_id: &str,
        name: &str,
    ) -> StoreResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions WHERE org_id = $1 AND name = $2",
        )
        .bind(org_id)
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Subscription::from))
    }

    async fn list_subscriptions(&self, org_id: &str) -> StoreResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions WHERE org_id = $1 ORDER BY name",
        )
        .bind(org_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn subscriptions_for_groups(
        &self,
        org_id: &str,
        group_names: &[String],
    ) -> StoreResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions WHERE org_id = $1 AND groups ?| $2 ORDER BY name",
        )
        .bind(org_id)
        .bind(group_names)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn delete_subscription(&self, org_id: &str, uuid: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE org_id = $1 AND uuid = $2")
            .bind(org_id)
            .bind(uuid)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
