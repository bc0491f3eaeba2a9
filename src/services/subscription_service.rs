//! 订阅服务
//! 订阅的创建/删除会为可达集群调度身份同步；读取结果附带下发视图与同步计数

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use super::rollout_service::RolloutService;
use super::sync_queue::{SyncQueue, SyncTask};
use crate::auth::RequestContext;
use crate::authz::{Action, Attributes, AuthzEngine, PageRequest, ResourceType};
use crate::error::{AppError, Result};
use crate::models::{AddSubscriptionRequest, Cluster, Subscription, SubscriptionDetail};
use crate::store::ModelStore;

pub struct SubscriptionService {
    store: Arc<dyn ModelStore>,
    authz: Arc<AuthzEngine>,
    rollout: Arc<RolloutService>,
    sync_queue: Arc<SyncQueue>,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn ModelStore>,
        authz: Arc<AuthzEngine>,
        rollout: Arc<RolloutService>,
        sync_queue: Arc<SyncQueue>,
    ) -> Self {
        Self {
            store,
            authz,
            rollout,
            sync_queue,
        }
    }

    pub async fn add_subscription(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        req: AddSubscriptionRequest,
    ) -> Result<SubscriptionDetail> {
        req.validate()?;
        self.authz
            .authorize(
                ctx,
                org_id,
                Action::Create,
                ResourceType::Subscription,
                &Attributes::new(),
            )
            .await?;
        self.authz
            .authorize(
                ctx,
                org_id,
                Action::Read,
                ResourceType::Channel,
                &Attributes::by_id(ResourceType::Channel, &req.channel_uuid),
            )
            .await?;

        let channel = self
            .store
            .find_channel(org_id, &req.channel_uuid)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("The channel {} was not found.", req.channel_uuid))
            })?;
        if channel.version(&req.version_uuid).is_none() {
            return Err(AppError::NotFound(format!(
                "The version {} was not found in channel {}.",
                req.version_uuid, channel.name
            )));
        }

        let found = self.store.find_groups_by_name(org_id, &req.groups).await?;
        let missing: Vec<&str> = req
            .groups
            .iter()
            .filter(|name| !found.iter().any(|g| &g.name == *name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::NotFound(format!(
                "The groups {} were not found.",
                missing.join(", ")
            )));
        }

        let now = Utc::now();
        let subscription = self
            .store
            .create_subscription(Subscription {
                uuid: Uuid::new_v4().to_string(),
                org_id: org_id.to_string(),
                name: req.name,
                groups: req.groups,
                channel_uuid: req.channel_uuid,
                version_uuid: req.version_uuid,
                owner: ctx.identity.id.clone(),
                created: now,
                updated: now,
            })
            .await?;

        let scheduled = self.schedule_reachable(ctx, &subscription).await?;
        tracing::info!(
            parent: &ctx.span,
            subscription = %subscription.uuid,
            name = %subscription.name,
            sync_tasks = scheduled,
            "Subscription created"
        );

        self.rollout.subscription_detail(subscription).await
    }

    pub async fn remove_subscription(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        uuid: &str,
    ) -> Result<()> {
        self.authz
            .authorize(
                ctx,
                org_id,
                Action::Delete,
                ResourceType::Subscription,
                &Attributes::by_id(ResourceType::Subscription, uuid),
            )
            .await?;

        let subscription = self
            .store
            .find_subscription(org_id, uuid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("The subscription {} was not found.", uuid)))?;
        let clusters = self.rollout.reachable_clusters(&subscription).await?;

        self.store.delete_subscription(org_id, uuid).await?;

        // 删除后任务会判定集群不可达并清理所有者记录
        self.schedule(ctx, &subscription, &clusters);

        tracing::info!(
            parent: &ctx.span,
            subscription = %subscription.uuid,
            name = %subscription.name,
            "Subscription removed"
        );
        Ok(())
    }

    async fn schedule_reachable(
        &self,
        ctx: &RequestContext,
        subscription: &Subscription,
    ) -> Result<usize> {
        let clusters = self.rollout.reachable_clusters(subscription).await?;
        self.schedule(ctx, subscription, &clusters);
        Ok(clusters.len())
    }

    fn schedule(&self, ctx: &RequestContext, subscription: &Subscription, clusters: &[Cluster]) {
        for cluster in clusters {
            self.sync_queue.schedule(SyncTask {
                subscription_uuid: subscription.uuid.clone(),
                cluster_id: cluster.cluster_id.clone(),
                org_id: subscription.org_id.clone(),
                actor_id: ctx.identity.id.clone(),
                owner_id: subscription.owner.clone(),
            });
        }
    }

    async fn details(&self, subscriptions: Vec<Subscription>) -> Result<Vec<SubscriptionDetail>> {
        let mut details = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            details.push(self.rollout.subscription_detail(subscription).await?);
        }
        Ok(details)
    }

    pub async fn subscriptions(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        page: &PageRequest,
    ) -> Result<Vec<SubscriptionDetail>> {
        let candidates = self.store.list_subscriptions(org_id).await?;
        let allowed = self
            .authz
            .filter_authorized(&ctx.identity, org_id, Action::Read, candidates)
            .await?;
        self.details(self.authz.paginate(allowed, page)).await
    }

    /// 按 uuid 或名称查询订阅详情
    pub async fn subscription(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        attributes: &Attributes,
    ) -> Result<Option<SubscriptionDetail>> {
        let rt = ResourceType::Subscription;
        if attributes.identifier(rt).is_none() {
            return Err(AppError::validation("A subscription uuid or name is required"));
        }
        if !self
            .authz
            .authorize_lookup(ctx, org_id, Action::Read, rt, attributes)
            .await?
        {
            return Ok(None);
        }
        let subscription = match attributes.id(rt) {
            Some(uuid) => self.store.find_subscription(org_id, uuid).await?,
            None => match attributes.name(rt) {
                Some(name) => self.store.find_subscription_by_name(org_id, name).await?,
                None => None,
            },
        };
        match subscription {
            Some(subscription) => Ok(Some(self.rollout.subscription_detail(subscription).await?)),
            None => Ok(None),
        }
    }

    /// 分组到达指定集群的订阅；集群不存在时返回空列表
    pub async fn subscriptions_by_cluster_id(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        attributes: &Attributes,
    ) -> Result<Vec<SubscriptionDetail>> {
        let Some(cluster_id) = attributes.id(ResourceType::Cluster) else {
            return Err(AppError::validation("A cluster id is required"));
        };
        if !self
            .authz
            .authorize_lookup(ctx, org_id, Action::Read, ResourceType::Cluster, attributes)
            .await?
        {
            return Ok(Vec::new());
        }
        let Some(cluster) = self.store.find_cluster(org_id, cluster_id).await? else {
            return Ok(Vec::new());
        };

        let group_names: Vec<String> = cluster.groups.iter().map(|g| g.name.clone()).collect();
        if group_names.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = self
            .store
            .subscriptions_for_groups(org_id, &group_names)
            .await?;
        let allowed = self
            .authz
            .filter_authorized(&ctx.identity, org_id, Action::Read, candidates)
            .await?;
        self.details(allowed).await
    }
}
