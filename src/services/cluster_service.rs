//! 集群服务
//! 注册、注册状态流转、活跃度分类与删除

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::RequestContext;
use crate::authz::{Action, Attributes, AuthzEngine, PageRequest, ResourceType};
use crate::error::{AppError, Result};
use crate::models::{
    ActivityWindows, Cluster, ClusterActivity, ClusterSummary, RegState, RegisterClusterRequest,
};
use crate::store::ModelStore;

pub struct ClusterService {
    store: Arc<dyn ModelStore>,
    authz: Arc<AuthzEngine>,
    windows: ActivityWindows,
}

impl ClusterService {
    pub fn new(store: Arc<dyn ModelStore>, authz: Arc<AuthzEngine>, windows: ActivityWindows) -> Self {
        Self {
            store,
            authz,
            windows,
        }
    }

    fn summarize(&self, cluster: Cluster) -> ClusterSummary {
        let activity = cluster.activity(Utc::now(), &self.windows);
        ClusterSummary { cluster, activity }
    }

    /// 注册新集群，初始状态为 registering
    pub async fn register_cluster(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        req: RegisterClusterRequest,
    ) -> Result<Cluster> {
        req.validate()?;
        self.authz
            .authorize(ctx, org_id, Action::Register, ResourceType::Cluster, &Attributes::new())
            .await?;

        let now = Utc::now();
        let registration = if req.registration.is_null() {
            serde_json::json!({ "name": req.name })
        } else {
            req.registration
        };
        let cluster = self
            .store
            .create_cluster(Cluster {
                cluster_id: Uuid::new_v4().to_string(),
                org_id: org_id.to_string(),
                name: req.name,
                registration,
                reg_state: RegState::Registering,
                groups: Vec::new(),
                synced_identities: Vec::new(),
                created: now,
                updated: now,
            })
            .await?;

        tracing::info!(
            parent: &ctx.span,
            cluster_id = %cluster.cluster_id,
            name = %cluster.name,
            "Cluster registered"
        );
        Ok(cluster)
    }

    /// 注册状态只允许 registering → registered，或保持不变
    pub async fn update_reg_state(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        cluster_id: &str,
        target: RegState,
    ) -> Result<Cluster> {
        self.authz
            .authorize(
                ctx,
                org_id,
                Action::Update,
                ResourceType::Cluster,
                &Attributes::by_id(ResourceType::Cluster, cluster_id),
            )
            .await?;

        let cluster = self
            .store
            .find_cluster(org_id, cluster_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("The cluster {} was not found.", cluster_id)))?;

        match (cluster.reg_state, target) {
            (from, to) if from == to => {}
            (RegState::Registering, RegState::Registered) => {}
            (from, to) => {
                return Err(AppError::Validation(format!(
                    "Cannot change the registration state of cluster {} from {} to {}.",
                    cluster.name,
                    from.as_str(),
                    to.as_str()
                )))
            }
        }

        let updated = self.store.update_reg_state(org_id, cluster_id, target).await?;
        tracing::info!(
            parent: &ctx.span,
            cluster_id = %cluster_id,
            reg_state = target.as_str(),
            "Cluster registration state updated"
        );
        Ok(updated)
    }

    pub async fn clusters(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        page: &PageRequest,
    ) -> Result<Vec<ClusterSummary>> {
        let candidates = self.store.list_clusters(org_id).await?;
        let allowed = self
            .authz
            .filter_authorized(&ctx.identity, org_id, Action::Read, candidates)
            .await?;
        Ok(self
            .authz
            .paginate(allowed, page)
            .into_iter()
            .map(|c| self.summarize(c))
            .collect())
    }

    /// 超过 inactive 窗口未更新的集群（包含 zombie）
    pub async fn inactive_clusters(
        &self,
        ctx: &RequestContext,
        org_id: &str,
    ) -> Result<Vec<ClusterSummary>> {
        self.by_activity(ctx, org_id, |a| a != ClusterActivity::Active)
            .await
    }

    pub async fn zombie_clusters(
        &self,
        ctx: &RequestContext,
        org_id: &str,
    ) -> Result<Vec<ClusterSummary>> {
        self.by_activity(ctx, org_id, |a| a == ClusterActivity::Zombie)
            .await
    }

    async fn by_activity(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        keep: impl Fn(ClusterActivity) -> bool,
    ) -> Result<Vec<ClusterSummary>> {
        let candidates = self.store.list_clusters(org_id).await?;
        let allowed = self
            .authz
            .filter_authorized(&ctx.identity, org_id, Action::Read, candidates)
            .await?;
        Ok(allowed
            .into_iter()
            .map(|c| self.summarize(c))
            .filter(|s| keep(s.activity))
            .collect())
    }

    pub async fn cluster(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        attributes: &Attributes,
    ) -> Result<Option<ClusterSummary>> {
        let rt = ResourceType::Cluster;
        if attributes.identifier(rt).is_none() {
            return Err(AppError::validation("A cluster id or name is required"));
        }
        if !self
            .authz
            .authorize_lookup(ctx, org_id, Action::Read, rt, attributes)
            .await?
        {
            return Ok(None);
        }
        let cluster = match attributes.id(rt) {
            Some(cluster_id) => self.store.find_cluster(org_id, cluster_id).await?,
            None => match attributes.name(rt) {
                Some(name) => self.store.find_cluster_by_name(org_id, name).await?,
                None => None,
            },
        };
        Ok(cluster.map(|c| self.summarize(c)))
    }

    /// 删除集群，成员投影与同步记录随集群一起删除
    pub async fn delete_cluster(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        cluster_id: &str,
    ) -> Result<()> {
        self.authz
            .authorize(
                ctx,
                org_id,
                Action::Delete,
                ResourceType::Cluster,
                &Attributes::by_id(ResourceType::Cluster, cluster_id),
            )
            .await?;

        if !self.store.delete_cluster(org_id, cluster_id).await? {
            return Err(AppError::NotFound(format!(
                "The cluster {} was not found.",
                cluster_id
            )));
        }
        tracing::info!(parent: &ctx.span, cluster_id = %cluster_id, "Cluster deleted");
        Ok(())
    }
}
