//! 频道服务

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::RequestContext;
use crate::authz::{Action, Attributes, AuthzEngine, PageRequest, ResourceType};
use crate::error::{AppError, Result};
use crate::models::{AddChannelRequest, AddChannelVersionRequest, Channel, ChannelVersion};
use crate::store::ModelStore;

pub struct ChannelService {
    store: Arc<dyn ModelStore>,
    authz: Arc<AuthzEngine>,
}

impl ChannelService {
    pub fn new(store: Arc<dyn ModelStore>, authz: Arc<AuthzEngine>) -> Self {
        Self { store, authz }
    }

    pub async fn add_channel(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        req: AddChannelRequest,
    ) -> Result<Channel> {
        req.validate()?;
        self.authz
            .authorize(ctx, org_id, Action::Create, ResourceType::Channel, &Attributes::new())
            .await?;

        let channel = self
            .store
            .create_channel(Channel {
                uuid: Uuid::new_v4().to_string(),
                org_id: org_id.to_string(),
                name: req.name,
                owner: ctx.identity.id.clone(),
                versions: Vec::new(),
                created: Utc::now(),
            })
            .await?;

        tracing::info!(parent: &ctx.span, channel = %channel.uuid, name = %channel.name, "Channel created");
        Ok(channel)
    }

    /// 为频道添加版本，需要 manageversion 权限
    pub async fn add_channel_version(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        channel_uuid: &str,
        req: AddChannelVersionRequest,
    ) -> Result<ChannelVersion> {
        req.validate()?;
        self.authz
            .authorize(
                ctx,
                org_id,
                Action::ManageVersion,
                ResourceType::Channel,
                &Attributes::by_id(ResourceType::Channel, channel_uuid),
            )
            .await?;

        let version = ChannelVersion {
            uuid: Uuid::new_v4().to_string(),
            name: req.name,
        };
        self.store
            .add_channel_version(org_id, channel_uuid, version.clone())
            .await?;

        tracing::info!(
            parent: &ctx.span,
            channel = %channel_uuid,
            version = %version.uuid,
            name = %version.name,
            "Channel version added"
        );
        Ok(version)
    }

    pub async fn channels(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        page: &PageRequest,
    ) -> Result<Vec<Channel>> {
        let candidates = self.store.list_channels(org_id).await?;
        let allowed = self
            .authz
            .filter_authorized(&ctx.identity, org_id, Action::Read, candidates)
            .await?;
        Ok(self.authz.paginate(allowed, page))
    }

    /// 按 uuid 或名称查询单个频道；不存在时返回 None
    pub async fn channel(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        attributes: &Attributes,
    ) -> Result<Option<Channel>> {
        let rt = ResourceType::Channel;
        if attributes.identifier(rt).is_none() {
            return Err(AppError::validation("A channel uuid or name is required"));
        }
        if !self
            .authz
            .authorize_lookup(ctx, org_id, Action::Read, rt, attributes)
            .await?
        {
            return Ok(None);
        }
        let channel = match attributes.id(rt) {
            Some(uuid) => self.store.find_channel(org_id, uuid).await?,
            None => match attributes.name(rt) {
                Some(name) => self.store.find_channel_by_name(org_id, name).await?,
                None => None,
            },
        };
        Ok(channel)
    }
}
