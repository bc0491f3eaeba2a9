//! Subscription domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::sync::{GroupObj, IdentitySyncStatus};

/// 订阅：将频道版本绑定到一组分组
///
/// `groups` 保存的是分组名称而不是 uuid，读取时需要先按名称解析。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub uuid: String,
    pub org_id: String,
    pub name: String,
    pub groups: Vec<String>,
    pub channel_uuid: String,
    pub version_uuid: String,
    pub owner: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Subscription {
    pub fn references_group(&self, group_name: &str) -> bool {
        self.groups.iter().any(|g| g == group_name)
    }
}

/// 订阅详情（带派生字段）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDetail {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub channel_name: Option<String>,
    pub version_name: Option<String>,
    pub group_objs: Vec<GroupObj>,
    pub identity_sync_status: IdentitySyncStatus,
}

/// 创建订阅请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddSubscriptionRequest {
    #[validate(length(min = 1, max = 64, message = "subscription name must be 1-64 characters"))]
    pub name: String,
    #[validate(length(min = 1, message = "at least one group is required"))]
    pub groups: Vec<String>,
    pub channel_uuid: String,
    pub version_uuid: String,
}
