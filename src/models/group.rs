//! Group domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::cluster::GroupRef;

/// 分组：应用于集群的命名标签
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub uuid: String,
    pub org_id: String,
    pub name: String,
    pub owner: String,
    pub created: DateTime<Utc>,
}

impl Group {
    pub fn to_ref(&self) -> GroupRef {
        GroupRef {
            uuid: self.uuid.clone(),
            name: self.name.clone(),
        }
    }
}

/// 分组详情
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetail {
    pub uuid: String,
    pub org_id: String,
    pub name: String,
    pub owner: String,
    pub created: DateTime<Utc>,
    pub cluster_count: usize,
    pub subscription_count: usize,
    pub subscriptions: serde_json::Value,
    pub clusters: serde_json::Value,
}

/// 创建分组请求
#[derive(Debug, Deserialize, Validate)]
pub struct AddGroupRequest {
    #[validate(length(min = 1, max = 64, message = "group name must be 1-64 characters"))]
    pub name: String,
}

/// 批量分配/解除分组请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGroupsRequest {
    #[serde(default)]
    pub group_uuids: Vec<String>,
    #[serde(default)]
    pub cluster_ids: Vec<String>,
}

/// 整体替换集群分组请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditClusterGroupsRequest {
    #[serde(default)]
    pub group_uuids: Vec<String>,
}

/// Legacy single-group request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupClustersRequest {
    #[serde(default)]
    pub cluster_ids: Vec<String>,
}

/// 成员变更结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MembershipResult {
    pub modified: u64,
}
