//! Channel domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 频道：Kubernetes 清单配置包
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub uuid: String,
    pub org_id: String,
    pub name: String,
    pub owner: String,
    pub versions: Vec<ChannelVersion>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelVersion {
    pub uuid: String,
    pub name: String,
}

impl Channel {
    pub fn version(&self, version_uuid: &str) -> Option<&ChannelVersion> {
        self.versions.iter().find(|v| v.uuid == version_uuid)
    }
}

/// 创建频道请求
#[derive(Debug, Deserialize, Validate)]
pub struct AddChannelRequest {
    #[validate(length(min = 1, max = 64, message = "channel name must be 1-64 characters"))]
    pub name: String,
}

/// 添加频道版本请求
#[derive(Debug, Deserialize, Validate)]
pub struct AddChannelVersionRequest {
    #[validate(length(min = 1, max = 64, message = "version name must be 1-64 characters"))]
    pub name: String,
}
