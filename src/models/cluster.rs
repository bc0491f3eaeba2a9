//! Cluster domain models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::sync::SyncedIdentity;

/// 注册状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegState {
    Registering,
    Registered,
}

impl RegState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegState::Registering => "registering",
            RegState::Registered => "registered",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "registering" => Some(RegState::Registering),
            "registered" => Some(RegState::Registered),
            _ => None,
        }
    }
}

/// 集群上保存的分组成员投影
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub uuid: String,
    pub name: String,
}

/// 已注册的目标环境
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub cluster_id: String,
    pub org_id: String,
    pub name: String,
    pub registration: serde_json::Value,
    pub reg_state: RegState,
    pub groups: Vec<GroupRef>,
    #[serde(default)]
    pub synced_identities: Vec<SyncedIdentity>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Cluster {
    pub fn in_group(&self, group_uuid: &str) -> bool {
        self.groups.iter().any(|g| g.uuid == group_uuid)
    }

    /// 按身份 id 查找同步记录
    pub fn synced_identity(&self, identity_id: &str) -> Option<&SyncedIdentity> {
        self.synced_identities.iter().find(|s| s.id == identity_id)
    }

    pub fn activity(&self, now: DateTime<Utc>, windows: &ActivityWindows) -> ClusterActivity {
        let idle = now - self.updated;
        if idle >= windows.zombie {
            ClusterActivity::Zombie
        } else if idle >= windows.inactive {
            ClusterActivity::Inactive
        } else {
            ClusterActivity::Active
        }
    }
}

/// 活跃度分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterActivity {
    Active,
    Inactive,
    Zombie,
}

/// 活跃度分类窗口
#[derive(Debug, Clone, Copy)]
pub struct ActivityWindows {
    pub inactive: Duration,
    pub zombie: Duration,
}

impl Default for ActivityWindows {
    fn default() -> Self {
        Self {
            inactive: Duration::days(1),
            zombie: Duration::days(30),
        }
    }
}

/// Cluster listing entry with its activity classification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    #[serde(flatten)]
    pub cluster: Cluster,
    pub activity: ClusterActivity,
}

/// 注册集群请求
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterClusterRequest {
    #[validate(length(min = 1, max = 128, message = "cluster name must be 1-128 characters"))]
    pub name: String,
    #[serde(default)]
    pub registration: serde_json::Value,
}

/// 更新注册状态请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRegStateRequest {
    pub reg_state: RegState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_updated_at(updated: DateTime<Utc>) -> Cluster {
        Cluster {
            cluster_id: "c1".to_string(),
            org_id: "org".to_string(),
            name: "c1".to_string(),
            registration: serde_json::json!({}),
            reg_state: RegState::Registered,
            groups: vec![],
            synced_identities: vec![],
            created: updated,
            updated,
        }
    }

    #[test]
    fn test_activity_classification() {
        let now = Utc::now();
        let windows = ActivityWindows::default();

        let fresh = cluster_updated_at(now - Duration::hours(2));
        assert_eq!(fresh.activity(now, &windows), ClusterActivity::Active);

        let stale = cluster_updated_at(now - Duration::days(2));
        assert_eq!(stale.activity(now, &windows), ClusterActivity::Inactive);

        let dead = cluster_updated_at(now - Duration::days(45));
        assert_eq!(dead.activity(now, &windows), ClusterActivity::Zombie);
    }

    #[test]
    fn test_reg_state_parse() {
        assert_eq!(RegState::parse("registering"), Some(RegState::Registering));
        assert_eq!(RegState::parse("registered"), Some(RegState::Registered));
        assert_eq!(RegState::parse("deleted"), None);
    }
}
