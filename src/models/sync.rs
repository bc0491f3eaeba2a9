//! 身份同步模型
//! 每个 (订阅, 集群, 身份) 组合的同步结果以及订阅级别的计数聚合

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Failed,
    Pending,
    Unknown,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
            SyncStatus::Pending => "pending",
            SyncStatus::Unknown => "unknown",
        }
    }
}

/// 集群上按身份 id 保存的同步记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedIdentity {
    pub id: String,
    pub sync_status: SyncStatus,
    pub sync_message: Option<String>,
    pub synced_at: DateTime<Utc>,
}

impl SyncedIdentity {
    pub fn new(id: &str, sync_status: SyncStatus, sync_message: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            sync_status,
            sync_message,
            synced_at: Utc::now(),
        }
    }
}

/// 订阅级别的同步计数
///
/// 四个计数之和恒等于可达的 (集群, 身份) 组合数量。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySyncStatus {
    pub synced_count: u32,
    pub failed_count: u32,
    pub pending_count: u32,
    pub unknown_count: u32,
    /// 仍有排队中的同步任务，计数可能尚未反映最近一次成员变更
    #[serde(default)]
    pub propagation_pending: bool,
}

impl IdentitySyncStatus {
    pub fn record(&mut self, status: SyncStatus) {
        match status {
            SyncStatus::Synced => self.synced_count += 1,
            SyncStatus::Failed => self.failed_count += 1,
            SyncStatus::Pending => self.pending_count += 1,
            SyncStatus::Unknown => self.unknown_count += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.synced_count + self.failed_count + self.pending_count + self.unknown_count
    }
}

/// 订阅可达集群视图中的单个集群
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSyncView {
    pub cluster_id: String,
    pub name: String,
    pub sync_status: SyncStatus,
    pub synced_identities: Vec<SyncedIdentity>,
}

/// 订阅引用的分组及其成员集群
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupObj {
    pub uuid: String,
    pub name: String,
    pub clusters: Vec<ClusterSyncView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_total() {
        let mut status = IdentitySyncStatus::default();
        for s in [
            SyncStatus::Synced,
            SyncStatus::Failed,
            SyncStatus::Failed,
            SyncStatus::Unknown,
            SyncStatus::Pending,
        ] {
            status.record(s);
        }

        assert_eq!(status.synced_count, 1);
        assert_eq!(status.failed_count, 2);
        assert_eq!(status.pending_count, 1);
        assert_eq!(status.unknown_count, 1);
        assert_eq!(status.total(), 5);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(IdentitySyncStatus::default()).unwrap();
        assert!(json.get("syncedCount").is_some());
        assert!(json.get("unknownCount").is_some());
    }
}
