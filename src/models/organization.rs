//! Organization (tenant) domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 组织：租户边界
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    /// 主 org key 列表（仅保存 SHA-256 摘要）
    #[serde(default, skip_serializing)]
    pub org_keys: Vec<String>,
    /// 次级 org key 列表
    #[serde(default, skip_serializing)]
    pub org_keys2: Vec<OrgKeyEntry>,
    pub created: DateTime<Utc>,
}

/// Named org key with rotation metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgKeyEntry {
    pub uuid: String,
    pub name: String,
    pub key_hash: String,
    pub primary: bool,
}

impl Organization {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            org_keys: Vec::new(),
            org_keys2: Vec::new(),
            created: Utc::now(),
        }
    }

    /// 判断给定摘要是否属于本组织的任一 org key
    pub fn holds_key_hash(&self, key_hash: &str) -> bool {
        self.org_keys.iter().any(|k| k == key_hash)
            || self.org_keys2.iter().any(|k| k.key_hash == key_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holds_key_hash_checks_both_lists() {
        let mut org = Organization::new("org-1", "acme");
        org.org_keys.push("aaa".to_string());
        org.org_keys2.push(OrgKeyEntry {
            uuid: "k2".to_string(),
            name: "rotated".to_string(),
            key_hash: "bbb".to_string(),
            primary: false,
        });

        assert!(org.holds_key_hash("aaa"));
        assert!(org.holds_key_hash("bbb"));
        assert!(!org.holds_key_hash("ccc"));
    }
}
