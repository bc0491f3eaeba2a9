//! 身份与用户模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 组织内角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgRole {
    Admin,
    Member,
}

/// 外部用户存储中的用户
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub org_id: String,
    pub email: String,
    pub role: OrgRole,
    pub created: DateTime<Utc>,
}

/// 身份来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// 交互式调用方（Bearer 令牌）
    User,
    /// 非交互式调用方（org key）
    OrgKey,
}

/// 已认证的调用方，按请求构造，核心不持久化
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub org_id: String,
    pub kind: IdentityKind,
    /// org key 调用方没有用户级角色
    pub role: Option<OrgRole>,
    pub email: Option<String>,
}

impl Identity {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            org_id: user.org_id.clone(),
            kind: IdentityKind::User,
            role: Some(user.role),
            email: Some(user.email.clone()),
        }
    }

    /// 为 org key 调用方构造合成身份
    pub fn for_org_key(org_id: &str) -> Self {
        Self {
            id: format!("orgkey:{}", org_id),
            org_id: org_id.to_string(),
            kind: IdentityKind::OrgKey,
            role: None,
            email: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Some(OrgRole::Admin)
    }

    /// 日志与错误消息中使用的标识
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.id)
    }
}
