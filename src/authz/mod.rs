//! 细粒度授权
//! 动作/资源类型分类、属性提取、授权引擎与策略后端

pub mod attributes;
pub mod engine;
pub mod policy;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use attributes::{extract, Attributes};
pub use engine::{AuthzEngine, AuthzResource, BulkTarget, Decision, PageRequest};
pub use policy::{
    Grant, GrantPolicy, OrgMemberPolicy, PolicyBackend, PolicyBackendKind, PolicyRegistry,
    ResourceSelector,
};

/// 操作动作
///
/// 每个接口声明自己的动作，不从 HTTP 方法推断。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Manage,
    Create,
    Update,
    Delete,
    Attach,
    Detach,
    Register,
    #[serde(rename = "manageversion")]
    ManageVersion,
    #[serde(rename = "setversion")]
    SetVersion,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::Read,
        Action::Write,
        Action::Manage,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Attach,
        Action::Detach,
        Action::Register,
        Action::ManageVersion,
        Action::SetVersion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Manage => "manage",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Attach => "attach",
            Action::Detach => "detach",
            Action::Register => "register",
            Action::ManageVersion => "manageversion",
            Action::SetVersion => "setversion",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 受保护的资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Channel,
    Cluster,
    Group,
    Subscription,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Channel => "channel",
            ResourceType::Cluster => "cluster",
            ResourceType::Group => "group",
            ResourceType::Subscription => "subscription",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
