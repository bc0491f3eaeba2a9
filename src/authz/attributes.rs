//! 授权属性提取
//!
//! 从请求参数中推导用于区分单个资源的属性集合，例如 `{channelName}`、
//! `{subscriptionId}`。列表级操作得到空集合，由引擎按集合范围过滤。

use std::collections::BTreeMap;

use super::ResourceType;

/// 资源属性（键为稳定的属性名）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: BTreeMap<&'static str, String>,
}

/// (标识键, 名称键)
fn keys(resource_type: ResourceType) -> (&'static str, &'static str) {
    match resource_type {
        ResourceType::Channel => ("channelUuid", "channelName"),
        ResourceType::Cluster => ("clusterId", "clusterName"),
        ResourceType::Group => ("groupUuid", "groupName"),
        ResourceType::Subscription => ("subscriptionId", "subscriptionName"),
    }
}

/// 每种资源类型接受的请求参数别名
fn id_params(resource_type: ResourceType) -> &'static [&'static str] {
    match resource_type {
        ResourceType::Channel => &["channelUuid", "uuid"],
        ResourceType::Cluster => &["clusterId", "cluster_id", "id"],
        ResourceType::Group => &["groupUuid", "uuid"],
        ResourceType::Subscription => &["subscriptionId", "subscriptionUuid", "uuid"],
    }
}

fn name_params(resource_type: ResourceType) -> &'static [&'static str] {
    match resource_type {
        ResourceType::Channel => &["channelName", "name"],
        ResourceType::Cluster => &["clusterName", "name"],
        ResourceType::Group => &["groupName", "name"],
        ResourceType::Subscription => &["subscriptionName", "name"],
    }
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由已知资源构造完整属性
    pub fn for_resource(resource_type: ResourceType, id: &str, name: &str) -> Self {
        let (id_key, name_key) = keys(resource_type);
        let mut entries = BTreeMap::new();
        entries.insert(id_key, id.to_string());
        entries.insert(name_key, name.to_string());
        Self { entries }
    }

    pub fn by_id(resource_type: ResourceType, id: &str) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(keys(resource_type).0, id.to_string());
        Self { entries }
    }

    pub fn by_name(resource_type: ResourceType, name: &str) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(keys(resource_type).1, name.to_string());
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn id(&self, resource_type: ResourceType) -> Option<&str> {
        self.get(keys(resource_type).0)
    }

    pub fn name(&self, resource_type: ResourceType) -> Option<&str> {
        self.get(keys(resource_type).1)
    }

    /// 错误消息中使用的标识：优先名称，其次 id
    pub fn identifier(&self, resource_type: ResourceType) -> Option<&str> {
        self.name(resource_type).or_else(|| self.id(resource_type))
    }
}

/// 从请求参数中提取资源属性
///
/// 纯函数；参数中没有可识别的 id 或名称时返回空集合。
pub fn extract(resource_type: ResourceType, params: &[(&str, &str)]) -> Attributes {
    let lookup = |aliases: &[&str]| {
        aliases.iter().find_map(|alias| {
            params
                .iter()
                .find(|(k, v)| k == alias && !v.trim().is_empty())
                .map(|(_, v)| v.to_string())
        })
    };

    let (id_key, name_key) = keys(resource_type);
    let mut entries = BTreeMap::new();
    if let Some(id) = lookup(id_params(resource_type)) {
        entries.insert(id_key, id);
    }
    if let Some(name) = lookup(name_params(resource_type)) {
        entries.insert(name_key, name);
    }
    Attributes { entries }
}
