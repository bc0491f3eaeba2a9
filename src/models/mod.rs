//! 数据模型模块
//! 租户、身份、集群、分组、频道、订阅以及身份同步记录

pub mod channel;
pub mod cluster;
pub mod group;
pub mod identity;
pub mod organization;
pub mod subscription;
pub mod sync;

pub use channel::*;
pub use cluster::*;
pub use group::*;
pub use identity::*;
pub use organization::*;
pub use subscription::*;
pub use sync::*;
