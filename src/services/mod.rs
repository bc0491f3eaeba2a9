//! Business logic services layer

pub mod channel_service;
pub mod cluster_service;
pub mod group_service;
pub mod membership_service;
pub mod rollout_service;
pub mod subscription_service;
pub mod sync_queue;

pub use channel_service::ChannelService;
pub use cluster_service::ClusterService;
pub use group_service::GroupService;
pub use membership_service::MembershipService;
pub use rollout_service::RolloutService;
pub use subscription_service::SubscriptionService;
pub use sync_queue::{IdentitySyncer, SyncError, SyncQueue, SyncTask, UnavailableSyncer};
