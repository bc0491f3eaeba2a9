//! 测试公共模块
//! 基于内存模型存储的应用状态、身份与数据夹具

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use fleet_authz::{
    auth::{OrgKeyGenerator, RequestContext},
    authz::{Action, Grant, ResourceSelector, ResourceType},
    config::{
        AppConfig, AuthzConfig, ClusterConfig, DatabaseConfig, LoggingConfig, SecurityConfig,
        ServerConfig, SyncConfig,
    },
    middleware::AppState,
    models::{
        Channel, ChannelVersion, Cluster, Group, Identity, OrgRole, Organization, RegState,
        Subscription, User,
    },
    services::{IdentitySyncer, UnavailableSyncer},
    store::{MemoryStore, ModelStore},
};
use http_body_util::BodyExt;
use secrecy::Secret;
use std::sync::Arc;
use tower::ServiceExt;

pub const ORG: &str = "org-1";
pub const OTHER_ORG: &str = "org-2";
pub const ORG_KEY: &str = "orgApiKey-testkeytestkeytestkeytestkeytestkey01";

/// 创建测试配置（不依赖环境变量）
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(), // 使用随机端口
            graceful_shutdown_timeout_secs: 5,
        },
        database: DatabaseConfig {
            url: None,
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            jwt_secret: Secret::new("test-secret-key-for-testing-only-min-32-chars".to_string()),
            access_token_exp_secs: 300,
            org_key_header: "org-key".to_string(),
        },
        authz: AuthzConfig {
            fga_enabled: true,
            batch_selection_limit: 2,
            page_size_max: 50,
        },
        sync: SyncConfig {
            queue_capacity: 64,
            worker_count: 2,
        },
        cluster: ClusterConfig {
            inactive_window_secs: 86_400,
            zombie_window_secs: 2_592_000,
        },
    }
}

/// 测试应用：状态、存储与预置身份
pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub admin: User,
    pub alice: User,
    pub bob: User,
    pub outsider: User,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(create_test_config(), Arc::new(UnavailableSyncer)).await
    }

    pub async fn with_config(config: AppConfig, syncer: Arc<dyn IdentitySyncer>) -> Self {
        let store = Arc::new(MemoryStore::new());

        let mut org = Organization::new(ORG, "acme");
        org.org_keys.push(OrgKeyGenerator::hash(ORG_KEY));
        store.create_org(org).await.unwrap();
        store
            .create_org(Organization::new(OTHER_ORG, "globex"))
            .await
            .unwrap();

        let admin = create_user(&store, "admin", ORG, OrgRole::Admin).await;
        let alice = create_user(&store, "alice", ORG, OrgRole::Member).await;
        let bob = create_user(&store, "bob", ORG, OrgRole::Member).await;
        let outsider = create_user(&store, "mallory", OTHER_ORG, OrgRole::Admin).await;

        let state = Arc::new(AppState::new(config, store.clone(), syncer).unwrap());

        Self {
            state,
            store,
            admin,
            alice,
            bob,
            outsider,
        }
    }

    pub fn router(&self) -> Router {
        fleet_authz::routes::create_router(self.state.clone())
    }

    pub fn ctx(&self, user: &User) -> RequestContext {
        RequestContext::new(format!("req-{}", user.id), Identity::from_user(user))
    }

    pub fn token(&self, user: &User) -> String {
        self.state.jwt_service.generate_access_token(user).unwrap()
    }

    /// 授予某用户对单个资源（按 id）的动作
    pub fn grant_id(&self, user: &User, actions: &[Action], resource_type: ResourceType, id: &str) {
        self.state.grants.grant(
            &user.org_id,
            &user.id,
            Grant {
                actions: actions.to_vec(),
                resource_type,
                selector: ResourceSelector::Id(id.to_string()),
            },
        );
    }

    /// 授予某用户对一类资源的全部动作
    pub fn grant_all(&self, user: &User, resource_type: ResourceType) {
        self.state.grants.grant(
            &user.org_id,
            &user.id,
            Grant {
                actions: vec![],
                resource_type,
                selector: ResourceSelector::Any,
            },
        );
    }

    pub async fn settle(&self) {
        self.state.sync_queue.await_propagation().await;
    }
}

pub async fn create_user(store: &MemoryStore, id: &str, org_id: &str, role: OrgRole) -> User {
    store
        .create_user(User {
            id: id.to_string(),
            org_id: org_id.to_string(),
            email: format!("{}@example.com", id),
            role,
            created: Utc::now(),
        })
        .await
        .unwrap()
}

pub async fn create_group(store: &MemoryStore, org_id: &str, uuid: &str, name: &str) -> Group {
    store
        .create_group(Group {
            uuid: uuid.to_string(),
            org_id: org_id.to_string(),
            name: name.to_string(),
            owner: "admin".to_string(),
            created: Utc::now(),
        })
        .await
        .unwrap()
}

pub async fn create_cluster(store: &MemoryStore, org_id: &str, cluster_id: &str) -> Cluster {
    store
        .create_cluster(Cluster {
            cluster_id: cluster_id.to_string(),
            org_id: org_id.to_string(),
            name: format!("{}-name", cluster_id),
            registration: serde_json::json!({ "name": cluster_id }),
            reg_state: RegState::Registered,
            groups: vec![],
            synced_identities: vec![],
            created: Utc::now(),
            updated: Utc::now(),
        })
        .await
        .unwrap()
}

pub async fn create_channel(store: &MemoryStore, org_id: &str, uuid: &str, name: &str) -> Channel {
    store
        .create_channel(Channel {
            uuid: uuid.to_string(),
            org_id: org_id.to_string(),
            name: name.to_string(),
            owner: "admin".to_string(),
            versions: vec![ChannelVersion {
                uuid: format!("{}-v1", uuid),
                name: "v1".to_string(),
            }],
            created: Utc::now(),
        })
        .await
        .unwrap()
}

pub async fn create_subscription(
    store: &MemoryStore,
    org_id: &str,
    uuid: &str,
    owner: &str,
    groups: &[&str],
) -> Subscription {
    store
        .create_subscription(Subscription {
            uuid: uuid.to_string(),
            org_id: org_id.to_string(),
            name: format!("{}-name", uuid),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            channel_uuid: "ch-1".to_string(),
            version_uuid: "ch-1-v1".to_string(),
            owner: owner.to_string(),
            created: Utc::now(),
            updated: Utc::now(),
        })
        .await
        .unwrap()
}

/// 发送请求并解析 JSON 响应
pub async fn send(
    router: Router,
    method: &str,
    uri: &str,
    auth: Option<(&str, &str)>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((name, value)) = auth {
        builder = builder.header(name, value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}
