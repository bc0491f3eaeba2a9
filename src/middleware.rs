//! HTTP 中间件与应用状态
//! 请求追踪、共享服务实例

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    auth::{IdentityResolver, JwtService},
    authz::{AuthzEngine, GrantPolicy, PolicyBackendKind, PolicyRegistry},
    config::AppConfig,
    error::{AppError, ErrorResponse},
    services::{
        ChannelService, ClusterService, GroupService, IdentitySyncer, MembershipService,
        RolloutService, SubscriptionService, SyncQueue,
    },
    store::ModelStore,
};

/// 应用状态
///
/// 服务使用 Arc 包装，请求之间共享同一实例。
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn ModelStore>,
    pub jwt_service: Arc<JwtService>,
    pub identity_resolver: Arc<IdentityResolver>,
    pub authz: Arc<AuthzEngine>,
    /// 授权管理接口写入的进程内授权表
    pub grants: Arc<GrantPolicy>,
    pub sync_queue: Arc<SyncQueue>,
    pub membership: Arc<MembershipService>,
    pub rollout: Arc<RolloutService>,
    pub groups: Arc<GroupService>,
    pub channels: Arc<ChannelService>,
    pub clusters: Arc<ClusterService>,
    pub subscriptions: Arc<SubscriptionService>,
}

impl AppState {
    /// 组装所有服务；同步 worker 在此启动，需要在 tokio 运行时内调用
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ModelStore>,
        syncer: Arc<dyn IdentitySyncer>,
    ) -> Result<Self, AppError> {
        let jwt_service = Arc::new(JwtService::from_config(&config)?);
        let identity_resolver = Arc::new(IdentityResolver::new(
            store.clone(),
            jwt_service.clone(),
            config.security.org_key_header.clone(),
        ));

        let registry = PolicyRegistry::builtin();
        let policy = registry.select(PolicyBackendKind::from_config(&config.authz))?;
        tracing::info!(
            policy = policy.name(),
            store = store.backend_name(),
            "Authorization policy selected"
        );
        let authz = Arc::new(AuthzEngine::new(
            store.clone(),
            policy,
            config.authz.page_size_max,
        ));

        let sync_queue = SyncQueue::start(store.clone(), syncer, &config.sync);
        let rollout = Arc::new(RolloutService::new(store.clone(), sync_queue.clone()));
        let membership = Arc::new(MembershipService::new(
            store.clone(),
            authz.clone(),
            sync_queue.clone(),
        ));
        let groups = Arc::new(GroupService::new(store.clone(), authz.clone()));
        let channels = Arc::new(ChannelService::new(store.clone(), authz.clone()));
        let clusters = Arc::new(ClusterService::new(
            store.clone(),
            authz.clone(),
            config.activity_windows(),
        ));
        let subscriptions = Arc::new(SubscriptionService::new(
            store.clone(),
            authz.clone(),
            rollout.clone(),
            sync_queue.clone(),
        ));

        Ok(Self {
            config,
            store,
            jwt_service,
            identity_resolver,
            authz,
            grants: registry.grants(),
            sync_queue,
            membership,
            rollout,
            groups,
            channels,
            clusters,
            subscriptions,
        })
    }
}

/// 请求追踪中间件生成的 request_id，供认证中间件复用
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let method = req.method().clone();
    let uri = req.uri().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    async move {
        let start = Instant::now();
        let mut response = next.run(req).await;
        let elapsed = start.elapsed();

        let status = response.status().as_u16();
        let method_name = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            "PUT" => "PUT",
            "DELETE" => "DELETE",
            "PATCH" => "PATCH",
            _ => "UNKNOWN",
        };
        let status_code = match status {
            200 => "200",
            201 => "201",
            204 => "204",
            400 => "400",
            401 => "401",
            403 => "403",
            404 => "404",
            500 => "500",
            _ => "other",
        };

        metrics::counter!("http_requests_total", "method" => method_name, "status" => status_code)
            .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            method = %method,
            uri = %uri,
            status = status,
            elapsed_ms = elapsed.as_millis(),
            "Request completed"
        );

        // 错误响应体中的 request_id 与响应头保持一致
        if let Some(mut error) = response.extensions_mut().remove::<ErrorResponse>() {
            error.error.request_id = request_id.clone();
            if let Ok(bytes) = serde_json::to_vec(&error) {
                *response.body_mut() = Body::from(bytes);
                response.headers_mut().remove(header::CONTENT_LENGTH);
            }
        }

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::UnavailableSyncer;
    use crate::store::MemoryStore;

    #[test]
    fn test_extract_or_generate_trace_id() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", "test-trace-123".parse().unwrap());

        let trace_id = extract_or_generate_trace_id(&headers);
        assert_eq!(trace_id, "test-trace-123");

        let headers = HeaderMap::new();
        let trace_id = extract_or_generate_trace_id(&headers);
        assert!(!trace_id.is_empty());
        assert_ne!(trace_id, "test-trace-123");
    }

    #[tokio::test]
    async fn test_app_state_selects_policy_from_config() {
        let mut config = crate::config::tests::test_config();
        let state = AppState::new(
            config.clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(UnavailableSyncer),
        )
        .unwrap();
        assert_eq!(state.authz.policy_name(), "grants");

        config.authz.fga_enabled = false;
        let state = AppState::new(config, Arc::new(MemoryStore::new()), Arc::new(UnavailableSyncer))
            .unwrap();
        assert_eq!(state.authz.policy_name(), "org_member");
    }
}
