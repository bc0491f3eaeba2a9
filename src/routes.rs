//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer};

use crate::{handlers, middleware::AppState};

/// 请求体上限
const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 需要认证的路由，全部以组织为作用域
    let org_routes = Router::new()
        // 频道
        .route(
            "/channels",
            get(handlers::channels::list_channels).post(handlers::channels::add_channel),
        )
        .route(
            "/channels/by-name/{name}",
            get(handlers::channels::get_channel),
        )
        .route("/channels/{uuid}", get(handlers::channels::get_channel))
        .route(
            "/channels/{uuid}/versions",
            post(handlers::channels::add_channel_version),
        )

        // 集群
        .route(
            "/clusters",
            get(handlers::clusters::list_clusters).post(handlers::clusters::register_cluster),
        )
        .route(
            "/clusters/inactive",
            get(handlers::clusters::list_inactive_clusters),
        )
        .route("/clusters/zombie", get(handlers::clusters::list_zombie_clusters))
        .route(
            "/clusters/by-name/{name}",
            get(handlers::clusters::get_cluster),
        )
        .route(
            "/clusters/{cluster_id}",
            get(handlers::clusters::get_cluster).delete(handlers::clusters::delete_cluster),
        )
        .route(
            "/clusters/{cluster_id}/reg-state",
            put(handlers::clusters::update_reg_state),
        )
        .route(
            "/clusters/{cluster_id}/groups",
            put(handlers::clusters::edit_cluster_groups),
        )
        .route(
            "/clusters/{cluster_id}/subscriptions",
            get(handlers::clusters::list_cluster_subscriptions),
        )

        // 分组与成员关系
        .route(
            "/groups",
            get(handlers::groups::list_groups).post(handlers::groups::add_group),
        )
        .route("/groups/assign", post(handlers::groups::assign_cluster_groups))
        .route(
            "/groups/unassign",
            post(handlers::groups::unassign_cluster_groups),
        )
        .route(
            "/groups/by-name/{name}",
            get(handlers::groups::get_group).delete(handlers::groups::remove_group_by_name),
        )
        .route(
            "/groups/{uuid}",
            get(handlers::groups::get_group).delete(handlers::groups::remove_group),
        )
        .route("/groups/{uuid}/clusters", post(handlers::groups::group_clusters))
        .route(
            "/groups/{uuid}/clusters/remove",
            post(handlers::groups::ungroup_clusters),
        )

        // 订阅
        .route(
            "/subscriptions",
            get(handlers::subscriptions::list_subscriptions)
                .post(handlers::subscriptions::add_subscription),
        )
        .route(
            "/subscriptions/by-name/{name}",
            get(handlers::subscriptions::get_subscription),
        )
        .route(
            "/subscriptions/{uuid}",
            get(handlers::subscriptions::get_subscription)
                .delete(handlers::subscriptions::remove_subscription),
        )

        // 授权条目管理
        .route("/grants", post(handlers::grants::add_grant))
        .route(
            "/grants/{identity_id}",
            get(handlers::grants::list_grants).delete(handlers::grants::revoke_grants),
        );

    let authenticated_routes = Router::new()
        .nest("/api/v1/orgs/{org_id}", org_routes)
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::auth_middleware,
        ));

    // 组合所有路由；批量查询保护在认证之前执行
    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::guard::batch_guard_middleware,
        ))
        .layer(axum::middleware::from_fn(crate::middleware::request_tracking_middleware))
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .with_state(state)
}
