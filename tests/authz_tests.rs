//! 授权引擎集成测试
//!
//! 租户隔离、集合过滤、单对象查询的 not found / forbidden 区分以及批量两阶段检查

use fleet_authz::{
    authz::{Action, Attributes, BulkTarget, PageRequest, ResourceType},
    error::AppError,
    models::Identity,
};

mod common;
use common::{create_channel, create_cluster, create_group, TestApp, ORG, OTHER_ORG};

#[tokio::test]
async fn test_cross_org_is_denied_for_every_action() {
    let app = TestApp::new().await;
    create_channel(&app.store, OTHER_ORG, "foreign", "foreign").await;
    // 即使策略允许所有操作，跨租户依然拒绝
    app.grant_all(&app.outsider, ResourceType::Channel);

    let alice = Identity::from_user(&app.alice);
    let admin = Identity::from_user(&app.admin);
    let attrs = Attributes::by_id(ResourceType::Channel, "foreign");

    for action in Action::ALL {
        for identity in [&alice, &admin] {
            assert!(!app
                .state
                .authz
                .is_authorized(identity, OTHER_ORG, action, ResourceType::Channel, &attrs)
                .await
                .unwrap());
        }
    }
}

#[tokio::test]
async fn test_filter_on_empty_candidates_returns_empty() {
    let app = TestApp::new().await;
    let identities = [
        Identity::from_user(&app.alice),
        Identity::from_user(&app.admin),
        Identity::from_user(&app.outsider),
        Identity::for_org_key(ORG),
    ];

    for identity in &identities {
        for action in Action::ALL {
            let result = app
                .state
                .authz
                .filter_authorized::<fleet_authz::models::Group>(identity, ORG, action, vec![])
                .await
                .unwrap();
            assert!(result.is_empty());
        }
    }
}

#[tokio::test]
async fn test_fga_read_isolation_between_two_users() {
    let app = TestApp::new().await;
    let channel_a = create_channel(&app.store, ORG, "ch-a", "channel-a").await;
    let channel_b = create_channel(&app.store, ORG, "ch-b", "channel-b").await;
    app.grant_id(&app.alice, &[Action::Read], ResourceType::Channel, &channel_a.uuid);
    app.grant_id(&app.bob, &[Action::Read], ResourceType::Channel, &channel_b.uuid);

    let page = PageRequest::default();
    let alice_ctx = app.ctx(&app.alice);
    let bob_ctx = app.ctx(&app.bob);

    let seen_by_alice = app.state.channels.channels(&alice_ctx, ORG, &page).await.unwrap();
    assert_eq!(seen_by_alice.len(), 1);
    assert_eq!(seen_by_alice[0].uuid, channel_a.uuid);

    let seen_by_bob = app.state.channels.channels(&bob_ctx, ORG, &page).await.unwrap();
    assert_eq!(seen_by_bob.len(), 1);
    assert_eq!(seen_by_bob[0].uuid, channel_b.uuid);

    let err = app
        .state
        .channels
        .channel(
            &alice_ctx,
            ORG,
            &Attributes::by_id(ResourceType::Channel, &channel_b.uuid),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert!(err.user_message().contains("not allowed"));
    assert!(err.user_message().contains(&channel_b.uuid));
}

#[tokio::test]
async fn test_unknown_single_lookup_returns_none() {
    let app = TestApp::new().await;
    let ctx = app.ctx(&app.alice);

    assert!(app
        .state
        .channels
        .channel(
            &ctx,
            ORG,
            &Attributes::by_id(ResourceType::Channel, "does-not-exist"),
        )
        .await
        .unwrap()
        .is_none());
    assert!(app
        .state
        .groups
        .group(&ctx, ORG, &Attributes::by_name(ResourceType::Group, "nope"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_mutation_on_unknown_resource_is_not_found() {
    let app = TestApp::new().await;
    let ctx = app.ctx(&app.admin);

    let err = app
        .state
        .groups
        .remove_group(&ctx, ORG, "missing-group")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(err.user_message().contains("not found"));
}

#[tokio::test]
async fn test_admin_bypasses_grants_and_member_needs_them() {
    let app = TestApp::new().await;
    create_group(&app.store, ORG, "g1", "edge").await;
    let page = PageRequest::default();

    let admin_view = app
        .state
        .groups
        .groups(&app.ctx(&app.admin), ORG, &page)
        .await
        .unwrap();
    assert_eq!(admin_view.len(), 1);

    let member_view = app
        .state
        .groups
        .groups(&app.ctx(&app.alice), ORG, &page)
        .await
        .unwrap();
    assert!(member_view.is_empty());
}

#[tokio::test]
async fn test_bulk_unknown_target_is_query_error_before_forbidden() {
    let app = TestApp::new().await;
    create_group(&app.store, ORG, "g1", "edge").await;
    create_cluster(&app.store, ORG, "c1").await;
    let ctx = app.ctx(&app.alice);

    // alice 没有任何授权，但目标不存在时先返回不区分条目的 QueryError
    let targets = vec![
        BulkTarget::by_id(Action::Attach, ResourceType::Group, "g1"),
        BulkTarget::by_id(Action::Attach, ResourceType::Cluster, "ghost"),
    ];
    let err = app
        .state
        .authz
        .authorize_bulk(&ctx, ORG, "assignClusterGroups", &targets)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Query(_)));
    assert!(err.user_message().contains("Query assignClusterGroups error"));
    assert!(err.user_message().contains(&ctx.req_id));

    // 目标都存在时才进入逐项检查
    let targets = vec![
        BulkTarget::by_id(Action::Attach, ResourceType::Group, "g1"),
        BulkTarget::by_id(Action::Attach, ResourceType::Cluster, "c1"),
    ];
    let err = app
        .state
        .authz
        .authorize_bulk(&ctx, ORG, "assignClusterGroups", &targets)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert!(err.user_message().contains("not allowed to attach"));
}

#[tokio::test]
async fn test_bulk_cross_org_is_query_error() {
    let app = TestApp::new().await;
    create_group(&app.store, OTHER_ORG, "g9", "theirs").await;

    let err = app
        .state
        .authz
        .authorize_bulk(
            &app.ctx(&app.admin),
            OTHER_ORG,
            "unassignClusterGroups",
            &[BulkTarget::by_id(Action::Detach, ResourceType::Group, "g9")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Query(_)));
}

#[tokio::test]
async fn test_org_key_identity_may_act_on_clusters_only() {
    let app = TestApp::new().await;
    create_cluster(&app.store, ORG, "c1").await;
    create_group(&app.store, ORG, "g1", "edge").await;
    let agent = Identity::for_org_key(ORG);

    assert!(app
        .state
        .authz
        .is_authorized(
            &agent,
            ORG,
            Action::Update,
            ResourceType::Cluster,
            &Attributes::by_id(ResourceType::Cluster, "c1"),
        )
        .await
        .unwrap());
    assert!(!app
        .state
        .authz
        .is_authorized(
            &agent,
            ORG,
            Action::Read,
            ResourceType::Group,
            &Attributes::by_id(ResourceType::Group, "g1"),
        )
        .await
        .unwrap());
}

#[tokio::test]
async fn test_coarse_mode_lets_any_org_member_act() {
    let mut config = common::create_test_config();
    config.authz.fga_enabled = false;
    let app = TestApp::with_config(config, std::sync::Arc::new(
        fleet_authz::services::UnavailableSyncer,
    ))
    .await;
    create_channel(&app.store, ORG, "ch-a", "channel-a").await;
    create_channel(&app.store, OTHER_ORG, "ch-x", "channel-x").await;

    let channels = app
        .state
        .channels
        .channels(&app.ctx(&app.alice), ORG, &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(channels.len(), 1);

    let foreign = app
        .state
        .channels
        .channels(&app.ctx(&app.alice), OTHER_ORG, &PageRequest::default())
        .await
        .unwrap();
    assert!(foreign.is_empty());
}

#[tokio::test]
async fn test_pagination_applies_after_filtering() {
    let app = TestApp::new().await;
    for i in 0..6 {
        create_group(&app.store, ORG, &format!("g{}", i), &format!("group-{}", i)).await;
    }
    // alice 只能看到偶数编号
    for i in [0, 2, 4] {
        app.grant_id(&app.alice, &[Action::Read], ResourceType::Group, &format!("g{}", i));
    }
    let ctx = app.ctx(&app.alice);

    let first = app
        .state
        .groups
        .groups(
            &ctx,
            ORG,
            &PageRequest {
                limit: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let names: Vec<&str> = first.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["group-0", "group-2"]);

    let next = app
        .state
        .groups
        .groups(
            &ctx,
            ORG,
            &PageRequest {
                limit: Some(2),
                starting_after: Some("g2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].name, "group-4");

    // 游标指向无权访问的分组时不会回到第一页
    let hidden = app
        .state
        .groups
        .groups(
            &ctx,
            ORG,
            &PageRequest {
                limit: Some(2),
                starting_after: Some("g1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(hidden.is_empty());
}
