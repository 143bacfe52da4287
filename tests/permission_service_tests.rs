//! 权限解析服务集成测试
//!
//! 覆盖：空角色主体、跨角色去重、通配段匹配、指派撤销后的
//! 权限回收，以及"授权-拒绝-记录"的端到端链路

mod common;

use backoffice_system::error::AppError;
use backoffice_system::models::role::Permission;
use backoffice_system::services::permission_service::enforce_permission;
use backoffice_system::store::{PermissionStore, RoleAssignmentStore, VersionedStore};
use common::*;

#[tokio::test]
async fn test_no_roles_means_empty_set_and_authorize_false() {
    let harness = setup();
    let user = seed_user(&harness.store, "lonely").await;

    // 没有任何角色指派：空集 + false，不是错误
    let effective = harness
        .permissions
        .resolve_effective_permissions(user.id)
        .await
        .unwrap();
    assert!(effective.is_empty());

    let allowed = harness.permissions.authorize(user.id, "user.read").await.unwrap();
    assert!(!allowed);

    let result = harness.permissions.require_permission(user.id, "user.read").await;
    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
async fn test_overlapping_roles_deduplicate_permissions() {
    let harness = setup();
    let store = &harness.store;

    let user = seed_user(store, "operator").await;
    let shared = seed_permission(store, "customer.read").await;
    let extra = seed_permission(store, "customer.update").await;

    // 两个角色都授予 customer.read
    let role_a = seed_role(store, "clerk").await;
    let role_b = seed_role(store, "manager").await;
    store
        .assign_permissions(role_a.id, &[shared.id], None)
        .await
        .unwrap();
    store
        .assign_permissions(role_b.id, &[shared.id, extra.id], None)
        .await
        .unwrap();
    seed_assignment(store, user.id, role_a.id).await;
    seed_assignment(store, user.id, role_b.id).await;

    let effective = harness
        .permissions
        .resolve_effective_permissions(user.id)
        .await
        .unwrap();

    // 去重：同一权限只出现一次
    assert_eq!(effective.len(), 2);
    let read_count = effective
        .permissions()
        .iter()
        .filter(|p| p.code == "customer.read")
        .count();
    assert_eq!(read_count, 1);

    // 解析出的集合可在请求范围内直接复用
    assert!(effective.covers("customer.read"));
    assert!(effective.covers("customer.*"));
    assert!(!effective.covers("customer.delete"));
}

#[tokio::test]
async fn test_wildcard_requires_equal_segment_count() {
    let harness = setup();
    let store = &harness.store;

    let holder = seed_operator(store, "holder", &["serviceOrder.buyback.read"]).await;
    assert!(harness
        .permissions
        .authorize(holder.id, "serviceOrder.*.read")
        .await
        .unwrap());

    // 段数不等的持有码不被通配模式覆盖
    let long_holder =
        seed_operator(store, "long-holder", &["serviceOrder.buyback.read.extra"]).await;
    assert!(!harness
        .permissions
        .authorize(long_holder.id, "serviceOrder.*.read")
        .await
        .unwrap());

    let short_holder = seed_operator(store, "short-holder", &["serviceOrder.read"]).await;
    assert!(!harness
        .permissions
        .authorize(short_holder.id, "serviceOrder.*.read")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_revoked_assignment_stops_contributing() {
    let harness = setup();
    let store = &harness.store;

    let user = seed_operator(store, "temp", &["report.read"]).await;
    assert!(harness.permissions.authorize(user.id, "report.read").await.unwrap());

    let role_ids = store.active_roles_for_user(user.id).await.unwrap();
    let role_id = role_ids[0];

    // 撤销后不再贡献权限
    store.remove_role(user.id, role_id, None).await.unwrap();
    assert!(!harness.permissions.authorize(user.id, "report.read").await.unwrap());

    // 撤销后的重新指派是合法的（唯一性只约束活跃行）
    store.assign_role(user.id, role_id, None).await.unwrap();
    assert!(harness.permissions.authorize(user.id, "report.read").await.unwrap());
}

#[tokio::test]
async fn test_soft_deleted_permission_excluded_from_resolution() {
    let harness = setup();
    let store = &harness.store;

    let user = seed_operator(store, "viewer", &["archive.read"]).await;
    assert!(harness.permissions.authorize(user.id, "archive.read").await.unwrap());

    let permission = store.find_by_code("archive.read").await.unwrap().unwrap();
    VersionedStore::<Permission>::conditional_soft_delete(
        store.as_ref(),
        permission.id,
        permission.version,
        None,
    )
    .await
    .unwrap();

    // 软删除的权限从解析中消失，但仍可按 id 寻址
    assert!(!harness.permissions.authorize(user.id, "archive.read").await.unwrap());
    let raw = VersionedStore::<Permission>::get_by_id(store.as_ref(), permission.id)
        .await
        .unwrap();
    assert!(raw.unwrap().is_deleted);
}

#[tokio::test]
async fn test_end_to_end_resolution_and_denial_recording() {
    let harness = setup();
    let store = &harness.store;

    // 主体 A：R1 -> {x.read}，R2 -> {y.write}
    let user = seed_user(store, "principal-a").await;
    let x_read = seed_permission(store, "x.read").await;
    let y_write = seed_permission(store, "y.write").await;
    let r1 = seed_role(store, "r1").await;
    let r2 = seed_role(store, "r2").await;
    store.assign_permissions(r1.id, &[x_read.id], None).await.unwrap();
    store.assign_permissions(r2.id, &[y_write.id], None).await.unwrap();
    seed_assignment(store, user.id, r1.id).await;
    seed_assignment(store, user.id, r2.id).await;

    let effective = harness
        .permissions
        .resolve_effective_permissions(user.id)
        .await
        .unwrap();
    let mut codes: Vec<&str> = effective.permissions().iter().map(|p| p.code.as_str()).collect();
    codes.sort();
    assert_eq!(codes, vec!["x.read", "y.write"]);

    assert!(harness.permissions.authorize(user.id, "x.read").await.unwrap());
    assert!(!harness.permissions.authorize(user.id, "z.read").await.unwrap());

    // 门卫在拒绝时落一条拒绝日志
    let ctx = ctx_for(&user);
    let result = enforce_permission(&harness.permissions, &harness.audit, &ctx, "z.read").await;
    assert!(matches!(result, Err(AppError::Forbidden)));

    let denials = harness.audit.query_denials(Some(user.id), 10).await.unwrap();
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].attempted_resource, "z.read");
    assert_eq!(denials[0].user_name, user.display_name);
    assert!(denials[0].trace_id.is_some());
}
