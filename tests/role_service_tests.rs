//! 角色与权限目录服务集成测试
//!
//! 覆盖：删除前的引用完整性保护（InUse）、幂等的权限指派、
//! 名称/权限码唯一性与版本冲突

mod common;

use backoffice_system::error::AppError;
use backoffice_system::models::role::{
    CreatePermissionRequest, CreateRoleRequest, PermissionKind, UpdateRoleRequest,
};
use common::*;

const ROLE_ADMIN_CODES: &[&str] = &[
    "role.create",
    "role.update",
    "role.delete",
    "role.read",
    "role.assignPermission",
    "role.removePermission",
    "permission.create",
    "permission.delete",
    "user.assignRole",
    "user.removeRole",
];

#[tokio::test]
async fn test_delete_role_in_use_then_after_unassignment() {
    let harness = setup();
    let store = &harness.store;
    let admin = seed_operator(store, "admin", ROLE_ADMIN_CODES).await;
    let member = seed_user(store, "member").await;
    let ctx = ctx_for(&admin);

    let role = harness
        .roles
        .create_role(
            &ctx,
            CreateRoleRequest {
                name: "cashier".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    harness.users.assign_role(&ctx, member.id, role.id).await.unwrap();

    // 仍有活跃指派引用该角色
    let result = harness.roles.delete_role(&ctx, role.id, 1).await;
    assert!(matches!(result, Err(AppError::InUse("role"))));

    // 解除指派后同一删除调用（携带正确版本）成功
    harness.users.remove_role(&ctx, member.id, role.id).await.unwrap();
    harness.roles.delete_role(&ctx, role.id, 1).await.unwrap();
}

#[tokio::test]
async fn test_assign_permissions_is_idempotent() {
    let harness = setup();
    let store = &harness.store;
    let admin = seed_operator(store, "admin", ROLE_ADMIN_CODES).await;
    let ctx = ctx_for(&admin);

    let role = harness
        .roles
        .create_role(
            &ctx,
            CreateRoleRequest {
                name: "appraiser".to_string(),
                description: Some("鉴定师".to_string()),
            },
        )
        .await
        .unwrap();
    let read = harness
        .roles
        .create_permission(
            &ctx,
            CreatePermissionRequest {
                code: "appraisal.read".to_string(),
                name: "查看鉴定".to_string(),
                kind: PermissionKind::Function,
                route_path: None,
            },
        )
        .await
        .unwrap();
    let write = harness
        .roles
        .create_permission(
            &ctx,
            CreatePermissionRequest {
                code: "appraisal.write".to_string(),
                name: "出具鉴定".to_string(),
                kind: PermissionKind::Function,
                route_path: None,
            },
        )
        .await
        .unwrap();

    let newly = harness
        .roles
        .assign_permissions(&ctx, role.id, &[read.id, write.id])
        .await
        .unwrap();
    assert_eq!(newly, 2);

    // 第二次指派同样的配对：零新增，不报错
    let newly = harness
        .roles
        .assign_permissions(&ctx, role.id, &[read.id, write.id])
        .await
        .unwrap();
    assert_eq!(newly, 0);

    let held = harness.roles.role_permissions(&ctx, role.id).await.unwrap();
    assert_eq!(held.len(), 2);

    let catalog = harness.roles.list_permissions(&ctx).await.unwrap();
    assert!(catalog.iter().any(|p| p.code == "appraisal.read"));
}

#[tokio::test]
async fn test_delete_permission_in_use() {
    let harness = setup();
    let store = &harness.store;
    let admin = seed_operator(store, "admin", ROLE_ADMIN_CODES).await;
    let ctx = ctx_for(&admin);

    let role = harness
        .roles
        .create_role(
            &ctx,
            CreateRoleRequest {
                name: "clerk".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    let permission = harness
        .roles
        .create_permission(
            &ctx,
            CreatePermissionRequest {
                code: "intake.create".to_string(),
                name: "收货建单".to_string(),
                kind: PermissionKind::Function,
                route_path: None,
            },
        )
        .await
        .unwrap();
    harness
        .roles
        .assign_permissions(&ctx, role.id, &[permission.id])
        .await
        .unwrap();

    let result = harness.roles.delete_permission(&ctx, permission.id, 1).await;
    assert!(matches!(result, Err(AppError::InUse("permission"))));

    // 移除配对后删除成功
    let removed = harness
        .roles
        .remove_permission(&ctx, role.id, permission.id)
        .await
        .unwrap();
    assert!(removed);
    harness.roles.delete_permission(&ctx, permission.id, 1).await.unwrap();
}

#[tokio::test]
async fn test_remove_permission_reports_whether_pair_existed() {
    let harness = setup();
    let store = &harness.store;
    let admin = seed_operator(store, "admin", ROLE_ADMIN_CODES).await;
    let ctx = ctx_for(&admin);

    let role = harness
        .roles
        .create_role(
            &ctx,
            CreateRoleRequest {
                name: "empty-role".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    let permission = harness
        .roles
        .create_permission(
            &ctx,
            CreatePermissionRequest {
                code: "void.read".to_string(),
                name: "无配对权限".to_string(),
                kind: PermissionKind::Function,
                route_path: None,
            },
        )
        .await
        .unwrap();

    let removed = harness
        .roles
        .remove_permission(&ctx, role.id, permission.id)
        .await
        .unwrap();
    assert!(!removed);
}

#[tokio::test]
async fn test_role_name_unique_among_active() {
    let harness = setup();
    let store = &harness.store;
    let admin = seed_operator(store, "admin", ROLE_ADMIN_CODES).await;
    let ctx = ctx_for(&admin);

    harness
        .roles
        .create_role(
            &ctx,
            CreateRoleRequest {
                name: "manager".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();

    let result = harness
        .roles
        .create_role(
            &ctx,
            CreateRoleRequest {
                name: "manager".to_string(),
                description: None,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Duplicate("role name"))));

    // 改名撞到其他活跃角色同样报 Duplicate
    let other = harness
        .roles
        .create_role(
            &ctx,
            CreateRoleRequest {
                name: "supervisor".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    let result = harness
        .roles
        .update_role(
            &ctx,
            other.id,
            1,
            UpdateRoleRequest {
                name: Some("manager".to_string()),
                description: None,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Duplicate("role name"))));

    let roles = harness.roles.list_roles(&ctx).await.unwrap();
    assert!(roles.iter().any(|r| r.name == "manager"));
    assert!(roles.iter().any(|r| r.name == "supervisor"));
}

#[tokio::test]
async fn test_duplicate_permission_code_rejected() {
    let harness = setup();
    let store = &harness.store;
    let admin = seed_operator(store, "admin", ROLE_ADMIN_CODES).await;
    let ctx = ctx_for(&admin);

    harness
        .roles
        .create_permission(
            &ctx,
            CreatePermissionRequest {
                code: "serviceOrder.buyback.read".to_string(),
                name: "查看回收单".to_string(),
                kind: PermissionKind::Route,
                route_path: Some("/orders/buyback".to_string()),
            },
        )
        .await
        .unwrap();

    let result = harness
        .roles
        .create_permission(
            &ctx,
            CreatePermissionRequest {
                code: "serviceOrder.buyback.read".to_string(),
                name: "重复权限".to_string(),
                kind: PermissionKind::Function,
                route_path: None,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Duplicate("permission code"))));
}

#[tokio::test]
async fn test_update_role_with_stale_version_conflicts() {
    let harness = setup();
    let store = &harness.store;
    let admin = seed_operator(store, "admin", ROLE_ADMIN_CODES).await;
    let ctx = ctx_for(&admin);

    let role = harness
        .roles
        .create_role(
            &ctx,
            CreateRoleRequest {
                name: "shifting".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();

    harness
        .roles
        .update_role(
            &ctx,
            role.id,
            1,
            UpdateRoleRequest {
                name: None,
                description: Some("第一次".to_string()),
            },
        )
        .await
        .unwrap();

    let result = harness
        .roles
        .update_role(
            &ctx,
            role.id,
            1,
            UpdateRoleRequest {
                name: None,
                description: Some("第二次".to_string()),
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Conflict { .. })));
}

#[tokio::test]
async fn test_assigned_permissions_flow_into_resolution() {
    let harness = setup();
    let store = &harness.store;
    let admin = seed_operator(store, "admin", ROLE_ADMIN_CODES).await;
    let member = seed_user(store, "member").await;
    let ctx = ctx_for(&admin);

    let role = harness
        .roles
        .create_role(
            &ctx,
            CreateRoleRequest {
                name: "pricing".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    let permission = harness
        .roles
        .create_permission(
            &ctx,
            CreatePermissionRequest {
                code: "price.update".to_string(),
                name: "调价".to_string(),
                kind: PermissionKind::Function,
                route_path: None,
            },
        )
        .await
        .unwrap();
    harness
        .roles
        .assign_permissions(&ctx, role.id, &[permission.id])
        .await
        .unwrap();
    harness.users.assign_role(&ctx, member.id, role.id).await.unwrap();

    assert!(harness.permissions.authorize(member.id, "price.update").await.unwrap());

    // 移除配对后即时生效
    harness
        .roles
        .remove_permission(&ctx, role.id, permission.id)
        .await
        .unwrap();
    assert!(!harness.permissions.authorize(member.id, "price.update").await.unwrap());
}
