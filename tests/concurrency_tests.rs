//! 并发控制协议集成测试
//!
//! 覆盖：版本严格 +1、过期版本冲突且状态不变、NotFound 与
//! Conflict 的区分、软删除的版本检查，以及同版本并发竞争

mod common;

use backoffice_system::error::AppError;
use backoffice_system::models::user::User;
use backoffice_system::services::concurrency::{
    soft_delete_with_version_check, update_with_version_check,
};
use backoffice_system::store::VersionedStore;
use common::*;
use uuid::Uuid;

#[tokio::test]
async fn test_version_increments_by_exactly_one() {
    let harness = setup();
    let store = harness.store.as_ref();
    let user = seed_user(store, "versioned").await;
    assert_eq!(user.version, 1);

    // 连续推进到版本 3
    for expected in 1..=2 {
        let mutation = update_with_version_check(store, user.id, expected, |u: &mut User| {
            u.display_name = format!("revision {}", expected);
        })
        .await
        .unwrap();
        assert_eq!(mutation.before.version, expected);
        assert_eq!(mutation.after.version, expected + 1);
    }

    // 版本 3 的聚合：携带 expected = 3 的更新成功，存储版本变为 4
    let mutation = update_with_version_check(store, user.id, 3, |u: &mut User| {
        u.display_name = "revision 3".to_string();
    })
    .await
    .unwrap();
    assert_eq!(mutation.after.version, 4);

    let stored = VersionedStore::<User>::get_by_id(store, user.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 4);
}

#[tokio::test]
async fn test_stale_version_conflicts_and_state_is_unchanged() {
    let harness = setup();
    let store = harness.store.as_ref();
    let user = seed_user(store, "contended").await;

    update_with_version_check(store, user.id, 1, |u: &mut User| {
        u.display_name = "winner".to_string();
    })
    .await
    .unwrap();

    // 仍然携带 expected = 1 的第二个写入者输掉竞争
    let result = update_with_version_check(store, user.id, 1, |u: &mut User| {
        u.display_name = "loser".to_string();
    })
    .await;

    match result {
        Err(AppError::Conflict {
            target,
            expected,
            actual,
        }) => {
            assert_eq!(target, "user");
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected conflict, got {:?}", other.map(|m| m.after)),
    }

    // 被拒绝的变更不触碰存储状态
    let stored = VersionedStore::<User>::get_by_id(store, user.id).await.unwrap().unwrap();
    assert_eq!(stored.display_name, "winner");
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn test_missing_aggregate_is_not_found() {
    let harness = setup();
    let store = harness.store.as_ref();

    let result = update_with_version_check(store, Uuid::new_v4(), 1, |u: &mut User| {
        u.display_name = "ghost".to_string();
    })
    .await;
    assert!(matches!(result, Err(AppError::NotFound("user"))));

    let result =
        soft_delete_with_version_check::<User, _>(store, Uuid::new_v4(), 1, None).await;
    assert!(matches!(result, Err(AppError::NotFound("user"))));
}

#[tokio::test]
async fn test_soft_deleted_aggregate_is_not_found_but_addressable() {
    let harness = setup();
    let store = harness.store.as_ref();
    let user = seed_user(store, "leaving").await;

    let before = soft_delete_with_version_check::<User, _>(store, user.id, 1, None)
        .await
        .unwrap();
    assert_eq!(before.version, 1);
    assert!(!before.is_deleted);

    // 软删除后的更新按 NotFound 处理
    let result = update_with_version_check(store, user.id, 2, |u: &mut User| {
        u.display_name = "too late".to_string();
    })
    .await;
    assert!(matches!(result, Err(AppError::NotFound("user"))));

    // 但行本身仍可按 id 读到，供审计/历史使用
    let raw = VersionedStore::<User>::get_by_id(store, user.id).await.unwrap().unwrap();
    assert!(raw.is_deleted);
    assert_eq!(raw.version, 2);
}

#[tokio::test]
async fn test_soft_delete_requires_current_version() {
    let harness = setup();
    let store = harness.store.as_ref();
    let user = seed_user(store, "guarded").await;

    update_with_version_check(store, user.id, 1, |u: &mut User| {
        u.display_name = "bumped".to_string();
    })
    .await
    .unwrap();

    let result = soft_delete_with_version_check::<User, _>(store, user.id, 1, None).await;
    assert!(matches!(
        result,
        Err(AppError::Conflict {
            expected: 1,
            actual: 2,
            ..
        })
    ));

    // 携带当前版本即可成功
    soft_delete_with_version_check::<User, _>(store, user.id, 2, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_writers_exactly_one_wins() {
    let harness = setup();
    let store = harness.store.as_ref();
    let user = seed_user(store, "raced").await;

    // 两个写入者同时携带 expected = 1：条件写入保证恰有一个赢得版本号
    let (first, second) = tokio::join!(
        update_with_version_check(store, user.id, 1, |u: &mut User| {
            u.display_name = "writer-a".to_string();
        }),
        update_with_version_check(store, user.id, 1, |u: &mut User| {
            u.display_name = "writer-b".to_string();
        }),
    );

    assert!(first.is_ok() != second.is_ok());
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(loser, Err(AppError::Conflict { .. })));

    let stored = VersionedStore::<User>::get_by_id(store, user.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
}
