//! 并发控制协议
//! 所有可变聚合共用的"读取-变更-条件写回"契约。
//! 条件写入是同一聚合并发写入的唯一仲裁点；这里的前置读取只负责
//! 区分 NotFound 与 Conflict，并为审计提供变更前快照。

use uuid::Uuid;

use crate::error::AppError;
use crate::store::{Versioned, VersionedStore};

/// 一次通过版本检查的变更，携带前后状态供审计落地
#[derive(Debug, Clone)]
pub struct CheckedMutation<A> {
    pub before: A,
    pub after: A,
}

/// 版本检查更新
///
/// 流程：读取当前状态（无活跃行 ⇒ NotFound，版本不符 ⇒ Conflict），
/// 在副本上应用 `mutate`，携带期望版本发出条件写入。条件写入受影响
/// 行数为 0 时重新读取一次以区分两种失败。前置读取与条件写入之间
/// 被第三个写入者抢先是无害的：条件写入自己会落空。
pub async fn update_with_version_check<A, S, F>(
    store: &S,
    id: Uuid,
    expected_version: i32,
    mutate: F,
) -> Result<CheckedMutation<A>, AppError>
where
    A: Versioned,
    S: VersionedStore<A> + ?Sized,
    F: FnOnce(&mut A),
{
    let current = match store.get_by_id(id).await? {
        Some(aggregate) if !aggregate.is_deleted() => aggregate,
        _ => return Err(AppError::NotFound(A::TARGET)),
    };

    if current.version() != expected_version {
        return Err(AppError::Conflict {
            target: A::TARGET,
            expected: expected_version,
            actual: current.version(),
        });
    }

    let mut next = current.clone();
    mutate(&mut next);
    next.set_version(expected_version + 1);

    let affected = store.conditional_update(&next, expected_version).await?;
    if affected == 0 {
        return Err(resolve_zero_rows::<A, S>(store, id, expected_version).await?);
    }

    Ok(CheckedMutation {
        before: current,
        after: next,
    })
}

/// 版本检查软删除，返回删除前的状态快照
pub async fn soft_delete_with_version_check<A, S>(
    store: &S,
    id: Uuid,
    expected_version: i32,
    deleted_by: Option<Uuid>,
) -> Result<A, AppError>
where
    A: Versioned,
    S: VersionedStore<A> + ?Sized,
{
    let current = match store.get_by_id(id).await? {
        Some(aggregate) if !aggregate.is_deleted() => aggregate,
        _ => return Err(AppError::NotFound(A::TARGET)),
    };

    if current.version() != expected_version {
        return Err(AppError::Conflict {
            target: A::TARGET,
            expected: expected_version,
            actual: current.version(),
        });
    }

    let affected = store
        .conditional_soft_delete(id, expected_version, deleted_by)
        .await?;
    if affected == 0 {
        return Err(resolve_zero_rows::<A, S>(store, id, expected_version).await?);
    }

    Ok(current)
}

/// 条件写入受影响行数为 0 的歧义消解：
/// 活跃行仍在 ⇒ 版本冲突；否则 ⇒ 行已不存在
async fn resolve_zero_rows<A, S>(
    store: &S,
    id: Uuid,
    expected_version: i32,
) -> Result<AppError, AppError>
where
    A: Versioned,
    S: VersionedStore<A> + ?Sized,
{
    match store.get_by_id(id).await? {
        Some(aggregate) if !aggregate.is_deleted() => Ok(AppError::Conflict {
            target: A::TARGET,
            expected: expected_version,
            actual: aggregate.version(),
        }),
        _ => Ok(AppError::NotFound(A::TARGET)),
    }
}
