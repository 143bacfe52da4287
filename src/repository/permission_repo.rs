//! Permission catalog repository (权限目录数据访问)

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::role::Permission;
use crate::store::{PermissionStore, VersionedStore};

pub struct PermissionRepository {
    db: PgPool,
}

impl PermissionRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VersionedStore<Permission> for PermissionRepository {
    /// 根据 ID 查找权限（包含已软删除的行）
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Permission>, AppError> {
        let permission = sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(permission)
    }

    /// 是否存在活跃行
    async fn exists_active(&self, id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM permissions WHERE id = $1 AND NOT is_deleted)",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    /// 创建权限；活跃行中的重码由部分唯一索引裁决
    async fn create(&self, aggregate: &Permission) -> Result<Permission, AppError> {
        let permission = sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (
                id, code, name, kind, route_path, version, is_deleted,
                created_by, created_at, updated_by, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(aggregate.id)
        .bind(&aggregate.code)
        .bind(&aggregate.name)
        .bind(aggregate.kind)
        .bind(&aggregate.route_path)
        .bind(aggregate.version)
        .bind(aggregate.is_deleted)
        .bind(aggregate.created_by)
        .bind(aggregate.created_at)
        .bind(aggregate.updated_by)
        .bind(aggregate.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::map_unique(e, "permission code"))?;

        Ok(permission)
    }

    /// 条件更新
    async fn conditional_update(
        &self,
        aggregate: &Permission,
        expected_version: i32,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE permissions
            SET
                name = $3,
                route_path = $4,
                updated_by = $5,
                updated_at = $6,
                version = version + 1
            WHERE id = $1 AND version = $2 AND NOT is_deleted
            "#,
        )
        .bind(aggregate.id)
        .bind(expected_version)
        .bind(&aggregate.name)
        .bind(&aggregate.route_path)
        .bind(aggregate.updated_by)
        .bind(aggregate.updated_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// 条件软删除
    async fn conditional_soft_delete(
        &self,
        id: Uuid,
        expected_version: i32,
        deleted_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE permissions
            SET
                is_deleted = TRUE,
                deleted_by = $3,
                deleted_at = NOW(),
                version = version + 1
            WHERE id = $1 AND version = $2 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(deleted_by)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PermissionStore for PermissionRepository {
    /// 根据权限码查找活跃权限
    async fn find_by_code(&self, code: &str) -> Result<Option<Permission>, AppError> {
        let permission = sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions WHERE code = $1 AND NOT is_deleted",
        )
        .bind(code)
        .fetch_optional(&self.db)
        .await?;

        Ok(permission)
    }

    /// 列出活跃权限
    async fn list(&self) -> Result<Vec<Permission>, AppError> {
        let permissions = sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions WHERE NOT is_deleted ORDER BY code",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(permissions)
    }
}
