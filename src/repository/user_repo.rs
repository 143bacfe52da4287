//! User repository (用户数据访问)

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::User;
use crate::store::{UserStore, VersionedStore};

pub struct UserRepository {
    db: PgPool,
}

impl UserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VersionedStore<User> for UserRepository {
    /// 根据 ID 查找用户（包含已软删除的行）
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    /// 是否存在活跃行
    async fn exists_active(&self, id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND NOT is_deleted)",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    /// 创建用户；活跃行中的重名由部分唯一索引裁决
    async fn create(&self, aggregate: &User) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, username, display_name, version, is_deleted,
                created_by, created_at, updated_by, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(aggregate.id)
        .bind(&aggregate.username)
        .bind(&aggregate.display_name)
        .bind(aggregate.version)
        .bind(aggregate.is_deleted)
        .bind(aggregate.created_by)
        .bind(aggregate.created_at)
        .bind(aggregate.updated_by)
        .bind(aggregate.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::map_unique(e, "username"))?;

        Ok(user)
    }

    /// 条件更新：id 与期望版本同时命中才会写入
    async fn conditional_update(
        &self,
        aggregate: &User,
        expected_version: i32,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET
                username = $3,
                display_name = $4,
                updated_by = $5,
                updated_at = $6,
                version = version + 1
            WHERE id = $1 AND version = $2 AND NOT is_deleted
            "#,
        )
        .bind(aggregate.id)
        .bind(expected_version)
        .bind(&aggregate.username)
        .bind(&aggregate.display_name)
        .bind(aggregate.updated_by)
        .bind(aggregate.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::map_unique(e, "username"))?;

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
            UPDATE users
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
impl UserStore for UserRepository {
    /// 根据用户名查找活跃用户
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE username = $1 AND NOT is_deleted",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// 统计活跃用户数量
    async fn count_active(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE NOT is_deleted")
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    /// 列出活跃用户
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE NOT is_deleted ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }
}
