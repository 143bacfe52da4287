//! Role repository (角色与指派数据访问)

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::role::{Permission, Role};
use crate::models::user::UserRole;
use crate::store::{RoleAssignmentStore, RoleStore, VersionedStore};

pub struct RoleRepository {
    db: PgPool,
}

impl RoleRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

// ==================== Roles ====================

#[async_trait]
impl VersionedStore<Role> for RoleRepository {
    /// 根据 ID 查找角色（包含已软删除的行）
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(role)
    }

    /// 是否存在活跃行
    async fn exists_active(&self, id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM roles WHERE id = $1 AND NOT is_deleted)",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    /// 创建角色；活跃行中的重名由部分唯一索引裁决
    async fn create(&self, aggregate: &Role) -> Result<Role, AppError> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (
                id, name, description, version, is_deleted,
                created_by, created_at, updated_by, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(aggregate.id)
        .bind(&aggregate.name)
        .bind(&aggregate.description)
        .bind(aggregate.version)
        .bind(aggregate.is_deleted)
        .bind(aggregate.created_by)
        .bind(aggregate.created_at)
        .bind(aggregate.updated_by)
        .bind(aggregate.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::map_unique(e, "role name"))?;

        Ok(role)
    }

    /// 条件更新
    async fn conditional_update(
        &self,
        aggregate: &Role,
        expected_version: i32,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE roles
            SET
                name = $3,
                description = $4,
                updated_by = $5,
                updated_at = $6,
                version = version + 1
            WHERE id = $1 AND version = $2 AND NOT is_deleted
            "#,
        )
        .bind(aggregate.id)
        .bind(expected_version)
        .bind(&aggregate.name)
        .bind(&aggregate.description)
        .bind(aggregate.updated_by)
        .bind(aggregate.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::map_unique(e, "role name"))?;

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
            UPDATE roles
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
impl RoleStore for RoleRepository {
    /// 根据名称查找活跃角色
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, AppError> {
        let role =
            sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1 AND NOT is_deleted")
                .bind(name)
                .fetch_optional(&self.db)
                .await?;

        Ok(role)
    }

    /// 列出活跃角色
    async fn list(&self) -> Result<Vec<Role>, AppError> {
        let roles =
            sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE NOT is_deleted ORDER BY name")
                .fetch_all(&self.db)
                .await?;

        Ok(roles)
    }
}

// ==================== Assignments ====================

#[async_trait]
impl RoleAssignmentStore for RoleRepository {
    /// 获取用户的活跃角色 ID 列表
    async fn active_roles_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let role_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT role_id FROM user_roles WHERE user_id = $1 AND NOT is_deleted",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(role_ids)
    }

    /// 获取角色的权限列表（仅未删除的权限）
    async fn permissions_for_role(&self, role_id: Uuid) -> Result<Vec<Permission>, AppError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.*
            FROM permissions p
            JOIN role_permissions rp ON p.id = rp.permission_id
            WHERE rp.role_id = $1 AND NOT p.is_deleted
            ORDER BY p.code
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await?;

        Ok(permissions)
    }

    /// 为用户指派角色；活跃行中的重复配对由部分唯一索引裁决
    async fn assign_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<UserRole, AppError> {
        let assignment = sqlx::query_as::<_, UserRole>(
            r#"
            INSERT INTO user_roles (id, user_id, role_id, assigned_by, assigned_at, is_deleted)
            VALUES ($1, $2, $3, $4, NOW(), FALSE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(role_id)
        .bind(assigned_by)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::map_unique(e, "role assignment"))?;

        Ok(assignment)
    }

    /// 撤销用户的角色（软删除以保留历史）
    async fn remove_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        removed_by: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE user_roles
            SET is_deleted = TRUE, deleted_by = $3, deleted_at = NOW()
            WHERE user_id = $1 AND role_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .bind(removed_by)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 撤销用户的全部活跃角色指派
    async fn remove_all_roles_for_user(
        &self,
        user_id: Uuid,
        removed_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE user_roles
            SET is_deleted = TRUE, deleted_by = $2, deleted_at = NOW()
            WHERE user_id = $1 AND NOT is_deleted
            "#,
        )
        .bind(user_id)
        .bind(removed_by)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// 为角色指派权限，幂等；返回新增配对数
    async fn assign_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
        granted_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        let mut inserted = 0u64;
        for &permission_id in permission_ids {
            let result = sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id, granted_by, granted_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role_id)
            .bind(permission_id)
            .bind(granted_by)
            .execute(&self.db)
            .await?;

            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    /// 移除角色的单个权限配对（硬删除）
    async fn remove_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
                .bind(role_id)
                .bind(permission_id)
                .execute(&self.db)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 角色是否仍被活跃的用户指派引用
    async fn is_role_in_use(&self, role_id: Uuid) -> Result<bool, AppError> {
        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM user_roles WHERE role_id = $1 AND NOT is_deleted)",
        )
        .bind(role_id)
        .fetch_one(&self.db)
        .await?;

        Ok(in_use)
    }

    /// 权限是否仍被任何角色引用
    async fn is_permission_in_use(&self, permission_id: Uuid) -> Result<bool, AppError> {
        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM role_permissions WHERE permission_id = $1)",
        )
        .bind(permission_id)
        .fetch_one(&self.db)
        .await?;

        Ok(in_use)
    }
}
