//! 用户管理服务
//! 账户的增删改与角色指派，全部经过权限门卫、版本检查与审计落地

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::audit::{OperationKind, RequestContext};
use crate::models::user::{CreateUserRequest, UpdateUserRequest, User, UserRole};
use crate::services::audit_service::{AuditRecord, AuditService};
use crate::services::concurrency::{
    soft_delete_with_version_check, update_with_version_check,
};
use crate::services::permission_service::{enforce_permission, PermissionService};
use crate::store::{AuditSink, RoleAssignmentStore, RoleStore, UserStore, Versioned, VersionedStore};

pub struct UserService<U, RS, R, S>
where
    U: UserStore,
    RS: RoleStore,
    R: RoleAssignmentStore,
    S: AuditSink,
{
    users: Arc<U>,
    roles: Arc<RS>,
    assignments: Arc<R>,
    permissions: Arc<PermissionService<R>>,
    audit: Arc<AuditService<S>>,
}

impl<U, RS, R, S> UserService<U, RS, R, S>
where
    U: UserStore,
    RS: RoleStore,
    R: RoleAssignmentStore,
    S: AuditSink,
{
    pub fn new(
        users: Arc<U>,
        roles: Arc<RS>,
        assignments: Arc<R>,
        permissions: Arc<PermissionService<R>>,
        audit: Arc<AuditService<S>>,
    ) -> Self {
        Self {
            users,
            roles,
            assignments,
            permissions,
            audit,
        }
    }

    /// 创建用户
    pub async fn create_user(
        &self,
        ctx: &RequestContext,
        req: CreateUserRequest,
    ) -> Result<User, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "user.create").await?;

        // 预检查缩小窗口；存储的唯一约束才是最终裁决
        if self.users.find_by_username(&req.username).await?.is_some() {
            return Err(AppError::Duplicate("username"));
        }

        let user = User::new(req.username, req.display_name, ctx.operator_id);
        let created = self.users.create(&user).await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Create,
                    target_type: User::TARGET,
                    target_id: Some(created.id),
                    before_state: None,
                    after_state: serde_json::to_value(&created).ok(),
                },
            )
            .await;

        Ok(created)
    }

    /// 更新用户
    pub async fn update_user(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        expected_version: i32,
        req: UpdateUserRequest,
    ) -> Result<User, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "user.update").await?;

        let operator_id = ctx.operator_id;
        let mutation =
            update_with_version_check(self.users.as_ref(), id, expected_version, |user| {
                if let Some(display_name) = req.display_name {
                    user.display_name = display_name;
                }
                user.updated_by = operator_id;
                user.updated_at = Utc::now();
            })
            .await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Update,
                    target_type: User::TARGET,
                    target_id: Some(id),
                    before_state: serde_json::to_value(&mutation.before).ok(),
                    after_state: serde_json::to_value(&mutation.after).ok(),
                },
            )
            .await;

        Ok(mutation.after)
    }

    /// 删除用户（软删除）
    ///
    /// 两条策略硬性约束先于版本检查、无条件生效：
    /// 操作者不能删除自己；最后一个活跃账户不可删除。
    pub async fn delete_user(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        expected_version: i32,
    ) -> Result<(), AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "user.delete").await?;

        if ctx.operator_id == Some(id) {
            return Err(AppError::PolicyViolation(
                "operators cannot delete their own account".to_string(),
            ));
        }
        if self.users.count_active().await? <= 1 {
            return Err(AppError::PolicyViolation(
                "the last remaining account cannot be deleted".to_string(),
            ));
        }

        let before =
            soft_delete_with_version_check(self.users.as_ref(), id, expected_version, ctx.operator_id)
                .await?;

        // 离任账户不再占用角色：连带撤销其全部活跃指派
        let revoked = self
            .assignments
            .remove_all_roles_for_user(id, ctx.operator_id)
            .await?;
        if revoked > 0 {
            tracing::info!(user_id = %id, revoked = revoked, "Revoked role assignments of deleted user");
        }

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Delete,
                    target_type: User::TARGET,
                    target_id: Some(id),
                    before_state: serde_json::to_value(&before).ok(),
                    after_state: None,
                },
            )
            .await;

        Ok(())
    }

    /// 为用户指派角色
    ///
    /// 活跃行中的重复指派报 Duplicate；撤销后的重新指派是合法的。
    pub async fn assign_role(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<UserRole, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "user.assignRole").await?;

        if !VersionedStore::exists_active(self.users.as_ref(), user_id).await? {
            return Err(AppError::NotFound("user"));
        }
        if !VersionedStore::exists_active(self.roles.as_ref(), role_id).await? {
            return Err(AppError::NotFound("role"));
        }

        let assignment = self
            .assignments
            .assign_role(user_id, role_id, ctx.operator_id)
            .await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Create,
                    target_type: "role_assignment",
                    target_id: Some(assignment.id),
                    before_state: None,
                    after_state: serde_json::to_value(&assignment).ok(),
                },
            )
            .await;

        Ok(assignment)
    }

    /// 撤销用户的角色（软删除以保留历史）
    pub async fn remove_role(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<(), AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "user.removeRole").await?;

        let removed = self
            .assignments
            .remove_role(user_id, role_id, ctx.operator_id)
            .await?;
        if !removed {
            return Err(AppError::NotFound("role assignment"));
        }

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Delete,
                    target_type: "role_assignment",
                    target_id: None,
                    before_state: Some(serde_json::json!({
                        "user_id": user_id,
                        "role_id": role_id,
                    })),
                    after_state: None,
                },
            )
            .await;

        Ok(())
    }

    /// 获取用户详情
    pub async fn find_user(&self, ctx: &RequestContext, id: Uuid) -> Result<User, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "user.read").await?;

        match self.users.get_by_id(id).await? {
            Some(user) if !user.is_deleted => Ok(user),
            _ => Err(AppError::NotFound("user")),
        }
    }

    /// 列出用户
    pub async fn list_users(
        &self,
        ctx: &RequestContext,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "user.read").await?;

        let users = self.users.list(limit, offset).await?;
        self.audit.record_query(ctx, User::TARGET).await;
        Ok(users)
    }
}
