//! 角色与权限目录服务
//! 角色增删改、权限目录维护和角色-权限指派，
//! 删除前置引用完整性保护（InUse），幂等的权限指派

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::audit::{OperationKind, RequestContext};
use crate::models::role::{
    CreatePermissionRequest, CreateRoleRequest, Permission, Role, UpdatePermissionRequest,
    UpdateRoleRequest,
};
use crate::services::audit_service::{AuditRecord, AuditService};
use crate::services::concurrency::{
    soft_delete_with_version_check, update_with_version_check,
};
use crate::services::permission_service::{enforce_permission, PermissionService};
use crate::store::{
    AuditSink, PermissionStore, RoleAssignmentStore, RoleStore, Versioned, VersionedStore,
};

pub struct RoleService<RS, PS, R, S>
where
    RS: RoleStore,
    PS: PermissionStore,
    R: RoleAssignmentStore,
    S: AuditSink,
{
    roles: Arc<RS>,
    catalog: Arc<PS>,
    assignments: Arc<R>,
    permissions: Arc<PermissionService<R>>,
    audit: Arc<AuditService<S>>,
}

impl<RS, PS, R, S> RoleService<RS, PS, R, S>
where
    RS: RoleStore,
    PS: PermissionStore,
    R: RoleAssignmentStore,
    S: AuditSink,
{
    pub fn new(
        roles: Arc<RS>,
        catalog: Arc<PS>,
        assignments: Arc<R>,
        permissions: Arc<PermissionService<R>>,
        audit: Arc<AuditService<S>>,
    ) -> Self {
        Self {
            roles,
            catalog,
            assignments,
            permissions,
            audit,
        }
    }

    // ==================== 角色 ====================

    /// 创建角色
    pub async fn create_role(
        &self,
        ctx: &RequestContext,
        req: CreateRoleRequest,
    ) -> Result<Role, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "role.create").await?;

        if self.roles.find_by_name(&req.name).await?.is_some() {
            return Err(AppError::Duplicate("role name"));
        }

        let role = Role::new(req.name, req.description, ctx.operator_id);
        let created = self.roles.create(&role).await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Create,
                    target_type: Role::TARGET,
                    target_id: Some(created.id),
                    before_state: None,
                    after_state: serde_json::to_value(&created).ok(),
                },
            )
            .await;

        Ok(created)
    }

    /// 更新角色
    pub async fn update_role(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        expected_version: i32,
        req: UpdateRoleRequest,
    ) -> Result<Role, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "role.update").await?;

        // 改名时预检查目标名是否被其他活跃角色占用
        if let Some(name) = &req.name {
            if let Some(other) = self.roles.find_by_name(name).await? {
                if other.id != id {
                    return Err(AppError::Duplicate("role name"));
                }
            }
        }

        let operator_id = ctx.operator_id;
        let mutation =
            update_with_version_check(self.roles.as_ref(), id, expected_version, |role| {
                if let Some(name) = req.name {
                    role.name = name;
                }
                if let Some(description) = req.description {
                    role.description = Some(description);
                }
                role.updated_by = operator_id;
                role.updated_at = Utc::now();
            })
            .await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Update,
                    target_type: Role::TARGET,
                    target_id: Some(id),
                    before_state: serde_json::to_value(&mutation.before).ok(),
                    after_state: serde_json::to_value(&mutation.after).ok(),
                },
            )
            .await;

        Ok(mutation.after)
    }

    /// 删除角色（软删除）
    ///
    /// 仍被活跃用户指派引用的角色不可删除；该保护叠加在
    /// 版本检查之上，不替代版本检查。
    pub async fn delete_role(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        expected_version: i32,
    ) -> Result<(), AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "role.delete").await?;

        if self.assignments.is_role_in_use(id).await? {
            return Err(AppError::InUse("role"));
        }

        let before =
            soft_delete_with_version_check(self.roles.as_ref(), id, expected_version, ctx.operator_id)
                .await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Delete,
                    target_type: Role::TARGET,
                    target_id: Some(id),
                    before_state: serde_json::to_value(&before).ok(),
                    after_state: None,
                },
            )
            .await;

        Ok(())
    }

    /// 列出角色
    pub async fn list_roles(&self, ctx: &RequestContext) -> Result<Vec<Role>, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "role.read").await?;

        let roles = self.roles.list().await?;
        self.audit.record_query(ctx, Role::TARGET).await;
        Ok(roles)
    }

    // ==================== 权限目录 ====================

    /// 创建权限
    pub async fn create_permission(
        &self,
        ctx: &RequestContext,
        req: CreatePermissionRequest,
    ) -> Result<Permission, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "permission.create").await?;

        if self.catalog.find_by_code(&req.code).await?.is_some() {
            return Err(AppError::Duplicate("permission code"));
        }

        let permission =
            Permission::new(req.code, req.name, req.kind, req.route_path, ctx.operator_id);
        let created = self.catalog.create(&permission).await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Create,
                    target_type: Permission::TARGET,
                    target_id: Some(created.id),
                    before_state: None,
                    after_state: serde_json::to_value(&created).ok(),
                },
            )
            .await;

        Ok(created)
    }

    /// 更新权限
    pub async fn update_permission(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        expected_version: i32,
        req: UpdatePermissionRequest,
    ) -> Result<Permission, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "permission.update").await?;

        let operator_id = ctx.operator_id;
        let mutation =
            update_with_version_check(self.catalog.as_ref(), id, expected_version, |permission| {
                if let Some(name) = req.name {
                    permission.name = name;
                }
                if let Some(route_path) = req.route_path {
                    permission.route_path = Some(route_path);
                }
                permission.updated_by = operator_id;
                permission.updated_at = Utc::now();
            })
            .await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Update,
                    target_type: Permission::TARGET,
                    target_id: Some(id),
                    before_state: serde_json::to_value(&mutation.before).ok(),
                    after_state: serde_json::to_value(&mutation.after).ok(),
                },
            )
            .await;

        Ok(mutation.after)
    }

    /// 删除权限（软删除）
    ///
    /// 仍被任何角色引用的权限不可删除。
    pub async fn delete_permission(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        expected_version: i32,
    ) -> Result<(), AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "permission.delete").await?;

        if self.assignments.is_permission_in_use(id).await? {
            return Err(AppError::InUse("permission"));
        }

        let before = soft_delete_with_version_check(
            self.catalog.as_ref(),
            id,
            expected_version,
            ctx.operator_id,
        )
        .await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Delete,
                    target_type: Permission::TARGET,
                    target_id: Some(id),
                    before_state: serde_json::to_value(&before).ok(),
                    after_state: None,
                },
            )
            .await;

        Ok(())
    }

    /// 列出权限目录
    pub async fn list_permissions(&self, ctx: &RequestContext) -> Result<Vec<Permission>, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "permission.read").await?;

        let permissions = self.catalog.list().await?;
        self.audit.record_query(ctx, Permission::TARGET).await;
        Ok(permissions)
    }

    // ==================== 角色-权限指派 ====================

    /// 为角色指派权限，幂等：已存在的配对不报错。
    /// 返回本次新增的配对数。
    pub async fn assign_permissions(
        &self,
        ctx: &RequestContext,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<u64, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "role.assignPermission").await?;

        if !VersionedStore::exists_active(self.roles.as_ref(), role_id).await? {
            return Err(AppError::NotFound("role"));
        }
        for &permission_id in permission_ids {
            if !VersionedStore::exists_active(self.catalog.as_ref(), permission_id).await? {
                return Err(AppError::NotFound("permission"));
            }
        }

        let newly_assigned = self
            .assignments
            .assign_permissions(role_id, permission_ids, ctx.operator_id)
            .await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Update,
                    target_type: Role::TARGET,
                    target_id: Some(role_id),
                    before_state: None,
                    after_state: Some(serde_json::json!({
                        "assigned_permission_ids": permission_ids,
                        "newly_assigned": newly_assigned,
                    })),
                },
            )
            .await;

        Ok(newly_assigned)
    }

    /// 移除角色的单个权限配对，返回是否确有配对被移除
    pub async fn remove_permission(
        &self,
        ctx: &RequestContext,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "role.removePermission").await?;

        let removed = self
            .assignments
            .remove_permission(role_id, permission_id)
            .await?;

        if removed {
            self.audit
                .record(
                    ctx,
                    AuditRecord {
                        action: OperationKind::Update,
                        target_type: Role::TARGET,
                        target_id: Some(role_id),
                        before_state: Some(serde_json::json!({
                            "removed_permission_id": permission_id,
                        })),
                        after_state: None,
                    },
                )
                .await;
        }

        Ok(removed)
    }

    /// 角色当前持有的权限列表
    pub async fn role_permissions(
        &self,
        ctx: &RequestContext,
        role_id: Uuid,
    ) -> Result<Vec<Permission>, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "role.read").await?;
        self.assignments.permissions_for_role(role_id).await
    }
}
