//! 内存存储
//! 实现全部存储端口，供测试和嵌入式场景使用。
//! 用写锁模拟存储自身的原子条件写入与唯一约束，不构成应用层锁。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    audit::{AccessDenialLog, AuditLog, AuditLogFilters},
    customer::Customer,
    role::{Permission, Role, RolePermission},
    service_order::ServiceOrder,
    user::{User, UserRole},
};
use crate::store::{
    AuditSink, CustomerStore, OrderStore, PermissionStore, RoleAssignmentStore, RoleStore,
    UserStore, Versioned, VersionedStore,
};

/// 内存存储：所有表共享一个实例
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    roles: RwLock<HashMap<Uuid, Role>>,
    permissions: RwLock<HashMap<Uuid, Permission>>,
    customers: RwLock<HashMap<Uuid, Customer>>,
    orders: RwLock<HashMap<Uuid, ServiceOrder>>,
    user_roles: RwLock<Vec<UserRole>>,
    role_permissions: RwLock<Vec<RolePermission>>,
    audit_logs: RwLock<Vec<AuditLog>>,
    denial_logs: RwLock<Vec<AccessDenialLog>>,
    fail_audit_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注入审计落地失败，用于验证记录器的"尽力而为"契约
    pub fn set_fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }
}

// ==================== 通用聚合操作 ====================

async fn get_in<A: Versioned>(map: &RwLock<HashMap<Uuid, A>>, id: Uuid) -> Option<A> {
    map.read().await.get(&id).cloned()
}

async fn exists_active_in<A: Versioned>(map: &RwLock<HashMap<Uuid, A>>, id: Uuid) -> bool {
    map.read().await.get(&id).map(|a| !a.is_deleted()).unwrap_or(false)
}

/// 唯一性检查与插入在同一把写锁下完成，锁本身就是约束的裁决点
async fn create_in<A, F>(
    map: &RwLock<HashMap<Uuid, A>>,
    aggregate: &A,
    field: &'static str,
    is_duplicate_of: F,
) -> Result<A, AppError>
where
    A: Versioned,
    F: Fn(&A) -> bool,
{
    let mut map = map.write().await;
    if map
        .values()
        .any(|existing| !existing.is_deleted() && is_duplicate_of(existing))
    {
        return Err(AppError::Duplicate(field));
    }
    map.insert(aggregate.id(), aggregate.clone());
    Ok(aggregate.clone())
}

async fn conditional_update_in<A: Versioned>(
    map: &RwLock<HashMap<Uuid, A>>,
    aggregate: &A,
    expected_version: i32,
) -> u64 {
    let mut map = map.write().await;
    match map.get_mut(&aggregate.id()) {
        Some(current) if !current.is_deleted() && current.version() == expected_version => {
            let mut next = aggregate.clone();
            next.set_version(expected_version + 1);
            *current = next;
            1
        }
        _ => 0,
    }
}

async fn conditional_soft_delete_in<A: Versioned>(
    map: &RwLock<HashMap<Uuid, A>>,
    id: Uuid,
    expected_version: i32,
    deleted_by: Option<Uuid>,
) -> u64 {
    let mut map = map.write().await;
    match map.get_mut(&id) {
        Some(current) if !current.is_deleted() && current.version() == expected_version => {
            current.mark_deleted(deleted_by, Utc::now());
            current.set_version(expected_version + 1);
            1
        }
        _ => 0,
    }
}

// ==================== 用户 ====================

#[async_trait]
impl VersionedStore<User> for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(get_in(&self.users, id).await)
    }

    async fn exists_active(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(exists_active_in(&self.users, id).await)
    }

    async fn create(&self, aggregate: &User) -> Result<User, AppError> {
        create_in(&self.users, aggregate, "username", |existing| {
            existing.username == aggregate.username
        })
        .await
    }

    async fn conditional_update(
        &self,
        aggregate: &User,
        expected_version: i32,
    ) -> Result<u64, AppError> {
        Ok(conditional_update_in(&self.users, aggregate, expected_version).await)
    }

    async fn conditional_soft_delete(
        &self,
        id: Uuid,
        expected_version: i32,
        deleted_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        Ok(conditional_soft_delete_in(&self.users, id, expected_version, deleted_by).await)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| !u.is_deleted && u.username == username)
            .cloned())
    }

    async fn count_active(&self) -> Result<i64, AppError> {
        Ok(self.users.read().await.values().filter(|u| !u.is_deleted).count() as i64)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        let mut users: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| !u.is_deleted)
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

// ==================== 角色 ====================

#[async_trait]
impl VersionedStore<Role> for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError> {
        Ok(get_in(&self.roles, id).await)
    }

    async fn exists_active(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(exists_active_in(&self.roles, id).await)
    }

    async fn create(&self, aggregate: &Role) -> Result<Role, AppError> {
        create_in(&self.roles, aggregate, "role name", |existing| {
            existing.name == aggregate.name
        })
        .await
    }

    async fn conditional_update(
        &self,
        aggregate: &Role,
        expected_version: i32,
    ) -> Result<u64, AppError> {
        Ok(conditional_update_in(&self.roles, aggregate, expected_version).await)
    }

    async fn conditional_soft_delete(
        &self,
        id: Uuid,
        expected_version: i32,
        deleted_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        Ok(conditional_soft_delete_in(&self.roles, id, expected_version, deleted_by).await)
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, AppError> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .find(|r| !r.is_deleted && r.name == name)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Role>, AppError> {
        let mut roles: Vec<Role> = self
            .roles
            .read()
            .await
            .values()
            .filter(|r| !r.is_deleted)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }
}

// ==================== 权限目录 ====================

#[async_trait]
impl VersionedStore<Permission> for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Permission>, AppError> {
        Ok(get_in(&self.permissions, id).await)
    }

    async fn exists_active(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(exists_active_in(&self.permissions, id).await)
    }

    async fn create(&self, aggregate: &Permission) -> Result<Permission, AppError> {
        create_in(&self.permissions, aggregate, "permission code", |existing| {
            existing.code == aggregate.code
        })
        .await
    }

    async fn conditional_update(
        &self,
        aggregate: &Permission,
        expected_version: i32,
    ) -> Result<u64, AppError> {
        Ok(conditional_update_in(&self.permissions, aggregate, expected_version).await)
    }

    async fn conditional_soft_delete(
        &self,
        id: Uuid,
        expected_version: i32,
        deleted_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        Ok(conditional_soft_delete_in(&self.permissions, id, expected_version, deleted_by).await)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Permission>, AppError> {
        Ok(self
            .permissions
            .read()
            .await
            .values()
            .find(|p| !p.is_deleted && p.code == code)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Permission>, AppError> {
        let mut permissions: Vec<Permission> = self
            .permissions
            .read()
            .await
            .values()
            .filter(|p| !p.is_deleted)
            .cloned()
            .collect();
        permissions.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(permissions)
    }
}

// ==================== 客户 ====================

#[async_trait]
impl VersionedStore<Customer> for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Customer>, AppError> {
        Ok(get_in(&self.customers, id).await)
    }

    async fn exists_active(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(exists_active_in(&self.customers, id).await)
    }

    async fn create(&self, aggregate: &Customer) -> Result<Customer, AppError> {
        // 客户没有业务唯一键
        create_in(&self.customers, aggregate, "customer", |_| false).await
    }

    async fn conditional_update(
        &self,
        aggregate: &Customer,
        expected_version: i32,
    ) -> Result<u64, AppError> {
        Ok(conditional_update_in(&self.customers, aggregate, expected_version).await)
    }

    async fn conditional_soft_delete(
        &self,
        id: Uuid,
        expected_version: i32,
        deleted_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        Ok(conditional_soft_delete_in(&self.customers, id, expected_version, deleted_by).await)
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Customer>, AppError> {
        let mut customers: Vec<Customer> = self
            .customers
            .read()
            .await
            .values()
            .filter(|c| !c.is_deleted)
            .cloned()
            .collect();
        customers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(customers
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

// ==================== 服务单据 ====================

#[async_trait]
impl VersionedStore<ServiceOrder> for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<ServiceOrder>, AppError> {
        Ok(get_in(&self.orders, id).await)
    }

    async fn exists_active(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(exists_active_in(&self.orders, id).await)
    }

    async fn create(&self, aggregate: &ServiceOrder) -> Result<ServiceOrder, AppError> {
        create_in(&self.orders, aggregate, "order number", |existing| {
            existing.order_no == aggregate.order_no
        })
        .await
    }

    async fn conditional_update(
        &self,
        aggregate: &ServiceOrder,
        expected_version: i32,
    ) -> Result<u64, AppError> {
        Ok(conditional_update_in(&self.orders, aggregate, expected_version).await)
    }

    async fn conditional_soft_delete(
        &self,
        id: Uuid,
        expected_version: i32,
        deleted_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        Ok(conditional_soft_delete_in(&self.orders, id, expected_version, deleted_by).await)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find_by_order_no(&self, order_no: &str) -> Result<Option<ServiceOrder>, AppError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| !o.is_deleted && o.order_no == order_no)
            .cloned())
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> Result<Vec<ServiceOrder>, AppError> {
        let mut orders: Vec<ServiceOrder> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| !o.is_deleted && o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

// ==================== 角色/权限指派 ====================

#[async_trait]
impl RoleAssignmentStore for MemoryStore {
    async fn active_roles_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .user_roles
            .read()
            .await
            .iter()
            .filter(|ur| !ur.is_deleted && ur.user_id == user_id)
            .map(|ur| ur.role_id)
            .collect())
    }

    async fn permissions_for_role(&self, role_id: Uuid) -> Result<Vec<Permission>, AppError> {
        let pairs = self.role_permissions.read().await;
        let permissions = self.permissions.read().await;
        Ok(pairs
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .filter_map(|rp| permissions.get(&rp.permission_id))
            .filter(|p| !p.is_deleted)
            .cloned()
            .collect())
    }

    async fn assign_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<UserRole, AppError> {
        let mut assignments = self.user_roles.write().await;
        if assignments
            .iter()
            .any(|ur| !ur.is_deleted && ur.user_id == user_id && ur.role_id == role_id)
        {
            return Err(AppError::Duplicate("role assignment"));
        }
        let assignment = UserRole {
            id: Uuid::new_v4(),
            user_id,
            role_id,
            assigned_by,
            assigned_at: Utc::now(),
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
        };
        assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn remove_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        removed_by: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let mut assignments = self.user_roles.write().await;
        match assignments
            .iter_mut()
            .find(|ur| !ur.is_deleted && ur.user_id == user_id && ur.role_id == role_id)
        {
            Some(assignment) => {
                assignment.is_deleted = true;
                assignment.deleted_by = removed_by;
                assignment.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_all_roles_for_user(
        &self,
        user_id: Uuid,
        removed_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        let mut assignments = self.user_roles.write().await;
        let mut revoked = 0u64;
        for assignment in assignments
            .iter_mut()
            .filter(|ur| !ur.is_deleted && ur.user_id == user_id)
        {
            assignment.is_deleted = true;
            assignment.deleted_by = removed_by;
            assignment.deleted_at = Some(Utc::now());
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn assign_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
        granted_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        let mut pairs = self.role_permissions.write().await;
        let mut inserted = 0u64;
        for &permission_id in permission_ids {
            let exists = pairs
                .iter()
                .any(|rp| rp.role_id == role_id && rp.permission_id == permission_id);
            if !exists {
                pairs.push(RolePermission {
                    role_id,
                    permission_id,
                    granted_by,
                    granted_at: Utc::now(),
                });
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn remove_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut pairs = self.role_permissions.write().await;
        let before = pairs.len();
        pairs.retain(|rp| !(rp.role_id == role_id && rp.permission_id == permission_id));
        Ok(pairs.len() < before)
    }

    async fn is_role_in_use(&self, role_id: Uuid) -> Result<bool, AppError> {
        Ok(self
            .user_roles
            .read()
            .await
            .iter()
            .any(|ur| !ur.is_deleted && ur.role_id == role_id))
    }

    async fn is_permission_in_use(&self, permission_id: Uuid) -> Result<bool, AppError> {
        Ok(self
            .role_permissions
            .read()
            .await
            .iter()
            .any(|rp| rp.permission_id == permission_id))
    }
}

// ==================== 审计/拒绝日志 ====================

#[async_trait]
impl AuditSink for MemoryStore {
    async fn insert_audit_log(&self, entry: &AuditLog) -> Result<(), AppError> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal);
        }
        self.audit_logs.write().await.push(entry.clone());
        Ok(())
    }

    async fn insert_denial_log(&self, entry: &AccessDenialLog) -> Result<(), AppError> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal);
        }
        self.denial_logs.write().await.push(entry.clone());
        Ok(())
    }

    async fn query_audit_logs(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, AppError> {
        let logs = self.audit_logs.read().await;
        let mut matched: Vec<AuditLog> =
            logs.iter().filter(|log| matches_filters(log, filters)).cloned().collect();
        matched.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(matched
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_audit_logs(&self, filters: &AuditLogFilters) -> Result<i64, AppError> {
        let logs = self.audit_logs.read().await;
        Ok(logs.iter().filter(|log| matches_filters(log, filters)).count() as i64)
    }

    async fn query_denial_logs(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AccessDenialLog>, AppError> {
        let logs = self.denial_logs.read().await;
        let mut matched: Vec<AccessDenialLog> = logs
            .iter()
            .filter(|log| user_id.is_none() || log.user_id == user_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(matched.into_iter().take(limit.max(0) as usize).collect())
    }
}

fn matches_filters(log: &AuditLog, filters: &AuditLogFilters) -> bool {
    if let Some(operator_id) = filters.operator_id {
        if log.operator_id != Some(operator_id) {
            return false;
        }
    }
    if let Some(action) = filters.action {
        if log.action != action {
            return false;
        }
    }
    if let Some(target_type) = &filters.target_type {
        if &log.target_type != target_type {
            return false;
        }
    }
    if let Some(target_id) = filters.target_id {
        if log.target_id != Some(target_id) {
            return false;
        }
    }
    if let Some(trace_id) = &filters.trace_id {
        if log.trace_id.as_deref() != Some(trace_id.as_str()) {
            return false;
        }
    }
    if let Some(start) = filters.start_time {
        if log.occurred_at < start {
            return false;
        }
    }
    if let Some(end) = filters.end_time {
        if log.occurred_at > end {
            return false;
        }
    }
    true
}
