//! 存储端口层
//! 核心平面以抽象端口消费持久化；PostgreSQL 仓储（repository 模块）
//! 和内存存储（memory 模块）都实现这些端口

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    audit::{AccessDenialLog, AuditLog, AuditLogFilters},
    customer::Customer,
    role::{Permission, Role},
    service_order::ServiceOrder,
    user::{User, UserRole},
};

/// 带版本号、可软删除的可变聚合
pub trait Versioned: Clone + Send + Sync {
    /// 审计日志中使用的目标类型名
    const TARGET: &'static str;

    fn id(&self) -> Uuid;
    fn version(&self) -> i32;
    fn set_version(&mut self, version: i32);
    fn is_deleted(&self) -> bool;
    /// 打软删除标记并记录删除人/时间
    fn mark_deleted(&mut self, deleted_by: Option<Uuid>, deleted_at: chrono::DateTime<chrono::Utc>);
}

impl Versioned for User {
    const TARGET: &'static str = "user";

    fn id(&self) -> Uuid {
        self.id
    }
    fn version(&self) -> i32 {
        self.version
    }
    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
    fn mark_deleted(&mut self, deleted_by: Option<Uuid>, deleted_at: chrono::DateTime<chrono::Utc>) {
        self.is_deleted = true;
        self.deleted_by = deleted_by;
        self.deleted_at = Some(deleted_at);
    }
}

impl Versioned for Role {
    const TARGET: &'static str = "role";

    fn id(&self) -> Uuid {
        self.id
    }
    fn version(&self) -> i32 {
        self.version
    }
    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
    fn mark_deleted(&mut self, deleted_by: Option<Uuid>, deleted_at: chrono::DateTime<chrono::Utc>) {
        self.is_deleted = true;
        self.deleted_by = deleted_by;
        self.deleted_at = Some(deleted_at);
    }
}

impl Versioned for Permission {
    const TARGET: &'static str = "permission";

    fn id(&self) -> Uuid {
        self.id
    }
    fn version(&self) -> i32 {
        self.version
    }
    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
    fn mark_deleted(&mut self, deleted_by: Option<Uuid>, deleted_at: chrono::DateTime<chrono::Utc>) {
        self.is_deleted = true;
        self.deleted_by = deleted_by;
        self.deleted_at = Some(deleted_at);
    }
}

impl Versioned for Customer {
    const TARGET: &'static str = "customer";

    fn id(&self) -> Uuid {
        self.id
    }
    fn version(&self) -> i32 {
        self.version
    }
    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
    fn mark_deleted(&mut self, deleted_by: Option<Uuid>, deleted_at: chrono::DateTime<chrono::Utc>) {
        self.is_deleted = true;
        self.deleted_by = deleted_by;
        self.deleted_at = Some(deleted_at);
    }
}

impl Versioned for ServiceOrder {
    const TARGET: &'static str = "service_order";

    fn id(&self) -> Uuid {
        self.id
    }
    fn version(&self) -> i32 {
        self.version
    }
    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
    fn mark_deleted(&mut self, deleted_by: Option<Uuid>, deleted_at: chrono::DateTime<chrono::Utc>) {
        self.is_deleted = true;
        self.deleted_by = deleted_by;
        self.deleted_at = Some(deleted_at);
    }
}

/// 版本化聚合存储端口
///
/// 条件写入（`WHERE id = .. AND version = .. AND NOT is_deleted`）是
/// 同一聚合并发写入的唯一仲裁点；实现必须保证其原子性。
#[async_trait]
pub trait VersionedStore<A: Versioned>: Send + Sync {
    /// 按 id 读取（包含已软删除的行，供审计/历史寻址）
    async fn get_by_id(&self, id: Uuid) -> Result<Option<A>, AppError>;

    /// 是否存在活跃（未软删除）行
    async fn exists_active(&self, id: Uuid) -> Result<bool, AppError>;

    /// 插入新聚合；唯一约束冲突必须以 Duplicate 报告
    async fn create(&self, aggregate: &A) -> Result<A, AppError>;

    /// 条件更新，返回受影响行数（0 表示行不存在或版本不匹配）
    async fn conditional_update(
        &self,
        aggregate: &A,
        expected_version: i32,
    ) -> Result<u64, AppError>;

    /// 条件软删除，同样受版本检查约束
    async fn conditional_soft_delete(
        &self,
        id: Uuid,
        expected_version: i32,
        deleted_by: Option<Uuid>,
    ) -> Result<u64, AppError>;
}

/// 用户存储端口
#[async_trait]
pub trait UserStore: VersionedStore<User> {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
    async fn count_active(&self) -> Result<i64, AppError>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError>;
}

/// 角色存储端口
#[async_trait]
pub trait RoleStore: VersionedStore<Role> {
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, AppError>;
    async fn list(&self) -> Result<Vec<Role>, AppError>;
}

/// 权限目录存储端口
#[async_trait]
pub trait PermissionStore: VersionedStore<Permission> {
    async fn find_by_code(&self, code: &str) -> Result<Option<Permission>, AppError>;
    async fn list(&self) -> Result<Vec<Permission>, AppError>;
}

/// 客户存储端口
#[async_trait]
pub trait CustomerStore: VersionedStore<Customer> {
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Customer>, AppError>;
}

/// 服务单据存储端口
#[async_trait]
pub trait OrderStore: VersionedStore<ServiceOrder> {
    async fn find_by_order_no(&self, order_no: &str) -> Result<Option<ServiceOrder>, AppError>;
    async fn list_for_customer(&self, customer_id: Uuid) -> Result<Vec<ServiceOrder>, AppError>;
}

/// 角色/权限指派存储端口
#[async_trait]
pub trait RoleAssignmentStore: Send + Sync {
    /// 主体的活跃角色 id 列表（一次取回）
    async fn active_roles_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError>;

    /// 角色的权限列表（仅未删除的权限）
    async fn permissions_for_role(&self, role_id: Uuid) -> Result<Vec<Permission>, AppError>;

    /// 指派角色；活跃行中的重复指派以 Duplicate 报告。
    /// 撤销后的重新指派是合法的（唯一性只约束活跃行）。
    async fn assign_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<UserRole, AppError>;

    /// 撤销角色（软删除以保留历史），返回是否确有活跃行被撤销
    async fn remove_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        removed_by: Option<Uuid>,
    ) -> Result<bool, AppError>;

    /// 撤销用户的全部活跃角色指派（用户删除时调用），返回撤销数
    async fn remove_all_roles_for_user(
        &self,
        user_id: Uuid,
        removed_by: Option<Uuid>,
    ) -> Result<u64, AppError>;

    /// 为角色指派权限，幂等：已存在的配对不报错，也不计入返回的新增数
    async fn assign_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
        granted_by: Option<Uuid>,
    ) -> Result<u64, AppError>;

    /// 移除单个权限配对（硬删除，无历史要求）
    async fn remove_permission(&self, role_id: Uuid, permission_id: Uuid)
        -> Result<bool, AppError>;

    /// 角色是否仍被活跃的用户指派引用
    async fn is_role_in_use(&self, role_id: Uuid) -> Result<bool, AppError>;

    /// 权限是否仍被任何角色引用
    async fn is_permission_in_use(&self, permission_id: Uuid) -> Result<bool, AppError>;
}

/// 审计/拒绝日志落地端口（只追加，不暴露更新或删除）
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn insert_audit_log(&self, entry: &AuditLog) -> Result<(), AppError>;

    async fn insert_denial_log(&self, entry: &AccessDenialLog) -> Result<(), AppError>;

    async fn query_audit_logs(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, AppError>;

    async fn count_audit_logs(&self, filters: &AuditLogFilters) -> Result<i64, AppError>;

    async fn query_denial_logs(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AccessDenialLog>, AppError>;
}
