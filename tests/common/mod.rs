//! 测试公共模块
//! 基于内存存储的测试夹具与种子数据辅助函数

#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use backoffice_system::config::AuditConfig;
use backoffice_system::models::audit::RequestContext;
use backoffice_system::models::role::{Permission, PermissionKind, Role};
use backoffice_system::models::user::User;
use backoffice_system::services::{
    AuditService, CustomerService, OrderService, PermissionService, RoleService, UserService,
};
use backoffice_system::store::memory::MemoryStore;
use backoffice_system::store::{RoleAssignmentStore, VersionedStore};

pub type MemUserService = UserService<MemoryStore, MemoryStore, MemoryStore, MemoryStore>;
pub type MemRoleService = RoleService<MemoryStore, MemoryStore, MemoryStore, MemoryStore>;
pub type MemCustomerService = CustomerService<MemoryStore, MemoryStore, MemoryStore>;
pub type MemOrderService = OrderService<MemoryStore, MemoryStore, MemoryStore, MemoryStore>;

/// 全部服务共享同一个内存存储实例
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub permissions: Arc<PermissionService<MemoryStore>>,
    pub audit: Arc<AuditService<MemoryStore>>,
    pub users: MemUserService,
    pub roles: MemRoleService,
    pub customers: MemCustomerService,
    pub orders: MemOrderService,
}

/// 创建测试审计配置
pub fn test_audit_config() -> AuditConfig {
    AuditConfig {
        query_max_limit: 200,
        record_reads: false,
    }
}

/// 搭建测试环境
pub fn setup() -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let permissions = Arc::new(PermissionService::new(store.clone()));
    let audit = Arc::new(AuditService::new(store.clone(), &test_audit_config()));

    let users = UserService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        permissions.clone(),
        audit.clone(),
    );
    let roles = RoleService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        permissions.clone(),
        audit.clone(),
    );
    let customers = CustomerService::new(store.clone(), permissions.clone(), audit.clone());
    let orders = OrderService::new(
        store.clone(),
        store.clone(),
        permissions.clone(),
        audit.clone(),
    );

    TestHarness {
        store,
        permissions,
        audit,
        users,
        roles,
        customers,
        orders,
    }
}

/// 直接在存储中创建用户（绕过服务层，用于搭建前置状态）
pub async fn seed_user(store: &MemoryStore, username: &str) -> User {
    let user = User::new(username.to_string(), format!("{} 测试账号", username), None);
    VersionedStore::<User>::create(store, &user)
        .await
        .expect("Failed to seed user")
}

/// 直接在存储中创建角色
pub async fn seed_role(store: &MemoryStore, name: &str) -> Role {
    let role = Role::new(name.to_string(), None, None);
    VersionedStore::<Role>::create(store, &role)
        .await
        .expect("Failed to seed role")
}

/// 直接在存储中创建权限
pub async fn seed_permission(store: &MemoryStore, code: &str) -> Permission {
    let permission = Permission::new(
        code.to_string(),
        code.to_string(),
        PermissionKind::Function,
        None,
        None,
    );
    VersionedStore::<Permission>::create(store, &permission)
        .await
        .expect("Failed to seed permission")
}

/// 为用户指派角色
pub async fn seed_assignment(store: &MemoryStore, user_id: Uuid, role_id: Uuid) {
    store
        .assign_role(user_id, role_id, None)
        .await
        .expect("Failed to seed role assignment");
}

/// 创建一个持有给定权限码的操作员：
/// 自动建出角色与权限并完成两级指派
pub async fn seed_operator(store: &MemoryStore, username: &str, codes: &[&str]) -> User {
    let user = seed_user(store, username).await;
    let role = seed_role(store, &format!("{}-role", username)).await;

    let mut permission_ids = Vec::new();
    for code in codes {
        let permission = seed_permission(store, code).await;
        permission_ids.push(permission.id);
    }
    store
        .assign_permissions(role.id, &permission_ids, None)
        .await
        .expect("Failed to seed role permissions");
    seed_assignment(store, user.id, role.id).await;

    user
}

/// 操作员请求上下文（带请求元数据）
pub fn ctx_for(user: &User) -> RequestContext {
    RequestContext::operator(user.id, user.display_name.clone()).with_request_meta(
        Some("127.0.0.1".to_string()),
        Some("test-agent".to_string()),
        Some(Uuid::new_v4().to_string()),
    )
}
