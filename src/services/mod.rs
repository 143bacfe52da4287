//! 业务服务层
//! 权限解析、并发控制协议、审计记录与各功能切片服务

pub mod audit_service;
pub mod concurrency;
pub mod customer_service;
pub mod order_service;
pub mod permission_service;
pub mod role_service;
pub mod user_service;

pub use audit_service::AuditService;
pub use customer_service::CustomerService;
pub use order_service::OrderService;
pub use permission_service::PermissionService;
pub use role_service::RoleService;
pub use user_service::UserService;
