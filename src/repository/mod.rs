//! Database repository layer
//! 存储端口的 PostgreSQL 实现

pub mod audit_repo;
pub mod customer_repo;
pub mod order_repo;
pub mod permission_repo;
pub mod role_repo;
pub mod user_repo;

pub use audit_repo::AuditRepository;
pub use customer_repo::CustomerRepository;
pub use order_repo::OrderRepository;
pub use permission_repo::PermissionRepository;
pub use role_repo::RoleRepository;
pub use user_repo::UserRepository;
