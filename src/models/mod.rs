//! 数据模型模块
//! 账户、角色权限、客户与服务单据聚合，以及审计日志模型

pub mod audit;
pub mod customer;
pub mod role;
pub mod service_order;
pub mod user;
