//! 回收/寄卖后台管理系统核心库
//! 提供权限解析、乐观并发控制与审计追踪平面，
//! 以及各功能切片复用它们的业务服务

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod store;
pub mod telemetry;
