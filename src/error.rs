//! 统一错误模型
//! 定义核心平面的错误分类和对外消息格式

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 底层存储读取/写入失败（必须与"授权拒绝"区分开）
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// 权限校验未通过
    #[error("Access denied")]
    Forbidden,

    /// 目标聚合不存在（或已被软删除）
    #[error("{0} not found")]
    NotFound(&'static str),

    /// 版本冲突：调用方持有的版本已经过期
    #[error("Version conflict on {target}: expected {expected}, found {actual}")]
    Conflict {
        target: &'static str,
        expected: i32,
        actual: i32,
    },

    /// 唯一性约束冲突
    #[error("Duplicate {0}")]
    Duplicate(&'static str),

    /// 引用完整性保护：目标仍被其他记录引用
    #[error("{0} is still in use")]
    InUse(&'static str),

    /// 业务策略硬性约束（与并发无关）
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Internal error")]
    Internal,
}

impl AppError {
    /// 获取稳定的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "retrieval_error",
            AppError::Config(_) => "config_error",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict { .. } => "conflict",
            AppError::Duplicate(_) => "duplicate",
            AppError::InUse(_) => "in_use",
            AppError::PolicyViolation(_) => "policy_violation",
            AppError::Internal => "internal",
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(_) => "Storage error occurred".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Forbidden => "Access denied".to_string(),
            AppError::NotFound(target) => format!("{} not found", target),
            AppError::Conflict { target, .. } => {
                format!("{} was modified by another operator, refresh and retry", target)
            }
            AppError::Duplicate(field) => format!("Duplicate {}", field),
            AppError::InUse(target) => format!("{} is still in use", target),
            AppError::PolicyViolation(reason) => reason.clone(),
            AppError::Internal => "Internal error".to_string(),
        }
    }

    /// 该错误是否属于"重新读取后可重试"的并发冲突
    ///
    /// Duplicate/InUse/PolicyViolation 表示请求本身永远无法成功，
    /// 不应重试；只有版本冲突属于可重试类别。
    pub fn retryable(&self) -> bool {
        matches!(self, AppError::Conflict { .. })
    }

    /// 将数据库唯一约束冲突翻译为 Duplicate，其余错误保持为 Database
    ///
    /// 存储自身的唯一约束是防重复的最终裁决：应用层预检查只能缩小窗口，
    /// 插入时的约束冲突仍然必须映射为可识别的 Duplicate。
    pub fn map_unique(err: sqlx::Error, field: &'static str) -> AppError {
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Duplicate(field)
            }
            other => AppError::Database(other),
        }
    }
}

/// 从 String 转换为 AppError::Config
impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Config(s)
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}
