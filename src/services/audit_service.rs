//! 审计服务
//! 审计轨迹与访问拒绝两个记录器：只追加、尽力而为。
//! 落地失败被捕获、以 error 级别记录后丢弃——审计可用性
//! 永远不构成业务操作失败的理由，这是显式的、被测试的契约。

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::error::AppError;
use crate::models::audit::{
    AccessDenialLog, AuditLog, AuditLogFilters, OperationKind, RequestContext,
};
use crate::store::AuditSink;

/// 审计条目参数
#[derive(Debug, Clone)]
pub struct AuditRecord<'a> {
    pub action: OperationKind,
    pub target_type: &'a str,
    pub target_id: Option<Uuid>,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
}

pub struct AuditService<S: AuditSink> {
    sink: Arc<S>,
    query_max_limit: i64,
    record_reads: bool,
}

impl<S: AuditSink> AuditService<S> {
    pub fn new(sink: Arc<S>, config: &AuditConfig) -> Self {
        Self {
            sink,
            query_max_limit: config.query_max_limit,
            record_reads: config.record_reads,
        }
    }

    /// 记录一次特权变更
    ///
    /// 失败被吞掉：返回值只反映是否成功落地，主操作结果不受影响。
    pub async fn record(&self, ctx: &RequestContext, record: AuditRecord<'_>) -> bool {
        let entry = AuditLog {
            id: Uuid::new_v4(),
            operator_id: ctx.operator_id,
            operator_name: ctx.operator_name.clone(),
            action: record.action,
            target_type: record.target_type.to_string(),
            target_id: record.target_id,
            before_state: record.before_state,
            after_state: record.after_state,
            source_ip: ctx.source_ip.clone(),
            user_agent: ctx.user_agent.clone(),
            trace_id: ctx.trace_id.clone(),
            occurred_at: Utc::now(),
        };

        match self.sink.insert_audit_log(&entry).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    action = record.action.as_str(),
                    target_type = record.target_type,
                    "Failed to persist audit log entry"
                );
                false
            }
        }
    }

    /// 记录一次只读访问（query 类审计），受配置开关控制
    pub async fn record_query(&self, ctx: &RequestContext, target_type: &str) -> bool {
        if !self.record_reads {
            return false;
        }
        self.record(
            ctx,
            AuditRecord {
                action: OperationKind::Query,
                target_type,
                target_id: None,
                before_state: None,
                after_state: None,
            },
        )
        .await
    }

    /// 记录一次访问拒绝
    ///
    /// 与审计轨迹同样尽力而为；返回 false 表示未能落地，
    /// 绝不能被解释为授权放行。
    pub async fn record_denial(
        &self,
        ctx: &RequestContext,
        attempted_resource: &str,
        reason: &str,
    ) -> bool {
        let entry = AccessDenialLog {
            id: Uuid::new_v4(),
            user_id: ctx.operator_id,
            user_name: ctx.operator_name.clone(),
            attempted_resource: attempted_resource.to_string(),
            reason: reason.to_string(),
            source_ip: ctx.source_ip.clone(),
            user_agent: ctx.user_agent.clone(),
            trace_id: ctx.trace_id.clone(),
            occurred_at: Utc::now(),
        };

        match self.sink.insert_denial_log(&entry).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    attempted_resource = attempted_resource,
                    "Failed to persist access denial entry"
                );
                false
            }
        }
    }

    /// 查询审计日志（读投影，不属于核心写路径）
    pub async fn query_logs(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, AppError> {
        let limit = limit.clamp(1, self.query_max_limit);
        self.sink.query_audit_logs(filters, limit, offset).await
    }

    /// 统计审计日志数量
    pub async fn count_logs(&self, filters: &AuditLogFilters) -> Result<i64, AppError> {
        self.sink.count_audit_logs(filters).await
    }

    /// 查询访问拒绝日志
    pub async fn query_denials(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AccessDenialLog>, AppError> {
        let limit = limit.clamp(1, self.query_max_limit);
        self.sink.query_denial_logs(user_id, limit).await
    }
}
