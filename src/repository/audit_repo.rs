//! Audit repository (审计数据访问)
//! 审计与访问拒绝日志只有插入和查询两个面，不存在更新或删除

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::audit::{AccessDenialLog, AuditLog, AuditLogFilters};
use crate::store::AuditSink;

pub struct AuditRepository {
    db: PgPool,
}

impl AuditRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 拼接过滤条件，返回占位符个数
    fn push_filters(query: &mut String, filters: &AuditLogFilters) -> usize {
        let mut index = 0;

        if filters.operator_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND operator_id = ${}", index));
        }
        if filters.action.is_some() {
            index += 1;
            query.push_str(&format!(" AND action = ${}", index));
        }
        if filters.target_type.is_some() {
            index += 1;
            query.push_str(&format!(" AND target_type = ${}", index));
        }
        if filters.target_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND target_id = ${}", index));
        }
        if filters.trace_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND trace_id = ${}", index));
        }
        if filters.start_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND occurred_at >= ${}", index));
        }
        if filters.end_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND occurred_at <= ${}", index));
        }

        index
    }
}

/// 依过滤器顺序绑定参数
macro_rules! bind_filters {
    ($builder:expr, $filters:expr) => {{
        let mut builder = $builder;
        if let Some(operator_id) = $filters.operator_id {
            builder = builder.bind(operator_id);
        }
        if let Some(action) = $filters.action {
            builder = builder.bind(action);
        }
        if let Some(target_type) = &$filters.target_type {
            builder = builder.bind(target_type);
        }
        if let Some(target_id) = $filters.target_id {
            builder = builder.bind(target_id);
        }
        if let Some(trace_id) = &$filters.trace_id {
            builder = builder.bind(trace_id);
        }
        if let Some(start_time) = $filters.start_time {
            builder = builder.bind(start_time);
        }
        if let Some(end_time) = $filters.end_time {
            builder = builder.bind(end_time);
        }
        builder
    }};
}

#[async_trait]
impl AuditSink for AuditRepository {
    /// 插入审计日志
    async fn insert_audit_log(&self, entry: &AuditLog) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, operator_id, operator_name, action, target_type, target_id,
                before_state, after_state, source_ip, user_agent, trace_id, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.id)
        .bind(entry.operator_id)
        .bind(&entry.operator_name)
        .bind(entry.action)
        .bind(&entry.target_type)
        .bind(entry.target_id)
        .bind(&entry.before_state)
        .bind(&entry.after_state)
        .bind(&entry.source_ip)
        .bind(&entry.user_agent)
        .bind(&entry.trace_id)
        .bind(entry.occurred_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 插入访问拒绝日志
    async fn insert_denial_log(&self, entry: &AccessDenialLog) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO access_denial_logs (
                id, user_id, user_name, attempted_resource, reason,
                source_ip, user_agent, trace_id, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(&entry.user_name)
        .bind(&entry.attempted_resource)
        .bind(&entry.reason)
        .bind(&entry.source_ip)
        .bind(&entry.user_agent)
        .bind(&entry.trace_id)
        .bind(entry.occurred_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 查询审计日志
    async fn query_audit_logs(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, AppError> {
        let mut query = String::from("SELECT * FROM audit_logs WHERE 1=1");
        let index = Self::push_filters(&mut query, filters);
        query.push_str(&format!(
            " ORDER BY occurred_at DESC LIMIT ${} OFFSET ${}",
            index + 1,
            index + 2
        ));

        let builder = bind_filters!(sqlx::query_as::<_, AuditLog>(&query), filters);
        let logs = builder.bind(limit).bind(offset).fetch_all(&self.db).await?;

        Ok(logs)
    }

    /// 统计审计日志数量
    async fn count_audit_logs(&self, filters: &AuditLogFilters) -> Result<i64, AppError> {
        let mut query = String::from("SELECT COUNT(*) FROM audit_logs WHERE 1=1");
        Self::push_filters(&mut query, filters);

        let builder = bind_filters!(sqlx::query_scalar::<_, i64>(&query), filters);
        let count = builder.fetch_one(&self.db).await?;

        Ok(count)
    }

    /// 查询访问拒绝日志
    async fn query_denial_logs(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AccessDenialLog>, AppError> {
        let logs = match user_id {
            Some(user_id) => {
                sqlx::query_as::<_, AccessDenialLog>(
                    r#"
                    SELECT * FROM access_denial_logs
                    WHERE user_id = $1
                    ORDER BY occurred_at DESC LIMIT $2
                    "#,
                )
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, AccessDenialLog>(
                    "SELECT * FROM access_denial_logs ORDER BY occurred_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(logs)
    }
}
