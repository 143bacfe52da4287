//! Audit trail and access-denial log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operation kind recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "operation_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Query,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Query => "query",
        }
    }
}

/// Audit log entry, immutable once written. `operator_id` is None for
/// system-initiated actions.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub operator_id: Option<Uuid>,
    pub operator_name: String,
    pub action: OperationKind,
    pub target_type: String,
    pub target_id: Option<Uuid>,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub trace_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Access-denial log entry, immutable once written
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessDenialLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_name: String,
    pub attempted_resource: String,
    pub reason: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub trace_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Audit log query filters
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilters {
    pub operator_id: Option<Uuid>,
    pub action: Option<OperationKind>,
    pub target_type: Option<String>,
    pub target_id: Option<Uuid>,
    pub trace_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Per-request metadata threaded from the boundary into the services.
/// Carries the acting operator plus request provenance for audit and
/// denial records.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub operator_id: Option<Uuid>,
    pub operator_name: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub trace_id: Option<String>,
}

impl RequestContext {
    /// Context for an authenticated operator
    pub fn operator(operator_id: Uuid, operator_name: impl Into<String>) -> Self {
        Self {
            operator_id: Some(operator_id),
            operator_name: operator_name.into(),
            source_ip: None,
            user_agent: None,
            trace_id: None,
        }
    }

    /// Context for system-initiated actions (migrations, seeding)
    pub fn system() -> Self {
        Self {
            operator_id: None,
            operator_name: "system".to_string(),
            source_ip: None,
            user_agent: None,
            trace_id: None,
        }
    }

    pub fn with_request_meta(
        mut self,
        source_ip: Option<String>,
        user_agent: Option<String>,
        trace_id: Option<String>,
    ) -> Self {
        self.source_ip = source_ip;
        self.user_agent = user_agent;
        self.trace_id = trace_id;
        self
    }
}
