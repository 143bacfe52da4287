//! Service order domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// 回收
    Buyback,
    /// 寄卖
    Consignment,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// 草稿（合同未签署）
    Draft,
    /// 已签署
    Signed,
    /// 已完成
    Completed,
    /// 已取消
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Signed => "signed",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a transition to `next` is allowed. Completed and
    /// cancelled orders are terminal.
    pub fn can_transition(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Draft, OrderStatus::Signed)
                | (OrderStatus::Signed, OrderStatus::Completed)
                | (OrderStatus::Draft, OrderStatus::Cancelled)
                | (OrderStatus::Signed, OrderStatus::Cancelled)
        )
    }
}

/// Buyback/consignment service order. The contract document and
/// signature image live in blob storage; only their URLs are kept here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceOrder {
    pub id: Uuid,
    pub order_no: String,
    pub customer_id: Uuid,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub amount_cents: i64,
    pub contract_url: Option<String>,
    pub signature_url: Option<String>,
    pub version: i32,
    pub is_deleted: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ServiceOrder {
    pub fn new(req: CreateOrderRequest, created_by: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_no: req.order_no,
            customer_id: req.customer_id,
            kind: req.kind,
            status: OrderStatus::Draft,
            amount_cents: req.amount_cents,
            contract_url: None,
            signature_url: None,
            version: 1,
            is_deleted: false,
            created_by,
            created_at: now,
            updated_by: created_by,
            updated_at: now,
            deleted_by: None,
            deleted_at: None,
        }
    }
}

/// Create order request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub order_no: String,
    pub customer_id: Uuid,
    pub kind: OrderKind,
    pub amount_cents: i64,
}

/// Update order request
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderRequest {
    pub amount_cents: Option<i64>,
    pub contract_url: Option<String>,
    pub signature_url: Option<String>,
}
