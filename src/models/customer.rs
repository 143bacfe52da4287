//! Customer domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Walk-in customer for buyback/consignment intake
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub id_card_no: Option<String>,
    pub remark: Option<String>,
    pub version: i32,
    pub is_deleted: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Customer {
    pub fn new(req: CreateCustomerRequest, created_by: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: req.name,
            phone: req.phone,
            id_card_no: req.id_card_no,
            remark: req.remark,
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

/// Create customer request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub phone: Option<String>,
    pub id_card_no: Option<String>,
    pub remark: Option<String>,
}

/// Update customer request
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub id_card_no: Option<String>,
    pub remark: Option<String>,
}
