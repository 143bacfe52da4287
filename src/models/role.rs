//! Role and permission domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub version: i32,
    pub is_deleted: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    pub fn new(name: String, description: Option<String>, created_by: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
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

/// Permission kind: a routed page/endpoint or a function point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "permission_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    Route,
    Function,
}

/// Permission with a dotted hierarchical code, e.g. `serviceOrder.buyback.read`
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub kind: PermissionKind,
    pub route_path: Option<String>,
    pub version: i32,
    pub is_deleted: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Permission {
    pub fn new(
        code: String,
        name: String,
        kind: PermissionKind,
        route_path: Option<String>,
        created_by: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code,
            name,
            kind,
            route_path,
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

/// Role <-> permission assignment. Hard deleted on removal, unique at
/// all times.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
    pub granted_by: Option<Uuid>,
    pub granted_at: DateTime<Utc>,
}

/// Create role request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Update role request
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Create permission request
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePermissionRequest {
    pub code: String,
    pub name: String,
    pub kind: PermissionKind,
    pub route_path: Option<String>,
}

/// Update permission request
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePermissionRequest {
    pub name: Option<String>,
    pub route_path: Option<String>,
}
