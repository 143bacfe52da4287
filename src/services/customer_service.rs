//! 客户管理服务
//! 回收/寄卖客户档案的增删改查，与其他切片复用同一套
//! 权限门卫、版本检查与审计落地

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::audit::{OperationKind, RequestContext};
use crate::models::customer::{CreateCustomerRequest, Customer, UpdateCustomerRequest};
use crate::services::audit_service::{AuditRecord, AuditService};
use crate::services::concurrency::{
    soft_delete_with_version_check, update_with_version_check,
};
use crate::services::permission_service::{enforce_permission, PermissionService};
use crate::store::{AuditSink, CustomerStore, RoleAssignmentStore, Versioned, VersionedStore};

pub struct CustomerService<C, R, S>
where
    C: CustomerStore,
    R: RoleAssignmentStore,
    S: AuditSink,
{
    customers: Arc<C>,
    permissions: Arc<PermissionService<R>>,
    audit: Arc<AuditService<S>>,
}

impl<C, R, S> CustomerService<C, R, S>
where
    C: CustomerStore,
    R: RoleAssignmentStore,
    S: AuditSink,
{
    pub fn new(
        customers: Arc<C>,
        permissions: Arc<PermissionService<R>>,
        audit: Arc<AuditService<S>>,
    ) -> Self {
        Self {
            customers,
            permissions,
            audit,
        }
    }

    /// 客户建档
    pub async fn create_customer(
        &self,
        ctx: &RequestContext,
        req: CreateCustomerRequest,
    ) -> Result<Customer, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "customer.create").await?;

        let customer = Customer::new(req, ctx.operator_id);
        let created = self.customers.create(&customer).await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Create,
                    target_type: Customer::TARGET,
                    target_id: Some(created.id),
                    before_state: None,
                    after_state: serde_json::to_value(&created).ok(),
                },
            )
            .await;

        Ok(created)
    }

    /// 更新客户档案
    pub async fn update_customer(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        expected_version: i32,
        req: UpdateCustomerRequest,
    ) -> Result<Customer, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "customer.update").await?;

        let operator_id = ctx.operator_id;
        let mutation =
            update_with_version_check(self.customers.as_ref(), id, expected_version, |customer| {
                if let Some(name) = req.name {
                    customer.name = name;
                }
                if let Some(phone) = req.phone {
                    customer.phone = Some(phone);
                }
                if let Some(id_card_no) = req.id_card_no {
                    customer.id_card_no = Some(id_card_no);
                }
                if let Some(remark) = req.remark {
                    customer.remark = Some(remark);
                }
                customer.updated_by = operator_id;
                customer.updated_at = Utc::now();
            })
            .await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Update,
                    target_type: Customer::TARGET,
                    target_id: Some(id),
                    before_state: serde_json::to_value(&mutation.before).ok(),
                    after_state: serde_json::to_value(&mutation.after).ok(),
                },
            )
            .await;

        Ok(mutation.after)
    }

    /// 删除客户（软删除）
    pub async fn delete_customer(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        expected_version: i32,
    ) -> Result<(), AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "customer.delete").await?;

        let before = soft_delete_with_version_check(
            self.customers.as_ref(),
            id,
            expected_version,
            ctx.operator_id,
        )
        .await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Delete,
                    target_type: Customer::TARGET,
                    target_id: Some(id),
                    before_state: serde_json::to_value(&before).ok(),
                    after_state: None,
                },
            )
            .await;

        Ok(())
    }

    /// 获取客户详情
    pub async fn find_customer(&self, ctx: &RequestContext, id: Uuid) -> Result<Customer, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "customer.read").await?;

        match self.customers.get_by_id(id).await? {
            Some(customer) if !customer.is_deleted => Ok(customer),
            _ => Err(AppError::NotFound("customer")),
        }
    }

    /// 列出客户
    pub async fn list_customers(
        &self,
        ctx: &RequestContext,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Customer>, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "customer.read").await?;

        let customers = self.customers.list(limit, offset).await?;
        self.audit.record_query(ctx, Customer::TARGET).await;
        Ok(customers)
    }
}
