//! 服务单据服务
//! 回收/寄卖单据的创建、修改、状态流转与删除。
//! 合同与签名图片由外部协作方生成并上传，这里只登记 URL。

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::audit::{OperationKind, RequestContext};
use crate::models::service_order::{
    CreateOrderRequest, OrderStatus, ServiceOrder, UpdateOrderRequest,
};
use crate::services::audit_service::{AuditRecord, AuditService};
use crate::services::concurrency::{
    soft_delete_with_version_check, update_with_version_check,
};
use crate::services::permission_service::{enforce_permission, PermissionService};
use crate::store::{
    AuditSink, CustomerStore, OrderStore, RoleAssignmentStore, Versioned, VersionedStore,
};

pub struct OrderService<O, C, R, S>
where
    O: OrderStore,
    C: CustomerStore,
    R: RoleAssignmentStore,
    S: AuditSink,
{
    orders: Arc<O>,
    customers: Arc<C>,
    permissions: Arc<PermissionService<R>>,
    audit: Arc<AuditService<S>>,
}

impl<O, C, R, S> OrderService<O, C, R, S>
where
    O: OrderStore,
    C: CustomerStore,
    R: RoleAssignmentStore,
    S: AuditSink,
{
    pub fn new(
        orders: Arc<O>,
        customers: Arc<C>,
        permissions: Arc<PermissionService<R>>,
        audit: Arc<AuditService<S>>,
    ) -> Self {
        Self {
            orders,
            customers,
            permissions,
            audit,
        }
    }

    /// 创建单据（初始状态为草稿）
    pub async fn create_order(
        &self,
        ctx: &RequestContext,
        req: CreateOrderRequest,
    ) -> Result<ServiceOrder, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "serviceOrder.create").await?;

        if !VersionedStore::exists_active(self.customers.as_ref(), req.customer_id).await? {
            return Err(AppError::NotFound("customer"));
        }
        if self.orders.find_by_order_no(&req.order_no).await?.is_some() {
            return Err(AppError::Duplicate("order number"));
        }

        let order = ServiceOrder::new(req, ctx.operator_id);
        let created = self.orders.create(&order).await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Create,
                    target_type: ServiceOrder::TARGET,
                    target_id: Some(created.id),
                    before_state: None,
                    after_state: serde_json::to_value(&created).ok(),
                },
            )
            .await;

        Ok(created)
    }

    /// 更新单据（金额、合同/签名 URL）
    pub async fn update_order(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        expected_version: i32,
        req: UpdateOrderRequest,
    ) -> Result<ServiceOrder, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "serviceOrder.update").await?;

        let operator_id = ctx.operator_id;
        let mutation =
            update_with_version_check(self.orders.as_ref(), id, expected_version, |order| {
                if let Some(amount_cents) = req.amount_cents {
                    order.amount_cents = amount_cents;
                }
                if let Some(contract_url) = req.contract_url {
                    order.contract_url = Some(contract_url);
                }
                if let Some(signature_url) = req.signature_url {
                    order.signature_url = Some(signature_url);
                }
                order.updated_by = operator_id;
                order.updated_at = Utc::now();
            })
            .await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Update,
                    target_type: ServiceOrder::TARGET,
                    target_id: Some(id),
                    before_state: serde_json::to_value(&mutation.before).ok(),
                    after_state: serde_json::to_value(&mutation.after).ok(),
                },
            )
            .await;

        Ok(mutation.after)
    }

    /// 单据状态流转
    ///
    /// 允许的流转见 [`OrderStatus::can_transition`]；非法跳转报
    /// PolicyViolation。这里的前置读取只做流转校验，最终一致性
    /// 仍由条件写入的版本检查保证。
    pub async fn transition_status(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        expected_version: i32,
        next: OrderStatus,
    ) -> Result<ServiceOrder, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "serviceOrder.updateStatus")
            .await?;

        let current = match self.orders.get_by_id(id).await? {
            Some(order) if !order.is_deleted => order,
            _ => return Err(AppError::NotFound(ServiceOrder::TARGET)),
        };
        if !current.status.can_transition(next) {
            return Err(AppError::PolicyViolation(format!(
                "order status cannot change from {} to {}",
                current.status.as_str(),
                next.as_str(),
            )));
        }

        let operator_id = ctx.operator_id;
        let mutation =
            update_with_version_check(self.orders.as_ref(), id, expected_version, |order| {
                order.status = next;
                order.updated_by = operator_id;
                order.updated_at = Utc::now();
            })
            .await?;

        self.audit
            .record(
                ctx,
                AuditRecord {
                    action: OperationKind::Update,
                    target_type: ServiceOrder::TARGET,
                    target_id: Some(id),
                    before_state: serde_json::to_value(&mutation.before).ok(),
                    after_state: serde_json::to_value(&mutation.after).ok(),
                },
            )
            .await;

        Ok(mutation.after)
    }

    /// 删除单据（软删除）
    pub async fn delete_order(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        expected_version: i32,
    ) -> Result<(), AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "serviceOrder.delete").await?;

        let before = soft_delete_with_version_check(
            self.orders.as_ref(),
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
                    target_type: ServiceOrder::TARGET,
                    target_id: Some(id),
                    before_state: serde_json::to_value(&before).ok(),
                    after_state: None,
                },
            )
            .await;

        Ok(())
    }

    /// 获取单据详情
    pub async fn find_order(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<ServiceOrder, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "serviceOrder.read").await?;

        match self.orders.get_by_id(id).await? {
            Some(order) if !order.is_deleted => Ok(order),
            _ => Err(AppError::NotFound(ServiceOrder::TARGET)),
        }
    }

    /// 列出客户名下的单据
    pub async fn list_orders_for_customer(
        &self,
        ctx: &RequestContext,
        customer_id: Uuid,
    ) -> Result<Vec<ServiceOrder>, AppError> {
        enforce_permission(&self.permissions, &self.audit, ctx, "serviceOrder.read").await?;

        let orders = self.orders.list_for_customer(customer_id).await?;
        self.audit.record_query(ctx, ServiceOrder::TARGET).await;
        Ok(orders)
    }
}
