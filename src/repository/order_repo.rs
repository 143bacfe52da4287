//! Service order repository (服务单据数据访问)

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::service_order::ServiceOrder;
use crate::store::{OrderStore, VersionedStore};

pub struct OrderRepository {
    db: PgPool,
}

impl OrderRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VersionedStore<ServiceOrder> for OrderRepository {
    /// 根据 ID 查找单据（包含已软删除的行）
    async fn get_by_id(&self, id: Uuid) -> Result<Option<ServiceOrder>, AppError> {
        let order =
            sqlx::query_as::<_, ServiceOrder>("SELECT * FROM service_orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db)
                .await?;

        Ok(order)
    }

    /// 是否存在活跃行
    async fn exists_active(&self, id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM service_orders WHERE id = $1 AND NOT is_deleted)",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    /// 创建单据；活跃行中的重复单号由部分唯一索引裁决
    async fn create(&self, aggregate: &ServiceOrder) -> Result<ServiceOrder, AppError> {
        let order = sqlx::query_as::<_, ServiceOrder>(
            r#"
            INSERT INTO service_orders (
                id, order_no, customer_id, kind, status, amount_cents,
                contract_url, signature_url, version, is_deleted,
                created_by, created_at, updated_by, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(aggregate.id)
        .bind(&aggregate.order_no)
        .bind(aggregate.customer_id)
        .bind(aggregate.kind)
        .bind(aggregate.status)
        .bind(aggregate.amount_cents)
        .bind(&aggregate.contract_url)
        .bind(&aggregate.signature_url)
        .bind(aggregate.version)
        .bind(aggregate.is_deleted)
        .bind(aggregate.created_by)
        .bind(aggregate.created_at)
        .bind(aggregate.updated_by)
        .bind(aggregate.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::map_unique(e, "order number"))?;

        Ok(order)
    }

    /// 条件更新
    async fn conditional_update(
        &self,
        aggregate: &ServiceOrder,
        expected_version: i32,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE service_orders
            SET
                status = $3,
                amount_cents = $4,
                contract_url = $5,
                signature_url = $6,
                updated_by = $7,
                updated_at = $8,
                version = version + 1
            WHERE id = $1 AND version = $2 AND NOT is_deleted
            "#,
        )
        .bind(aggregate.id)
        .bind(expected_version)
        .bind(aggregate.status)
        .bind(aggregate.amount_cents)
        .bind(&aggregate.contract_url)
        .bind(&aggregate.signature_url)
        .bind(aggregate.updated_by)
        .bind(aggregate.updated_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// 条件软删除
    async fn conditional_soft_delete(
        &self,
        id: Uuid,
        expected_version: i32,
        deleted_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE service_orders
            SET
                is_deleted = TRUE,
                deleted_by = $3,
                deleted_at = NOW(),
                version = version + 1
            WHERE id = $1 AND version = $2 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(deleted_by)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    /// 根据单号查找活跃单据
    async fn find_by_order_no(&self, order_no: &str) -> Result<Option<ServiceOrder>, AppError> {
        let order = sqlx::query_as::<_, ServiceOrder>(
            "SELECT * FROM service_orders WHERE order_no = $1 AND NOT is_deleted",
        )
        .bind(order_no)
        .fetch_optional(&self.db)
        .await?;

        Ok(order)
    }

    /// 列出客户名下的活跃单据
    async fn list_for_customer(&self, customer_id: Uuid) -> Result<Vec<ServiceOrder>, AppError> {
        let orders = sqlx::query_as::<_, ServiceOrder>(
            r#"
            SELECT * FROM service_orders
            WHERE customer_id = $1 AND NOT is_deleted
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.db)
        .await?;

        Ok(orders)
    }
}
