//! Customer repository (客户数据访问)

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::customer::Customer;
use crate::store::{CustomerStore, VersionedStore};

pub struct CustomerRepository {
    db: PgPool,
}

impl CustomerRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VersionedStore<Customer> for CustomerRepository {
    /// 根据 ID 查找客户（包含已软删除的行）
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Customer>, AppError> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(customer)
    }

    /// 是否存在活跃行
    async fn exists_active(&self, id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM customers WHERE id = $1 AND NOT is_deleted)",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    /// 客户建档
    async fn create(&self, aggregate: &Customer) -> Result<Customer, AppError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (
                id, name, phone, id_card_no, remark, version, is_deleted,
                created_by, created_at, updated_by, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(aggregate.id)
        .bind(&aggregate.name)
        .bind(&aggregate.phone)
        .bind(&aggregate.id_card_no)
        .bind(&aggregate.remark)
        .bind(aggregate.version)
        .bind(aggregate.is_deleted)
        .bind(aggregate.created_by)
        .bind(aggregate.created_at)
        .bind(aggregate.updated_by)
        .bind(aggregate.updated_at)
        .fetch_one(&self.db)
        .await?;

        Ok(customer)
    }

    /// 条件更新
    async fn conditional_update(
        &self,
        aggregate: &Customer,
        expected_version: i32,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET
                name = $3,
                phone = $4,
                id_card_no = $5,
                remark = $6,
                updated_by = $7,
                updated_at = $8,
                version = version + 1
            WHERE id = $1 AND version = $2 AND NOT is_deleted
            "#,
        )
        .bind(aggregate.id)
        .bind(expected_version)
        .bind(&aggregate.name)
        .bind(&aggregate.phone)
        .bind(&aggregate.id_card_no)
        .bind(&aggregate.remark)
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
            UPDATE customers
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
impl CustomerStore for CustomerRepository {
    /// 列出活跃客户
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Customer>, AppError> {
        let customers = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE NOT is_deleted ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(customers)
    }
}
