//! 客户与服务单据切片集成测试
//!
//! 验证功能切片以同一套平面组合：权限门卫先行、
//! 版本检查仲裁并发、审计落地前后快照、状态机流转约束

mod common;

use backoffice_system::error::AppError;
use backoffice_system::models::audit::{AuditLogFilters, OperationKind};
use backoffice_system::models::customer::{CreateCustomerRequest, UpdateCustomerRequest};
use backoffice_system::models::service_order::{
    CreateOrderRequest, OrderKind, OrderStatus, UpdateOrderRequest,
};
use common::*;

const DESK_CODES: &[&str] = &[
    "customer.create",
    "customer.update",
    "customer.delete",
    "customer.read",
    "serviceOrder.create",
    "serviceOrder.update",
    "serviceOrder.updateStatus",
    "serviceOrder.delete",
    "serviceOrder.read",
];

fn customer_req(name: &str) -> CreateCustomerRequest {
    CreateCustomerRequest {
        name: name.to_string(),
        phone: Some("13800000000".to_string()),
        id_card_no: None,
        remark: None,
    }
}

#[tokio::test]
async fn test_customer_crud_through_the_plane() {
    let harness = setup();
    let store = &harness.store;
    let clerk = seed_operator(store, "clerk", DESK_CODES).await;
    let ctx = ctx_for(&clerk);

    let customer = harness
        .customers
        .create_customer(&ctx, customer_req("张三"))
        .await
        .unwrap();
    assert_eq!(customer.version, 1);

    let updated = harness
        .customers
        .update_customer(
            &ctx,
            customer.id,
            1,
            UpdateCustomerRequest {
                name: None,
                phone: Some("13900000000".to_string()),
                id_card_no: None,
                remark: Some("老客户".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.phone.as_deref(), Some("13900000000"));

    // 过期版本的并发修改者输掉竞争，状态不变
    let result = harness
        .customers
        .update_customer(
            &ctx,
            customer.id,
            1,
            UpdateCustomerRequest {
                name: Some("李四".to_string()),
                phone: None,
                id_card_no: None,
                remark: None,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Conflict { .. })));
    let current = harness.customers.find_customer(&ctx, customer.id).await.unwrap();
    assert_eq!(current.name, "张三");

    harness.customers.delete_customer(&ctx, customer.id, 2).await.unwrap();
    let result = harness.customers.find_customer(&ctx, customer.id).await;
    assert!(matches!(result, Err(AppError::NotFound("customer"))));
}

#[tokio::test]
async fn test_order_requires_active_customer_and_unique_number() {
    let harness = setup();
    let store = &harness.store;
    let clerk = seed_operator(store, "clerk", DESK_CODES).await;
    let ctx = ctx_for(&clerk);

    let result = harness
        .orders
        .create_order(
            &ctx,
            CreateOrderRequest {
                order_no: "BB-20260806-001".to_string(),
                customer_id: uuid::Uuid::new_v4(),
                kind: OrderKind::Buyback,
                amount_cents: 120_000,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::NotFound("customer"))));

    let customer = harness
        .customers
        .create_customer(&ctx, customer_req("王五"))
        .await
        .unwrap();

    harness
        .orders
        .create_order(
            &ctx,
            CreateOrderRequest {
                order_no: "BB-20260806-001".to_string(),
                customer_id: customer.id,
                kind: OrderKind::Buyback,
                amount_cents: 120_000,
            },
        )
        .await
        .unwrap();

    let result = harness
        .orders
        .create_order(
            &ctx,
            CreateOrderRequest {
                order_no: "BB-20260806-001".to_string(),
                customer_id: customer.id,
                kind: OrderKind::Consignment,
                amount_cents: 50_000,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Duplicate("order number"))));
}

#[tokio::test]
async fn test_order_status_transitions() {
    let harness = setup();
    let store = &harness.store;
    let clerk = seed_operator(store, "clerk", DESK_CODES).await;
    let ctx = ctx_for(&clerk);

    let customer = harness
        .customers
        .create_customer(&ctx, customer_req("赵六"))
        .await
        .unwrap();
    let order = harness
        .orders
        .create_order(
            &ctx,
            CreateOrderRequest {
                order_no: "CS-20260806-007".to_string(),
                customer_id: customer.id,
                kind: OrderKind::Consignment,
                amount_cents: 88_000,
            },
        )
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Draft);

    // 草稿不能直接完成
    let result = harness
        .orders
        .transition_status(&ctx, order.id, 1, OrderStatus::Completed)
        .await;
    assert!(matches!(result, Err(AppError::PolicyViolation(_))));

    let signed = harness
        .orders
        .transition_status(&ctx, order.id, 1, OrderStatus::Signed)
        .await
        .unwrap();
    assert_eq!(signed.status, OrderStatus::Signed);
    assert_eq!(signed.version, 2);

    let completed = harness
        .orders
        .transition_status(&ctx, order.id, 2, OrderStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);

    // 完成后不可取消
    let result = harness
        .orders
        .transition_status(&ctx, order.id, 3, OrderStatus::Cancelled)
        .await;
    assert!(matches!(result, Err(AppError::PolicyViolation(_))));
}

#[tokio::test]
async fn test_order_update_records_before_and_after_snapshots() {
    let harness = setup();
    let store = &harness.store;
    let clerk = seed_operator(store, "clerk", DESK_CODES).await;
    let ctx = ctx_for(&clerk);

    let customer = harness
        .customers
        .create_customer(&ctx, customer_req("钱七"))
        .await
        .unwrap();
    let order = harness
        .orders
        .create_order(
            &ctx,
            CreateOrderRequest {
                order_no: "BB-20260806-002".to_string(),
                customer_id: customer.id,
                kind: OrderKind::Buyback,
                amount_cents: 10_000,
            },
        )
        .await
        .unwrap();

    harness
        .orders
        .update_order(
            &ctx,
            order.id,
            1,
            UpdateOrderRequest {
                amount_cents: Some(12_000),
                contract_url: Some("https://blob.example/contract.pdf".to_string()),
                signature_url: None,
            },
        )
        .await
        .unwrap();

    let logs = harness
        .audit
        .query_logs(
            &AuditLogFilters {
                action: Some(OperationKind::Update),
                target_type: Some("service_order".to_string()),
                target_id: Some(order.id),
                ..Default::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    let before = logs[0].before_state.as_ref().unwrap();
    let after = logs[0].after_state.as_ref().unwrap();
    assert_eq!(before["amount_cents"], 10_000);
    assert_eq!(after["amount_cents"], 12_000);
    assert_eq!(logs[0].operator_id, Some(clerk.id));
}

#[tokio::test]
async fn test_unauthorized_clerk_cannot_touch_orders() {
    let harness = setup();
    let store = &harness.store;
    // 只有客户权限，没有单据权限
    let clerk = seed_operator(store, "limited", &["customer.create"]).await;
    let ctx = ctx_for(&clerk);

    let customer = harness
        .customers
        .create_customer(&ctx, customer_req("孙八"))
        .await
        .unwrap();

    let result = harness
        .orders
        .create_order(
            &ctx,
            CreateOrderRequest {
                order_no: "BB-20260806-003".to_string(),
                customer_id: customer.id,
                kind: OrderKind::Buyback,
                amount_cents: 1_000,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Forbidden)));

    // 单据权限可经通配模式授权
    let auditor = seed_operator(store, "auditor", &["serviceOrder.read"]).await;
    assert!(harness
        .permissions
        .authorize(auditor.id, "serviceOrder.*")
        .await
        .unwrap());
}
