#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;
use ordering::engine::OrderEngine;
use ordering::error::OrderError;
use ordering::memory::MemoryStore;
use ordering::model::{
    ModelId, NewCartItem, NewOrder, OrderStatus, PayStatus, SubmitRequest,
};
use ordering::storage::{ChargeOutcome, PaymentGateway};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn charge(
            &self,
            order_number: &str,
            amount: Decimal,
            description: &str,
            payer: ModelId,
        ) -> Result<ChargeOutcome, OrderError>;

        async fn refund(&self, order_number: &str, amount: Decimal) -> Result<(), OrderError>;
    }
}

/// Engine wired entirely to one in-memory store. Expectations must be
/// set on the mock gateway before it is handed over.
pub fn engine(store: &Arc<MemoryStore>, gateway: MockGateway) -> OrderEngine {
    OrderEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(gateway),
    )
}

pub fn submit_request(address_id: ModelId) -> SubmitRequest {
    SubmitRequest {
        address_id,
        remark: None,
        estimated_delivery_time: None,
    }
}

pub fn dish_cart_item(user_id: ModelId, dish_id: ModelId, quantity: i32, price: Decimal) -> NewCartItem {
    NewCartItem {
        user_id,
        dish_id: Some(dish_id),
        setmeal_id: None,
        flavor: Some("mild".to_string()),
        quantity,
        unit_amount: price,
        name: format!("dish-{dish_id}"),
        image: Some(format!("dish-{dish_id}.png")),
        created_at: Utc::now(),
    }
}

pub fn setmeal_cart_item(
    user_id: ModelId,
    setmeal_id: ModelId,
    quantity: i32,
    price: Decimal,
) -> NewCartItem {
    NewCartItem {
        user_id,
        dish_id: None,
        setmeal_id: Some(setmeal_id),
        flavor: None,
        quantity,
        unit_amount: price,
        name: format!("setmeal-{setmeal_id}"),
        image: None,
        created_at: Utc::now(),
    }
}

/// Insert an order header directly, in an arbitrary state; used for
/// reconciler staleness scenarios.
pub async fn seed_order(
    store: &MemoryStore,
    user_id: ModelId,
    status: OrderStatus,
    pay_status: PayStatus,
    order_time: DateTime<Utc>,
    delivery_time: Option<DateTime<Utc>>,
) -> ModelId {
    let id = store.next_order_id().await;
    let new_order = NewOrder {
        number: common::generate_unique_id("ORD"),
        user_id,
        amount: dec!(45.00),
        consignee: "Alex".to_string(),
        phone: "13800000000".to_string(),
        address: "1 Main St".to_string(),
        remark: None,
        order_time,
        estimated_delivery_time: None,
    };
    let mut order = new_order.materialize(id);
    order.status = status;
    order.pay_status = pay_status;
    order.delivery_time = delivery_time;
    store.put_order(order).await;
    id
}
