use crate::error::OrderError;
use crate::model::{
    AddressEntry, AddressSnapshot, CartItem, CartSelection, ModelId, NewCartItem, NewOrder,
    NewOrderLine, Order, OrderLine, OrderStatus, PayStatus, StatusChange,
};
use crate::storage::{AddressBook, CartStore, OrderStore, TransitionOutcome};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error};

/// Postgres-backed order, cart and address storage over one pool.
///
/// All queries use runtime binding; multi-step writes run inside one
/// explicit transaction so partial application is never observable.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn new(database_url: &str) -> Result<Self, OrderError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize_schema(&self) -> Result<(), OrderError> {
        let schema_sql = include_str!("../resources/schema.sql");
        sqlx::raw_sql(schema_sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: ModelId,
    number: String,
    user_id: ModelId,
    status: i16,
    pay_status: i16,
    amount: Decimal,
    consignee: String,
    phone: String,
    address: String,
    remark: Option<String>,
    order_time: DateTime<Utc>,
    checkout_time: Option<DateTime<Utc>>,
    cancel_time: Option<DateTime<Utc>>,
    delivery_time: Option<DateTime<Utc>>,
    estimated_delivery_time: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    rejection_reason: Option<String>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order, OrderError> {
        let status = OrderStatus::from_code(self.status)
            .ok_or_else(|| anyhow!("order {} has unknown status code {}", self.id, self.status))?;
        let pay_status = PayStatus::from_code(self.pay_status).ok_or_else(|| {
            anyhow!(
                "order {} has unknown pay status code {}",
                self.id,
                self.pay_status
            )
        })?;
        Ok(Order {
            id: self.id,
            number: self.number,
            user_id: self.user_id,
            status,
            pay_status,
            amount: self.amount,
            consignee: self.consignee,
            phone: self.phone,
            address: self.address,
            remark: self.remark,
            order_time: self.order_time,
            checkout_time: self.checkout_time,
            cancel_time: self.cancel_time,
            delivery_time: self.delivery_time,
            estimated_delivery_time: self.estimated_delivery_time,
            cancel_reason: self.cancel_reason,
            rejection_reason: self.rejection_reason,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    id: ModelId,
    order_id: ModelId,
    name: String,
    image: Option<String>,
    dish_id: Option<ModelId>,
    setmeal_id: Option<ModelId>,
    flavor: Option<String>,
    quantity: i32,
    unit_amount: Decimal,
}

impl From<OrderLineRow> for OrderLine {
    fn from(row: OrderLineRow) -> Self {
        OrderLine {
            id: row.id,
            order_id: row.order_id,
            name: row.name,
            image: row.image,
            dish_id: row.dish_id,
            setmeal_id: row.setmeal_id,
            flavor: row.flavor,
            quantity: row.quantity,
            unit_amount: row.unit_amount,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: ModelId,
    user_id: ModelId,
    dish_id: Option<ModelId>,
    setmeal_id: Option<ModelId>,
    flavor: Option<String>,
    quantity: i32,
    unit_amount: Decimal,
    name: String,
    image: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        CartItem {
            id: row.id,
            user_id: row.user_id,
            dish_id: row.dish_id,
            setmeal_id: row.setmeal_id,
            flavor: row.flavor,
            quantity: row.quantity,
            unit_amount: row.unit_amount,
            name: row.name,
            image: row.image,
            created_at: row.created_at,
        }
    }
}

const ORDER_COLUMNS: &str = "id, number, user_id, status, pay_status, amount, consignee, phone, \
     address, remark, order_time, checkout_time, cancel_time, delivery_time, \
     estimated_delivery_time, cancel_reason, rejection_reason";

#[async_trait]
impl OrderStore for PgStore {
    async fn persist_submission(
        &self,
        order: &NewOrder,
        lines: &[NewOrderLine],
    ) -> Result<ModelId, OrderError> {
        debug!(number = %order.number, user_id = order.user_id, "persisting submission");
        let mut tx = self.pool.begin().await?;

        let order_id: ModelId = sqlx::query_scalar(
            r#"
            INSERT INTO orders (
                number, user_id, status, pay_status, amount, consignee, phone,
                address, remark, order_time, estimated_delivery_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(&order.number)
        .bind(order.user_id)
        .bind(OrderStatus::PendingPayment.code())
        .bind(PayStatus::Unpaid.code())
        .bind(order.amount)
        .bind(&order.consignee)
        .bind(&order.phone)
        .bind(&order.address)
        .bind(&order.remark)
        .bind(order.order_time)
        .bind(order.estimated_delivery_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!(number = %order.number, "failed to insert order header: {}", e);
            e
        })?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    order_id, name, image, dish_id, setmeal_id, flavor, quantity, unit_amount
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(order_id)
            .bind(&line.name)
            .bind(&line.image)
            .bind(line.dish_id)
            .bind(line.setmeal_id)
            .bind(&line.flavor)
            .bind(line.quantity)
            .bind(line.unit_amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(order_id, "failed to insert order line: {}", e);
                e
            })?;
        }

        // Cart rows go away only inside the same transaction that made
        // the order durable.
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(order.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(order_id, number = %order.number, "submission committed");
        Ok(order_id)
    }

    async fn get(&self, id: ModelId) -> Result<Option<Order>, OrderError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn get_owned(
        &self,
        id: ModelId,
        user_id: ModelId,
    ) -> Result<Option<Order>, OrderError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn get_by_number_and_user(
        &self,
        number: &str,
        user_id: ModelId,
    ) -> Result<Option<Order>, OrderError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE number = $1 AND user_id = $2"
        ))
        .bind(number)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn lines(&self, order_id: ModelId) -> Result<Vec<OrderLine>, OrderError> {
        let rows: Vec<OrderLineRow> = sqlx::query_as(
            r#"
            SELECT id, order_id, name, image, dish_id, setmeal_id, flavor, quantity, unit_amount
            FROM order_lines
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(OrderLine::from).collect())
    }

    async fn transition(
        &self,
        id: ModelId,
        expected: &[OrderStatus],
        change: &StatusChange,
    ) -> Result<TransitionOutcome, OrderError> {
        let expected_codes: Vec<i16> = expected.iter().map(|s| s.code()).collect();
        // The refund settlement must read the row's pay status inside
        // the update itself; RETURNING hands the settled value back so
        // the caller never decides from a pre-update snapshot.
        let query = format!(
            r#"
            UPDATE orders SET
                status = $2,
                pay_status = CASE
                    WHEN $3 AND pay_status = {paid} THEN {refunded}
                    ELSE COALESCE($4, pay_status)
                END,
                checkout_time = COALESCE($5, checkout_time),
                cancel_reason = COALESCE($6, cancel_reason),
                rejection_reason = COALESCE($7, rejection_reason),
                cancel_time = COALESCE($8, cancel_time),
                delivery_time = COALESCE($9, delivery_time)
            WHERE id = $1 AND status = ANY($10)
            RETURNING pay_status
            "#,
            paid = PayStatus::Paid.code(),
            refunded = PayStatus::Refunded.code(),
        );
        let updated: Option<i16> = sqlx::query_scalar(&query)
            .bind(id)
            .bind(change.new_status().code())
            .bind(change.refund_if_paid)
            .bind(change.pay_status.map(PayStatus::code))
            .bind(change.checkout_time)
            .bind(&change.cancel_reason)
            .bind(&change.rejection_reason)
            .bind(change.cancel_time)
            .bind(change.delivery_time)
            .bind(&expected_codes)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(code) = updated {
            let pay_status = PayStatus::from_code(code)
                .ok_or_else(|| anyhow!("order {} has unknown pay status code {}", id, code))?;
            return Ok(TransitionOutcome::Applied { pay_status });
        }

        // Predicate missed: distinguish a moved order from a vanished
        // row for the caller.
        let current: Option<i16> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match current {
            Some(code) => {
                let current = OrderStatus::from_code(code)
                    .ok_or_else(|| anyhow!("order {} has unknown status code {}", id, code))?;
                Ok(TransitionOutcome::Conflict { current })
            }
            None => Ok(TransitionOutcome::Vanished),
        }
    }

    async fn stale_pending_payment(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 AND order_time < $2"
        ))
        .bind(OrderStatus::PendingPayment.code())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn stale_deliveries(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, OrderError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 AND delivery_time < $2"
        ))
        .bind(OrderStatus::DeliveryInProgress.code())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn list_by_user(&self, user_id: ModelId) -> Result<Vec<CartItem>, OrderError> {
        let rows: Vec<CartItemRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, dish_id, setmeal_id, flavor, quantity, unit_amount,
                   name, image, created_at
            FROM cart_items
            WHERE user_id = $1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CartItem::from).collect())
    }

    async fn find_entry(
        &self,
        user_id: ModelId,
        selection: &CartSelection,
    ) -> Result<Option<CartItem>, OrderError> {
        let row: Option<CartItemRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, dish_id, setmeal_id, flavor, quantity, unit_amount,
                   name, image, created_at
            FROM cart_items
            WHERE user_id = $1
              AND dish_id IS NOT DISTINCT FROM $2
              AND setmeal_id IS NOT DISTINCT FROM $3
              AND flavor IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(user_id)
        .bind(selection.dish_id)
        .bind(selection.setmeal_id)
        .bind(&selection.flavor)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CartItem::from))
    }

    async fn insert(&self, item: &NewCartItem) -> Result<ModelId, OrderError> {
        let id: ModelId = sqlx::query_scalar(
            r#"
            INSERT INTO cart_items (
                user_id, dish_id, setmeal_id, flavor, quantity, unit_amount,
                name, image, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(item.user_id)
        .bind(item.dish_id)
        .bind(item.setmeal_id)
        .bind(&item.flavor)
        .bind(item.quantity)
        .bind(item.unit_amount)
        .bind(&item.name)
        .bind(&item.image)
        .bind(item.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn set_quantity(&self, id: ModelId, quantity: i32) -> Result<(), OrderError> {
        sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
            .bind(id)
            .bind(quantity)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: ModelId) -> Result<(), OrderError> {
        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_user(&self, user_id: ModelId) -> Result<(), OrderError> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_many(&self, items: &[NewCartItem]) -> Result<(), OrderError> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO cart_items (
                    user_id, dish_id, setmeal_id, flavor, quantity, unit_amount,
                    name, image, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.user_id)
            .bind(item.dish_id)
            .bind(item.setmeal_id)
            .bind(&item.flavor)
            .bind(item.quantity)
            .bind(item.unit_amount)
            .bind(&item.name)
            .bind(&item.image)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: ModelId,
    user_id: ModelId,
    consignee: String,
    phone: String,
    detail: String,
}

#[async_trait]
impl AddressBook for PgStore {
    async fn get(&self, id: ModelId) -> Result<Option<AddressEntry>, OrderError> {
        let row: Option<AddressRow> = sqlx::query_as(
            "SELECT id, user_id, consignee, phone, detail FROM address_book WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| AddressEntry {
            id: row.id,
            user_id: row.user_id,
            snapshot: AddressSnapshot {
                consignee: row.consignee,
                phone: row.phone,
                address: row.detail,
            },
        }))
    }
}
