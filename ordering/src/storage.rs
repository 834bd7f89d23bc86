use crate::error::OrderError;
use crate::model::{
    AddressEntry, CartItem, CartSelection, CatalogItem, ModelId, NewCartItem, NewOrder,
    NewOrderLine, Order, OrderLine, OrderStatus, PayStatus, StatusChange,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Result of a conditional status update.
///
/// `Conflict` and `Vanished` are the two distinguishable ways the
/// predicate can fail: a concurrent writer already moved the order, or
/// the row is gone entirely. Callers decide which of the two is benign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The update applied. `pay_status` is the row's value afterwards;
    /// a cancellation that found the row Paid reports `Refunded` here,
    /// which is the caller's only trustworthy refund signal - any
    /// pre-update read may predate a concurrent payment.
    Applied { pay_status: PayStatus },
    Conflict { current: OrderStatus },
    Vanished,
}

/// Persisted order headers and their immutable line items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist one submission atomically: insert the header, batch
    /// insert the lines, and delete the submitting user's cart rows.
    /// Any failure rolls the whole transaction back - the cart is
    /// never cleared unless the order was fully written.
    async fn persist_submission(
        &self,
        order: &NewOrder,
        lines: &[NewOrderLine],
    ) -> Result<ModelId, OrderError>;

    async fn get(&self, id: ModelId) -> Result<Option<Order>, OrderError>;

    /// Point lookup scoped to the owning user; `None` both when the
    /// order is absent and when it belongs to someone else.
    async fn get_owned(&self, id: ModelId, user_id: ModelId)
        -> Result<Option<Order>, OrderError>;

    async fn get_by_number_and_user(
        &self,
        number: &str,
        user_id: ModelId,
    ) -> Result<Option<Order>, OrderError>;

    async fn lines(&self, order_id: ModelId) -> Result<Vec<OrderLine>, OrderError>;

    /// Compare-and-swap on `status`, scoped to one order id: apply
    /// `change` only if the stored status is one of `expected`. This
    /// is the only way order state moves; read-then-unconditional-
    /// write is not offered.
    async fn transition(
        &self,
        id: ModelId,
        expected: &[OrderStatus],
        change: &StatusChange,
    ) -> Result<TransitionOutcome, OrderError>;

    /// PendingPayment orders whose `order_time` is before `cutoff`.
    async fn stale_pending_payment(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderError>;

    /// DeliveryInProgress orders whose `delivery_time` is before
    /// `cutoff`.
    async fn stale_deliveries(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, OrderError>;
}

/// Mutable pre-checkout cart rows, keyed by consumer.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn list_by_user(&self, user_id: ModelId) -> Result<Vec<CartItem>, OrderError>;

    /// The existing entry matching a selection (same dish/set meal and
    /// flavor), if any - the merge target for a duplicate add.
    async fn find_entry(
        &self,
        user_id: ModelId,
        selection: &CartSelection,
    ) -> Result<Option<CartItem>, OrderError>;

    async fn insert(&self, item: &NewCartItem) -> Result<ModelId, OrderError>;

    async fn set_quantity(&self, id: ModelId, quantity: i32) -> Result<(), OrderError>;

    async fn delete(&self, id: ModelId) -> Result<(), OrderError>;

    async fn clear_user(&self, user_id: ModelId) -> Result<(), OrderError>;

    async fn insert_many(&self, items: &[NewCartItem]) -> Result<(), OrderError>;
}

/// Read-only address book collaborator.
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn get(&self, id: ModelId) -> Result<Option<AddressEntry>, OrderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved,
    /// The gateway saw this order number before; the charge already
    /// went through.
    AlreadyPaid,
    Declined(String),
}

/// Opaque payment collaborator. The engine only records outcomes; the
/// gateway's protocol is its own business.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        order_number: &str,
        amount: Decimal,
        description: &str,
        payer: ModelId,
    ) -> Result<ChargeOutcome, OrderError>;

    async fn refund(&self, order_number: &str, amount: Decimal) -> Result<(), OrderError>;
}

/// Read-only catalog lookups used when a cart entry is first created.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn dish(&self, id: ModelId) -> Result<Option<CatalogItem>, OrderError>;

    async fn setmeal(&self, id: ModelId) -> Result<Option<CatalogItem>, OrderError>;
}

/// External key/value cache in front of catalog reads.
#[async_trait]
pub trait CatalogCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, OrderError>;

    async fn set(&self, key: &str, value: String) -> Result<(), OrderError>;

    async fn delete(&self, key: &str) -> Result<(), OrderError>;

    async fn delete_by_prefix(&self, prefix: &str) -> Result<(), OrderError>;
}
