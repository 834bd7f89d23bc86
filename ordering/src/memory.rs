use crate::error::OrderError;
use crate::model::{
    AddressEntry, AddressSnapshot, CartItem, CartSelection, CatalogItem, ModelId, NewCartItem,
    NewOrder, NewOrderLine, Order, OrderLine, OrderStatus, StatusChange,
};
use crate::storage::{AddressBook, CartStore, Catalog, CatalogCache, OrderStore, TransitionOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    next_id: ModelId,
    orders: HashMap<ModelId, Order>,
    lines: HashMap<ModelId, Vec<OrderLine>>,
    cart: BTreeMap<ModelId, CartItem>,
    addresses: HashMap<ModelId, AddressEntry>,
}

impl Inner {
    fn next_id(&mut self) -> ModelId {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory implementation of the storage traits.
///
/// One lock guards all tables, so each per-order conditional update is
/// atomic and submissions are all-or-nothing, matching the Postgres
/// store's transactional guarantees. Backs the engine and reconciler
/// tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an address-book entry, returning its id.
    pub async fn add_address(
        &self,
        user_id: ModelId,
        consignee: &str,
        phone: &str,
        address: &str,
    ) -> ModelId {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id();
        inner.addresses.insert(
            id,
            AddressEntry {
                id,
                user_id,
                snapshot: AddressSnapshot {
                    consignee: consignee.to_string(),
                    phone: phone.to_string(),
                    address: address.to_string(),
                },
            },
        );
        id
    }

    /// Insert a fully-built order header, e.g. one backdated for
    /// staleness scenarios.
    pub async fn put_order(&self, order: Order) {
        let mut inner = self.inner.lock().await;
        inner.next_id = inner.next_id.max(order.id);
        inner.orders.insert(order.id, order);
    }

    pub async fn next_order_id(&self) -> ModelId {
        self.inner.lock().await.next_id()
    }
}

fn selection_matches(item: &CartItem, selection: &CartSelection) -> bool {
    item.dish_id == selection.dish_id
        && item.setmeal_id == selection.setmeal_id
        && item.flavor == selection.flavor
}

fn materialize_cart_item(id: ModelId, item: &NewCartItem) -> CartItem {
    CartItem {
        id,
        user_id: item.user_id,
        dish_id: item.dish_id,
        setmeal_id: item.setmeal_id,
        flavor: item.flavor.clone(),
        quantity: item.quantity,
        unit_amount: item.unit_amount,
        name: item.name.clone(),
        image: item.image.clone(),
        created_at: item.created_at,
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn persist_submission(
        &self,
        order: &NewOrder,
        lines: &[NewOrderLine],
    ) -> Result<ModelId, OrderError> {
        let mut inner = self.inner.lock().await;
        let order_id = inner.next_id();
        let mut stored_lines = Vec::with_capacity(lines.len());
        for line in lines {
            let line_id = inner.next_id();
            stored_lines.push(OrderLine {
                id: line_id,
                order_id,
                name: line.name.clone(),
                image: line.image.clone(),
                dish_id: line.dish_id,
                setmeal_id: line.setmeal_id,
                flavor: line.flavor.clone(),
                quantity: line.quantity,
                unit_amount: line.unit_amount,
            });
        }
        inner.orders.insert(order_id, order.materialize(order_id));
        inner.lines.insert(order_id, stored_lines);
        inner.cart.retain(|_, item| item.user_id != order.user_id);
        Ok(order_id)
    }

    async fn get(&self, id: ModelId) -> Result<Option<Order>, OrderError> {
        Ok(self.inner.lock().await.orders.get(&id).cloned())
    }

    async fn get_owned(
        &self,
        id: ModelId,
        user_id: ModelId,
    ) -> Result<Option<Order>, OrderError> {
        Ok(self
            .inner
            .lock()
            .await
            .orders
            .get(&id)
            .filter(|order| order.user_id == user_id)
            .cloned())
    }

    async fn get_by_number_and_user(
        &self,
        number: &str,
        user_id: ModelId,
    ) -> Result<Option<Order>, OrderError> {
        Ok(self
            .inner
            .lock()
            .await
            .orders
            .values()
            .find(|order| order.number == number && order.user_id == user_id)
            .cloned())
    }

    async fn lines(&self, order_id: ModelId) -> Result<Vec<OrderLine>, OrderError> {
        Ok(self
            .inner
            .lock()
            .await
            .lines
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn transition(
        &self,
        id: ModelId,
        expected: &[OrderStatus],
        change: &StatusChange,
    ) -> Result<TransitionOutcome, OrderError> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(&id) {
            None => Ok(TransitionOutcome::Vanished),
            Some(order) if expected.contains(&order.status) => {
                change.apply(order);
                Ok(TransitionOutcome::Applied {
                    pay_status: order.pay_status,
                })
            }
            Some(order) => Ok(TransitionOutcome::Conflict {
                current: order.status,
            }),
        }
    }

    async fn stale_pending_payment(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderError> {
        Ok(self
            .inner
            .lock()
            .await
            .orders
            .values()
            .filter(|order| {
                order.status == OrderStatus::PendingPayment && order.order_time < cutoff
            })
            .cloned()
            .collect())
    }

    async fn stale_deliveries(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, OrderError> {
        Ok(self
            .inner
            .lock()
            .await
            .orders
            .values()
            .filter(|order| {
                order.status == OrderStatus::DeliveryInProgress
                    && order.delivery_time.is_some_and(|t| t < cutoff)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn list_by_user(&self, user_id: ModelId) -> Result<Vec<CartItem>, OrderError> {
        Ok(self
            .inner
            .lock()
            .await
            .cart
            .values()
            .filter(|item| item.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_entry(
        &self,
        user_id: ModelId,
        selection: &CartSelection,
    ) -> Result<Option<CartItem>, OrderError> {
        Ok(self
            .inner
            .lock()
            .await
            .cart
            .values()
            .find(|item| item.user_id == user_id && selection_matches(item, selection))
            .cloned())
    }

    async fn insert(&self, item: &NewCartItem) -> Result<ModelId, OrderError> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id();
        inner.cart.insert(id, materialize_cart_item(id, item));
        Ok(id)
    }

    async fn set_quantity(&self, id: ModelId, quantity: i32) -> Result<(), OrderError> {
        let mut inner = self.inner.lock().await;
        if let Some(item) = inner.cart.get_mut(&id) {
            item.quantity = quantity;
        }
        Ok(())
    }

    async fn delete(&self, id: ModelId) -> Result<(), OrderError> {
        self.inner.lock().await.cart.remove(&id);
        Ok(())
    }

    async fn clear_user(&self, user_id: ModelId) -> Result<(), OrderError> {
        self.inner
            .lock()
            .await
            .cart
            .retain(|_, item| item.user_id != user_id);
        Ok(())
    }

    async fn insert_many(&self, items: &[NewCartItem]) -> Result<(), OrderError> {
        let mut inner = self.inner.lock().await;
        for item in items {
            let id = inner.next_id();
            inner.cart.insert(id, materialize_cart_item(id, item));
        }
        Ok(())
    }
}

#[async_trait]
impl AddressBook for MemoryStore {
    async fn get(&self, id: ModelId) -> Result<Option<AddressEntry>, OrderError> {
        Ok(self.inner.lock().await.addresses.get(&id).cloned())
    }
}

/// In-memory catalog for cart tests: fixed dish/set-meal snapshots.
#[derive(Default)]
pub struct MemoryCatalog {
    dishes: Mutex<HashMap<ModelId, CatalogItem>>,
    setmeals: Mutex<HashMap<ModelId, CatalogItem>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_dish(&self, id: ModelId, item: CatalogItem) {
        self.dishes.lock().await.insert(id, item);
    }

    pub async fn add_setmeal(&self, id: ModelId, item: CatalogItem) {
        self.setmeals.lock().await.insert(id, item);
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn dish(&self, id: ModelId) -> Result<Option<CatalogItem>, OrderError> {
        Ok(self.dishes.lock().await.get(&id).cloned())
    }

    async fn setmeal(&self, id: ModelId) -> Result<Option<CatalogItem>, OrderError> {
        Ok(self.setmeals.lock().await.get(&id).cloned())
    }
}

/// In-memory stand-in for the external key/value cache.
#[derive(Default)]
pub struct MemoryCatalogCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl CatalogCache for MemoryCatalogCache {
    async fn get(&self, key: &str) -> Result<Option<String>, OrderError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), OrderError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), OrderError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<(), OrderError> {
        self.entries
            .lock()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}
