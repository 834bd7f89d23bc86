use crate::error::OrderError;
use crate::identity::RequestContext;
use crate::model::{CartItem, CartSelection, NewCartItem};
use crate::storage::{CartStore, Catalog};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Cart management for one consumer's pre-checkout selections.
///
/// Adding a selection that already sits in the cart (same dish or set
/// meal, same flavor) bumps its quantity instead of inserting a second
/// row. Prices, names and images are snapshotted from the catalog the
/// moment the entry is first created.
pub struct CartService {
    carts: Arc<dyn CartStore>,
    catalog: Arc<dyn Catalog>,
}

impl CartService {
    pub fn new(carts: Arc<dyn CartStore>, catalog: Arc<dyn Catalog>) -> Self {
        Self { carts, catalog }
    }

    pub async fn add(
        &self,
        ctx: &RequestContext,
        selection: &CartSelection,
    ) -> Result<(), OrderError> {
        if let Some(existing) = self.carts.find_entry(ctx.actor_id(), selection).await? {
            debug!(item_id = existing.id, quantity = existing.quantity + 1, "merging duplicate add");
            return self
                .carts
                .set_quantity(existing.id, existing.quantity + 1)
                .await;
        }

        let (item, dish_id, setmeal_id) = if let Some(dish_id) = selection.dish_id {
            let item = self
                .catalog
                .dish(dish_id)
                .await?
                .ok_or(OrderError::ItemNotFound(dish_id))?;
            (item, Some(dish_id), None)
        } else if let Some(setmeal_id) = selection.setmeal_id {
            let item = self
                .catalog
                .setmeal(setmeal_id)
                .await?
                .ok_or(OrderError::ItemNotFound(setmeal_id))?;
            (item, None, Some(setmeal_id))
        } else {
            return Err(OrderError::InvalidSelection);
        };

        self.carts
            .insert(&NewCartItem {
                user_id: ctx.actor_id(),
                dish_id,
                setmeal_id,
                flavor: selection.flavor.clone(),
                quantity: 1,
                unit_amount: item.price,
                name: item.name,
                image: item.image,
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Take one of a selection out of the cart: decrement above one,
    /// delete at one. Removing something that isn't there is a no-op.
    pub async fn remove(
        &self,
        ctx: &RequestContext,
        selection: &CartSelection,
    ) -> Result<(), OrderError> {
        let Some(existing) = self.carts.find_entry(ctx.actor_id(), selection).await? else {
            return Ok(());
        };
        if existing.quantity > 1 {
            self.carts
                .set_quantity(existing.id, existing.quantity - 1)
                .await
        } else {
            self.carts.delete(existing.id).await
        }
    }

    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<CartItem>, OrderError> {
        self.carts.list_by_user(ctx.actor_id()).await
    }

    pub async fn clear(&self, ctx: &RequestContext) -> Result<(), OrderError> {
        self.carts.clear_user(ctx.actor_id()).await
    }
}
