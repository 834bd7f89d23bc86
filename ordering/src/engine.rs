use crate::error::OrderError;
use crate::identity::RequestContext;
use crate::model::{
    ModelId, NewCartItem, NewOrder, NewOrderLine, Order, OrderDetail, OrderStatus, OrderSummary,
    PayStatus, PaymentConfirmation, StatusChange, SubmitRequest, ACTIVE_STATUSES,
};
use crate::number::OrderNumberGenerator;
use crate::storage::{
    AddressBook, CartStore, ChargeOutcome, OrderStore, PaymentGateway, TransitionOutcome,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

const CHARGE_DESCRIPTION: &str = "takeout order";

/// The order lifecycle engine: exclusive owner of Order/OrderLine
/// mutation. Every state change goes through the store's conditional
/// update, so concurrent admin actions, payment callbacks and
/// reconciler sweeps race safely on the `status` column.
pub struct OrderEngine {
    orders: Arc<dyn OrderStore>,
    carts: Arc<dyn CartStore>,
    addresses: Arc<dyn AddressBook>,
    payments: Arc<dyn PaymentGateway>,
    numbers: OrderNumberGenerator,
}

impl OrderEngine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        carts: Arc<dyn CartStore>,
        addresses: Arc<dyn AddressBook>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            orders,
            carts,
            addresses,
            payments,
            numbers: OrderNumberGenerator::new(),
        }
    }

    /// Turn the actor's cart into an order.
    ///
    /// The address must exist and belong to the actor and the cart
    /// must be non-empty; either failure aborts before anything is
    /// written. Header, lines and the cart delete commit in one store
    /// transaction. The amount is fixed here and never recomputed.
    pub async fn submit(
        &self,
        ctx: &RequestContext,
        request: SubmitRequest,
    ) -> Result<OrderSummary, OrderError> {
        let entry = self
            .addresses
            .get(request.address_id)
            .await?
            .filter(|entry| entry.user_id == ctx.actor_id())
            .ok_or(OrderError::AddressNotFound(request.address_id))?;

        let cart = self.carts.list_by_user(ctx.actor_id()).await?;
        if cart.is_empty() {
            debug!(user_id = ctx.actor_id(), "submit with empty cart");
            return Err(OrderError::EmptyCart);
        }

        let amount: Decimal = cart.iter().map(|item| item.line_total()).sum();
        let now = Utc::now();
        let number = self.numbers.next(now);

        let order = NewOrder {
            number: number.clone(),
            user_id: ctx.actor_id(),
            amount,
            consignee: entry.snapshot.consignee,
            phone: entry.snapshot.phone,
            address: entry.snapshot.address,
            remark: request.remark,
            order_time: now,
            estimated_delivery_time: request.estimated_delivery_time,
        };
        let lines: Vec<NewOrderLine> = cart.iter().map(NewOrderLine::from_cart_item).collect();

        let id = self.orders.persist_submission(&order, &lines).await?;
        info!(
            order_id = id,
            number = %number,
            user_id = ctx.actor_id(),
            %amount,
            "order submitted"
        );

        Ok(OrderSummary {
            id,
            number,
            order_time: now,
            amount,
        })
    }

    /// Record a successful payment for the actor's order.
    ///
    /// Idempotent against duplicate gateway callbacks: an order that
    /// is already paid reports success without another transition or
    /// another charge.
    pub async fn confirm_payment(
        &self,
        ctx: &RequestContext,
        order_number: &str,
    ) -> Result<PaymentConfirmation, OrderError> {
        let order = self
            .orders
            .get_by_number_and_user(order_number, ctx.actor_id())
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        if order.pay_status == PayStatus::Paid {
            debug!(order_id = order.id, "duplicate payment callback, already paid");
            return Ok(PaymentConfirmation::already_recorded(&order));
        }

        match self
            .payments
            .charge(order_number, order.amount, CHARGE_DESCRIPTION, ctx.actor_id())
            .await?
        {
            ChargeOutcome::Approved => {}
            ChargeOutcome::AlreadyPaid => {
                debug!(order_id = order.id, "gateway reports charge already taken");
            }
            ChargeOutcome::Declined(reason) => {
                warn!(order_id = order.id, %reason, "charge declined");
                return Err(OrderError::PaymentFailed(reason));
            }
        }

        let now = Utc::now();
        let change = StatusChange::paid(now);
        match self
            .orders
            .transition(order.id, &[OrderStatus::PendingPayment], &change)
            .await?
        {
            TransitionOutcome::Applied { .. } => {
                info!(order_id = order.id, number = %order.number, "payment recorded");
                Ok(PaymentConfirmation {
                    order_id: order.id,
                    status: OrderStatus::ToBeConfirmed,
                    pay_status: PayStatus::Paid,
                    checkout_time: Some(now),
                    already_paid: false,
                })
            }
            TransitionOutcome::Conflict {
                current: OrderStatus::ToBeConfirmed,
            } => {
                // A concurrent callback for the same payment won the
                // race; report the same idempotent success it got.
                let fresh = self
                    .orders
                    .get(order.id)
                    .await?
                    .ok_or(OrderError::OrderNotFound)?;
                Ok(PaymentConfirmation::already_recorded(&fresh))
            }
            TransitionOutcome::Conflict { current } => Err(OrderError::RaceLost {
                current: Some(current),
            }),
            TransitionOutcome::Vanished => Err(OrderError::OrderNotFound),
        }
    }

    /// Admin accepts an order: ToBeConfirmed -> Confirmed.
    pub async fn confirm(&self, order_id: ModelId) -> Result<(), OrderError> {
        self.apply_exact(
            order_id,
            &[OrderStatus::ToBeConfirmed],
            StatusChange::confirmed(),
            "ToBeConfirmed",
        )
        .await?;
        info!(order_id, "order confirmed");
        Ok(())
    }

    /// Admin rejects an order: ToBeConfirmed -> Cancelled, recording
    /// the rejection reason and refunding a paid order.
    pub async fn reject(&self, order_id: ModelId, reason: &str) -> Result<(), OrderError> {
        // Snapshot for the immutable number and amount only; whether a
        // refund is owed is decided by the update itself, so a payment
        // landing after this read is still settled and refunded.
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        let pay_status = self
            .apply_exact(
                order_id,
                &[OrderStatus::ToBeConfirmed],
                StatusChange::rejected(reason),
                "ToBeConfirmed",
            )
            .await?;

        if pay_status == PayStatus::Refunded {
            self.refund(&order).await?;
        }
        info!(order_id, %reason, "order rejected");
        Ok(())
    }

    /// Admin cancels an order from any non-terminal state, recording
    /// the reason and refunding a paid order.
    pub async fn cancel_by_admin(
        &self,
        order_id: ModelId,
        reason: &str,
    ) -> Result<(), OrderError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        let pay_status = self
            .apply_exact(
                order_id,
                ACTIVE_STATUSES,
                StatusChange::cancelled(reason, Utc::now()),
                "any non-terminal status",
            )
            .await?;

        if pay_status == PayStatus::Refunded {
            self.refund(&order).await?;
        }
        info!(order_id, %reason, "order cancelled by admin");
        Ok(())
    }

    /// Courier pickup: Confirmed -> DeliveryInProgress.
    pub async fn deliver(&self, order_id: ModelId) -> Result<(), OrderError> {
        self.apply_exact(
            order_id,
            &[OrderStatus::Confirmed],
            StatusChange::delivering(Utc::now()),
            "Confirmed",
        )
        .await?;
        info!(order_id, "order out for delivery");
        Ok(())
    }

    /// Delivery done: DeliveryInProgress -> Completed.
    pub async fn complete(&self, order_id: ModelId) -> Result<(), OrderError> {
        self.apply_exact(
            order_id,
            &[OrderStatus::DeliveryInProgress],
            StatusChange::completed(),
            "DeliveryInProgress",
        )
        .await?;
        info!(order_id, "order completed");
        Ok(())
    }

    /// Customer cancels their own order, permitted only before the
    /// kitchen confirms it.
    pub async fn cancel_by_user(
        &self,
        ctx: &RequestContext,
        order_id: ModelId,
    ) -> Result<(), OrderError> {
        let order = self
            .orders
            .get_owned(order_id, ctx.actor_id())
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        let cancellable = &[OrderStatus::PendingPayment, OrderStatus::ToBeConfirmed];
        if !cancellable.contains(&order.status) {
            return Err(OrderError::CancellationNotAllowed(order.status));
        }

        let change = StatusChange::cancelled("cancelled by customer", Utc::now());
        let pay_status = match self.orders.transition(order_id, cancellable, &change).await? {
            TransitionOutcome::Applied { pay_status } => pay_status,
            TransitionOutcome::Conflict { current } => {
                return Err(OrderError::CancellationNotAllowed(current));
            }
            TransitionOutcome::Vanished => return Err(OrderError::OrderNotFound),
        };

        if pay_status == PayStatus::Refunded {
            self.refund(&order).await?;
        }
        info!(order_id, user_id = ctx.actor_id(), "order cancelled by customer");
        Ok(())
    }

    /// Customer nudges the kitchen about an unconfirmed order. Pure
    /// notification; order state is never touched.
    pub async fn remind(&self, ctx: &RequestContext, order_id: ModelId) -> Result<(), OrderError> {
        let order = self
            .orders
            .get_owned(order_id, ctx.actor_id())
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        if order.status != OrderStatus::ToBeConfirmed {
            return Err(OrderError::InvalidTransition {
                current: order.status,
                expected: "ToBeConfirmed".to_string(),
            });
        }

        info!(order_id, number = %order.number, "customer reminder sent");
        Ok(())
    }

    /// Order the same thing again: copy a past order's frozen lines
    /// back into the actor's cart. Not a state transition.
    pub async fn repeat(&self, ctx: &RequestContext, order_id: ModelId) -> Result<(), OrderError> {
        let order = self
            .orders
            .get_owned(order_id, ctx.actor_id())
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        let lines = self.orders.lines(order.id).await?;
        let now = Utc::now();
        let items: Vec<NewCartItem> = lines
            .iter()
            .map(|line| NewCartItem::from_order_line(ctx.actor_id(), line, now))
            .collect();

        self.carts.insert_many(&items).await?;
        info!(order_id, user_id = ctx.actor_id(), lines = items.len(), "order repeated into cart");
        Ok(())
    }

    /// Ownership-scoped read of an order and its frozen line items.
    pub async fn detail(
        &self,
        ctx: &RequestContext,
        order_id: ModelId,
    ) -> Result<OrderDetail, OrderError> {
        let order = self
            .orders
            .get_owned(order_id, ctx.actor_id())
            .await?
            .ok_or(OrderError::OrderNotFound)?;
        let lines = self.orders.lines(order.id).await?;
        Ok(OrderDetail { order, lines })
    }

    /// One conditional update with the request-path failure mapping:
    /// a lost predicate names current vs expected state. On success
    /// the row's settled pay status is handed back so cancellation
    /// paths know whether this update refunded.
    async fn apply_exact(
        &self,
        order_id: ModelId,
        expected: &[OrderStatus],
        change: StatusChange,
        expected_label: &str,
    ) -> Result<PayStatus, OrderError> {
        match self.orders.transition(order_id, expected, &change).await? {
            TransitionOutcome::Applied { pay_status } => Ok(pay_status),
            TransitionOutcome::Conflict { current } => Err(OrderError::InvalidTransition {
                current,
                expected: expected_label.to_string(),
            }),
            TransitionOutcome::Vanished => Err(OrderError::OrderNotFound),
        }
    }

    /// Issue the gateway refund for an order whose cancellation just
    /// committed. Called at most once per successful transition, so a
    /// lost race never refunds.
    async fn refund(&self, order: &Order) -> Result<(), OrderError> {
        if let Err(e) = self.payments.refund(&order.number, order.amount).await {
            // The cancellation is already durable; the money side
            // needs operator attention.
            warn!(order_id = order.id, number = %order.number, error = %e, "refund failed");
            return Err(e);
        }
        info!(order_id = order.id, number = %order.number, amount = %order.amount, "refund issued");
        Ok(())
    }
}
