use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ModelId = i64;

/// Lifecycle state of an order, from checkout to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    PendingPayment,
    ToBeConfirmed,
    Confirmed,
    DeliveryInProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Numeric code used in the persisted rows.
    pub fn code(self) -> i16 {
        match self {
            OrderStatus::PendingPayment => 1,
            OrderStatus::ToBeConfirmed => 2,
            OrderStatus::Confirmed => 3,
            OrderStatus::DeliveryInProgress => 4,
            OrderStatus::Completed => 5,
            OrderStatus::Cancelled => 6,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(OrderStatus::PendingPayment),
            2 => Some(OrderStatus::ToBeConfirmed),
            3 => Some(OrderStatus::Confirmed),
            4 => Some(OrderStatus::DeliveryInProgress),
            5 => Some(OrderStatus::Completed),
            6 => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// Every state an admin cancellation may start from.
pub const ACTIVE_STATUSES: &[OrderStatus] = &[
    OrderStatus::PendingPayment,
    OrderStatus::ToBeConfirmed,
    OrderStatus::Confirmed,
    OrderStatus::DeliveryInProgress,
];

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::PendingPayment => "PendingPayment",
            OrderStatus::ToBeConfirmed => "ToBeConfirmed",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::DeliveryInProgress => "DeliveryInProgress",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl PayStatus {
    pub fn code(self) -> i16 {
        match self {
            PayStatus::Unpaid => 0,
            PayStatus::Paid => 1,
            PayStatus::Refunded => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(PayStatus::Unpaid),
            1 => Some(PayStatus::Paid),
            2 => Some(PayStatus::Refunded),
            _ => None,
        }
    }
}

/// The persisted order header. `number`, `user_id`, `order_time`, the
/// delivery snapshot fields and `amount` are fixed at submission and
/// never rewritten; everything else only changes through a
/// `StatusChange` applied by a conditional update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: ModelId,
    pub number: String,
    pub user_id: ModelId,
    pub status: OrderStatus,
    pub pay_status: PayStatus,
    pub amount: Decimal,
    pub consignee: String,
    pub phone: String,
    pub address: String,
    pub remark: Option<String>,
    pub order_time: DateTime<Utc>,
    pub checkout_time: Option<DateTime<Utc>>,
    pub cancel_time: Option<DateTime<Utc>>,
    pub delivery_time: Option<DateTime<Utc>>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub rejection_reason: Option<String>,
}

/// One purchased dish or set meal, frozen at submission time. Rendering
/// a historical order reads these rows only, never the live catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: ModelId,
    pub order_id: ModelId,
    pub name: String,
    pub image: Option<String>,
    pub dish_id: Option<ModelId>,
    pub setmeal_id: Option<ModelId>,
    pub flavor: Option<String>,
    pub quantity: i32,
    pub unit_amount: Decimal,
}

/// Mutable pre-checkout state for one consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ModelId,
    pub user_id: ModelId,
    pub dish_id: Option<ModelId>,
    pub setmeal_id: Option<ModelId>,
    pub flavor: Option<String>,
    pub quantity: i32,
    pub unit_amount: Decimal,
    pub name: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_amount * Decimal::from(self.quantity)
    }
}

/// What the customer picked, before the catalog snapshot is attached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartSelection {
    pub dish_id: Option<ModelId>,
    pub setmeal_id: Option<ModelId>,
    pub flavor: Option<String>,
}

impl CartSelection {
    pub fn dish(dish_id: ModelId, flavor: Option<String>) -> Self {
        Self {
            dish_id: Some(dish_id),
            setmeal_id: None,
            flavor,
        }
    }

    pub fn setmeal(setmeal_id: ModelId) -> Self {
        Self {
            dish_id: None,
            setmeal_id: Some(setmeal_id),
            flavor: None,
        }
    }
}

/// Address-book lookup result; the snapshot is copied onto the order
/// at submission so later edits never touch past orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub consignee: String,
    pub phone: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressEntry {
    pub id: ModelId,
    pub user_id: ModelId,
    pub snapshot: AddressSnapshot,
}

/// Name/image/price snapshot read from the catalog when a cart entry
/// is first created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    pub image: Option<String>,
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub address_id: ModelId,
    pub remark: Option<String>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub id: ModelId,
    pub number: String,
    pub order_time: DateTime<Utc>,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmation {
    pub order_id: ModelId,
    pub status: OrderStatus,
    pub pay_status: PayStatus,
    pub checkout_time: Option<DateTime<Utc>>,
    /// True when this call found the payment already recorded
    /// (duplicate gateway callback) and changed nothing.
    pub already_paid: bool,
}

impl PaymentConfirmation {
    pub fn already_recorded(order: &Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            pay_status: order.pay_status,
            checkout_time: order.checkout_time,
            already_paid: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

/// Insert record for a new order header, built once per submission.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub number: String,
    pub user_id: ModelId,
    pub amount: Decimal,
    pub consignee: String,
    pub phone: String,
    pub address: String,
    pub remark: Option<String>,
    pub order_time: DateTime<Utc>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
}

impl NewOrder {
    /// The full header this record persists as, once the store assigns
    /// an id. New orders always start unpaid and pending payment.
    pub fn materialize(&self, id: ModelId) -> Order {
        Order {
            id,
            number: self.number.clone(),
            user_id: self.user_id,
            status: OrderStatus::PendingPayment,
            pay_status: PayStatus::Unpaid,
            amount: self.amount,
            consignee: self.consignee.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            remark: self.remark.clone(),
            order_time: self.order_time,
            checkout_time: None,
            cancel_time: None,
            delivery_time: None,
            estimated_delivery_time: self.estimated_delivery_time,
            cancel_reason: None,
            rejection_reason: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub name: String,
    pub image: Option<String>,
    pub dish_id: Option<ModelId>,
    pub setmeal_id: Option<ModelId>,
    pub flavor: Option<String>,
    pub quantity: i32,
    pub unit_amount: Decimal,
}

impl NewOrderLine {
    /// Verbatim copy of a cart entry; no re-lookup of catalog state.
    pub fn from_cart_item(item: &CartItem) -> Self {
        Self {
            name: item.name.clone(),
            image: item.image.clone(),
            dish_id: item.dish_id,
            setmeal_id: item.setmeal_id,
            flavor: item.flavor.clone(),
            quantity: item.quantity,
            unit_amount: item.unit_amount,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub user_id: ModelId,
    pub dish_id: Option<ModelId>,
    pub setmeal_id: Option<ModelId>,
    pub flavor: Option<String>,
    pub quantity: i32,
    pub unit_amount: Decimal,
    pub name: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewCartItem {
    /// Re-populating a cart from a past order copies the frozen line
    /// snapshot, including the price paid back then.
    pub fn from_order_line(user_id: ModelId, line: &OrderLine, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            dish_id: line.dish_id,
            setmeal_id: line.setmeal_id,
            flavor: line.flavor.clone(),
            quantity: line.quantity,
            unit_amount: line.unit_amount,
            name: line.name.clone(),
            image: line.image.clone(),
            created_at: now,
        }
    }
}

/// Typed payload of one conditional status update. The named
/// constructors are the only way to build one, so a transition can
/// only set the fields its write path owns.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub(crate) status: OrderStatus,
    pub(crate) pay_status: Option<PayStatus>,
    pub(crate) checkout_time: Option<DateTime<Utc>>,
    pub(crate) cancel_reason: Option<String>,
    pub(crate) rejection_reason: Option<String>,
    pub(crate) cancel_time: Option<DateTime<Utc>>,
    pub(crate) delivery_time: Option<DateTime<Utc>>,
    /// Settle the money side inside the same update: a row that is
    /// Paid at update time becomes Refunded, anything else keeps its
    /// pay status. The caller learns which happened from the
    /// transition outcome, not from an earlier read.
    pub(crate) refund_if_paid: bool,
}

impl StatusChange {
    fn to(status: OrderStatus) -> Self {
        Self {
            status,
            pay_status: None,
            checkout_time: None,
            cancel_reason: None,
            rejection_reason: None,
            cancel_time: None,
            delivery_time: None,
            refund_if_paid: false,
        }
    }

    /// Payment recorded: PendingPayment -> ToBeConfirmed.
    pub fn paid(now: DateTime<Utc>) -> Self {
        Self {
            pay_status: Some(PayStatus::Paid),
            checkout_time: Some(now),
            ..Self::to(OrderStatus::ToBeConfirmed)
        }
    }

    /// Kitchen accepted: ToBeConfirmed -> Confirmed.
    pub fn confirmed() -> Self {
        Self::to(OrderStatus::Confirmed)
    }

    /// Kitchen rejected: ToBeConfirmed -> Cancelled, refunding a paid
    /// row.
    pub fn rejected(reason: &str) -> Self {
        Self {
            rejection_reason: Some(reason.to_string()),
            refund_if_paid: true,
            ..Self::to(OrderStatus::Cancelled)
        }
    }

    /// Cancellation by admin, customer or the reconciler, refunding a
    /// paid row.
    pub fn cancelled(reason: &str, now: DateTime<Utc>) -> Self {
        Self {
            cancel_reason: Some(reason.to_string()),
            cancel_time: Some(now),
            refund_if_paid: true,
            ..Self::to(OrderStatus::Cancelled)
        }
    }

    /// Handed to the courier: Confirmed -> DeliveryInProgress.
    pub fn delivering(now: DateTime<Utc>) -> Self {
        Self {
            delivery_time: Some(now),
            ..Self::to(OrderStatus::DeliveryInProgress)
        }
    }

    /// Delivered: DeliveryInProgress -> Completed.
    pub fn completed() -> Self {
        Self::to(OrderStatus::Completed)
    }

    pub fn new_status(&self) -> OrderStatus {
        self.status
    }

    /// Overwrite exactly the fields this transition owns; everything
    /// else on the header stays untouched. The refund settlement reads
    /// the row's pay status as it is now, never a stale snapshot.
    pub fn apply(&self, order: &mut Order) {
        order.status = self.status;
        if self.refund_if_paid && order.pay_status == PayStatus::Paid {
            order.pay_status = PayStatus::Refunded;
        } else if let Some(pay_status) = self.pay_status {
            order.pay_status = pay_status;
        }
        if let Some(checkout_time) = self.checkout_time {
            order.checkout_time = Some(checkout_time);
        }
        if let Some(cancel_reason) = &self.cancel_reason {
            order.cancel_reason = Some(cancel_reason.clone());
        }
        if let Some(rejection_reason) = &self.rejection_reason {
            order.rejection_reason = Some(rejection_reason.clone());
        }
        if let Some(cancel_time) = self.cancel_time {
            order.cancel_time = Some(cancel_time);
        }
        if let Some(delivery_time) = self.delivery_time {
            order.delivery_time = Some(delivery_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            OrderStatus::PendingPayment,
            OrderStatus::ToBeConfirmed,
            OrderStatus::Confirmed,
            OrderStatus::DeliveryInProgress,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(OrderStatus::from_code(0), None);
        assert_eq!(PayStatus::from_code(3), None);
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        for status in ACTIVE_STATUSES {
            assert!(!status.is_terminal());
        }
    }

    fn sample_order(status: OrderStatus, pay_status: PayStatus) -> Order {
        let new_order = NewOrder {
            number: "202501011200000000010042".to_string(),
            user_id: 101,
            amount: Decimal::from(45),
            consignee: "Alex".to_string(),
            phone: "13800000000".to_string(),
            address: "1 Main St".to_string(),
            remark: None,
            order_time: Utc::now(),
            estimated_delivery_time: None,
        };
        let mut order = new_order.materialize(1);
        order.status = status;
        order.pay_status = pay_status;
        order
    }

    #[test]
    fn cancelled_change_sets_only_cancellation_fields() {
        let now = Utc::now();
        let change = StatusChange::cancelled("changed my mind", now);
        assert_eq!(change.new_status(), OrderStatus::Cancelled);
        assert_eq!(change.cancel_reason.as_deref(), Some("changed my mind"));
        assert_eq!(change.cancel_time, Some(now));
        assert!(change.pay_status.is_none());
        assert!(change.rejection_reason.is_none());
        assert!(change.checkout_time.is_none());
        assert!(change.delivery_time.is_none());
    }

    #[test]
    fn cancellation_settles_a_paid_row_as_refunded() {
        let mut order = sample_order(OrderStatus::ToBeConfirmed, PayStatus::Paid);
        StatusChange::cancelled("store closed", Utc::now()).apply(&mut order);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.pay_status, PayStatus::Refunded);

        let mut order = sample_order(OrderStatus::ToBeConfirmed, PayStatus::Paid);
        StatusChange::rejected("out of stock").apply(&mut order);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.pay_status, PayStatus::Refunded);
    }

    #[test]
    fn cancellation_leaves_an_unpaid_row_unpaid() {
        let mut order = sample_order(OrderStatus::PendingPayment, PayStatus::Unpaid);
        StatusChange::cancelled("timed out", Utc::now()).apply(&mut order);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.pay_status, PayStatus::Unpaid);
    }
}
