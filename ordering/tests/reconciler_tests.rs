mod support;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::config::ReconcilerConfig;
use ordering::error::OrderError;
use ordering::memory::MemoryStore;
use ordering::model::{
    ModelId, NewOrder, NewOrderLine, Order, OrderLine, OrderStatus, PayStatus, StatusChange,
};
use ordering::reconciler::{Reconciler, AUTO_CANCEL_REASON};
use ordering::storage::{OrderStore, TransitionOutcome};
use std::sync::Arc;

/// Fault injection for sweep tests: delegates to the in-memory store
/// except where one order is singled out.
enum Interference {
    /// The customer's payment lands between the scan and the sweep's
    /// conditional update.
    PaymentLandsAfterScan(ModelId),
    /// The conditional update for this order errors out.
    TransitionFails(ModelId),
}

struct InterferingStore {
    inner: Arc<MemoryStore>,
    interference: Interference,
}

#[async_trait]
impl OrderStore for InterferingStore {
    async fn persist_submission(
        &self,
        order: &NewOrder,
        lines: &[NewOrderLine],
    ) -> Result<ModelId, OrderError> {
        self.inner.persist_submission(order, lines).await
    }

    async fn get(&self, id: ModelId) -> Result<Option<Order>, OrderError> {
        self.inner.get(id).await
    }

    async fn get_owned(
        &self,
        id: ModelId,
        user_id: ModelId,
    ) -> Result<Option<Order>, OrderError> {
        self.inner.get_owned(id, user_id).await
    }

    async fn get_by_number_and_user(
        &self,
        number: &str,
        user_id: ModelId,
    ) -> Result<Option<Order>, OrderError> {
        self.inner.get_by_number_and_user(number, user_id).await
    }

    async fn lines(&self, order_id: ModelId) -> Result<Vec<OrderLine>, OrderError> {
        self.inner.lines(order_id).await
    }

    async fn transition(
        &self,
        id: ModelId,
        expected: &[OrderStatus],
        change: &StatusChange,
    ) -> Result<TransitionOutcome, OrderError> {
        if let Interference::TransitionFails(poisoned) = self.interference {
            if id == poisoned {
                return Err(OrderError::Internal(anyhow!("injected storage failure")));
            }
        }
        self.inner.transition(id, expected, change).await
    }

    async fn stale_pending_payment(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderError> {
        let candidates = self.inner.stale_pending_payment(cutoff).await?;
        if let Interference::PaymentLandsAfterScan(id) = self.interference {
            self.inner
                .transition(id, &[OrderStatus::PendingPayment], &StatusChange::paid(Utc::now()))
                .await?;
        }
        Ok(candidates)
    }

    async fn stale_deliveries(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, OrderError> {
        self.inner.stale_deliveries(cutoff).await
    }
}

#[tokio::test]
async fn payment_timeout_cancels_overdue_unpaid_orders() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    let overdue = support::seed_order(
        &store,
        101,
        OrderStatus::PendingPayment,
        PayStatus::Unpaid,
        now - Duration::minutes(16),
        None,
    )
    .await;
    let fresh = support::seed_order(
        &store,
        101,
        OrderStatus::PendingPayment,
        PayStatus::Unpaid,
        now - Duration::minutes(5),
        None,
    )
    .await;
    // A paid order past the deadline is not a candidate at all.
    let paid = support::seed_order(
        &store,
        102,
        OrderStatus::ToBeConfirmed,
        PayStatus::Paid,
        now - Duration::minutes(30),
        None,
    )
    .await;

    let reconciler = Reconciler::new(store.clone(), ReconcilerConfig::default());
    let stats = reconciler.sweep_payment_timeouts(now).await;
    assert_eq!(stats.examined, 1);
    assert_eq!(stats.transitioned, 1);
    assert_eq!(stats.skipped, 0);

    let cancelled = store.get(overdue).await.unwrap().unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some(AUTO_CANCEL_REASON));
    assert_eq!(cancelled.cancel_time, Some(now));
    assert_eq!(cancelled.pay_status, PayStatus::Unpaid);

    assert_eq!(
        store.get(fresh).await.unwrap().unwrap().status,
        OrderStatus::PendingPayment
    );
    assert_eq!(
        store.get(paid).await.unwrap().unwrap().status,
        OrderStatus::ToBeConfirmed
    );
}

#[tokio::test]
async fn a_payment_landing_mid_sweep_wins() {
    let inner = Arc::new(MemoryStore::new());
    let now = Utc::now();
    let order_id = support::seed_order(
        &inner,
        101,
        OrderStatus::PendingPayment,
        PayStatus::Unpaid,
        now - Duration::minutes(20),
        None,
    )
    .await;

    let store = Arc::new(InterferingStore {
        inner: inner.clone(),
        interference: Interference::PaymentLandsAfterScan(order_id),
    });
    let reconciler = Reconciler::new(store, ReconcilerConfig::default());
    let stats = reconciler.sweep_payment_timeouts(now).await;
    assert_eq!(stats.examined, 1);
    assert_eq!(stats.transitioned, 0);
    assert_eq!(stats.skipped, 1);

    // The customer's write stands; the sweep never retries.
    let order = inner.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::ToBeConfirmed);
    assert_eq!(order.pay_status, PayStatus::Paid);
}

#[tokio::test]
async fn one_failing_order_does_not_abort_the_sweep() {
    let inner = Arc::new(MemoryStore::new());
    let now = Utc::now();
    let poisoned = support::seed_order(
        &inner,
        101,
        OrderStatus::PendingPayment,
        PayStatus::Unpaid,
        now - Duration::minutes(20),
        None,
    )
    .await;
    let healthy = support::seed_order(
        &inner,
        102,
        OrderStatus::PendingPayment,
        PayStatus::Unpaid,
        now - Duration::minutes(20),
        None,
    )
    .await;

    let store = Arc::new(InterferingStore {
        inner: inner.clone(),
        interference: Interference::TransitionFails(poisoned),
    });
    let reconciler = Reconciler::new(store, ReconcilerConfig::default());
    let stats = reconciler.sweep_payment_timeouts(now).await;
    assert_eq!(stats.examined, 2);
    assert_eq!(stats.transitioned, 1);
    assert_eq!(stats.skipped, 1);

    assert_eq!(
        inner.get(healthy).await.unwrap().unwrap().status,
        OrderStatus::Cancelled
    );
    assert_eq!(
        inner.get(poisoned).await.unwrap().unwrap().status,
        OrderStatus::PendingPayment
    );
}

#[tokio::test]
async fn stuck_deliveries_complete_after_the_deadline() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    let stuck = support::seed_order(
        &store,
        101,
        OrderStatus::DeliveryInProgress,
        PayStatus::Paid,
        now - Duration::hours(3),
        Some(now - Duration::hours(2)),
    )
    .await;
    // Out for half an hour; the default deadline is sixty minutes.
    let in_flight = support::seed_order(
        &store,
        101,
        OrderStatus::DeliveryInProgress,
        PayStatus::Paid,
        now - Duration::hours(1),
        Some(now - Duration::minutes(30)),
    )
    .await;

    let reconciler = Reconciler::new(store.clone(), ReconcilerConfig::default());
    let stats = reconciler.sweep_stuck_deliveries(now).await;
    assert_eq!(stats.examined, 1);
    assert_eq!(stats.transitioned, 1);

    let completed = store.get(stuck).await.unwrap().unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);
    assert_eq!(completed.pay_status, PayStatus::Paid);

    assert_eq!(
        store.get(in_flight).await.unwrap().unwrap().status,
        OrderStatus::DeliveryInProgress
    );
}

#[tokio::test]
async fn sweeps_key_on_the_right_timestamps() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    // Submitted long ago, but handed to the courier only minutes ago:
    // the delivery sweep keys on delivery_time, not order_time.
    let recently_dispatched = support::seed_order(
        &store,
        101,
        OrderStatus::DeliveryInProgress,
        PayStatus::Paid,
        now - Duration::days(1),
        Some(now - Duration::minutes(10)),
    )
    .await;

    let reconciler = Reconciler::new(store.clone(), ReconcilerConfig::default());
    let stats = reconciler.sweep_stuck_deliveries(now).await;
    assert_eq!(stats.examined, 0);
    assert_eq!(
        store.get(recently_dispatched).await.unwrap().unwrap().status,
        OrderStatus::DeliveryInProgress
    );
}
