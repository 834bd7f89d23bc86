use crate::model::{OrderStatus, StatusChange};
use crate::storage::{OrderStore, TransitionOutcome};
use chrono::{DateTime, Duration, Utc};
use common::config::ReconcilerConfig;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Reason stamped on orders the payment-timeout sweep cancels.
pub const AUTO_CANCEL_REASON: &str = "timed out, auto-cancelled";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub examined: usize,
    pub transitioned: usize,
    pub skipped: usize,
}

/// Background process that forces transitions on orders stuck past a
/// deadline: unpaid orders get cancelled, forgotten deliveries get
/// completed.
///
/// Each candidate moves through the same conditional update the
/// request paths use, so a customer paying in the same instant always
/// wins - the sweep's update loses its predicate and is skipped, never
/// retried. One order's failure never aborts the batch; there is no
/// cross-order transaction.
pub struct Reconciler {
    orders: Arc<dyn OrderStore>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(orders: Arc<dyn OrderStore>, config: ReconcilerConfig) -> Self {
        Self { orders, config }
    }

    /// Cancel orders still awaiting payment past the deadline.
    pub async fn sweep_payment_timeouts(&self, now: DateTime<Utc>) -> SweepStats {
        let cutoff = now - Duration::minutes(self.config.payment_deadline_mins);
        let candidates = match self.orders.stale_pending_payment(cutoff).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "payment-timeout scan failed");
                return SweepStats::default();
            }
        };

        let mut stats = SweepStats::default();
        for order in candidates {
            stats.examined += 1;
            let change = StatusChange::cancelled(AUTO_CANCEL_REASON, now);
            match self
                .orders
                .transition(order.id, &[OrderStatus::PendingPayment], &change)
                .await
            {
                Ok(TransitionOutcome::Applied { .. }) => {
                    stats.transitioned += 1;
                    metrics::counter!("reconciler_orders_auto_cancelled").increment(1);
                    info!(order_id = order.id, number = %order.number, "unpaid order auto-cancelled");
                }
                Ok(TransitionOutcome::Conflict { current }) => {
                    // The customer paid (or an admin acted) inside the
                    // window; their write stands.
                    stats.skipped += 1;
                    debug!(order_id = order.id, %current, "order moved before the sweep, skipping");
                }
                Ok(TransitionOutcome::Vanished) => {
                    stats.skipped += 1;
                    debug!(order_id = order.id, "order vanished before the sweep, skipping");
                }
                Err(e) => {
                    stats.skipped += 1;
                    warn!(order_id = order.id, error = %e, "auto-cancel failed, continuing sweep");
                }
            }
        }
        stats
    }

    /// Complete deliveries that have been in progress past the
    /// deadline.
    pub async fn sweep_stuck_deliveries(&self, now: DateTime<Utc>) -> SweepStats {
        let cutoff = now - Duration::minutes(self.config.delivery_deadline_mins);
        let candidates = match self.orders.stale_deliveries(cutoff).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "stuck-delivery scan failed");
                return SweepStats::default();
            }
        };

        let mut stats = SweepStats::default();
        for order in candidates {
            stats.examined += 1;
            match self
                .orders
                .transition(
                    order.id,
                    &[OrderStatus::DeliveryInProgress],
                    &StatusChange::completed(),
                )
                .await
            {
                Ok(TransitionOutcome::Applied { .. }) => {
                    stats.transitioned += 1;
                    metrics::counter!("reconciler_deliveries_auto_completed").increment(1);
                    info!(order_id = order.id, number = %order.number, "stuck delivery auto-completed");
                }
                Ok(TransitionOutcome::Conflict { current }) => {
                    stats.skipped += 1;
                    debug!(order_id = order.id, %current, "order moved before the sweep, skipping");
                }
                Ok(TransitionOutcome::Vanished) => {
                    stats.skipped += 1;
                    debug!(order_id = order.id, "order vanished before the sweep, skipping");
                }
                Err(e) => {
                    stats.skipped += 1;
                    warn!(order_id = order.id, error = %e, "auto-complete failed, continuing sweep");
                }
            }
        }
        stats
    }

    /// Run both sweeps forever on their independent schedules. Each
    /// tick re-evaluates candidates fresh against the wall clock.
    pub async fn run(&self) {
        let mut payment_tick = tokio::time::interval(std::time::Duration::from_secs(
            self.config.payment_sweep_interval_secs,
        ));
        let mut delivery_tick = tokio::time::interval(std::time::Duration::from_secs(
            self.config.delivery_sweep_interval_secs,
        ));
        info!(
            payment_interval_secs = self.config.payment_sweep_interval_secs,
            delivery_interval_secs = self.config.delivery_sweep_interval_secs,
            "reconciler started"
        );

        loop {
            tokio::select! {
                _ = payment_tick.tick() => {
                    let stats = self.sweep_payment_timeouts(Utc::now()).await;
                    debug!(?stats, "payment-timeout sweep finished");
                }
                _ = delivery_tick.tick() => {
                    let stats = self.sweep_stuck_deliveries(Utc::now()).await;
                    debug!(?stats, "stuck-delivery sweep finished");
                }
            }
        }
    }
}
