//! Automatic expiry of unpaid orders.
//!
//! [`ExpiryScheduler`] enqueues a close task when an order is created;
//! [`CloseOrderHandler`] consumes it and cancels the order if it is still
//! pending, crediting back any gift balance it pre-deducted.

use crate::application::fulfillment::with_transaction;
use crate::application::gift_ledger;
use crate::domain::order::{OrderKind, OrderStatus};
use crate::domain::ports::{
    DueTaskSourceRef, OrderStoreRef, TaskQueueRef, TransactionalStoreRef, UserStoreRef,
};
use crate::domain::task::{CLOSE_ORDER_TASK, CloseOrderPayload, DeferredTask, TaskInfo};
use crate::error::{OrderError, Result, StoreError, StoreResultExt};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{error, info, warn};

pub struct ExpiryScheduler {
    queue: TaskQueueRef,
    delay: Duration,
}

impl ExpiryScheduler {
    pub fn new(queue: TaskQueueRef, delay: Duration) -> Self {
        Self { queue, delay }
    }

    /// Schedules the close task for `order_no`.
    ///
    /// Failures are logged and swallowed: the order already exists, it just
    /// will not close by itself.
    pub async fn schedule_close(&self, order_no: &str) -> Option<TaskInfo> {
        let task = match DeferredTask::close_order(order_no) {
            Ok(task) => task,
            Err(e) => {
                error!(error = %e, order_no, "marshal close order payload error");
                return None;
            }
        };
        match self.queue.enqueue(task, self.delay).await {
            Ok(info) => {
                info!(task_id = %info.id, order_no, process_at = %info.process_at, "enqueue task success");
                Some(info)
            }
            Err(e) => {
                error!(error = %e, order_no, "enqueue task error");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Cancelled,
    AlreadyClosed,
    AlreadyPaid,
}

/// Consumer of `close-order` tasks. Idempotent: closing a closed order is a
/// no-op and a paid order is never touched.
#[derive(Clone)]
pub struct CloseOrderHandler {
    orders: OrderStoreRef,
    users: UserStoreRef,
    transactions: TransactionalStoreRef,
}

impl CloseOrderHandler {
    pub fn new(
        orders: OrderStoreRef,
        users: UserStoreRef,
        transactions: TransactionalStoreRef,
    ) -> Self {
        Self {
            orders,
            users,
            transactions,
        }
    }

    pub async fn handle(&self, task: &DeferredTask) -> Result<CloseOutcome> {
        let payload: CloseOrderPayload = serde_json::from_slice(&task.payload)?;
        self.close(&payload.order_no).await
    }

    pub async fn close(&self, order_no: &str) -> Result<CloseOutcome> {
        let order = self
            .orders
            .get(order_no)
            .await
            .query_context("find order")?
            .ok_or_else(|| OrderError::OrderNotFound(order_no.to_string()))?;

        match order.status {
            OrderStatus::Cancelled => return Ok(CloseOutcome::AlreadyClosed),
            OrderStatus::Paid => {
                info!(order_no, "order already paid, skipping close");
                return Ok(CloseOutcome::AlreadyPaid);
            }
            OrderStatus::Pending => {}
        }

        let refund = if order.gift_amount > 0 {
            let user = self
                .users
                .find(order.user_id)
                .await
                .query_context("find user")?
                .ok_or_else(|| {
                    OrderError::query(
                        "find user",
                        StoreError::NotFound(format!("user {}", order.user_id)),
                    )
                })?;
            Some((user.gift_amount, user.gift_amount + order.gift_amount))
        } else {
            None
        };
        let now = Utc::now();

        // The status transition is conditional, so a payment confirmed after
        // the read above aborts the whole close.
        with_transaction(self.transactions.as_ref(), "close order", |tx| {
            tx.transition_order(order_no, OrderStatus::Pending, OrderStatus::Cancelled);
            if let Some((before, after)) = refund {
                tx.set_gift_balance(order.user_id, before, after);
                tx.append_gift_log(gift_ledger::credit_entry(
                    order.user_id,
                    order_no,
                    order.gift_amount,
                    after,
                    now,
                ));
            }
            if let Some(code) = &order.coupon {
                tx.release_coupon(code);
            }
            if order.kind == OrderKind::Purchase
                && let Some(plan_id) = order.plan_id
            {
                tx.restore_inventory(plan_id);
            }
            Ok(())
        })
        .await?;

        info!(order_no, refunded = order.gift_amount, "unpaid order closed");
        Ok(CloseOutcome::Cancelled)
    }
}

/// Totals of one worker pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerReport {
    pub processed: usize,
    pub failed: usize,
}

/// Drains due tasks and dispatches them by kind.
pub struct ExpiryWorker {
    source: DueTaskSourceRef,
    handler: CloseOrderHandler,
}

impl ExpiryWorker {
    pub fn new(source: DueTaskSourceRef, handler: CloseOrderHandler) -> Self {
        Self { source, handler }
    }

    /// Runs every task due at `now`, giving each up to its retry budget.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<WorkerReport> {
        let due = self.source.take_due(now).await?;

        let mut report = WorkerReport::default();
        for (info, task) in due {
            if task.kind != CLOSE_ORDER_TASK {
                warn!(task_id = %info.id, kind = %task.kind, "unknown task kind, dropping");
                report.failed += 1;
                continue;
            }
            if self.run_with_retry(&info, &task).await {
                report.processed += 1;
            } else {
                report.failed += 1;
            }
        }
        Ok(report)
    }

    async fn run_with_retry(&self, info: &TaskInfo, task: &DeferredTask) -> bool {
        let attempts = task.max_retry.max(1);
        for attempt in 1..=attempts {
            match self.handler.handle(task).await {
                Ok(outcome) => {
                    info!(task_id = %info.id, ?outcome, "close order task done");
                    return true;
                }
                Err(e) => {
                    warn!(task_id = %info.id, attempt, error = %e, "close order task failed");
                }
            }
        }
        error!(task_id = %info.id, attempts, "close order task gave up");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::Order;
    use crate::domain::ports::{AuditLogStore, OrderStore, TransactionalStore, UserStore};
    use crate::domain::user::{GiftLogType, User};
    use crate::domain::write_set::WriteSet;
    use crate::infrastructure::in_memory::InMemoryStore;
    use std::sync::Arc;

    fn pending_order(order_no: &str, gift_amount: i64) -> Order {
        Order {
            order_no: order_no.to_string(),
            user_id: 1,
            parent_order_no: None,
            kind: OrderKind::Recharge,
            quantity: 0,
            price: 1_000,
            discount: 0,
            coupon: None,
            coupon_discount: 0,
            gift_amount,
            fee_amount: 0,
            amount: 1_000 - gift_amount,
            payment_id: 1,
            method: "epay".to_string(),
            status: OrderStatus::Pending,
            is_new: false,
            plan_id: None,
            subscribe_token: None,
            created_at: Utc::now(),
        }
    }

    async fn setup(order: Order, balance: i64) -> (Arc<InMemoryStore>, CloseOrderHandler) {
        let store = Arc::new(InMemoryStore::new());
        UserStore::store(
            store.as_ref(),
            User {
                id: 1,
                gift_amount: balance,
            },
        )
        .await
        .unwrap();
        let mut writes = WriteSet::new();
        writes.insert_order(order);
        store.commit(writes).await.unwrap();
        let handler = CloseOrderHandler::new(store.clone(), store.clone(), store.clone());
        (store, handler)
    }

    #[tokio::test]
    async fn test_close_pending_order_credits_gift_back() {
        let (store, handler) = setup(pending_order("C1", 400), 100).await;

        assert_eq!(handler.close("C1").await.unwrap(), CloseOutcome::Cancelled);

        let order = OrderStore::get(store.as_ref(), "C1").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        let user = UserStore::find(store.as_ref(), 1).await.unwrap().unwrap();
        assert_eq!(user.gift_amount, 500);
        let logs = store.gift_logs(1).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].r#type, GiftLogType::Increase);
        assert_eq!(logs[0].balance, 500);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (store, handler) = setup(pending_order("C2", 400), 0).await;
        handler.close("C2").await.unwrap();
        assert_eq!(
            handler.close("C2").await.unwrap(),
            CloseOutcome::AlreadyClosed
        );
        let user = UserStore::find(store.as_ref(), 1).await.unwrap().unwrap();
        assert_eq!(user.gift_amount, 400);
    }

    #[tokio::test]
    async fn test_paid_order_is_left_alone() {
        let (store, handler) = setup(pending_order("C3", 400), 0).await;
        let mut writes = WriteSet::new();
        writes.transition_order("C3", OrderStatus::Pending, OrderStatus::Paid);
        store.commit(writes).await.unwrap();

        assert_eq!(handler.close("C3").await.unwrap(), CloseOutcome::AlreadyPaid);
        let user = UserStore::find(store.as_ref(), 1).await.unwrap().unwrap();
        assert_eq!(user.gift_amount, 0);
    }

    #[tokio::test]
    async fn test_unknown_order_and_bad_payload() {
        let (_store, handler) = setup(pending_order("C4", 0), 0).await;
        assert!(matches!(
            handler.close("missing").await,
            Err(OrderError::OrderNotFound(_))
        ));

        let task = DeferredTask {
            kind: CLOSE_ORDER_TASK.to_string(),
            payload: b"not json".to_vec(),
            max_retry: 3,
        };
        assert!(matches!(
            handler.handle(&task).await,
            Err(OrderError::InvalidTaskPayload(_))
        ));
    }
}
