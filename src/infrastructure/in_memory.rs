use crate::domain::coupon::Coupon;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::payment::{PaymentId, PaymentMethod};
use crate::domain::plan::{Plan, PlanId};
use crate::domain::ports::{
    AuditLogStore, CouponStore, DeferredTaskQueue, DueTaskSource, OrderStore,
    PaymentMethodStore, PlanStore, TransactionalStore, UserStore,
};
use crate::domain::task::{DeferredTask, TaskInfo};
use crate::domain::user::{GiftLogEntry, SubscriptionId, User, UserId, UserSubscription};
use crate::domain::write_set::WriteSet;
use crate::error::{QueueError, StoreError};
use crate::infrastructure::staging::{self, Staging};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    plans: HashMap<PlanId, Plan>,
    payments: HashMap<PaymentId, PaymentMethod>,
    coupons: HashMap<String, Coupon>,
    users: HashMap<UserId, User>,
    subscriptions: HashMap<SubscriptionId, UserSubscription>,
    orders: HashMap<String, Order>,
    gift_logs: Vec<GiftLogEntry>,
}

/// Copies of the records a commit has touched, taken on first access.
/// Nothing reaches [`State`] until [`Changes::publish`].
#[derive(Default)]
struct Changes {
    users: HashMap<UserId, User>,
    plans: HashMap<PlanId, Plan>,
    coupons: HashMap<String, Coupon>,
    orders: HashMap<String, Order>,
    gift_logs: Vec<GiftLogEntry>,
}

impl Changes {
    fn publish(self, state: &mut State) {
        state.users.extend(self.users);
        state.plans.extend(self.plans);
        state.coupons.extend(self.coupons);
        state.orders.extend(self.orders);
        state.gift_logs.extend(self.gift_logs);
    }
}

struct Overlay<'a> {
    base: &'a State,
    changes: Changes,
}

impl Staging for Overlay<'_> {
    fn user(&mut self, user_id: UserId) -> Result<Option<&mut User>, StoreError> {
        if let Some(user) = self.base.users.get(&user_id) {
            self.changes.users.entry(user_id).or_insert_with(|| user.clone());
        }
        Ok(self.changes.users.get_mut(&user_id))
    }

    fn plan(&mut self, plan_id: PlanId) -> Result<Option<&mut Plan>, StoreError> {
        if let Some(plan) = self.base.plans.get(&plan_id) {
            self.changes.plans.entry(plan_id).or_insert_with(|| plan.clone());
        }
        Ok(self.changes.plans.get_mut(&plan_id))
    }

    fn coupon(&mut self, code: &str) -> Result<Option<&mut Coupon>, StoreError> {
        if let Some(coupon) = self.base.coupons.get(code)
            && !self.changes.coupons.contains_key(code)
        {
            self.changes.coupons.insert(code.to_string(), coupon.clone());
        }
        Ok(self.changes.coupons.get_mut(code))
    }

    fn order(&mut self, order_no: &str) -> Result<Option<&mut Order>, StoreError> {
        if let Some(order) = self.base.orders.get(order_no)
            && !self.changes.orders.contains_key(order_no)
        {
            self.changes.orders.insert(order_no.to_string(), order.clone());
        }
        Ok(self.changes.orders.get_mut(order_no))
    }

    fn insert_order(&mut self, order: Order) -> Result<(), StoreError> {
        if self.base.orders.contains_key(&order.order_no)
            || self.changes.orders.contains_key(&order.order_no)
        {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.order_no
            )));
        }
        self.changes.orders.insert(order.order_no.clone(), order);
        Ok(())
    }

    fn append_gift_log(&mut self, entry: GiftLogEntry) -> Result<(), StoreError> {
        self.changes.gift_logs.push(entry);
        Ok(())
    }
}

/// A thread-safe in-memory backend implementing every store port.
///
/// All records sit behind one `RwLock`. A commit stages the records it
/// touches under the write lock and publishes them only if every
/// precondition holds. Ideal for tests and one-shot CLI runs.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryStore {
    async fn find(&self, plan_id: PlanId) -> Result<Option<Plan>, StoreError> {
        Ok(self.state.read().await.plans.get(&plan_id).cloned())
    }

    async fn store(&self, plan: Plan) -> Result<(), StoreError> {
        self.state.write().await.plans.insert(plan.id, plan);
        Ok(())
    }
}

#[async_trait]
impl PaymentMethodStore for InMemoryStore {
    async fn find(&self, payment_id: PaymentId) -> Result<Option<PaymentMethod>, StoreError> {
        Ok(self.state.read().await.payments.get(&payment_id).cloned())
    }

    async fn store(&self, method: PaymentMethod) -> Result<(), StoreError> {
        self.state.write().await.payments.insert(method.id, method);
        Ok(())
    }
}

#[async_trait]
impl CouponStore for InMemoryStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        Ok(self.state.read().await.coupons.get(code).cloned())
    }

    async fn store(&self, coupon: Coupon) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .coupons
            .insert(coupon.code.clone(), coupon);
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn store(&self, user: User) -> Result<(), StoreError> {
        self.state.write().await.users.insert(user.id, user);
        Ok(())
    }

    async fn subscriptions(&self, user_id: UserId) -> Result<Vec<UserSubscription>, StoreError> {
        let state = self.state.read().await;
        let mut subscriptions: Vec<_> = state
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        subscriptions.sort_by_key(|s| s.id);
        Ok(subscriptions)
    }

    async fn find_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<UserSubscription>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .subscriptions
            .get(&subscription_id)
            .cloned())
    }

    async fn store_subscription(&self, subscription: UserSubscription) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .subscriptions
            .insert(subscription.id, subscription);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn get(&self, order_no: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.state.read().await.orders.get(order_no).cloned())
    }

    async fn count_by_coupon(&self, user_id: UserId, coupon: &str) -> Result<i64, StoreError> {
        let state = self.state.read().await;
        let count = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id && o.coupon.as_deref() == Some(coupon))
            .count();
        Ok(count as i64)
    }

    async fn has_paid_orders(&self, user_id: UserId) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .any(|o| o.user_id == user_id && o.status == OrderStatus::Paid))
    }

    async fn all_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.state.read().await.orders.values().cloned().collect())
    }
}

#[async_trait]
impl AuditLogStore for InMemoryStore {
    async fn gift_logs(&self, user_id: UserId) -> Result<Vec<GiftLogEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .gift_logs
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStore {
    async fn commit(&self, writes: WriteSet) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let mut overlay = Overlay {
            base: &*state,
            changes: Changes::default(),
        };
        staging::apply(&mut overlay, writes)?;
        let changes = overlay.changes;
        changes.publish(&mut *state);
        Ok(())
    }
}

/// In-process delayed task queue.
///
/// Tasks become due once their `process_at` passes; [`DueTaskSource::take_due`]
/// removes and returns them.
#[derive(Default, Clone)]
pub struct InMemoryTaskQueue {
    tasks: Arc<Mutex<Vec<(TaskInfo, DeferredTask)>>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every task not yet handed out.
    pub async fn pending(&self) -> Vec<(TaskInfo, DeferredTask)> {
        self.tasks.lock().await.clone()
    }
}

#[async_trait]
impl DeferredTaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: DeferredTask, delay: Duration) -> Result<TaskInfo, QueueError> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| QueueError::Unavailable(format!("invalid delay: {e}")))?;
        let process_at = Utc::now()
            .checked_add_signed(delay)
            .ok_or_else(|| QueueError::Unavailable(format!("delay of {delay} is out of range")))?;
        let info = TaskInfo {
            id: Uuid::new_v4().to_string(),
            kind: task.kind.clone(),
            process_at,
        };
        self.tasks.lock().await.push((info.clone(), task));
        Ok(info)
    }
}

#[async_trait]
impl DueTaskSource for InMemoryTaskQueue {
    async fn take_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(TaskInfo, DeferredTask)>, QueueError> {
        let mut tasks = self.tasks.lock().await;
        let (mut due, waiting): (Vec<_>, Vec<_>) = tasks
            .drain(..)
            .partition(|(info, _)| info.process_at <= now);
        *tasks = waiting;
        due.sort_by_key(|(info, _)| info.process_at);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderKind;
    use crate::domain::plan::DiscountTable;
    use crate::domain::task::CLOSE_ORDER_TASK;

    fn order(order_no: &str, user_id: UserId, coupon: Option<&str>, status: OrderStatus) -> Order {
        Order {
            order_no: order_no.to_string(),
            user_id,
            parent_order_no: None,
            kind: OrderKind::Purchase,
            quantity: 1,
            price: 100,
            discount: 0,
            coupon: coupon.map(str::to_string),
            coupon_discount: 0,
            gift_amount: 0,
            fee_amount: 0,
            amount: 100,
            payment_id: 1,
            method: "balance".to_string(),
            status,
            is_new: true,
            plan_id: Some(1),
            subscribe_token: None,
            created_at: Utc::now(),
        }
    }

    async fn insert(store: &InMemoryStore, order: Order) {
        let mut writes = WriteSet::new();
        writes.insert_order(order);
        store.commit(writes).await.unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_plan_store() {
        let store = InMemoryStore::new();
        let plan = Plan {
            id: 1,
            name: "Pro".to_string(),
            unit_price: 1_000,
            discount: DiscountTable::default(),
            inventory: 10,
            quota: 0,
            sell: true,
        };
        PlanStore::store(&store, plan.clone()).await.unwrap();
        assert_eq!(PlanStore::find(&store, 1).await.unwrap(), Some(plan));
        assert!(PlanStore::find(&store, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_coupon_count_includes_every_status() {
        let store = InMemoryStore::new();
        insert(&store, order("O1", 1, Some("SPRING"), OrderStatus::Pending)).await;
        insert(&store, order("O2", 1, Some("SPRING"), OrderStatus::Cancelled)).await;
        insert(&store, order("O3", 1, Some("SPRING"), OrderStatus::Paid)).await;
        insert(&store, order("O4", 2, Some("SPRING"), OrderStatus::Paid)).await;
        insert(&store, order("O5", 1, None, OrderStatus::Paid)).await;

        assert_eq!(store.count_by_coupon(1, "SPRING").await.unwrap(), 3);
        assert_eq!(store.count_by_coupon(3, "SPRING").await.unwrap(), 0);
        assert!(store.has_paid_orders(1).await.unwrap());
        assert!(!store.has_paid_orders(3).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_order_number_conflicts() {
        let store = InMemoryStore::new();
        insert(&store, order("DUP", 1, None, OrderStatus::Pending)).await;

        let mut writes = WriteSet::new();
        writes.insert_order(order("DUP", 2, None, OrderStatus::Pending));
        let err = store.commit(writes).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(OrderStore::get(&store, "DUP").await.unwrap().unwrap().user_id, 1);
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = InMemoryStore::new();
        UserStore::store(&store, User { id: 1, gift_amount: 500 })
            .await
            .unwrap();

        // Second write references a coupon that does not exist.
        let mut writes = WriteSet::new();
        writes.set_gift_balance(1, 500, 0);
        writes.redeem_coupon("MISSING");
        assert!(store.commit(writes).await.is_err());

        let user = UserStore::find(&store, 1).await.unwrap().unwrap();
        assert_eq!(user.gift_amount, 500);
    }

    #[tokio::test]
    async fn test_later_writes_see_staged_records() {
        let store = InMemoryStore::new();
        UserStore::store(&store, User { id: 1, gift_amount: 500 })
            .await
            .unwrap();
        insert(&store, order("O1", 1, None, OrderStatus::Pending)).await;

        let mut writes = WriteSet::new();
        writes.set_gift_balance(1, 500, 300);
        writes.set_gift_balance(1, 300, 100);
        writes.insert_order(order("O2", 1, None, OrderStatus::Pending));
        writes.transition_order("O2", OrderStatus::Pending, OrderStatus::Cancelled);
        store.commit(writes).await.unwrap();

        assert_eq!(UserStore::find(&store, 1).await.unwrap().unwrap().gift_amount, 100);
        let o2 = OrderStore::get(&store, "O2").await.unwrap().unwrap();
        assert_eq!(o2.status, OrderStatus::Cancelled);

        // A failure after a staged insert leaves the order table as it was.
        let mut writes = WriteSet::new();
        writes.insert_order(order("O3", 1, None, OrderStatus::Pending));
        writes.set_gift_balance(1, 500, 0);
        assert!(store.commit(writes).await.is_err());
        assert!(OrderStore::get(&store, "O3").await.unwrap().is_none());
        assert_eq!(store.all_orders().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_inventory_and_coupon_preconditions() {
        let store = InMemoryStore::new();
        PlanStore::store(
            &store,
            Plan {
                id: 1,
                name: String::new(),
                unit_price: 1,
                discount: DiscountTable::default(),
                inventory: 1,
                quota: 0,
                sell: true,
            },
        )
        .await
        .unwrap();
        CouponStore::store(
            &store,
            Coupon {
                code: "ONCE".to_string(),
                rule: crate::domain::coupon::CouponRule::Fixed { amount: 1 },
                count: 1,
                used_count: 0,
                user_limit: 1,
                plans: vec![],
            },
        )
        .await
        .unwrap();

        let mut writes = WriteSet::new();
        writes.decrement_inventory(1);
        writes.redeem_coupon("ONCE");
        store.commit(writes.clone()).await.unwrap();
        assert!(matches!(
            store.commit(writes).await,
            Err(StoreError::Conflict(_))
        ));

        let mut release = WriteSet::new();
        release.restore_inventory(1);
        release.release_coupon("ONCE");
        store.commit(release).await.unwrap();
        assert_eq!(PlanStore::find(&store, 1).await.unwrap().unwrap().inventory, 1);
        assert_eq!(
            store.find_by_code("ONCE").await.unwrap().unwrap().used_count,
            0
        );
    }

    #[tokio::test]
    async fn test_task_queue_hands_out_due_tasks_once() {
        let queue = InMemoryTaskQueue::new();
        let soon = queue
            .enqueue(DeferredTask::close_order("A").unwrap(), Duration::ZERO)
            .await
            .unwrap();
        queue
            .enqueue(
                DeferredTask::close_order("B").unwrap(),
                Duration::from_secs(900),
            )
            .await
            .unwrap();
        assert_eq!(soon.kind, CLOSE_ORDER_TASK);

        let due = queue.take_due(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0.id, soon.id);
        assert!(queue.take_due(Utc::now()).await.unwrap().is_empty());
        assert_eq!(queue.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_out_of_range_delay() {
        let queue = InMemoryTaskQueue::new();
        let err = queue
            .enqueue(
                DeferredTask::close_order("A").unwrap(),
                Duration::from_secs(60_000_000_000_000),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Unavailable(_)));
        assert!(queue.pending().await.is_empty());
    }
}
