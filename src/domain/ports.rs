use super::coupon::Coupon;
use super::order::Order;
use super::payment::{PaymentId, PaymentMethod};
use super::plan::{Plan, PlanId};
use super::task::{DeferredTask, TaskInfo};
use super::user::{GiftLogEntry, SubscriptionId, User, UserId, UserSubscription};
use super::write_set::WriteSet;
use crate::error::{QueueError, Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn find(&self, plan_id: PlanId) -> Result<Option<Plan>, StoreError>;
    async fn store(&self, plan: Plan) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PaymentMethodStore: Send + Sync {
    async fn find(&self, payment_id: PaymentId) -> Result<Option<PaymentMethod>, StoreError>;
    async fn store(&self, method: PaymentMethod) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError>;
    async fn store(&self, coupon: Coupon) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, user_id: UserId) -> Result<Option<User>, StoreError>;
    async fn store(&self, user: User) -> Result<(), StoreError>;
    async fn subscriptions(&self, user_id: UserId) -> Result<Vec<UserSubscription>, StoreError>;
    async fn find_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<UserSubscription>, StoreError>;
    async fn store_subscription(&self, subscription: UserSubscription) -> Result<(), StoreError>;
}

/// Read side of the order table. Orders are only written through
/// [`TransactionalStore::commit`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_no: &str) -> Result<Option<Order>, StoreError>;
    /// Counts every order of the user referencing `coupon`, whatever its status.
    async fn count_by_coupon(&self, user_id: UserId, coupon: &str) -> Result<i64, StoreError>;
    /// Whether the user has ever completed a payment.
    async fn has_paid_orders(&self, user_id: UserId) -> Result<bool, StoreError>;
    async fn all_orders(&self) -> Result<Vec<Order>, StoreError>;
}

#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn gift_logs(&self, user_id: UserId) -> Result<Vec<GiftLogEntry>, StoreError>;
}

/// Commit side of the fulfillment transaction.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Validates every staged precondition and applies every write, or
    /// applies nothing and returns the first failure.
    async fn commit(&self, writes: WriteSet) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DeferredTaskQueue: Send + Sync {
    async fn enqueue(&self, task: DeferredTask, delay: Duration) -> Result<TaskInfo, QueueError>;
}

/// Worker side of the queue: hands out tasks whose delay has elapsed.
#[async_trait]
pub trait DueTaskSource: Send + Sync {
    async fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<(TaskInfo, DeferredTask)>, QueueError>;
}

pub type PlanStoreRef = Arc<dyn PlanStore>;
pub type PaymentMethodStoreRef = Arc<dyn PaymentMethodStore>;
pub type CouponStoreRef = Arc<dyn CouponStore>;
pub type UserStoreRef = Arc<dyn UserStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type TransactionalStoreRef = Arc<dyn TransactionalStore>;
pub type TaskQueueRef = Arc<dyn DeferredTaskQueue>;
pub type DueTaskSourceRef = Arc<dyn DueTaskSource>;

/// The collaborator stores the order flow depends on.
#[derive(Clone)]
pub struct Repositories {
    pub plans: PlanStoreRef,
    pub payments: PaymentMethodStoreRef,
    pub coupons: CouponStoreRef,
    pub users: UserStoreRef,
    pub orders: OrderStoreRef,
    pub transactions: TransactionalStoreRef,
}

impl Repositories {
    /// Wires every port to one backend that implements all of them.
    pub fn from_store<S>(store: S) -> Self
    where
        S: PlanStore
            + PaymentMethodStore
            + CouponStore
            + UserStore
            + OrderStore
            + TransactionalStore
            + 'static,
    {
        let shared = Arc::new(store);
        Self {
            plans: shared.clone(),
            payments: shared.clone(),
            coupons: shared.clone(),
            users: shared.clone(),
            orders: shared.clone(),
            transactions: shared,
        }
    }
}
