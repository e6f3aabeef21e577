use crate::domain::coupon::Coupon;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::payment::{PaymentId, PaymentMethod};
use crate::domain::plan::{Plan, PlanId};
use crate::domain::ports::{
    AuditLogStore, CouponStore, OrderStore, PaymentMethodStore, PlanStore, TransactionalStore,
    UserStore,
};
use crate::domain::user::{GiftLogEntry, GiftLogType, SubscriptionId, User, UserId, UserSubscription};
use crate::domain::write_set::WriteSet;
use crate::error::StoreError;
use crate::infrastructure::staging::{self, Staging};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub const CF_PLANS: &str = "plans";
pub const CF_COUPONS: &str = "coupons";
pub const CF_PAYMENT_METHODS: &str = "payment_methods";
pub const CF_USERS: &str = "users";
pub const CF_SUBSCRIPTIONS: &str = "subscriptions";
pub const CF_ORDERS: &str = "orders";
/// Gift ledger, keyed so that one user's entries are contiguous and ordered by time.
pub const CF_GIFT_LOGS: &str = "gift_logs";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_PLANS,
    CF_COUPONS,
    CF_PAYMENT_METHODS,
    CF_USERS,
    CF_SUBSCRIPTIONS,
    CF_ORDERS,
    CF_GIFT_LOGS,
];

/// A persistent backend using RocksDB, one column family per record type,
/// values encoded as JSON.
///
/// `Clone` shares the underlying `Arc<DB>`. Commits are serialized through
/// `commit_lock` and land as a single `WriteBatch`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a database at `path` with every column family present.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Internal(format!("column family {name} not found")))
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    /// Decodes every value whose key starts with `prefix`.
    fn scan_json<T: DeserializeOwned>(&self, cf: &str, prefix: &[u8]) -> Result<Vec<T>, StoreError> {
        let mode = IteratorMode::From(prefix, Direction::Forward);
        let mut values = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }
}

fn gift_log_prefix(user_id: UserId) -> String {
    format!("{user_id:020}:")
}

fn gift_log_key(entry: &GiftLogEntry) -> String {
    let kind = match entry.r#type {
        GiftLogType::Increase => "increase",
        GiftLogType::Decrease => "decrease",
    };
    let nanos = entry.timestamp.timestamp_nanos_opt().unwrap_or_default();
    format!(
        "{}{nanos:020}:{}:{kind}",
        gift_log_prefix(entry.user_id),
        entry.order_no
    )
}

/// Records a commit has touched, loaded on first access and flushed as one batch.
struct Overlay<'a> {
    store: &'a RocksDBStore,
    users: HashMap<UserId, User>,
    plans: HashMap<PlanId, Plan>,
    coupons: HashMap<String, Coupon>,
    orders: HashMap<String, Order>,
    gift_logs: Vec<GiftLogEntry>,
}

impl<'a> Overlay<'a> {
    fn new(store: &'a RocksDBStore) -> Self {
        Self {
            store,
            users: HashMap::new(),
            plans: HashMap::new(),
            coupons: HashMap::new(),
            orders: HashMap::new(),
            gift_logs: Vec::new(),
        }
    }

    fn into_batch(self) -> Result<WriteBatch, StoreError> {
        let store = self.store;
        let mut batch = WriteBatch::default();
        for (id, user) in &self.users {
            batch.put_cf(store.cf(CF_USERS)?, id.to_be_bytes(), serde_json::to_vec(user)?);
        }
        for (id, plan) in &self.plans {
            batch.put_cf(store.cf(CF_PLANS)?, id.to_be_bytes(), serde_json::to_vec(plan)?);
        }
        for (code, coupon) in &self.coupons {
            batch.put_cf(store.cf(CF_COUPONS)?, code.as_bytes(), serde_json::to_vec(coupon)?);
        }
        for (order_no, order) in &self.orders {
            batch.put_cf(store.cf(CF_ORDERS)?, order_no.as_bytes(), serde_json::to_vec(order)?);
        }
        for entry in &self.gift_logs {
            batch.put_cf(
                store.cf(CF_GIFT_LOGS)?,
                gift_log_key(entry).as_bytes(),
                serde_json::to_vec(entry)?,
            );
        }
        Ok(batch)
    }
}

impl Staging for Overlay<'_> {
    fn user(&mut self, user_id: UserId) -> Result<Option<&mut User>, StoreError> {
        if !self.users.contains_key(&user_id)
            && let Some(user) = self.store.get_json(CF_USERS, &user_id.to_be_bytes())?
        {
            self.users.insert(user_id, user);
        }
        Ok(self.users.get_mut(&user_id))
    }

    fn plan(&mut self, plan_id: PlanId) -> Result<Option<&mut Plan>, StoreError> {
        if !self.plans.contains_key(&plan_id)
            && let Some(plan) = self.store.get_json(CF_PLANS, &plan_id.to_be_bytes())?
        {
            self.plans.insert(plan_id, plan);
        }
        Ok(self.plans.get_mut(&plan_id))
    }

    fn coupon(&mut self, code: &str) -> Result<Option<&mut Coupon>, StoreError> {
        if !self.coupons.contains_key(code)
            && let Some(coupon) = self.store.get_json(CF_COUPONS, code.as_bytes())?
        {
            self.coupons.insert(code.to_string(), coupon);
        }
        Ok(self.coupons.get_mut(code))
    }

    fn order(&mut self, order_no: &str) -> Result<Option<&mut Order>, StoreError> {
        if !self.orders.contains_key(order_no)
            && let Some(order) = self.store.get_json(CF_ORDERS, order_no.as_bytes())?
        {
            self.orders.insert(order_no.to_string(), order);
        }
        Ok(self.orders.get_mut(order_no))
    }

    fn insert_order(&mut self, order: Order) -> Result<(), StoreError> {
        if self.order(&order.order_no)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.order_no
            )));
        }
        self.orders.insert(order.order_no.clone(), order);
        Ok(())
    }

    fn append_gift_log(&mut self, entry: GiftLogEntry) -> Result<(), StoreError> {
        self.gift_logs.push(entry);
        Ok(())
    }
}

#[async_trait]
impl PlanStore for RocksDBStore {
    async fn find(&self, plan_id: PlanId) -> Result<Option<Plan>, StoreError> {
        self.get_json(CF_PLANS, &plan_id.to_be_bytes())
    }

    async fn store(&self, plan: Plan) -> Result<(), StoreError> {
        self.put_json(CF_PLANS, &plan.id.to_be_bytes(), &plan)
    }
}

#[async_trait]
impl PaymentMethodStore for RocksDBStore {
    async fn find(&self, payment_id: PaymentId) -> Result<Option<PaymentMethod>, StoreError> {
        self.get_json(CF_PAYMENT_METHODS, &payment_id.to_be_bytes())
    }

    async fn store(&self, method: PaymentMethod) -> Result<(), StoreError> {
        self.put_json(CF_PAYMENT_METHODS, &method.id.to_be_bytes(), &method)
    }
}

#[async_trait]
impl CouponStore for RocksDBStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        self.get_json(CF_COUPONS, code.as_bytes())
    }

    async fn store(&self, coupon: Coupon) -> Result<(), StoreError> {
        self.put_json(CF_COUPONS, coupon.code.as_bytes(), &coupon)
    }
}

#[async_trait]
impl UserStore for RocksDBStore {
    async fn find(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        self.get_json(CF_USERS, &user_id.to_be_bytes())
    }

    async fn store(&self, user: User) -> Result<(), StoreError> {
        self.put_json(CF_USERS, &user.id.to_be_bytes(), &user)
    }

    async fn subscriptions(&self, user_id: UserId) -> Result<Vec<UserSubscription>, StoreError> {
        let all: Vec<UserSubscription> = self.scan_json(CF_SUBSCRIPTIONS, &[])?;
        Ok(all.into_iter().filter(|s| s.user_id == user_id).collect())
    }

    async fn find_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<UserSubscription>, StoreError> {
        self.get_json(CF_SUBSCRIPTIONS, &subscription_id.to_be_bytes())
    }

    async fn store_subscription(&self, subscription: UserSubscription) -> Result<(), StoreError> {
        self.put_json(
            CF_SUBSCRIPTIONS,
            &subscription.id.to_be_bytes(),
            &subscription,
        )
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn get(&self, order_no: &str) -> Result<Option<Order>, StoreError> {
        self.get_json(CF_ORDERS, order_no.as_bytes())
    }

    async fn count_by_coupon(&self, user_id: UserId, coupon: &str) -> Result<i64, StoreError> {
        let orders: Vec<Order> = self.scan_json(CF_ORDERS, &[])?;
        let count = orders
            .iter()
            .filter(|o| o.user_id == user_id && o.coupon.as_deref() == Some(coupon))
            .count();
        Ok(count as i64)
    }

    async fn has_paid_orders(&self, user_id: UserId) -> Result<bool, StoreError> {
        let orders: Vec<Order> = self.scan_json(CF_ORDERS, &[])?;
        Ok(orders
            .iter()
            .any(|o| o.user_id == user_id && o.status == OrderStatus::Paid))
    }

    async fn all_orders(&self) -> Result<Vec<Order>, StoreError> {
        self.scan_json(CF_ORDERS, &[])
    }
}

#[async_trait]
impl AuditLogStore for RocksDBStore {
    async fn gift_logs(&self, user_id: UserId) -> Result<Vec<GiftLogEntry>, StoreError> {
        self.scan_json(CF_GIFT_LOGS, gift_log_prefix(user_id).as_bytes())
    }
}

#[async_trait]
impl TransactionalStore for RocksDBStore {
    async fn commit(&self, writes: WriteSet) -> Result<(), StoreError> {
        // Preconditions are read outside the batch, so a second commit must not
        // read the same records until this batch has landed.
        let _guard = self.commit_lock.lock().await;
        let ops = writes.ops().len();
        let mut overlay = Overlay::new(self);
        staging::apply(&mut overlay, writes)?;
        let batch = overlay.into_batch()?;
        self.db.write(batch)?;
        debug!(ops, "rocksdb commit applied");
        Ok(())
    }
}
