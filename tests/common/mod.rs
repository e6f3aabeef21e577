#![allow(dead_code)]

use panel_orders::application::workflow::OrderWorkflow;
use panel_orders::config::OrderConfig;
use panel_orders::domain::coupon::{Coupon, CouponRule};
use panel_orders::domain::payment::{FeeRule, PaymentMethod};
use panel_orders::domain::plan::{DiscountTable, Plan};
use panel_orders::domain::ports::{
    CouponStore, PaymentMethodStore, PlanStore, Repositories, UserStore,
};
use panel_orders::domain::user::{SubscriptionStatus, User, UserSubscription};
use panel_orders::infrastructure::in_memory::{InMemoryStore, InMemoryTaskQueue};
use std::sync::Arc;

pub const BALANCE_PAYMENT: u64 = 1;
pub const CARD_PAYMENT: u64 = 2;

/// An in-memory deployment: the raw store for assertions, plus the workflow
/// wired to it.
pub struct World {
    pub store: InMemoryStore,
    pub queue: Arc<InMemoryTaskQueue>,
    pub repos: Repositories,
    pub workflow: OrderWorkflow,
}

impl World {
    pub async fn new() -> Self {
        Self::with_config(OrderConfig::default()).await
    }

    pub async fn with_config(config: OrderConfig) -> Self {
        let store = InMemoryStore::new();
        let queue = Arc::new(InMemoryTaskQueue::new());
        let repos = Repositories::from_store(store.clone());
        let workflow = OrderWorkflow::new(repos.clone(), queue.clone(), config);

        PaymentMethodStore::store(
            &store,
            PaymentMethod {
                id: BALANCE_PAYMENT,
                platform: "balance".to_string(),
                fee: FeeRule::None,
            },
        )
        .await
        .unwrap();
        PaymentMethodStore::store(
            &store,
            PaymentMethod {
                id: CARD_PAYMENT,
                platform: "stripe_alipay".to_string(),
                fee: FeeRule::Fixed { amount: 30 },
            },
        )
        .await
        .unwrap();

        Self {
            store,
            queue,
            repos,
            workflow,
        }
    }

    pub async fn user(&self, id: u64, gift_amount: i64) -> User {
        let user = User { id, gift_amount };
        UserStore::store(&self.store, user.clone()).await.unwrap();
        user
    }

    pub async fn plan(&self, id: u64, unit_price: i64, inventory: i64) -> Plan {
        let plan = Plan {
            id,
            name: format!("plan-{id}"),
            unit_price,
            discount: DiscountTable::default(),
            inventory,
            quota: 0,
            sell: true,
        };
        PlanStore::store(&self.store, plan.clone()).await.unwrap();
        plan
    }

    pub async fn save_plan(&self, plan: Plan) {
        PlanStore::store(&self.store, plan).await.unwrap();
    }

    pub async fn payment(&self, id: u64, fee: FeeRule) {
        PaymentMethodStore::store(
            &self.store,
            PaymentMethod {
                id,
                platform: format!("method-{id}"),
                fee,
            },
        )
        .await
        .unwrap();
    }

    pub async fn coupon(&self, code: &str, rule: CouponRule, count: i64, user_limit: i64) {
        CouponStore::store(
            &self.store,
            Coupon {
                code: code.to_string(),
                rule,
                count,
                used_count: 0,
                user_limit,
                plans: vec![],
            },
        )
        .await
        .unwrap();
    }

    pub async fn subscription(&self, id: u64, user_id: u64, plan_id: u64, order_no: &str) {
        UserStore::store_subscription(
            &self.store,
            UserSubscription {
                id,
                user_id,
                plan_id,
                order_no: Some(order_no.to_string()),
                token: format!("token-{id}"),
                status: SubscriptionStatus::Active,
                expire_at: None,
            },
        )
        .await
        .unwrap();
    }
}
