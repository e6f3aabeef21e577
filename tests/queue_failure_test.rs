use async_trait::async_trait;
use panel_orders::application::workflow::{OrderWorkflow, PurchaseRequest};
use panel_orders::config::OrderConfig;
use panel_orders::domain::order::OrderStatus;
use panel_orders::domain::payment::{FeeRule, PaymentMethod};
use panel_orders::domain::plan::{DiscountTable, Plan};
use panel_orders::domain::ports::{
    DeferredTaskQueue, OrderStore, PaymentMethodStore, PlanStore, Repositories, UserStore,
};
use panel_orders::domain::task::{DeferredTask, TaskInfo};
use panel_orders::domain::user::User;
use panel_orders::error::QueueError;
use panel_orders::infrastructure::in_memory::InMemoryStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A queue whose broker is always down.
#[derive(Default)]
struct UnavailableQueue {
    attempts: AtomicUsize,
}

#[async_trait]
impl DeferredTaskQueue for UnavailableQueue {
    async fn enqueue(&self, _task: DeferredTask, _delay: Duration) -> Result<TaskInfo, QueueError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(QueueError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_enqueue_failure_keeps_the_order() {
    let store = InMemoryStore::new();
    PlanStore::store(
        &store,
        Plan {
            id: 1,
            name: "Basic".to_string(),
            unit_price: 1_000,
            discount: DiscountTable::default(),
            inventory: -1,
            quota: 0,
            sell: true,
        },
    )
    .await
    .unwrap();
    PaymentMethodStore::store(
        &store,
        PaymentMethod {
            id: 1,
            platform: "balance".to_string(),
            fee: FeeRule::None,
        },
    )
    .await
    .unwrap();
    let user = User::new(1);
    UserStore::store(&store, user.clone()).await.unwrap();

    let queue = Arc::new(UnavailableQueue::default());
    let workflow = OrderWorkflow::new(
        Repositories::from_store(store.clone()),
        queue.clone(),
        OrderConfig::default(),
    );

    let res = workflow
        .purchase(
            Some(&user),
            PurchaseRequest {
                plan_id: 1,
                quantity: 1,
                coupon: None,
                payment_id: 1,
            },
        )
        .await
        .unwrap();

    assert_eq!(queue.attempts.load(Ordering::SeqCst), 1);
    let order = store.get(&res.order_no).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}
