use crate::application::eligibility::{self, CouponGuard};
use crate::application::expiry::ExpiryScheduler;
use crate::application::fulfillment::OrderFulfillmentTransaction;
use crate::application::gift_ledger::{self, GiftDeduction};
use crate::application::pricing::{self, Quote};
use crate::config::OrderConfig;
use crate::domain::coupon::Coupon;
use crate::domain::order::{Order, OrderKind, OrderStatus, generate_order_no};
use crate::domain::payment::{PaymentId, PaymentMethod};
use crate::domain::plan::{Plan, PlanId};
use crate::domain::ports::{Repositories, TaskQueueRef};
use crate::domain::user::{SubscriptionId, User, UserId};
use crate::error::{OrderError, Result, StoreError, StoreResultExt};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub plan_id: PlanId,
    /// Values `<= 0` are treated as `1`.
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub coupon: Option<String>,
    pub payment_id: PaymentId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub order_no: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalRequest {
    pub user_subscription_id: SubscriptionId,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub coupon: Option<String>,
    pub payment_id: PaymentId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalResponse {
    pub order_no: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RechargeRequest {
    /// Minor currency units.
    pub amount: i64,
    pub payment_id: PaymentId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RechargeResponse {
    pub order_no: String,
}

/// Any of the three order operations, for callers that dispatch dynamically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowRequest {
    Purchase(PurchaseRequest),
    Renewal(RenewalRequest),
    Recharge(RechargeRequest),
}

/// Entry point for creating orders.
///
/// Each operation runs eligibility checks, prices the order, commits it in
/// one fulfillment transaction and schedules its expiry. The session user is
/// passed explicitly; `None` is refused with `InvalidAccess`.
pub struct OrderWorkflow {
    repos: Repositories,
    scheduler: ExpiryScheduler,
    config: OrderConfig,
}

impl OrderWorkflow {
    pub fn new(repos: Repositories, queue: TaskQueueRef, config: OrderConfig) -> Self {
        let scheduler = ExpiryScheduler::new(queue, config.close_order_after);
        Self {
            repos,
            scheduler,
            config,
        }
    }

    /// Runs whichever operation `request` names and returns the order number.
    pub async fn submit(&self, user: Option<&User>, request: WorkflowRequest) -> Result<String> {
        match request {
            WorkflowRequest::Purchase(req) => self.purchase(user, req).await.map(|r| r.order_no),
            WorkflowRequest::Renewal(req) => self.renewal(user, req).await.map(|r| r.order_no),
            WorkflowRequest::Recharge(req) => self.recharge(user, req).await.map(|r| r.order_no),
        }
    }

    #[instrument(name = "purchase", skip_all, fields(plan_id = req.plan_id))]
    pub async fn purchase(
        &self,
        user: Option<&User>,
        req: PurchaseRequest,
    ) -> Result<PurchaseResponse> {
        let session = eligibility::require_user(user)?;
        let quantity = eligibility::normalize_quantity(req.quantity, &self.config)?;
        let user = self.load_user(session.id).await?;

        let plan = self.find_plan(req.plan_id).await?;
        eligibility::check_plan_sellable(&plan)?;
        eligibility::check_inventory(&plan)?;

        let subscriptions = self
            .repos
            .users
            .subscriptions(user.id)
            .await
            .query_context("find user subscription")?;
        eligibility::check_quota(&plan, &subscriptions)?;
        eligibility::check_single_subscription(user.id, &subscriptions, &self.config)?;

        let coupon_code = non_empty(req.coupon);
        let coupon = self.check_coupon(user.id, plan.id, coupon_code.as_deref()).await?;
        let payment = self.find_payment(req.payment_id).await?;
        let (quote, deduction) = self.price(&plan, quantity, coupon.as_ref(), &user, &payment)?;
        let is_new = self.is_new_customer(user.id).await?;

        let now = Utc::now();
        let order = Order {
            order_no: generate_order_no(now),
            user_id: user.id,
            parent_order_no: None,
            kind: OrderKind::Purchase,
            quantity,
            price: quote.list_price,
            discount: quote.discount,
            coupon: coupon_code,
            coupon_discount: quote.coupon_discount,
            gift_amount: quote.gift_deduction,
            fee_amount: quote.fee,
            amount: quote.amount,
            payment_id: payment.id,
            method: payment.platform.clone(),
            status: OrderStatus::Pending,
            is_new,
            plan_id: Some(plan.id),
            subscribe_token: None,
            created_at: now,
        };

        let order = OrderFulfillmentTransaction::new(order)
            .with_gift_deduction(&deduction, gift_ledger::PURCHASE_DEDUCTION_REMARK, now)
            .consuming_inventory(&plan)
            .commit(self.repos.transactions.as_ref())
            .await?;
        info!(order_no = %order.order_no, user_id = user.id, amount = order.amount, "purchase order created");

        self.scheduler.schedule_close(&order.order_no).await;
        Ok(PurchaseResponse {
            order_no: order.order_no,
        })
    }

    #[instrument(name = "renewal", skip_all, fields(user_subscription_id = req.user_subscription_id))]
    pub async fn renewal(
        &self,
        user: Option<&User>,
        req: RenewalRequest,
    ) -> Result<RenewalResponse> {
        let session = eligibility::require_user(user)?;
        let quantity = eligibility::normalize_quantity(req.quantity, &self.config)?;
        let user = self.load_user(session.id).await?;

        let subscription = self
            .repos
            .users
            .find_subscription(req.user_subscription_id)
            .await
            .query_context("find user subscribe")?
            .ok_or_else(|| {
                OrderError::query(
                    "find user subscribe",
                    StoreError::NotFound(format!(
                        "user subscription {}",
                        req.user_subscription_id
                    )),
                )
            })?;
        eligibility::check_subscription_owner(&user, &subscription)?;
        if subscription.is_expired(Utc::now()) {
            debug!(subscription_id = subscription.id, "renewing an expired subscription");
        }

        let plan = self.find_plan(subscription.plan_id).await?;
        eligibility::check_plan_sellable(&plan)?;

        let coupon_code = non_empty(req.coupon);
        let coupon = self.check_coupon(user.id, plan.id, coupon_code.as_deref()).await?;
        let payment = self.find_payment(req.payment_id).await?;
        let (quote, deduction) = self.price(&plan, quantity, coupon.as_ref(), &user, &payment)?;

        let now = Utc::now();
        let order = Order {
            order_no: generate_order_no(now),
            user_id: user.id,
            parent_order_no: subscription.order_no.clone(),
            kind: OrderKind::Renewal,
            quantity,
            price: quote.list_price,
            discount: quote.discount,
            coupon: coupon_code,
            coupon_discount: quote.coupon_discount,
            gift_amount: quote.gift_deduction,
            fee_amount: quote.fee,
            amount: quote.amount,
            payment_id: payment.id,
            method: payment.platform.clone(),
            status: OrderStatus::Pending,
            is_new: false,
            plan_id: Some(plan.id),
            subscribe_token: Some(subscription.token.clone()),
            created_at: now,
        };

        let order = OrderFulfillmentTransaction::new(order)
            .with_gift_deduction(&deduction, gift_ledger::RENEWAL_DEDUCTION_REMARK, now)
            .commit(self.repos.transactions.as_ref())
            .await?;
        info!(order_no = %order.order_no, user_id = user.id, amount = order.amount, "renewal order created");

        self.scheduler.schedule_close(&order.order_no).await;
        Ok(RenewalResponse {
            order_no: order.order_no,
        })
    }

    #[instrument(name = "recharge", skip_all, fields(amount = req.amount))]
    pub async fn recharge(
        &self,
        user: Option<&User>,
        req: RechargeRequest,
    ) -> Result<RechargeResponse> {
        let session = eligibility::require_user(user)?;
        eligibility::check_recharge_amount(req.amount, &self.config)?;

        let payment = self.find_payment(req.payment_id).await?;
        let mut quote = Quote::flat(req.amount);
        quote.apply_fee(pricing::fee(quote.amount, &payment.fee));
        eligibility::check_amount_ceiling(quote.amount, "fee", &self.config)?;

        let is_new = self.is_new_customer(session.id).await?;
        let now = Utc::now();
        let order = Order {
            order_no: generate_order_no(now),
            user_id: session.id,
            parent_order_no: None,
            kind: OrderKind::Recharge,
            quantity: 0,
            price: quote.list_price,
            discount: 0,
            coupon: None,
            coupon_discount: 0,
            gift_amount: 0,
            fee_amount: quote.fee,
            amount: quote.amount,
            payment_id: payment.id,
            method: payment.platform.clone(),
            status: OrderStatus::Pending,
            is_new,
            plan_id: None,
            subscribe_token: None,
            created_at: now,
        };

        let order = OrderFulfillmentTransaction::new(order)
            .commit(self.repos.transactions.as_ref())
            .await?;
        info!(order_no = %order.order_no, user_id = session.id, amount = order.amount, "recharge order created");

        self.scheduler.schedule_close(&order.order_no).await;
        Ok(RechargeResponse {
            order_no: order.order_no,
        })
    }

    /// Tier discount, coupon, gift balance and fee, with the ceiling checked
    /// after every step that can raise the amount.
    fn price(
        &self,
        plan: &Plan,
        quantity: i64,
        coupon: Option<&Coupon>,
        user: &User,
        payment: &PaymentMethod,
    ) -> Result<(Quote, GiftDeduction)> {
        let multiplier = pricing::tiered_discount(&plan.discount, quantity);
        let mut quote = pricing::list_quote(plan.unit_price, quantity, multiplier)?;
        eligibility::check_amount_ceiling(quote.amount, "discount", &self.config)?;

        if let Some(coupon) = coupon {
            quote.apply_coupon(pricing::coupon_discount(quote.amount, &coupon.rule));
        }
        eligibility::check_amount_ceiling(quote.amount, "coupon", &self.config)?;

        let deduction = gift_ledger::deduct(user.gift_amount, quote.amount);
        quote.apply_gift(deduction.deducted);

        quote.apply_fee(pricing::fee(quote.amount, &payment.fee));
        eligibility::check_amount_ceiling(quote.amount, "fee", &self.config)?;

        debug_assert!(quote.reconciles());
        Ok((quote, deduction))
    }

    async fn load_user(&self, user_id: UserId) -> Result<User> {
        self.repos
            .users
            .find(user_id)
            .await
            .query_context("find user")?
            .ok_or_else(|| OrderError::InvalidAccess(format!("user {user_id} does not exist")))
    }

    async fn find_plan(&self, plan_id: PlanId) -> Result<Plan> {
        self.repos
            .plans
            .find(plan_id)
            .await
            .query_context("find subscribe plan")?
            .ok_or_else(|| {
                OrderError::query(
                    "find subscribe plan",
                    StoreError::NotFound(format!("subscribe plan {plan_id}")),
                )
            })
    }

    async fn find_payment(&self, payment_id: PaymentId) -> Result<PaymentMethod> {
        self.repos
            .payments
            .find(payment_id)
            .await
            .query_context("find payment method")?
            .ok_or_else(|| {
                OrderError::query(
                    "find payment method",
                    StoreError::NotFound(format!("payment method {payment_id}")),
                )
            })
    }

    async fn check_coupon(
        &self,
        user_id: UserId,
        plan_id: PlanId,
        code: Option<&str>,
    ) -> Result<Option<Coupon>> {
        let Some(code) = code else {
            return Ok(None);
        };
        let guard = CouponGuard::new(self.repos.coupons.as_ref(), self.repos.orders.as_ref());
        guard.check(user_id, plan_id, code).await.map(Some)
    }

    async fn is_new_customer(&self, user_id: UserId) -> Result<bool> {
        let paid_before = self
            .repos
            .orders
            .has_paid_orders(user_id)
            .await
            .query_context("find user order")?;
        Ok(!paid_before)
    }
}

fn non_empty(code: Option<String>) -> Option<String> {
    code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}
