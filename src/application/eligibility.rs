//! Eligibility rules checked before an order is priced and written.
//!
//! Each rule fails fast with the error kind of the first violation. Checks
//! that read the store run outside the fulfillment transaction; the store
//! re-validates the contended counters at commit.

use crate::config::OrderConfig;
use crate::domain::coupon::Coupon;
use crate::domain::plan::{Plan, PlanId};
use crate::domain::ports::{CouponStore, OrderStore};
use crate::domain::user::{User, UserId, UserSubscription};
use crate::error::{OrderError, Result, StoreResultExt};
use tracing::{debug, error};

/// Resolves the session user, refusing anonymous requests.
pub fn require_user(user: Option<&User>) -> Result<&User> {
    user.ok_or_else(|| {
        error!("current user is not found in context");
        OrderError::InvalidAccess("current user is not found".to_string())
    })
}

/// Clamps non-positive quantities to `1` and rejects quantities above the cap.
pub fn normalize_quantity(quantity: i64, config: &OrderConfig) -> Result<i64> {
    if quantity <= 0 {
        debug!(quantity, "quantity is less than or equal to 0, setting to 1");
        return Ok(1);
    }
    if quantity > config.max_quantity {
        error!(quantity, max = config.max_quantity, "quantity exceeds maximum limit");
        return Err(OrderError::InvalidParams(format!(
            "quantity exceeds maximum limit of {}",
            config.max_quantity
        )));
    }
    Ok(quantity)
}

pub fn check_plan_sellable(plan: &Plan) -> Result<()> {
    if plan.sell {
        Ok(())
    } else {
        Err(OrderError::PlanNotSellable(plan.id))
    }
}

pub fn check_inventory(plan: &Plan) -> Result<()> {
    if plan.is_sold_out() {
        Err(OrderError::PlanOutOfStock(plan.id))
    } else {
        Ok(())
    }
}

/// Rejects once the user holds `quota` active subscriptions to the plan.
pub fn check_quota(plan: &Plan, subscriptions: &[UserSubscription]) -> Result<()> {
    if plan.quota <= 0 {
        return Ok(());
    }
    let held = subscriptions
        .iter()
        .filter(|s| s.plan_id == plan.id && s.is_active())
        .count() as i64;
    if held >= plan.quota {
        return Err(OrderError::PlanQuotaExceeded {
            plan_id: plan.id,
            quota: plan.quota,
        });
    }
    Ok(())
}

pub fn check_single_subscription(
    user_id: UserId,
    subscriptions: &[UserSubscription],
    config: &OrderConfig,
) -> Result<()> {
    if config.single_subscription_mode && subscriptions.iter().any(|s| s.is_active()) {
        return Err(OrderError::UserAlreadySubscribed(user_id));
    }
    Ok(())
}

pub fn check_subscription_owner(user: &User, subscription: &UserSubscription) -> Result<()> {
    if subscription.user_id != user.id {
        error!(
            user_id = user.id,
            subscription_id = subscription.id,
            "user subscription belongs to another user"
        );
        return Err(OrderError::InvalidAccess(format!(
            "user subscription {} does not belong to the current user",
            subscription.id
        )));
    }
    Ok(())
}

/// Keeps a running amount within `[0, max_order_amount]`. `stage` names the
/// pricing step for the log.
pub fn check_amount_ceiling(amount: i64, stage: &str, config: &OrderConfig) -> Result<()> {
    if amount < 0 || amount > config.max_order_amount {
        error!(
            amount,
            max = config.max_order_amount,
            stage,
            "order amount exceeds maximum limit"
        );
        return Err(OrderError::InvalidParams(
            "order amount exceeds maximum limit".to_string(),
        ));
    }
    Ok(())
}

pub fn check_recharge_amount(amount: i64, config: &OrderConfig) -> Result<()> {
    if amount <= 0 {
        return Err(OrderError::InvalidParams(
            "recharge amount must be greater than 0".to_string(),
        ));
    }
    if amount > config.max_recharge_amount {
        error!(
            amount,
            max = config.max_recharge_amount,
            "recharge amount exceeds maximum limit"
        );
        return Err(OrderError::InvalidParams(
            "recharge amount exceeds maximum limit".to_string(),
        ));
    }
    Ok(())
}

/// Coupon rules, which need the coupon and order tables.
pub struct CouponGuard<'a> {
    coupons: &'a dyn CouponStore,
    orders: &'a dyn OrderStore,
}

impl<'a> CouponGuard<'a> {
    pub fn new(coupons: &'a dyn CouponStore, orders: &'a dyn OrderStore) -> Self {
        Self { coupons, orders }
    }

    /// Returns the coupon if `user_id` may redeem it on `plan_id`.
    ///
    /// Checks, in order: existence, remaining global uses, plan allow-list,
    /// and the user's past redemptions counted from the order table.
    pub async fn check(&self, user_id: UserId, plan_id: PlanId, code: &str) -> Result<Coupon> {
        let coupon = self
            .coupons
            .find_by_code(code)
            .await
            .query_context("find coupon")?
            .ok_or_else(|| OrderError::CouponNotFound(code.to_string()))?;

        if !coupon.has_remaining_uses() {
            return Err(OrderError::CouponExhausted(code.to_string()));
        }
        if !coupon.applies_to(plan_id) {
            return Err(OrderError::CouponNotApplicable {
                code: code.to_string(),
                plan_id,
            });
        }

        let redeemed = self
            .orders
            .count_by_coupon(user_id, code)
            .await
            .query_context("count coupon redemptions")?;
        if !coupon.allows_user_redemption(redeemed) {
            return Err(OrderError::CouponUserLimitExceeded {
                code: code.to_string(),
                limit: coupon.user_limit,
            });
        }
        Ok(coupon)
    }
}
