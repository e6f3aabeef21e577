use super::plan::PlanId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a coupon reduces the amount it is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponRule {
    /// `percent` of the amount, floored, optionally capped at `max_discount`.
    Percentage {
        percent: Decimal,
        #[serde(default)]
        max_discount: Option<i64>,
    },
    /// A flat reduction, never more than the amount.
    Fixed { amount: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub rule: CouponRule,
    /// Total redemptions allowed; `0` is unlimited.
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub used_count: i64,
    /// Redemptions allowed per user; `0` refuses every redemption.
    #[serde(default)]
    pub user_limit: i64,
    /// Plans the coupon applies to; empty applies to every plan.
    #[serde(default)]
    pub plans: Vec<PlanId>,
}

impl Coupon {
    pub fn has_remaining_uses(&self) -> bool {
        self.count == 0 || self.used_count < self.count
    }

    pub fn applies_to(&self, plan_id: PlanId) -> bool {
        self.plans.is_empty() || self.plans.contains(&plan_id)
    }

    pub fn allows_user_redemption(&self, redeemed: i64) -> bool {
        redeemed < self.user_limit
    }
}
