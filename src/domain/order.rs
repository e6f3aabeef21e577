use super::payment::PaymentId;
use super::plan::PlanId;
use super::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ceiling for any order amount at any stage of pricing (`i32::MAX`).
pub const MAX_ORDER_AMOUNT: i64 = 2_147_483_647;
/// Ceiling for a single recharge, kept below [`MAX_ORDER_AMOUNT`] so the fee fits.
pub const MAX_RECHARGE_AMOUNT: i64 = 2_000_000_000;
pub const MAX_QUANTITY: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Purchase,
    Renewal,
    Recharge,
}

impl OrderKind {
    /// Numeric operation code recorded by the platform.
    pub fn code(self) -> u8 {
        match self {
            Self::Purchase => 1,
            Self::Renewal => 2,
            Self::Recharge => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self == Self::Pending && next != Self::Pending
    }
}

/// An order record. Amounts are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_no: String,
    pub user_id: UserId,
    /// Order that created the subscription being renewed.
    #[serde(default)]
    pub parent_order_no: Option<String>,
    pub kind: OrderKind,
    pub quantity: i64,
    /// List price before any reduction.
    pub price: i64,
    pub discount: i64,
    #[serde(default)]
    pub coupon: Option<String>,
    pub coupon_discount: i64,
    pub gift_amount: i64,
    pub fee_amount: i64,
    /// Final payable amount.
    pub amount: i64,
    pub payment_id: PaymentId,
    pub method: String,
    pub status: OrderStatus,
    pub is_new: bool,
    #[serde(default)]
    pub plan_id: Option<PlanId>,
    #[serde(default)]
    pub subscribe_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Checks `amount = price - discount - coupon - gift + fee`.
    pub fn reconciles(&self) -> bool {
        self.price - self.discount - self.coupon_discount - self.gift_amount + self.fee_amount
            == self.amount
    }
}

/// Generates an order number: UTC timestamp followed by 12 random hex digits.
pub fn generate_order_no(now: DateTime<Utc>) -> String {
    let entropy = Uuid::new_v4().simple().to_string();
    format!("{}{}", now.format("%Y%m%d%H%M%S"), &entropy[..12])
}
