use super::plan::PlanId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type SubscriptionId = u64;

/// The part of a user account the order flow reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Platform credit usable as a pre-payment deduction, in minor units.
    #[serde(default)]
    pub gift_amount: i64,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self { id, gift_amount: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Finished,
    Expired,
    Deducted,
}

/// A plan subscription held by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    /// Order that created the subscription, if known.
    #[serde(default)]
    pub order_no: Option<String>,
    pub token: String,
    pub status: SubscriptionStatus,
    /// `None` never expires.
    #[serde(default)]
    pub expire_at: Option<DateTime<Utc>>,
}

impl UserSubscription {
    /// Whether the subscription counts towards quotas and single-subscription mode.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Pending | SubscriptionStatus::Active
        )
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_some_and(|at| at < now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GiftLogType {
    Increase,
    Decrease,
}

/// Append-only audit record of a gift balance movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftLogEntry {
    pub user_id: UserId,
    pub r#type: GiftLogType,
    pub order_no: String,
    pub amount: i64,
    /// Gift balance after the movement.
    pub balance: i64,
    pub remark: String,
    pub timestamp: DateTime<Utc>,
}
