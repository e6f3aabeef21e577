use crate::domain::user::{GiftLogEntry, GiftLogType, UserId};
use chrono::{DateTime, Utc};

pub const PURCHASE_DEDUCTION_REMARK: &str = "Purchase order deduction";
pub const RENEWAL_DEDUCTION_REMARK: &str = "Renewal order deduction";
pub const CANCELLATION_REFUND_REMARK: &str = "Order cancellation refund";

/// Outcome of applying a gift balance to a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiftDeduction {
    pub deducted: i64,
    pub remaining_due: i64,
    pub balance_before: i64,
    pub balance_after: i64,
}

/// Applies at most `balance` against `charge`.
///
/// The deduction never exceeds either input and the resulting balance is
/// never negative.
pub fn deduct(balance: i64, charge: i64) -> GiftDeduction {
    let available = balance.max(0);
    let due = charge.max(0);
    let deducted = available.min(due);
    GiftDeduction {
        deducted,
        remaining_due: due - deducted,
        balance_before: balance,
        balance_after: balance - deducted,
    }
}

/// Audit entry for a deduction, if anything was deducted.
pub fn debit_entry(
    user_id: UserId,
    order_no: &str,
    deduction: &GiftDeduction,
    remark: &str,
    now: DateTime<Utc>,
) -> Option<GiftLogEntry> {
    (deduction.deducted > 0).then(|| GiftLogEntry {
        user_id,
        r#type: GiftLogType::Decrease,
        order_no: order_no.to_string(),
        amount: deduction.deducted,
        balance: deduction.balance_after,
        remark: remark.to_string(),
        timestamp: now,
    })
}

/// The credit reversing a debit made for `order_no`.
pub fn credit_entry(
    user_id: UserId,
    order_no: &str,
    amount: i64,
    balance_after: i64,
    now: DateTime<Utc>,
) -> GiftLogEntry {
    GiftLogEntry {
        user_id,
        r#type: GiftLogType::Increase,
        order_no: order_no.to_string(),
        amount,
        balance: balance_after,
        remark: CANCELLATION_REFUND_REMARK.to_string(),
        timestamp: now,
    }
}
