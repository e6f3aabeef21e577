//! Commit-time validation shared by every [`TransactionalStore`] backend.
//!
//! A backend exposes its records through [`Staging`]; [`apply`] replays a
//! [`WriteSet`] against it, checking each precondition on the way. Backends
//! stage the touched records in an overlay and only publish it when `apply` succeeds.
//!
//! [`TransactionalStore`]: crate::domain::ports::TransactionalStore

use crate::domain::coupon::Coupon;
use crate::domain::order::Order;
use crate::domain::plan::{Plan, PlanId};
use crate::domain::user::{GiftLogEntry, User, UserId};
use crate::domain::write_set::{WriteOp, WriteSet};
use crate::error::StoreError;

pub(crate) trait Staging {
    fn user(&mut self, user_id: UserId) -> Result<Option<&mut User>, StoreError>;
    fn plan(&mut self, plan_id: PlanId) -> Result<Option<&mut Plan>, StoreError>;
    fn coupon(&mut self, code: &str) -> Result<Option<&mut Coupon>, StoreError>;
    fn order(&mut self, order_no: &str) -> Result<Option<&mut Order>, StoreError>;
    /// Inserts a new order; an existing order number is a conflict.
    fn insert_order(&mut self, order: Order) -> Result<(), StoreError>;
    fn append_gift_log(&mut self, entry: GiftLogEntry) -> Result<(), StoreError>;
}

pub(crate) fn apply(staging: &mut impl Staging, writes: WriteSet) -> Result<(), StoreError> {
    for op in writes.into_ops() {
        apply_op(staging, op)?;
    }
    Ok(())
}

fn apply_op(staging: &mut impl Staging, op: WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::SetGiftBalance {
            user_id,
            expected,
            balance,
        } => {
            let user = staging
                .user(user_id)?
                .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
            if user.gift_amount != expected {
                return Err(StoreError::Conflict(format!(
                    "gift balance of user {user_id} is {}, expected {expected}",
                    user.gift_amount
                )));
            }
            if balance < 0 {
                return Err(StoreError::Conflict(format!(
                    "gift balance of user {user_id} would become {balance}"
                )));
            }
            user.gift_amount = balance;
        }
        WriteOp::AppendGiftLog(entry) => staging.append_gift_log(entry)?,
        WriteOp::DecrementInventory { plan_id } => {
            let plan = staging
                .plan(plan_id)?
                .ok_or_else(|| StoreError::NotFound(format!("subscribe plan {plan_id}")))?;
            if plan.has_finite_inventory() {
                if plan.is_sold_out() {
                    return Err(StoreError::Conflict(format!(
                        "subscribe plan {plan_id} is out of stock"
                    )));
                }
                plan.inventory -= 1;
            }
        }
        WriteOp::RestoreInventory { plan_id } => {
            if let Some(plan) = staging.plan(plan_id)?
                && plan.has_finite_inventory()
            {
                plan.inventory += 1;
            }
        }
        WriteOp::RedeemCoupon { code } => {
            let coupon = staging
                .coupon(&code)?
                .ok_or_else(|| StoreError::NotFound(format!("coupon {code}")))?;
            if !coupon.has_remaining_uses() {
                return Err(StoreError::Conflict(format!("coupon {code} is exhausted")));
            }
            coupon.used_count += 1;
        }
        WriteOp::ReleaseCoupon { code } => {
            if let Some(coupon) = staging.coupon(&code)?
                && coupon.used_count > 0
            {
                coupon.used_count -= 1;
            }
        }
        WriteOp::InsertOrder(order) => staging.insert_order(*order)?,
        WriteOp::TransitionOrder { order_no, from, to } => {
            let order = staging
                .order(&order_no)?
                .ok_or_else(|| StoreError::NotFound(format!("order {order_no}")))?;
            if order.status != from || !from.can_transition_to(to) {
                return Err(StoreError::Conflict(format!(
                    "order {order_no} is {:?}, cannot move from {from:?} to {to:?}",
                    order.status
                )));
            }
            order.status = to;
        }
    }
    Ok(())
}
