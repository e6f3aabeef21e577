use super::order::{Order, OrderStatus};
use super::plan::PlanId;
use super::user::{GiftLogEntry, UserId};

/// A single staged mutation. Each carries the precondition the store checks
/// at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Sets a gift balance, provided it still equals `expected`.
    SetGiftBalance {
        user_id: UserId,
        expected: i64,
        balance: i64,
    },
    AppendGiftLog(GiftLogEntry),
    /// Takes one unit of a finite inventory; fails once it reached zero.
    DecrementInventory { plan_id: PlanId },
    /// Gives one unit back to a finite inventory. Unlimited or missing plans are left alone.
    RestoreInventory { plan_id: PlanId },
    /// Counts a redemption; fails once the coupon is exhausted.
    RedeemCoupon { code: String },
    ReleaseCoupon { code: String },
    /// Inserts an order; fails if the order number is taken.
    InsertOrder(Box<Order>),
    TransitionOrder {
        order_no: String,
        from: OrderStatus,
        to: OrderStatus,
    },
}

/// Writes staged by a transaction body, applied by
/// [`TransactionalStore::commit`](super::ports::TransactionalStore::commit)
/// all-or-nothing, in staging order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteSet {
    ops: Vec<WriteOp>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_gift_balance(&mut self, user_id: UserId, expected: i64, balance: i64) {
        self.ops.push(WriteOp::SetGiftBalance {
            user_id,
            expected,
            balance,
        });
    }

    pub fn append_gift_log(&mut self, entry: GiftLogEntry) {
        self.ops.push(WriteOp::AppendGiftLog(entry));
    }

    pub fn decrement_inventory(&mut self, plan_id: PlanId) {
        self.ops.push(WriteOp::DecrementInventory { plan_id });
    }

    pub fn restore_inventory(&mut self, plan_id: PlanId) {
        self.ops.push(WriteOp::RestoreInventory { plan_id });
    }

    pub fn redeem_coupon(&mut self, code: &str) {
        self.ops.push(WriteOp::RedeemCoupon {
            code: code.to_string(),
        });
    }

    pub fn release_coupon(&mut self, code: &str) {
        self.ops.push(WriteOp::ReleaseCoupon {
            code: code.to_string(),
        });
    }

    pub fn insert_order(&mut self, order: Order) {
        self.ops.push(WriteOp::InsertOrder(Box::new(order)));
    }

    pub fn transition_order(&mut self, order_no: &str, from: OrderStatus, to: OrderStatus) {
        self.ops.push(WriteOp::TransitionOrder {
            order_no: order_no.to_string(),
            from,
            to,
        });
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
