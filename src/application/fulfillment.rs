use crate::application::gift_ledger::{self, GiftDeduction};
use crate::domain::order::Order;
use crate::domain::plan::{Plan, PlanId};
use crate::domain::ports::TransactionalStore;
use crate::domain::user::{GiftLogEntry, UserId};
use crate::domain::write_set::WriteSet;
use crate::error::{Result, StoreResultExt};
use chrono::{DateTime, Utc};
use tracing::error;

/// Runs `body` against a fresh [`WriteSet`] and commits it.
///
/// An error from `body` discards the staged writes. A failed commit has
/// written nothing and surfaces as `DatabaseInsertError` tagged with `context`.
pub async fn with_transaction<T, F>(
    store: &dyn TransactionalStore,
    context: &str,
    body: F,
) -> Result<T>
where
    F: FnOnce(&mut WriteSet) -> Result<T>,
{
    let mut writes = WriteSet::new();
    let value = body(&mut writes)?;
    store.commit(writes).await.insert_context(context)?;
    Ok(value)
}

struct GiftDebit {
    user_id: UserId,
    expected: i64,
    balance: i64,
    entry: GiftLogEntry,
}

/// The atomic write behind every new order: gift balance, gift ledger,
/// plan inventory, coupon usage and the order row.
pub struct OrderFulfillmentTransaction {
    order: Order,
    gift: Option<GiftDebit>,
    inventory_plan: Option<PlanId>,
}

impl OrderFulfillmentTransaction {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            gift: None,
            inventory_plan: None,
        }
    }

    /// Persists the deduction and its ledger entry. Zero deductions write nothing.
    pub fn with_gift_deduction(
        mut self,
        deduction: &GiftDeduction,
        remark: &str,
        now: DateTime<Utc>,
    ) -> Self {
        self.gift = gift_ledger::debit_entry(
            self.order.user_id,
            &self.order.order_no,
            deduction,
            remark,
            now,
        )
        .map(|entry| GiftDebit {
            user_id: self.order.user_id,
            expected: deduction.balance_before,
            balance: deduction.balance_after,
            entry,
        });
        self
    }

    /// Takes one unit of the plan's inventory, unless it is unlimited.
    pub fn consuming_inventory(mut self, plan: &Plan) -> Self {
        self.inventory_plan = plan.has_finite_inventory().then_some(plan.id);
        self
    }

    pub async fn commit(self, store: &dyn TransactionalStore) -> Result<Order> {
        let Self {
            order,
            gift,
            inventory_plan,
        } = self;

        let result = with_transaction(store, "insert order", |tx| {
            if let Some(debit) = gift {
                tx.set_gift_balance(debit.user_id, debit.expected, debit.balance);
                tx.append_gift_log(debit.entry);
            }
            if let Some(plan_id) = inventory_plan {
                tx.decrement_inventory(plan_id);
            }
            if let Some(code) = &order.coupon {
                tx.redeem_coupon(code);
            }
            tx.insert_order(order.clone());
            Ok(())
        })
        .await;

        if let Err(e) = result {
            error!(
                error = %e,
                order_no = %order.order_no,
                user_id = order.user_id,
                "database insert error"
            );
            return Err(e);
        }
        Ok(order)
    }
}
