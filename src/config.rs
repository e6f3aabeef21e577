use crate::domain::order::{MAX_ORDER_AMOUNT, MAX_QUANTITY, MAX_RECHARGE_AMOUNT};
use std::time::Duration;

/// Default window after which an unpaid order is closed.
pub const CLOSE_ORDER_AFTER: Duration = Duration::from_secs(15 * 60);

/// Platform-wide knobs of the order flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfig {
    /// Refuse purchases from users that already hold an active subscription.
    pub single_subscription_mode: bool,
    pub max_quantity: i64,
    pub max_order_amount: i64,
    pub max_recharge_amount: i64,
    pub close_order_after: Duration,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            single_subscription_mode: false,
            max_quantity: MAX_QUANTITY,
            max_order_amount: MAX_ORDER_AMOUNT,
            max_recharge_amount: MAX_RECHARGE_AMOUNT,
            close_order_after: CLOSE_ORDER_AFTER,
        }
    }
}

impl OrderConfig {
    pub fn with_single_subscription_mode(mut self, enabled: bool) -> Self {
        self.single_subscription_mode = enabled;
        self
    }

    pub fn with_close_order_after(mut self, window: Duration) -> Self {
        self.close_order_after = window;
        self
    }
}
