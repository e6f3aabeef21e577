//! Pricing engine: tier discounts, coupon reductions and payment fees.
//!
//! Everything here is pure. Amounts are integer minor units; fractional
//! results are floored.

use crate::domain::coupon::CouponRule;
use crate::domain::payment::FeeRule;
use crate::domain::plan::DiscountTable;
use crate::error::{OrderError, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Running price breakdown of an order.
///
/// `amount` always equals
/// `list_price - discount - coupon_discount - gift_deduction + fee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quote {
    pub list_price: i64,
    pub discount: i64,
    pub coupon_discount: i64,
    pub gift_deduction: i64,
    pub fee: i64,
    pub amount: i64,
}

impl Quote {
    /// A quote for a flat amount with nothing taken off.
    pub fn flat(amount: i64) -> Self {
        Self {
            list_price: amount,
            amount,
            ..Self::default()
        }
    }

    pub fn apply_coupon(&mut self, discount: i64) {
        self.coupon_discount += discount;
        self.amount -= discount;
    }

    pub fn apply_gift(&mut self, deduction: i64) {
        self.gift_deduction += deduction;
        self.amount -= deduction;
    }

    pub fn apply_fee(&mut self, fee: i64) {
        self.fee += fee;
        self.amount += fee;
    }

    pub fn reconciles(&self) -> bool {
        self.list_price - self.discount - self.coupon_discount - self.gift_deduction + self.fee
            == self.amount
    }
}

/// Multiplier of the tier with the greatest threshold not above `quantity`,
/// or `1` when no tier matches.
pub fn tiered_discount(table: &DiscountTable, quantity: i64) -> Decimal {
    table
        .tiers()
        .iter()
        .rev()
        .find(|tier| tier.quantity <= quantity)
        .map(|tier| tier.discount / Decimal::ONE_HUNDRED)
        .unwrap_or(Decimal::ONE)
}

/// Prices `quantity` units and applies the tier multiplier.
pub fn list_quote(unit_price: i64, quantity: i64, multiplier: Decimal) -> Result<Quote> {
    let list_price = unit_price
        .checked_mul(quantity)
        .filter(|price| *price >= 0)
        .ok_or_else(|| {
            OrderError::InvalidParams(format!(
                "price of {quantity} units at {unit_price} is out of range"
            ))
        })?;
    let base = floor_mul(list_price, multiplier)
        .filter(|base| (0..=list_price).contains(base))
        .unwrap_or(list_price);
    Ok(Quote {
        list_price,
        discount: list_price - base,
        amount: base,
        ..Quote::default()
    })
}

/// Reduction a coupon grants on `amount`; never negative, never above `amount`.
pub fn coupon_discount(amount: i64, rule: &CouponRule) -> i64 {
    if amount <= 0 {
        return 0;
    }
    let discount = match rule {
        CouponRule::Percentage {
            percent,
            max_discount,
        } => {
            let raw = floor_mul(amount, *percent / Decimal::ONE_HUNDRED).unwrap_or(0);
            match max_discount {
                Some(cap) if *cap > 0 => raw.min(*cap),
                _ => raw,
            }
        }
        CouponRule::Fixed { amount: value } => (*value).min(amount),
    };
    discount.clamp(0, amount)
}

/// Surcharge for collecting `amount` through a payment method. Zero when
/// nothing is left to collect.
pub fn fee(amount: i64, rule: &FeeRule) -> i64 {
    if amount <= 0 {
        return 0;
    }
    let fee = match rule {
        FeeRule::None => 0,
        FeeRule::Percent { percent } => percent_of(amount, *percent),
        FeeRule::Fixed { amount: fixed } => *fixed,
        FeeRule::PercentPlusFixed {
            percent,
            amount: fixed,
        } => percent_of(amount, *percent).saturating_add(*fixed),
    };
    fee.max(0)
}

fn percent_of(amount: i64, percent: Decimal) -> i64 {
    floor_mul(amount, percent / Decimal::ONE_HUNDRED).unwrap_or(0)
}

fn floor_mul(amount: i64, factor: Decimal) -> Option<i64> {
    Decimal::from(amount)
        .checked_mul(factor)
        .and_then(|v| v.floor().to_i64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::{DiscountTable, DiscountTier};
    use rust_decimal_macros::dec;

    fn table() -> DiscountTable {
        DiscountTable::from_tiers(vec![
            DiscountTier {
                quantity: 3,
                discount: dec!(95),
            },
            DiscountTier {
                quantity: 6,
                discount: dec!(90),
            },
            DiscountTier {
                quantity: 12,
                discount: dec!(80),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_tier_selection() {
        let table = table();
        assert_eq!(tiered_discount(&table, 1), Decimal::ONE);
        assert_eq!(tiered_discount(&table, 3), dec!(0.95));
        assert_eq!(tiered_discount(&table, 11), dec!(0.90));
        assert_eq!(tiered_discount(&table, 500), dec!(0.80));
        assert_eq!(tiered_discount(&DiscountTable::default(), 500), Decimal::ONE);
    }

    #[test]
    fn test_list_quote_floors_discounted_amount() {
        let quote = list_quote(333, 3, dec!(0.95)).unwrap();
        assert_eq!(quote.list_price, 999);
        // 999 * 0.95 = 949.05
        assert_eq!(quote.amount, 949);
        assert_eq!(quote.discount, 50);
        assert!(quote.reconciles());
    }

    #[test]
    fn test_list_quote_overflow_is_invalid_params() {
        let err = list_quote(i64::MAX, 2, Decimal::ONE).unwrap_err();
        assert!(matches!(err, OrderError::InvalidParams(_)));
        assert!(list_quote(-5, 2, Decimal::ONE).is_err());
    }

    #[test]
    fn test_percentage_coupon_is_capped() {
        let rule = CouponRule::Percentage {
            percent: dec!(10),
            max_discount: Some(150),
        };
        assert_eq!(coupon_discount(1_000, &rule), 100);
        assert_eq!(coupon_discount(5_000, &rule), 150);

        let uncapped = CouponRule::Percentage {
            percent: dec!(15),
            max_discount: None,
        };
        assert_eq!(coupon_discount(999, &uncapped), 149);
    }

    #[test]
    fn test_coupon_never_exceeds_amount() {
        assert_eq!(coupon_discount(300, &CouponRule::Fixed { amount: 500 }), 300);
        let greedy = CouponRule::Percentage {
            percent: dec!(250),
            max_discount: None,
        };
        assert_eq!(coupon_discount(300, &greedy), 300);
        assert_eq!(coupon_discount(0, &CouponRule::Fixed { amount: 500 }), 0);
        assert_eq!(coupon_discount(300, &CouponRule::Fixed { amount: -5 }), 0);
    }

    #[test]
    fn test_fee_rules() {
        assert_eq!(fee(1_000, &FeeRule::None), 0);
        assert_eq!(
            fee(
                1_000,
                &FeeRule::Percent {
                    percent: dec!(2.5)
                }
            ),
            25
        );
        assert_eq!(fee(1_000, &FeeRule::Fixed { amount: 30 }), 30);
        assert_eq!(
            fee(
                999,
                &FeeRule::PercentPlusFixed {
                    percent: dec!(3),
                    amount: 10
                }
            ),
            39
        );
    }

    #[test]
    fn test_fee_skipped_on_zero_amount() {
        assert_eq!(fee(0, &FeeRule::Fixed { amount: 30 }), 0);
        assert_eq!(
            fee(
                1_000,
                &FeeRule::Percent {
                    percent: dec!(-5)
                }
            ),
            0
        );
    }

    #[test]
    fn test_quote_reconciles_through_every_step() {
        let mut quote = list_quote(1_000, 6, dec!(0.9)).unwrap();
        quote.apply_coupon(200);
        quote.apply_gift(1_000);
        quote.apply_fee(50);
        assert_eq!(quote.amount, 6_000 - 600 - 200 - 1_000 + 50);
        assert!(quote.reconciles());
    }
}
