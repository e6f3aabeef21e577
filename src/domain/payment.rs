use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type PaymentId = u64;

/// Surcharge a payment method adds on top of the amount due.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FeeRule {
    #[default]
    None,
    Percent {
        percent: Decimal,
    },
    Fixed {
        amount: i64,
    },
    PercentPlusFixed {
        percent: Decimal,
        amount: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentId,
    pub platform: String,
    #[serde(default)]
    pub fee: FeeRule,
}
