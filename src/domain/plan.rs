use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

pub type PlanId = u64;

/// Inventory value meaning the plan never sells out.
pub const UNLIMITED_INVENTORY: i64 = -1;

/// One row of a quantity discount table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountTier {
    /// Minimum quantity for the tier to apply.
    pub quantity: i64,
    /// Percentage of the list price that is charged, in `(0, 100]`.
    pub discount: Decimal,
}

/// Validated quantity discount table, sorted by threshold ascending.
///
/// Plans persist the table as a JSON-encoded string. It is decoded once when
/// the plan is loaded; an undecodable or out-of-range table is replaced by an
/// empty one, which prices every quantity at the list price.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscountTable(Vec<DiscountTier>);

impl DiscountTable {
    pub fn from_tiers(mut tiers: Vec<DiscountTier>) -> Result<Self, String> {
        for tier in &tiers {
            if tier.quantity <= 0 {
                return Err(format!("tier threshold {} must be positive", tier.quantity));
            }
            if tier.discount <= Decimal::ZERO || tier.discount > Decimal::ONE_HUNDRED {
                return Err(format!(
                    "tier discount {} must be within (0, 100]",
                    tier.discount
                ));
            }
        }
        tiers.sort_by_key(|t| t.quantity);
        Ok(Self(tiers))
    }

    /// Decodes the stored representation, degrading to an empty table.
    pub fn parse(encoded: &str) -> Self {
        if encoded.trim().is_empty() {
            return Self::default();
        }
        let tiers = match serde_json::from_str::<Vec<DiscountTier>>(encoded) {
            Ok(tiers) => tiers,
            Err(e) => {
                warn!(error = %e, "malformed discount table, pricing without discount");
                return Self::default();
            }
        };
        Self::from_tiers(tiers).unwrap_or_else(|reason| {
            warn!(%reason, "invalid discount table, pricing without discount");
            Self::default()
        })
    }

    pub fn encode(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    pub fn tiers(&self) -> &[DiscountTier] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for DiscountTable {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for DiscountTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Option::<String>::deserialize(deserializer)?;
        Ok(encoded.map(|s| Self::parse(&s)).unwrap_or_default())
    }
}

/// A purchasable subscription tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    #[serde(default)]
    pub name: String,
    /// Price of one unit, in minor currency units.
    pub unit_price: i64,
    #[serde(default)]
    pub discount: DiscountTable,
    /// `-1` unlimited, `0` sold out, otherwise the remaining units.
    pub inventory: i64,
    /// Maximum concurrent subscriptions per user; `0` is unlimited.
    #[serde(default)]
    pub quota: i64,
    pub sell: bool,
}

impl Plan {
    pub fn has_finite_inventory(&self) -> bool {
        self.inventory >= 0
    }

    pub fn is_sold_out(&self) -> bool {
        self.inventory == 0
    }
}
