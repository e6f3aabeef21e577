use crate::domain::coupon::Coupon;
use crate::domain::payment::PaymentMethod;
use crate::domain::plan::Plan;
use crate::domain::ports::Repositories;
use crate::domain::user::{User, UserSubscription};
use crate::error::{OrderError, Result, StoreResultExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use tracing::info;

/// Seed data loaded into a store before requests are replayed.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub plans: Vec<Plan>,
    #[serde(default)]
    pub coupons: Vec<Coupon>,
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub subscriptions: Vec<UserSubscription>,
}

impl Catalog {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        let catalog: Catalog = serde_json::from_reader(source)
            .map_err(|e| OrderError::Catalog(format!("invalid catalog: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        if let Some(dup) = self.plans.iter().find(|p| !seen.insert(p.id)) {
            return Err(OrderError::Catalog(format!("duplicate plan id {}", dup.id)));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.coupons.iter().find(|c| !seen.insert(c.code.as_str())) {
            return Err(OrderError::Catalog(format!("duplicate coupon {}", dup.code)));
        }
        let users: HashSet<_> = self.users.iter().map(|u| u.id).collect();
        if let Some(orphan) = self.subscriptions.iter().find(|s| !users.contains(&s.user_id)) {
            return Err(OrderError::Catalog(format!(
                "subscription {} belongs to unknown user {}",
                orphan.id, orphan.user_id
            )));
        }
        Ok(())
    }

    /// Writes every record through the repositories.
    pub async fn seed(self, repos: &Repositories) -> Result<()> {
        let counts = (
            self.plans.len(),
            self.coupons.len(),
            self.payment_methods.len(),
            self.users.len(),
            self.subscriptions.len(),
        );
        for plan in self.plans {
            repos.plans.store(plan).await.insert_context("seed plan")?;
        }
        for coupon in self.coupons {
            repos.coupons.store(coupon).await.insert_context("seed coupon")?;
        }
        for method in self.payment_methods {
            repos
                .payments
                .store(method)
                .await
                .insert_context("seed payment method")?;
        }
        for user in self.users {
            repos.users.store(user).await.insert_context("seed user")?;
        }
        for subscription in self.subscriptions {
            repos
                .users
                .store_subscription(subscription)
                .await
                .insert_context("seed user subscription")?;
        }
        info!(
            plans = counts.0,
            coupons = counts.1,
            payment_methods = counts.2,
            users = counts.3,
            subscriptions = counts.4,
            "catalog seeded"
        );
        Ok(())
    }
}
