//! Application layer orchestrating order creation and expiry.
//!
//! [`workflow::OrderWorkflow`] is the entry point for purchases, renewals and
//! recharges. It composes the eligibility checks, the pricing pipeline and
//! the fulfillment transaction, then hands the new order to the expiry
//! scheduler.

pub mod eligibility;
pub mod expiry;
pub mod fulfillment;
pub mod gift_ledger;
pub mod pricing;
pub mod workflow;
