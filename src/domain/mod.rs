//! Domain layer: order, plan, coupon and user records, plus the ports the
//! application layer drives.

pub mod coupon;
pub mod order;
pub mod payment;
pub mod plan;
pub mod ports;
pub mod task;
pub mod user;
pub mod write_set;
