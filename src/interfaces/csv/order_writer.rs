use crate::domain::order::{Order, OrderKind, OrderStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OrderRow<'a> {
    order_no: &'a str,
    user: u64,
    kind: OrderKind,
    /// Numeric operation code of `kind`.
    r#type: u8,
    status: OrderStatus,
    plan: Option<u64>,
    quantity: i64,
    price: i64,
    discount: i64,
    coupon: Option<&'a str>,
    coupon_discount: i64,
    gift_amount: i64,
    fee_amount: i64,
    amount: i64,
    method: &'a str,
    is_new: bool,
    parent_order_no: Option<&'a str>,
}

impl<'a> From<&'a Order> for OrderRow<'a> {
    fn from(order: &'a Order) -> Self {
        Self {
            order_no: &order.order_no,
            user: order.user_id,
            kind: order.kind,
            r#type: order.kind.code(),
            status: order.status,
            plan: order.plan_id,
            quantity: order.quantity,
            price: order.price,
            discount: order.discount,
            coupon: order.coupon.as_deref(),
            coupon_discount: order.coupon_discount,
            gift_amount: order.gift_amount,
            fee_amount: order.fee_amount,
            amount: order.amount,
            method: &order.method,
            is_new: order.is_new,
            parent_order_no: order.parent_order_no.as_deref(),
        }
    }
}

/// Writes orders as CSV, one row per order, with a header.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders<'a>(&mut self, orders: impl IntoIterator<Item = &'a Order>) -> Result<()> {
        for order in orders {
            self.writer.serialize(OrderRow::from(order))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
