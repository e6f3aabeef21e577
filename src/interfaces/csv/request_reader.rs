use crate::application::workflow::{
    PurchaseRequest, RechargeRequest, RenewalRequest, WorkflowRequest,
};
use crate::domain::payment::PaymentId;
use crate::domain::user::UserId;
use crate::error::{OrderError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Purchase,
    Renewal,
    Recharge,
}

/// One row of a request file.
///
/// `target` is the plan id for purchases and the user subscription id for
/// renewals; recharges ignore it and read `amount` instead.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestRecord {
    pub kind: RequestKind,
    pub user: UserId,
    pub target: Option<u64>,
    pub quantity: Option<i64>,
    pub coupon: Option<String>,
    pub payment: PaymentId,
    pub amount: Option<i64>,
}

impl RequestRecord {
    /// Splits the row into the session user and the workflow request.
    pub fn into_request(self) -> Result<(UserId, WorkflowRequest)> {
        let request = match self.kind {
            RequestKind::Purchase => WorkflowRequest::Purchase(PurchaseRequest {
                plan_id: self.target.ok_or_else(|| missing("target", "purchase"))?,
                quantity: self.quantity.unwrap_or_default(),
                coupon: self.coupon,
                payment_id: self.payment,
            }),
            RequestKind::Renewal => WorkflowRequest::Renewal(RenewalRequest {
                user_subscription_id: self.target.ok_or_else(|| missing("target", "renewal"))?,
                quantity: self.quantity.unwrap_or_default(),
                coupon: self.coupon,
                payment_id: self.payment,
            }),
            RequestKind::Recharge => WorkflowRequest::Recharge(RechargeRequest {
                amount: self.amount.ok_or_else(|| missing("amount", "recharge"))?,
                payment_id: self.payment,
            }),
        };
        Ok((self.user, request))
    }
}

fn missing(column: &str, kind: &str) -> OrderError {
    OrderError::InvalidParams(format!("{kind} request is missing `{column}`"))
}

/// Reads order requests from a CSV source.
///
/// Whitespace is trimmed and rows may omit trailing columns.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes the rows.
    pub fn requests(self) -> impl Iterator<Item = Result<RequestRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(OrderError::from))
    }
}
