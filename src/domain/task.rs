use crate::error::QueueError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task kind of the deferred "close unpaid order" job.
pub const CLOSE_ORDER_TASK: &str = "close-order";
/// Attempts a queue worker makes before giving a close task up.
pub const CLOSE_ORDER_MAX_RETRY: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseOrderPayload {
    #[serde(rename = "orderNo")]
    pub order_no: String,
}

/// A unit of deferred work handed to the task queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredTask {
    pub kind: String,
    pub payload: Vec<u8>,
    pub max_retry: u32,
}

impl DeferredTask {
    pub fn close_order(order_no: &str) -> Result<Self, QueueError> {
        let payload = serde_json::to_vec(&CloseOrderPayload {
            order_no: order_no.to_string(),
        })?;
        Ok(Self {
            kind: CLOSE_ORDER_TASK.to_string(),
            payload,
            max_retry: CLOSE_ORDER_MAX_RETRY,
        })
    }
}

/// Receipt returned by the queue on enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: String,
    pub kind: String,
    pub process_at: DateTime<Utc>,
}
