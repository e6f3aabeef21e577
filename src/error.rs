use miette::Diagnostic;
use thiserror::Error;

pub type Result<T, E = OrderError> = std::result::Result<T, E>;

/// Failures raised by storage adapters.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    /// A commit-time precondition no longer held. Nothing was written.
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("internal store error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("task queue unavailable: {0}")]
    Unavailable(String),
    #[error("task payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Coarse classification of [`OrderError`], for callers that branch on the
/// kind of refusal rather than on its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidAccess,
    InvalidParams,
    DatabaseQueryError,
    DatabaseInsertError,
    PlanNotSellable,
    PlanOutOfStock,
    PlanQuotaExceeded,
    UserAlreadySubscribed,
    CouponNotFound,
    CouponExhausted,
    CouponNotApplicable,
    CouponUserLimitExceeded,
    OrderNotFound,
    InvalidTaskPayload,
    QueueError,
    Input,
}

#[derive(Error, Diagnostic, Debug)]
pub enum OrderError {
    #[error("invalid access: {0}")]
    #[diagnostic(code(order::invalid_access))]
    InvalidAccess(String),

    #[error("invalid params: {0}")]
    #[diagnostic(code(order::invalid_params))]
    InvalidParams(String),

    #[error("database query error: {context}: {source}")]
    #[diagnostic(code(order::database_query))]
    DatabaseQuery {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("database insert error: {context}: {source}")]
    #[diagnostic(code(order::database_insert))]
    DatabaseInsert {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("subscribe plan {0} is not for sale")]
    #[diagnostic(code(order::plan_not_sellable))]
    PlanNotSellable(u64),

    #[error("subscribe plan {0} is out of stock")]
    #[diagnostic(code(order::plan_out_of_stock))]
    PlanOutOfStock(u64),

    #[error("subscribe plan {plan_id} quota of {quota} reached")]
    #[diagnostic(code(order::plan_quota_exceeded))]
    PlanQuotaExceeded { plan_id: u64, quota: i64 },

    #[error("user {0} already holds a subscription")]
    #[diagnostic(
        code(order::user_already_subscribed),
        help("single subscription mode is enabled; renew the existing subscription instead")
    )]
    UserAlreadySubscribed(u64),

    #[error("coupon {0} not found")]
    #[diagnostic(code(order::coupon_not_found))]
    CouponNotFound(String),

    #[error("coupon {0} has no remaining uses")]
    #[diagnostic(code(order::coupon_exhausted))]
    CouponExhausted(String),

    #[error("coupon {code} does not apply to plan {plan_id}")]
    #[diagnostic(code(order::coupon_not_applicable))]
    CouponNotApplicable { code: String, plan_id: u64 },

    #[error("coupon {code} per-user limit of {limit} reached")]
    #[diagnostic(code(order::coupon_user_limit))]
    CouponUserLimitExceeded { code: String, limit: i64 },

    #[error("order {0} not found")]
    #[diagnostic(code(order::not_found))]
    OrderNotFound(String),

    #[error("invalid task payload: {0}")]
    #[diagnostic(code(order::invalid_task_payload))]
    InvalidTaskPayload(#[from] serde_json::Error),

    #[error("task queue error: {0}")]
    #[diagnostic(code(order::queue))]
    Queue(#[from] QueueError),

    #[error("CSV error: {0}")]
    #[diagnostic(code(order::csv))]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(order::io))]
    Io(#[from] std::io::Error),

    #[error("catalog error: {0}")]
    #[diagnostic(code(order::catalog))]
    Catalog(String),
}

impl OrderError {
    pub fn query(context: impl Into<String>, source: StoreError) -> Self {
        Self::DatabaseQuery {
            context: context.into(),
            source,
        }
    }

    pub fn insert(context: impl Into<String>, source: StoreError) -> Self {
        Self::DatabaseInsert {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAccess(_) => ErrorKind::InvalidAccess,
            Self::InvalidParams(_) => ErrorKind::InvalidParams,
            Self::DatabaseQuery { .. } => ErrorKind::DatabaseQueryError,
            Self::DatabaseInsert { .. } => ErrorKind::DatabaseInsertError,
            Self::PlanNotSellable(_) => ErrorKind::PlanNotSellable,
            Self::PlanOutOfStock(_) => ErrorKind::PlanOutOfStock,
            Self::PlanQuotaExceeded { .. } => ErrorKind::PlanQuotaExceeded,
            Self::UserAlreadySubscribed(_) => ErrorKind::UserAlreadySubscribed,
            Self::CouponNotFound(_) => ErrorKind::CouponNotFound,
            Self::CouponExhausted(_) => ErrorKind::CouponExhausted,
            Self::CouponNotApplicable { .. } => ErrorKind::CouponNotApplicable,
            Self::CouponUserLimitExceeded { .. } => ErrorKind::CouponUserLimitExceeded,
            Self::OrderNotFound(_) => ErrorKind::OrderNotFound,
            Self::InvalidTaskPayload(_) => ErrorKind::InvalidTaskPayload,
            Self::Queue(_) => ErrorKind::QueueError,
            Self::Csv(_) | Self::Io(_) | Self::Catalog(_) => ErrorKind::Input,
        }
    }
}

/// Attaches operation context to store failures.
pub trait StoreResultExt<T> {
    /// Wraps a read failure as `DatabaseQueryError`.
    fn query_context(self, context: impl Into<String>) -> Result<T>;
    /// Wraps a write failure as `DatabaseInsertError`.
    fn insert_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> StoreResultExt<T> for std::result::Result<T, StoreError> {
    fn query_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| OrderError::query(context, e))
    }

    fn insert_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| OrderError::insert(context, e))
    }
}
