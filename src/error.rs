use crate::database::DatabaseError;
use crate::models::{OrderId, SkuId};
use sqlx::Error as SqlxError;
use thiserror::Error;

/// Postgres SQLSTATE codes the storage layer reacts to
mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const DEADLOCK_DETECTED: &str = "40P01";
}

/// Storage-layer error types
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Row locks could not be granted within the configured wait
    #[error("Lock wait timed out")]
    LockTimeout,

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<SqlxError> for StoreError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => StoreError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    Some(sqlstate::LOCK_NOT_AVAILABLE) | Some(sqlstate::DEADLOCK_DETECTED) => {
                        StoreError::LockTimeout
                    }
                    Some(sqlstate::UNIQUE_VIOLATION) => {
                        StoreError::Duplicate(db_err.message().to_string())
                    }
                    Some(sqlstate::FOREIGN_KEY_VIOLATION) | Some(sqlstate::CHECK_VIOLATION) => {
                        StoreError::ConstraintViolation(db_err.message().to_string())
                    }
                    _ => StoreError::Query(err),
                }
            }
            _ => StoreError::Query(err),
        }
    }
}

/// Failures of a checkout attempt and of the order operations around it
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// The cart has no lines to check out
    #[error("Cart is empty")]
    EmptyCart,

    /// Locked stock does not cover the requested quantity, or the stock row is gone
    #[error("Insufficient stock for SKU {sku_id}")]
    InsufficientStock { sku_id: SkuId },

    /// Transient contention; the whole attempt may be retried
    #[error("Timed out waiting for stock locks")]
    LockTimeout,

    #[error("Not found: {0}")]
    NotFound(String),

    /// A cart line asked for a non-positive quantity
    #[error("Invalid quantity {quantity} for SKU {sku_id}")]
    InvalidQuantity { sku_id: SkuId, quantity: i32 },

    #[error("Order {0} belongs to another user")]
    Forbidden(OrderId),

    #[error("Order {order_id} is not pending (status: {status})")]
    OrderNotPending { order_id: OrderId, status: String },

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    /// Anything unexpected; the enclosing transaction was aborted
    #[error("Transaction aborted: {0}")]
    Storage(StoreError),
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout => CheckoutError::LockTimeout,
            StoreError::NotFound(msg) => CheckoutError::NotFound(msg),
            other => CheckoutError::Storage(other),
        }
    }
}

impl From<SqlxError> for CheckoutError {
    fn from(err: SqlxError) -> Self {
        StoreError::from(err).into()
    }
}

impl CheckoutError {
    /// HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            CheckoutError::EmptyCart
            | CheckoutError::InsufficientStock { .. }
            | CheckoutError::OrderNotPending { .. } => 409,
            CheckoutError::NotFound(_) => 404,
            CheckoutError::Forbidden(_) => 403,
            CheckoutError::InvalidQuantity { .. } => 422,
            CheckoutError::PaymentDeclined(_) => 402,
            CheckoutError::LockTimeout => 503,
            CheckoutError::PaymentGateway(_) => 502,
            CheckoutError::Storage(_) => 500,
        }
    }

    /// Whether retrying the whole attempt from scratch can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckoutError::LockTimeout)
    }

    /// Stable machine-readable code for clients
    pub fn error_code(&self) -> &'static str {
        match self {
            CheckoutError::EmptyCart => "EMPTY_CART",
            CheckoutError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CheckoutError::LockTimeout => "LOCK_TIMEOUT",
            CheckoutError::NotFound(_) => "NOT_FOUND",
            CheckoutError::InvalidQuantity { .. } => "INVALID_QUANTITY",
            CheckoutError::Forbidden(_) => "FORBIDDEN",
            CheckoutError::OrderNotPending { .. } => "ORDER_NOT_PENDING",
            CheckoutError::PaymentDeclined(_) => "PAYMENT_DECLINED",
            CheckoutError::PaymentGateway(_) => "PAYMENT_UNAVAILABLE",
            CheckoutError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show a client. Never carries SQL state or lock detail.
    pub fn public_message(&self) -> String {
        match self {
            CheckoutError::EmptyCart => "Your cart is empty.".to_string(),
            CheckoutError::InsufficientStock { sku_id } => format!(
                "Not enough stock for item {}. Please refresh your cart.",
                sku_id
            ),
            CheckoutError::LockTimeout => {
                "The store is busy right now. Please try again.".to_string()
            }
            CheckoutError::NotFound(_) => "The requested resource was not found.".to_string(),
            CheckoutError::InvalidQuantity { sku_id, .. } => {
                format!("Item {} has an invalid quantity.", sku_id)
            }
            CheckoutError::Forbidden(_) => "You cannot access this order.".to_string(),
            CheckoutError::OrderNotPending { status, .. } => {
                format!("This order can no longer be paid (status: {}).", status)
            }
            CheckoutError::PaymentDeclined(_) => "The payment was declined.".to_string(),
            CheckoutError::PaymentGateway(_) => {
                "The payment service is unavailable. Please try again later.".to_string()
            }
            CheckoutError::Storage(_) => "The order could not be processed.".to_string(),
        }
    }
}

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a database connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, AppError::Database(DatabaseError::PoolCreation(_)))
    }
}
