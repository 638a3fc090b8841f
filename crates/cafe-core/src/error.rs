//! # Error Types
//!
//! Domain-specific error types for cafe-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  cafe-core errors (this file)                                          │
//! │  ├── CoreError        - Lifecycle / billing rule violations            │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  cafe-db errors (separate crate)                                       │
//! │  └── DbError          - Document store failures                        │
//! │                                                                         │
//! │  cafe-sync errors (separate crate)                                     │
//! │  └── SyncError        - Conflicts, outages, rejected mutations         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every rejection leaves the order exactly as it was. Operations validate
//! first and mutate last.

use thiserror::Error;

use crate::types::{BatchStatus, OrderStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Order lifecycle and billing rule violations.
///
/// All of these are local, synchronous and non-fatal. The caller decides
/// whether to retry or to surface the message to a human.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A batch was asked to move backward, or to the status it already has.
    ///
    /// ## When This Occurs
    /// - Two cashiers race on the same batch and the slower one lands second
    /// - A stale screen offers "Preparing" for a batch already `Ready`
    ///
    /// ## User Workflow
    /// ```text
    /// Batch is Done
    ///      │
    ///      ▼
    /// advance_batch(→ Preparing)
    ///      │
    ///      ▼
    /// InvalidTransition { from: Done, to: Preparing }
    ///      │
    ///      ▼
    /// Batch stays Done
    /// ```
    #[error("Batch {batch_id} cannot move from {from} to {to}")]
    InvalidTransition {
        batch_id: String,
        from: BatchStatus,
        to: BatchStatus,
    },

    /// The order is `PaymentDone` or `Cancelled` and accepts no more changes.
    #[error("Order {order_id} is {status} and closed to changes")]
    OrderClosed { order_id: String, status: OrderStatus },

    /// Cancellation requested after the kitchen finished something, or after
    /// payment.
    #[error("Order {order_id} cannot be cancelled: {reason}")]
    NotCancellable { order_id: String, reason: String },

    /// Payment requested before every batch is `Done`.
    #[error("Order {order_id} is {status}; every batch must be Done before payment")]
    NotReadyForPayment { order_id: String, status: OrderStatus },

    /// Negative subtotal or tax percentage. No partial bill is produced.
    #[error("Invalid billing input: {reason}")]
    InvalidBillingInput { reason: String },

    #[error("Batch {batch_id} not found on order {order_id}")]
    BatchNotFound { order_id: String, batch_id: String },

    #[error("Tax rule not found: {0}")]
    TaxRuleNotFound(String),

    /// Feedback is only taken once the order is settled.
    #[error("Order {order_id} is {status}; feedback opens after payment")]
    FeedbackNotAllowed { order_id: String, status: OrderStatus },

    /// A menu item marked out of stock was put on an order.
    #[error("{name} ({item_id}) is out of stock")]
    ItemOutOfStock { item_id: String, name: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// An amount too large to represent.
    pub fn overflow(what: &str) -> Self {
        CoreError::InvalidBillingInput {
            reason: format!("{what} is out of range"),
        }
    }

    /// Stable machine-readable code for frontends and logs.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::OrderClosed { .. } => "ORDER_CLOSED",
            CoreError::NotCancellable { .. } => "NOT_CANCELLABLE",
            CoreError::NotReadyForPayment { .. } => "NOT_READY_FOR_PAYMENT",
            CoreError::InvalidBillingInput { .. } => "INVALID_BILLING_INPUT",
            CoreError::BatchNotFound { .. } => "BATCH_NOT_FOUND",
            CoreError::TaxRuleNotFound(_) => "TAX_RULE_NOT_FOUND",
            CoreError::FeedbackNotAllowed { .. } => "FEEDBACK_NOT_ALLOWED",
            CoreError::ItemOutOfStock { .. } => "ITEM_OUT_OF_STOCK",
            CoreError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (e.g. a discount that is neither `10%` nor `50`).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Too many entries in a collection.
    #[error("{field} cannot have more than {max} entries")]
    TooMany { field: String, max: usize },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
