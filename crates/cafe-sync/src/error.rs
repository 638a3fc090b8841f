//! # Sync Error Types
//!
//! Error types for hub operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Store       │  │     Mutation            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │ StoreUnavailable│  │  Rejected (CoreError)   │ │
//! │  │  ConfigLoad…    │  │ Database        │  │  Conflict               │ │
//! │  │  ConfigSave…    │  │                 │  │  RetriesExhausted       │ │
//! │  │                 │  │                 │  │  OrderNotFound          │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  StoreUnavailable is the only one that degrades the hub. The rest are  │
//! │  answers about one request and leave every snapshot untouched.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use cafe_core::CoreError;
use cafe_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering every hub failure.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid hub configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// The store could not be reached. Subscribers keep the last-known
    /// snapshot and the hub resyncs in the background.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store answered, but with a permanent failure (corrupt document,
    /// constraint violation).
    #[error("Database error: {0}")]
    Database(String),

    // =========================================================================
    // Mutation Errors
    // =========================================================================
    /// The order state machine refused the operation.
    #[error(transparent)]
    Rejected(#[from] CoreError),

    /// The caller pinned a version that is no longer current.
    ///
    /// ## When This Occurs
    /// - A cashier acted on a snapshot while another cashier's change was
    ///   already committed
    #[error("Order {order_id} changed: expected version {expected}, found {actual}")]
    Conflict {
        order_id: String,
        expected: u64,
        actual: u64,
    },

    /// Every compare-and-swap attempt lost to a concurrent writer.
    #[error("Gave up on order {order_id} after {attempts} conflicting attempts")]
    RetriesExhausted { order_id: String, attempts: u32 },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Hub is shutting down.
    #[error("Order hub is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        if err.is_transient() {
            SyncError::StoreUnavailable(err.to_string())
        } else {
            SyncError::Database(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the same request may succeed later.
    ///
    /// ## Retryable Errors
    /// - Store outages
    /// - Lost compare-and-swap races (after reading a fresh snapshot)
    ///
    /// ## Non-Retryable Errors
    /// - State machine rejections
    /// - Configuration errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::StoreUnavailable(_)
                | SyncError::Conflict { .. }
                | SyncError::RetriesExhausted { .. }
        )
    }

    /// Transient connectivity loss between the hub and its store.
    pub fn is_sync_failure(&self) -> bool {
        matches!(self, SyncError::StoreUnavailable(_))
    }

    /// The request itself was refused; state is unchanged.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SyncError::Rejected(_) | SyncError::Conflict { .. } | SyncError::OrderNotFound(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::InvalidConfig(_) => "INVALID_CONFIG",
            SyncError::ConfigLoadFailed(_) => "CONFIG_LOAD_FAILED",
            SyncError::ConfigSaveFailed(_) => "CONFIG_SAVE_FAILED",
            SyncError::StoreUnavailable(_) => "SYNC_FAILURE",
            SyncError::Database(_) => "DATABASE_ERROR",
            SyncError::Rejected(inner) => inner.code(),
            SyncError::Conflict { .. } => "CONFLICT",
            SyncError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            SyncError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            SyncError::ShuttingDown => "SHUTTING_DOWN",
            SyncError::ChannelError(_) => "CHANNEL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafe_core::OrderStatus;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::StoreUnavailable("offline".into()).is_retryable());
        assert!(SyncError::Conflict {
            order_id: "o-1".into(),
            expected: 3,
            actual: 4
        }
        .is_retryable());

        let closed = SyncError::from(CoreError::OrderClosed {
            order_id: "o-1".into(),
            status: OrderStatus::Cancelled,
        });
        assert!(!closed.is_retryable());
        assert!(closed.is_rejection());
        assert_eq!(closed.code(), "ORDER_CLOSED");
    }

    #[test]
    fn test_db_errors_split_by_transience() {
        let outage = SyncError::from(DbError::PoolExhausted);
        assert!(outage.is_sync_failure());

        let corrupt = SyncError::from(DbError::Serialization("bad".into()));
        assert!(!corrupt.is_sync_failure());
        assert!(!corrupt.is_retryable());
    }
}
