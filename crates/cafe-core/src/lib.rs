//! # cafe-core: Pure Business Logic for Café Orders
//!
//! Order lifecycle, billing and tax rules as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Café Orders Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Cashier dashboard  •  Customer tracker  (external)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ subscribe / mutate                     │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                cafe-sync (OrderHub, snapshots, CAS)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ cafe-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │ lifecycle │  │  billing  │  │    tax    │  │  reports  │  │   │
//! │  │   │ Order ops │  │ Bill      │  │ Registry  │  │ Board     │  │   │
//! │  │   │ tables    │  │ TaxLine   │  │ snapshot  │  │ Summaries │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  cafe-db (document store)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Order, Batch, OrderLine, statuses, Discount, TaxRule
//! - [`money`] - Exact decimal Money, rounded only for display
//! - [`lifecycle`] - The order state machine
//! - [`billing`] - Discount, taxes and grand total
//! - [`tax`] - The tax rule registry
//! - [`reports`] - Dashboard lanes, daily summaries, feedback, purge selection
//! - [`error`] - Domain error types
//! - [`validation`] - Input rules
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: callers pass `now`; same input = same output
//! 2. **Closed Enums**: statuses are enums, transitions are one `match`
//! 3. **Exact Money**: decimals throughout, two places only at presentation
//! 4. **Reject, Don't Repair**: a failed operation leaves the order untouched
//!
//! ## Example Usage
//!
//! ```rust
//! use cafe_core::{BatchStatus, Money, Order, OrderLine, OrderStatus};
//! use cafe_core::tax::TaxRegistry;
//! use cafe_core::types::Rate;
//!
//! let now = chrono::Utc::now();
//! let lines = vec![OrderLine::new("latte", "Latte", Money::from_major(100), 2)];
//! let mut order = Order::place("o-1", "Meera", None, lines, None, now).unwrap();
//!
//! let batch = order.batches[0].batch_id.clone();
//! order.advance_batch(&batch, BatchStatus::Done, now).unwrap();
//! assert_eq!(order.status, OrderStatus::Done);
//!
//! let mut taxes = TaxRegistry::new();
//! taxes.add("GST", Rate::whole(5)).unwrap();
//! let bill = order.bill(&taxes.snapshot()).unwrap();
//! assert_eq!(bill.grand_total, Money::from_major(210));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod billing;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod reports;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use billing::{compute_bill, Bill, TaxLine};
pub use error::{CoreError, CoreResult, ValidationError};
pub use lifecycle::AppendOutcome;
pub use money::Money;
pub use tax::TaxRegistry;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in one batch.
///
/// ## Business Reason
/// Prevents runaway carts; a table ordering more splits it across batches.
pub const MAX_BATCH_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 100 instead of 10)
pub const MAX_LINE_QUANTITY: u32 = 999;

/// Names: customer, table, tax rule, payment method.
pub const MAX_NAME_LENGTH: usize = 80;

pub const MAX_COMMENT_LENGTH: usize = 1000;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
