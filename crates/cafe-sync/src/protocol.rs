//! # Hub Protocol Types
//!
//! What subscribers receive and what they may ask the hub to do.
//!
//! ## Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Hub Requests & Snapshots                           │
//! │                                                                         │
//! │  CREATE                                                                │
//! │  ──────                                                                │
//! │  customer ───► NewOrder { customer, table, lines, idempotencyKey }     │
//! │                                                                         │
//! │  MUTATE (field-scoped intents, applied to the stored document)         │
//! │  ──────                                                                │
//! │  any      ───► MutationRequest { orderId, precondition, mutation }     │
//! │                  AdvanceBatch │ AppendBatch │ SetDiscount              │
//! │                  MarkPaid     │ Cancel      │ AttachFeedback           │
//! │  any      ◄─── MutationOutcome { order, applied, batchId, change }     │
//! │                                                                         │
//! │  SUBSCRIBE                                                             │
//! │  ─────────                                                             │
//! │  hub      ───► OrdersSnapshot { revision, orders }   (full state)      │
//! │  hub      ───► TaxSnapshot    { revision, rules }    (independent)     │
//! │  hub      ───► StatusChange   { orderId, previousStatus, newStatus }   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Mutations are adjacently tagged:
//! ```json
//! { "type": "AdvanceBatch", "payload": { "batchId": "…", "to": "Ready" } }
//! ```

use cafe_core::{BatchStatus, Discount, Order, OrderLine, StatusChange, TaxRule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Mutations
// =============================================================================

/// One order-state-machine operation, expressed as the smallest intent
/// that can be re-applied to whatever version is current in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Mutation {
    #[serde(rename_all = "camelCase")]
    AdvanceBatch { batch_id: String, to: BatchStatus },

    /// Non-idempotent unless a key is supplied; a retried append with the
    /// same key returns the original batch.
    #[serde(rename_all = "camelCase")]
    AppendBatch {
        lines: Vec<OrderLine>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        idempotency_key: Option<String>,
    },

    /// `None` clears the discount.
    SetDiscount { discount: Option<Discount> },

    MarkPaid { method: String },

    Cancel,

    AttachFeedback { rating: u8, comment: String },
}

impl Mutation {
    /// Returns the mutation name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Mutation::AdvanceBatch { .. } => "AdvanceBatch",
            Mutation::AppendBatch { .. } => "AppendBatch",
            Mutation::SetDiscount { .. } => "SetDiscount",
            Mutation::MarkPaid { .. } => "MarkPaid",
            Mutation::Cancel => "Cancel",
            Mutation::AttachFeedback { .. } => "AttachFeedback",
        }
    }

    /// Safe to resend after an unknown outcome.
    pub fn is_idempotent(&self) -> bool {
        match self {
            Mutation::AppendBatch {
                idempotency_key, ..
            } => idempotency_key.is_some(),
            _ => true,
        }
    }
}

/// What the caller believed about the order when it asked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Precondition {
    /// Apply to whatever is current; the state machine still re-checks.
    #[default]
    Any,
    /// Only apply if the stored order is still at this version.
    Version(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest {
    pub order_id: String,
    #[serde(default)]
    pub precondition: Precondition,
    pub mutation: Mutation,
}

impl MutationRequest {
    pub fn new(order_id: impl Into<String>, mutation: Mutation) -> Self {
        MutationRequest {
            order_id: order_id.into(),
            precondition: Precondition::Any,
            mutation,
        }
    }

    /// Pins the version the caller last observed.
    pub fn at_version(mut self, version: u64) -> Self {
        self.precondition = Precondition::Version(version);
        self
    }
}

/// Result of a mutation that was not rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    /// The order as stored after this request.
    pub order: Order,
    /// `false` for no-ops: repeat payment, repeat feedback, replayed
    /// append, unchanged discount.
    pub applied: bool,
    /// The batch an `AppendBatch` created or replayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_change: Option<StatusChange>,
}

// =============================================================================
// Order Creation
// =============================================================================

/// A customer placing a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    /// Client-generated id. Resending the same id returns the stored
    /// order instead of creating a second one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub customer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub lines: Vec<OrderLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl NewOrder {
    pub fn new(customer: impl Into<String>, lines: Vec<OrderLine>) -> Self {
        NewOrder {
            order_id: None,
            customer: customer.into(),
            table: None,
            lines,
            idempotency_key: None,
        }
    }

    pub fn with_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn at_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Which orders a subscription sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum OrderFilter {
    #[default]
    All,
    /// One order: the customer tracking stream.
    Order(String),
    /// Neither paid nor cancelled.
    Open,
    /// Paid or cancelled.
    Closed,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderFilter::All => true,
            OrderFilter::Order(id) => order.id == *id,
            OrderFilter::Open => !order.is_closed(),
            OrderFilter::Closed => order.is_closed(),
        }
    }
}

/// Full state of the `orders` collection, oldest order first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersSnapshot {
    /// Increases by one with every published snapshot.
    pub revision: u64,
    pub orders: Vec<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
}

impl OrdersSnapshot {
    pub fn get(&self, order_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == order_id)
    }

    /// A copy holding only the orders `filter` admits.
    pub fn filtered(&self, filter: &OrderFilter) -> OrdersSnapshot {
        OrdersSnapshot {
            revision: self.revision,
            orders: self
                .orders
                .iter()
                .filter(|o| filter.matches(o))
                .cloned()
                .collect(),
            taken_at: self.taken_at,
        }
    }
}

/// Full state of the `taxes` collection in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxSnapshot {
    pub revision: u64,
    pub rules: Vec<TaxRule>,
}

/// Whether the hub currently reaches its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// Snapshots reflect the store.
    Connected,
    /// The store is unreachable; snapshots are the last-known state and a
    /// resync is running.
    Degraded,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Connected => write!(f, "connected"),
            LinkState::Degraded => write!(f, "degraded"),
        }
    }
}
