//! # cafe-sync: Live Order Hub
//!
//! Keeps every screen in the café looking at the same orders. The cashier
//! dashboard and each customer's tracker subscribe to full snapshots; all
//! writes go through one hub that applies them to the store with
//! versioned compare-and-swap.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Sync Architecture                              │
//! │                                                                         │
//! │   Customer tracker         Cashier dashboard       Notifier            │
//! │   subscribe(Order(id))     subscribe(Open)         status_changes()    │
//! │          ▲                        ▲                       ▲             │
//! │          │ OrdersSnapshot         │ OrdersSnapshot        │ StatusChange│
//! │   ┌──────┴────────────────────────┴───────────────────────┴──────┐     │
//! │   │                         HubHandle                            │     │
//! │   │  create_order · mutate · add/update/remove_tax · bill        │     │
//! │   │  purge_closed_before · resync · kitchen_board                │     │
//! │   └──────────────────────────────┬───────────────────────────────┘     │
//! │                                  │ Arc<dyn DocumentStore>               │
//! │                     ┌────────────┴────────────┐                        │
//! │                     ▼                         ▼                        │
//! │              cafe_db::Database           MemoryStore                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Hub configuration (store, retry, café settings)
//! - [`error`] - Sync error types
//! - [`hub`] - `OrderHub` service and its `HubHandle`
//! - [`protocol`] - Requests, mutations and snapshots
//! - [`store`] - `DocumentStore` seam with SQLite and in-memory backends
//! - [`subscription`] - Snapshot streams and the status feed
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cafe_sync::{NewOrder, OrderFilter, OrderHub, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let hub = OrderHub::from_config(config).await?.start().await?;
//!
//! let mut board = hub.subscribe(OrderFilter::Open);
//! let order = hub.create_order(NewOrder::new("Ravi", lines)).await?;
//!
//! while let Some(snapshot) = board.next_snapshot().await {
//!     println!("{} open orders", snapshot.orders.len());
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod store;
pub mod subscription;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{CafeSettings, StoreSettings, SyncConfig, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use hub::{HubHandle, OrderHub};
pub use protocol::{
    LinkState, Mutation, MutationOutcome, MutationRequest, NewOrder, OrderFilter, OrdersSnapshot,
    Precondition, TaxSnapshot,
};
pub use store::{DocumentStore, MemoryStore};
pub use subscription::{OrderSubscription, StatusFeed, TaxSubscription};
