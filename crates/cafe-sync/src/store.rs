//! # Document Store
//!
//! The seam between the hub and persistence. The hub only ever needs
//! whole-document reads and a versioned replace, so any backend that can
//! do compare-and-swap on a version counter fits.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       DocumentStore                                     │
//! │                                                                         │
//! │        OrderHub ──► Arc<dyn DocumentStore>                              │
//! │                            │                                            │
//! │              ┌─────────────┴─────────────┐                              │
//! │              ▼                           ▼                              │
//! │      cafe_db::Database              MemoryStore                        │
//! │      (SQLite, production)           (process memory; can be taken     │
//! │                                      offline or raced in tests)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use cafe_core::{Order, TaxRule};
use cafe_db::{Database, DbError, DbResult};
use tokio::sync::RwLock;
use tracing::debug;

/// Whole-document persistence for orders and tax rules.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_order(&self, id: &str) -> DbResult<Option<Order>>;

    /// Every order, oldest first.
    async fn list_orders(&self) -> DbResult<Vec<Order>>;

    /// Fails with [`DbError::UniqueViolation`] if the id is taken.
    async fn insert_order(&self, order: &Order) -> DbResult<()>;

    /// Writes `order` only if the stored version is still
    /// `expected_version`. `Ok(false)` means someone else won.
    async fn replace_order(&self, order: &Order, expected_version: u64) -> DbResult<bool>;

    async fn delete_orders(&self, ids: &[String]) -> DbResult<u64>;

    /// Rules in insertion order.
    async fn list_taxes(&self) -> DbResult<Vec<TaxRule>>;

    async fn insert_tax(&self, rule: &TaxRule) -> DbResult<()>;

    async fn update_tax(&self, rule: &TaxRule) -> DbResult<()>;

    async fn delete_tax(&self, id: &str) -> DbResult<()>;
}

// =============================================================================
// SQLite
// =============================================================================

#[async_trait]
impl DocumentStore for Database {
    async fn load_order(&self, id: &str) -> DbResult<Option<Order>> {
        self.orders().get(id).await
    }

    async fn list_orders(&self) -> DbResult<Vec<Order>> {
        self.orders().list().await
    }

    async fn insert_order(&self, order: &Order) -> DbResult<()> {
        self.orders().insert(order).await
    }

    async fn replace_order(&self, order: &Order, expected_version: u64) -> DbResult<bool> {
        self.orders().replace(order, expected_version).await
    }

    async fn delete_orders(&self, ids: &[String]) -> DbResult<u64> {
        self.orders().delete_many(ids).await
    }

    async fn list_taxes(&self) -> DbResult<Vec<TaxRule>> {
        self.taxes().list().await
    }

    async fn insert_tax(&self, rule: &TaxRule) -> DbResult<()> {
        self.taxes().insert(rule).await
    }

    async fn update_tax(&self, rule: &TaxRule) -> DbResult<()> {
        self.taxes().update(rule).await
    }

    async fn delete_tax(&self, id: &str) -> DbResult<()> {
        self.taxes().delete(id).await
    }
}

// =============================================================================
// In-Memory
// =============================================================================

#[derive(Debug, Default)]
struct MemoryCollections {
    orders: BTreeMap<String, Order>,
    taxes: Vec<TaxRule>,
}

/// Process-memory store with the same compare-and-swap contract as SQLite.
///
/// Two switches exist for exercising failure paths:
/// - [`set_available`](Self::set_available) takes the store offline; every
///   call then fails with [`DbError::ConnectionFailed`]
/// - [`inject_conflicts`](Self::inject_conflicts) makes the next `n`
///   replaces lose to a simulated foreign writer, which bumps the stored
///   version just before the swap
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<MemoryCollections>,
    available: AtomicBool,
    pending_conflicts: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: RwLock::new(MemoryCollections::default()),
            available: AtomicBool::new(true),
            pending_conflicts: AtomicU32::new(0),
        }
    }

    /// Simulates losing (`false`) or regaining (`true`) the store.
    pub fn set_available(&self, available: bool) {
        debug!(available, "Memory store availability changed");
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    fn check(&self) -> DbResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(DbError::ConnectionFailed("memory store offline".into()))
        }
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load_order(&self, id: &str) -> DbResult<Option<Order>> {
        self.check()?;
        Ok(self.inner.read().await.orders.get(id).cloned())
    }

    async fn list_orders(&self) -> DbResult<Vec<Order>> {
        self.check()?;
        let mut orders: Vec<Order> = self.inner.read().await.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn insert_order(&self, order: &Order) -> DbResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        if inner.orders.contains_key(&order.id) {
            return Err(DbError::duplicate("orders.id", &order.id));
        }
        inner.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn replace_order(&self, order: &Order, expected_version: u64) -> DbResult<bool> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.orders.get_mut(&order.id) else {
            return Ok(false);
        };

        if self.take_conflict() {
            stored.version += 1;
            debug!(order_id = %order.id, version = stored.version, "Injected foreign write");
        }

        if stored.version != expected_version {
            return Ok(false);
        }
        *stored = order.clone();
        Ok(true)
    }

    async fn delete_orders(&self, ids: &[String]) -> DbResult<u64> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let removed = ids
            .iter()
            .filter(|id| inner.orders.remove(id.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn list_taxes(&self) -> DbResult<Vec<TaxRule>> {
        self.check()?;
        Ok(self.inner.read().await.taxes.clone())
    }

    async fn insert_tax(&self, rule: &TaxRule) -> DbResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        if inner.taxes.iter().any(|r| r.id == rule.id) {
            return Err(DbError::duplicate("taxes.id", &rule.id));
        }
        inner.taxes.push(rule.clone());
        Ok(())
    }

    async fn update_tax(&self, rule: &TaxRule) -> DbResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let stored = inner
            .taxes
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| DbError::not_found("TaxRule", &rule.id))?;
        *stored = rule.clone();
        Ok(())
    }

    async fn delete_tax(&self, id: &str) -> DbResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let before = inner.taxes.len();
        inner.taxes.retain(|r| r.id != id);
        if inner.taxes.len() == before {
            return Err(DbError::not_found("TaxRule", id));
        }
        Ok(())
    }
}
