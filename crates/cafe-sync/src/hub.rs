//! # Order Hub
//!
//! Owns the live view of the `orders` and `taxes` collections and is the
//! only writer to the store.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Order Hub                                     │
//! │                                                                         │
//! │   cashier / customer                                                    │
//! │          │ mutate(orderId, mutation)                                    │
//! │          ▼                                                              │
//! │   ┌──────────────────────────────────────────────────────────────┐     │
//! │   │  CAS LOOP                                                    │     │
//! │   │  1. load stored order (version N)                            │     │
//! │   │  2. apply mutation through the state machine                 │     │
//! │   │  3. replace WHERE version = N                                │     │
//! │   │       won  ──► publish snapshot, emit StatusChange           │     │
//! │   │       lost ──► back off, go to 1                             │     │
//! │   └──────────────────────────────────────────────────────────────┘     │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   watch<OrdersSnapshot> ──► OrderSubscription (per filter)             │
//! │   watch<TaxSnapshot>    ──► TaxSubscription                            │
//! │   broadcast<StatusChange> ─► notification collaborator                 │
//! │   watch<LinkState>      ──► Connected │ Degraded                       │
//! │                                                                         │
//! │   BACKGROUND TASK                                                       │
//! │   ───────────────                                                       │
//! │   Resync command ──► reload both collections with backoff until the    │
//! │                      store answers, then publish full snapshots        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Store Outages
//! A store failure never clears a snapshot. The hub flips to
//! [`LinkState::Degraded`], answers the caller with
//! [`SyncError::StoreUnavailable`], and resyncs in the background.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use backoff::backoff::Backoff;
use cafe_core::reports::{self, DailySummary, FeedbackDigest, KitchenBoard};
use cafe_core::{
    AppendOutcome, BatchStatus, Bill, CoreResult, Discount, Order, OrderLine, Rate, StatusChange,
    TaxRegistry, TaxRule,
};
use cafe_db::{Database, DbError};
use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{SyncConfig, SyncSettings};
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    LinkState, Mutation, MutationOutcome, MutationRequest, NewOrder, OrderFilter, OrdersSnapshot,
    Precondition, TaxSnapshot,
};
use crate::store::{DocumentStore, MemoryStore};
use crate::subscription::{OrderSubscription, StatusFeed, TaxSubscription};

// =============================================================================
// Hub Service
// =============================================================================

/// Builder for a running hub.
pub struct OrderHub {
    store: Arc<dyn DocumentStore>,
    config: SyncConfig,
}

impl OrderHub {
    pub fn new(store: Arc<dyn DocumentStore>, config: SyncConfig) -> Self {
        OrderHub { store, config }
    }

    /// Opens the store the config names: SQLite, or process memory when
    /// `store.in_memory` is set.
    pub async fn from_config(config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let store: Arc<dyn DocumentStore> = if config.store.in_memory {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        } else {
            info!(path = %config.store.database_path.display(), "Opening SQLite store");
            Arc::new(Database::new(config.db_config()).await?)
        };
        Ok(OrderHub::new(store, config))
    }

    /// Loads both collections and spawns the resync task.
    ///
    /// An unreachable store does not fail startup: the hub comes up
    /// [`LinkState::Degraded`] with empty snapshots and keeps retrying.
    pub async fn start(self) -> SyncResult<HubHandle> {
        self.config.validate()?;
        let offset = self.config.utc_offset()?;

        let (orders_tx, _) = watch::channel(Arc::new(OrdersSnapshot::default()));
        let (taxes_tx, _) = watch::channel(Arc::new(TaxSnapshot::default()));
        let (link_tx, _) = watch::channel(LinkState::Connected);
        let (events_tx, _) = broadcast::channel(self.config.sync.notification_capacity);

        let state = Arc::new(HubState {
            store: self.store,
            settings: self.config.sync.clone(),
            offset,
            retention_days: self.config.cafe.retention_days,
            orders: Mutex::new(OrderCache::default()),
            taxes: Mutex::new(TaxCache::default()),
            orders_tx,
            taxes_tx,
            link_tx,
            events_tx,
            shutting_down: AtomicBool::new(false),
        });

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let handle = HubHandle {
            state: Arc::clone(&state),
            cmd_tx,
        };

        match state.reload().await {
            Ok(()) => info!(cafe = %self.config.cafe.name, "Order hub loaded"),
            Err(e) => {
                warn!(error = %e, "Initial load failed - starting degraded");
                state.set_link(LinkState::Degraded);
                handle.request_resync();
            }
        }

        tokio::spawn(run(state, cmd_rx));
        Ok(handle)
    }
}

enum HubCommand {
    Resync,
    Shutdown,
}

async fn run(state: Arc<HubState>, mut cmd_rx: mpsc::Receiver<HubCommand>) {
    info!("Order hub started");

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            HubCommand::Shutdown => break,
            HubCommand::Resync => {
                if !resync_until_loaded(&state, &mut cmd_rx).await {
                    break;
                }
            }
        }
    }

    info!("Order hub stopped");
}

/// Returns `false` if shutdown arrived while waiting.
async fn resync_until_loaded(state: &HubState, cmd_rx: &mut mpsc::Receiver<HubCommand>) -> bool {
    let mut backoff = state.settings.resync_backoff();
    let mut attempt: u32 = 0;
    let mut slowed = false;

    loop {
        attempt += 1;
        match state.reload().await {
            Ok(()) => {
                info!(attempt, "Resync complete");
                return true;
            }
            Err(e) => warn!(attempt, error = %e, "Resync failed"),
        }

        let delay = match backoff.next_backoff() {
            Some(delay) => delay,
            None => {
                if !slowed {
                    error!(attempt, "Resync still failing; retrying at the maximum interval");
                    slowed = true;
                }
                backoff.max_interval
            }
        };
        debug!(delay_ms = delay.as_millis() as u64, "Waiting before next resync");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            cmd = cmd_rx.recv() => match cmd {
                // Another failure was reported; retry now.
                Some(HubCommand::Resync) => {}
                Some(HubCommand::Shutdown) | None => return false,
            }
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

#[derive(Default)]
struct OrderCache {
    orders: BTreeMap<String, Order>,
    revision: u64,
}

#[derive(Default)]
struct TaxCache {
    registry: TaxRegistry,
    revision: u64,
}

struct HubState {
    store: Arc<dyn DocumentStore>,
    settings: SyncSettings,
    offset: FixedOffset,
    retention_days: u32,
    orders: Mutex<OrderCache>,
    taxes: Mutex<TaxCache>,
    orders_tx: watch::Sender<Arc<OrdersSnapshot>>,
    taxes_tx: watch::Sender<Arc<TaxSnapshot>>,
    link_tx: watch::Sender<LinkState>,
    events_tx: broadcast::Sender<StatusChange>,
    shutting_down: AtomicBool,
}

impl HubState {
    /// Replaces both caches with what the store holds and goes Connected.
    async fn reload(&self) -> SyncResult<()> {
        let loaded = self.store.list_orders().await?;
        let rules = self.store.list_taxes().await?;

        {
            let mut cache = self.orders.lock().await;
            let mut next = BTreeMap::new();
            for order in loaded {
                // A commit that landed after our read is newer than the list.
                let order = match cache.orders.remove(&order.id) {
                    Some(cached) if cached.version > order.version => cached,
                    _ => order,
                };
                next.insert(order.id.clone(), order);
            }
            cache.orders = next;
            self.publish_orders(&mut cache);
        }

        {
            let mut taxes = self.taxes.lock().await;
            taxes.registry = TaxRegistry::from_rules(rules);
            self.publish_taxes(&mut taxes);
        }

        self.set_link(LinkState::Connected);
        Ok(())
    }

    fn publish_orders(&self, cache: &mut OrderCache) {
        cache.revision += 1;
        let mut orders: Vec<Order> = cache.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        debug!(revision = cache.revision, count = orders.len(), "Publishing orders snapshot");
        self.orders_tx.send_replace(Arc::new(OrdersSnapshot {
            revision: cache.revision,
            orders,
            taken_at: Some(Utc::now()),
        }));
    }

    fn publish_taxes(&self, cache: &mut TaxCache) {
        cache.revision += 1;
        debug!(revision = cache.revision, count = cache.registry.len(), "Publishing tax snapshot");
        self.taxes_tx.send_replace(Arc::new(TaxSnapshot {
            revision: cache.revision,
            rules: cache.registry.snapshot(),
        }));
    }

    /// Returns true if the state changed.
    fn set_link(&self, next: LinkState) -> bool {
        let changed = self.link_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            match next {
                LinkState::Connected => info!(link = %next, "Store link restored"),
                LinkState::Degraded => warn!(link = %next, "Store link lost - serving last-known snapshot"),
            }
        }
        changed
    }

    /// Caches a committed order, publishes, and emits its status change.
    /// Older versions never overwrite newer ones. The event goes out while
    /// the cache lock is held so listeners see changes in commit order.
    async fn commit(&self, order: Order, change: Option<&StatusChange>) {
        let mut cache = self.orders.lock().await;
        let newer = cache
            .orders
            .get(&order.id)
            .map_or(true, |cached| cached.version < order.version);
        if newer {
            cache.orders.insert(order.id.clone(), order);
        }
        self.publish_orders(&mut cache);
        if let Some(change) = change {
            self.emit(change);
        }
    }

    fn emit(&self, change: &StatusChange) {
        info!(
            order_id = %change.order_id,
            from = ?change.previous_status,
            to = ?change.new_status,
            "Order status changed"
        );
        // No receivers is fine.
        let _ = self.events_tx.send(change.clone());
    }
}

// =============================================================================
// Hub Handle
// =============================================================================

/// Handle for talking to a running hub. Cheap to clone.
#[derive(Clone)]
pub struct HubHandle {
    state: Arc<HubState>,
    cmd_tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    pub fn subscribe(&self, filter: OrderFilter) -> OrderSubscription {
        OrderSubscription::new(self.state.orders_tx.subscribe(), filter)
    }

    pub fn subscribe_taxes(&self) -> TaxSubscription {
        TaxSubscription::new(self.state.taxes_tx.subscribe())
    }

    /// Aggregate status changes, in commit order. Slow receivers lag
    /// rather than block commits.
    pub fn status_changes(&self) -> StatusFeed {
        StatusFeed::new(self.state.events_tx.subscribe())
    }

    pub fn link_state(&self) -> LinkState {
        *self.state.link_tx.borrow()
    }

    pub fn watch_link(&self) -> watch::Receiver<LinkState> {
        self.state.link_tx.subscribe()
    }

    pub fn orders_snapshot(&self) -> Arc<OrdersSnapshot> {
        Arc::clone(&self.state.orders_tx.borrow())
    }

    pub fn taxes_snapshot(&self) -> Arc<TaxSnapshot> {
        Arc::clone(&self.state.taxes_tx.borrow())
    }

    /// The order as of the latest snapshot.
    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.orders_snapshot().get(order_id).cloned()
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// Places an order with one Pending batch.
    ///
    /// Resending a [`NewOrder`] that carries the same `order_id` returns the
    /// stored order. Creation emits no [`StatusChange`].
    pub async fn create_order(&self, new: NewOrder) -> SyncResult<Order> {
        self.ensure_running()?;

        let id = new
            .order_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let order = Order::place(
            id,
            &new.customer,
            new.table.as_deref(),
            new.lines,
            new.idempotency_key.as_deref(),
            Utc::now(),
        )?;

        match self.state.store.insert_order(&order).await {
            Ok(()) => {
                info!(order_id = %order.id, customer = %order.customer, "Order placed");
                self.state.commit(order.clone(), None).await;
                Ok(order)
            }
            Err(DbError::UniqueViolation { .. }) if new.order_id.is_some() => {
                debug!(order_id = %order.id, "Replayed order creation");
                self.state
                    .store
                    .load_order(&order.id)
                    .await
                    .map_err(|e| self.store_failed(e.into()))?
                    .ok_or_else(|| SyncError::OrderNotFound(order.id.clone()))
            }
            Err(e) => Err(self.store_failed(e.into())),
        }
    }

    /// Applies one mutation with compare-and-swap, retrying lost races
    /// against the freshly stored version.
    ///
    /// The state machine re-validates on every attempt, so a retry never
    /// resurrects a transition that a concurrent writer made illegal.
    pub async fn mutate(&self, request: MutationRequest) -> SyncResult<MutationOutcome> {
        self.ensure_running()?;

        let MutationRequest {
            order_id,
            precondition,
            mutation,
        } = request;
        let max_attempts = self.state.settings.max_mutation_attempts;
        let mut backoff = self.state.settings.conflict_backoff();

        for attempt in 1..=max_attempts {
            let current = self
                .state
                .store
                .load_order(&order_id)
                .await
                .map_err(|e| self.store_failed(e.into()))?
                .ok_or_else(|| SyncError::OrderNotFound(order_id.clone()))?;

            if let Precondition::Version(expected) = precondition {
                if current.version != expected {
                    debug!(order_id = %order_id, expected, actual = current.version, "Stale precondition");
                    return Err(SyncError::Conflict {
                        order_id,
                        expected,
                        actual: current.version,
                    });
                }
            }

            let mut next = current.clone();
            let (applied, batch_id) = apply(&mut next, &mutation, Utc::now())?;
            if !applied {
                debug!(order_id = %order_id, mutation = mutation.type_name(), "Mutation was a no-op");
                return Ok(MutationOutcome {
                    order: current,
                    applied: false,
                    batch_id,
                    status_change: None,
                });
            }

            match self.state.store.replace_order(&next, current.version).await {
                Ok(true) => {
                    info!(
                        order_id = %order_id,
                        mutation = mutation.type_name(),
                        version = next.version,
                        attempt,
                        "Mutation committed"
                    );
                    let status_change = StatusChange::between(&current, &next);
                    self.state
                        .commit(next.clone(), status_change.as_ref())
                        .await;
                    return Ok(MutationOutcome {
                        order: next,
                        applied: true,
                        batch_id,
                        status_change,
                    });
                }
                Ok(false) => {
                    warn!(order_id = %order_id, attempt, "Lost compare-and-swap - reloading");
                    if attempt < max_attempts {
                        if let Some(delay) = backoff.next_backoff() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                Err(e) => return Err(self.store_failed(e.into())),
            }
        }

        error!(order_id = %order_id, attempts = max_attempts, "Mutation retries exhausted");
        Err(SyncError::RetriesExhausted {
            order_id,
            attempts: max_attempts,
        })
    }

    pub async fn advance_batch(
        &self,
        order_id: &str,
        batch_id: &str,
        to: BatchStatus,
    ) -> SyncResult<MutationOutcome> {
        self.mutate(MutationRequest::new(
            order_id,
            Mutation::AdvanceBatch {
                batch_id: batch_id.to_string(),
                to,
            },
        ))
        .await
    }

    /// Adds a batch. Pass an idempotency key if the call may be retried.
    pub async fn append_batch(
        &self,
        order_id: &str,
        lines: Vec<OrderLine>,
        idempotency_key: Option<&str>,
    ) -> SyncResult<MutationOutcome> {
        self.mutate(MutationRequest::new(
            order_id,
            Mutation::AppendBatch {
                lines,
                idempotency_key: idempotency_key.map(str::to_string),
            },
        ))
        .await
    }

    pub async fn set_discount(
        &self,
        order_id: &str,
        discount: Option<Discount>,
    ) -> SyncResult<MutationOutcome> {
        self.mutate(MutationRequest::new(order_id, Mutation::SetDiscount { discount }))
            .await
    }

    pub async fn mark_paid(&self, order_id: &str, method: &str) -> SyncResult<MutationOutcome> {
        self.mutate(MutationRequest::new(
            order_id,
            Mutation::MarkPaid {
                method: method.to_string(),
            },
        ))
        .await
    }

    pub async fn cancel_order(&self, order_id: &str) -> SyncResult<MutationOutcome> {
        self.mutate(MutationRequest::new(order_id, Mutation::Cancel))
            .await
    }

    pub async fn attach_feedback(
        &self,
        order_id: &str,
        rating: u8,
        comment: &str,
    ) -> SyncResult<MutationOutcome> {
        self.mutate(MutationRequest::new(
            order_id,
            Mutation::AttachFeedback {
                rating,
                comment: comment.to_string(),
            },
        ))
        .await
    }

    // -------------------------------------------------------------------------
    // Billing & Reports
    // -------------------------------------------------------------------------

    /// The order's bill against the current tax snapshot.
    pub fn bill(&self, order_id: &str) -> SyncResult<Bill> {
        let orders = self.orders_snapshot();
        let order = orders
            .get(order_id)
            .ok_or_else(|| SyncError::OrderNotFound(order_id.to_string()))?;
        Ok(order.bill(&self.taxes_snapshot().rules)?)
    }

    pub fn kitchen_board(&self) -> SyncResult<KitchenBoard> {
        Ok(KitchenBoard::build(
            &self.orders_snapshot().orders,
            Utc::now(),
            self.state.offset,
        )?)
    }

    pub fn daily_summaries(&self) -> SyncResult<Vec<DailySummary>> {
        Ok(reports::daily_summaries(
            &self.orders_snapshot().orders,
            &self.taxes_snapshot().rules,
            self.state.offset,
        )?)
    }

    pub fn feedback_digest(&self) -> FeedbackDigest {
        FeedbackDigest::collect(&self.orders_snapshot().orders)
    }

    // -------------------------------------------------------------------------
    // Taxes
    // -------------------------------------------------------------------------

    pub async fn add_tax(&self, name: &str, percentage: Rate) -> SyncResult<TaxRule> {
        self.ensure_running()?;
        let mut cache = self.state.taxes.lock().await;

        let mut next = cache.registry.clone();
        let rule = next.add(name, percentage)?;
        self.state
            .store
            .insert_tax(&rule)
            .await
            .map_err(|e| self.store_failed(e.into()))?;

        info!(tax_id = %rule.id, name = %rule.name, percentage = %rule.percentage, "Tax rule added");
        cache.registry = next;
        self.state.publish_taxes(&mut cache);
        Ok(rule)
    }

    /// Changes a rate. Bills already handed out keep the old one.
    pub async fn update_tax(&self, tax_id: &str, percentage: Rate) -> SyncResult<TaxRule> {
        self.ensure_running()?;
        let mut cache = self.state.taxes.lock().await;

        let mut next = cache.registry.clone();
        let rule = next.update(tax_id, percentage)?;
        self.state
            .store
            .update_tax(&rule)
            .await
            .map_err(|e| self.store_failed(e.into()))?;

        info!(tax_id = %rule.id, percentage = %rule.percentage, "Tax rule updated");
        cache.registry = next;
        self.state.publish_taxes(&mut cache);
        Ok(rule)
    }

    pub async fn remove_tax(&self, tax_id: &str) -> SyncResult<TaxRule> {
        self.ensure_running()?;
        let mut cache = self.state.taxes.lock().await;

        let mut next = cache.registry.clone();
        let rule = next.remove(tax_id)?;
        self.state
            .store
            .delete_tax(tax_id)
            .await
            .map_err(|e| self.store_failed(e.into()))?;

        info!(tax_id = %rule.id, name = %rule.name, "Tax rule removed");
        cache.registry = next;
        self.state.publish_taxes(&mut cache);
        Ok(rule)
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    /// Deletes paid and cancelled orders placed before `cutoff`. Open
    /// orders are never touched, however old.
    pub async fn purge_closed_before(&self, cutoff: DateTime<Utc>) -> SyncResult<u64> {
        self.ensure_running()?;

        let orders = self
            .state
            .store
            .list_orders()
            .await
            .map_err(|e| self.store_failed(e.into()))?;
        let ids = reports::purge_candidates(&orders, cutoff);
        if ids.is_empty() {
            debug!(%cutoff, "Nothing to purge");
            return Ok(0);
        }

        let removed = self
            .state
            .store
            .delete_orders(&ids)
            .await
            .map_err(|e| self.store_failed(e.into()))?;

        let mut cache = self.state.orders.lock().await;
        for id in &ids {
            cache.orders.remove(id);
        }
        self.state.publish_orders(&mut cache);

        info!(removed, %cutoff, "Purged closed orders");
        Ok(removed)
    }

    /// Purges closed orders older than the configured retention window,
    /// counted in business days.
    pub async fn purge_prior_days(&self) -> SyncResult<u64> {
        let cutoff = reports::purge_cutoff(Utc::now(), self.state.offset, self.state.retention_days);
        self.purge_closed_before(cutoff).await
    }

    /// Reloads everything from the store and republishes full snapshots.
    pub async fn resync(&self) -> SyncResult<()> {
        self.ensure_running()?;
        self.state.reload().await.map_err(|e| self.store_failed(e))
    }

    /// Stops the background task. Further calls fail with
    /// [`SyncError::ShuttingDown`]; snapshots stay readable.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.state.shutting_down.store(true, Ordering::SeqCst);
        self.cmd_tx
            .send(HubCommand::Shutdown)
            .await
            .map_err(|_| SyncError::ChannelError("Hub task gone".into()))
    }

    fn ensure_running(&self) -> SyncResult<()> {
        if self.state.shutting_down.load(Ordering::SeqCst) {
            Err(SyncError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn request_resync(&self) {
        if let Err(e) = self.cmd_tx.try_send(HubCommand::Resync) {
            // A full queue already holds a resync.
            debug!(error = %e, "Resync not queued");
        }
    }

    /// Degrades the hub on connectivity loss; other errors pass through.
    fn store_failed(&self, err: SyncError) -> SyncError {
        if err.is_sync_failure() {
            self.state.set_link(LinkState::Degraded);
            self.request_resync();
        }
        err
    }
}

/// Runs one mutation through the state machine. Returns whether the order
/// changed and, for appends, the batch involved.
fn apply(
    order: &mut Order,
    mutation: &Mutation,
    now: DateTime<Utc>,
) -> CoreResult<(bool, Option<String>)> {
    match mutation {
        Mutation::AdvanceBatch { batch_id, to } => {
            order.advance_batch(batch_id, *to, now)?;
            Ok((true, Some(batch_id.clone())))
        }
        Mutation::AppendBatch {
            lines,
            idempotency_key,
        } => {
            let outcome = order.append_batch(lines.clone(), idempotency_key.as_deref(), now)?;
            let applied = matches!(outcome, AppendOutcome::Appended { .. });
            Ok((applied, Some(outcome.batch_id().to_string())))
        }
        Mutation::SetDiscount { discount } => Ok((order.set_discount(*discount, now)?, None)),
        Mutation::MarkPaid { method } => Ok((order.mark_paid(method, now)?, None)),
        Mutation::Cancel => {
            order.cancel(now)?;
            Ok((true, None))
        }
        Mutation::AttachFeedback { rating, comment } => {
            Ok((order.attach_feedback(*rating, comment, now)?, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafe_core::{CoreError, Money, OrderStatus};
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn test_config() -> SyncConfig {
        let mut config = SyncConfig::in_memory();
        config.sync.initial_backoff_ms = 1;
        config.sync.max_backoff_ms = 5;
        config.sync.max_mutation_attempts = 3;
        config
    }

    async fn start_hub() -> (Arc<MemoryStore>, HubHandle) {
        let store = Arc::new(MemoryStore::new());
        let hub = OrderHub::new(store.clone(), test_config())
            .start()
            .await
            .unwrap();
        (store, hub)
    }

    fn chai(qty: u32) -> Vec<OrderLine> {
        vec![OrderLine::new("chai", "Masala Chai", Money::from_major(100), qty)]
    }

    async fn place(hub: &HubHandle, id: &str) -> Order {
        hub.create_order(NewOrder::new("Ravi", chai(2)).with_id(id))
            .await
            .unwrap()
    }

    async fn advance_all(hub: &HubHandle, order_id: &str, to: BatchStatus) -> MutationOutcome {
        let order = hub.order(order_id).unwrap();
        let mut last = None;
        for batch in &order.batches {
            last = Some(hub.advance_batch(order_id, &batch.batch_id, to).await.unwrap());
        }
        last.unwrap()
    }

    #[tokio::test]
    async fn test_create_publishes_without_status_event() {
        let (_store, hub) = start_hub().await;
        let mut sub = hub.subscribe(OrderFilter::All);
        let mut events = hub.status_changes();

        let initial = sub.next_snapshot().await.unwrap();
        assert!(initial.orders.is_empty());

        let order = place(&hub, "o-1").await;
        assert_eq!(order.status, OrderStatus::Pending);

        let next = sub.next_snapshot().await.unwrap();
        assert!(next.revision > initial.revision);
        assert_eq!(next.orders[0].id, "o-1");
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_replayed_create_returns_stored_order() {
        let (_store, hub) = start_hub().await;
        let first = place(&hub, "o-1").await;
        let again = hub
            .create_order(NewOrder::new("Someone else", chai(9)).with_id("o-1"))
            .await
            .unwrap();

        assert_eq!(again, first);
        assert_eq!(hub.orders_snapshot().orders.len(), 1);
    }

    #[tokio::test]
    async fn test_full_lifecycle_emits_status_changes() {
        let (_store, hub) = start_hub().await;
        let mut events = hub.status_changes();
        place(&hub, "o-1").await;

        advance_all(&hub, "o-1", BatchStatus::Preparing).await;
        advance_all(&hub, "o-1", BatchStatus::Ready).await;
        let done = advance_all(&hub, "o-1", BatchStatus::Done).await;
        assert_eq!(done.order.status, OrderStatus::Done);

        let paid = hub.mark_paid("o-1", "UPI").await.unwrap();
        assert!(paid.applied);
        assert_eq!(paid.order.status, OrderStatus::PaymentDone);

        let seen: Vec<OrderStatus> = std::iter::from_fn(|| events.try_recv())
            .map(|c| c.new_status)
            .collect();
        assert_eq!(
            seen,
            vec![
                OrderStatus::Preparing,
                OrderStatus::Ready,
                OrderStatus::Done,
                OrderStatus::PaymentDone
            ]
        );

        let again = hub.mark_paid("o-1", "UPI").await.unwrap();
        assert!(!again.applied);
        assert!(again.status_change.is_none());
    }

    #[tokio::test]
    async fn test_rejection_leaves_state_untouched() {
        let (_store, hub) = start_hub().await;
        let order = place(&hub, "o-1").await;
        let before = hub.orders_snapshot();

        let err = hub
            .advance_batch("o-1", &order.batches[0].batch_id, BatchStatus::Pending)
            .await
            .unwrap_err();
        assert!(err.is_rejection());
        assert!(matches!(err, SyncError::Rejected(CoreError::InvalidTransition { .. })));
        assert_eq!(hub.orders_snapshot().revision, before.revision);

        let missing = hub.mark_paid("nope", "Cash").await.unwrap_err();
        assert!(matches!(missing, SyncError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_stale_version_precondition_conflicts() {
        let (_store, hub) = start_hub().await;
        let order = place(&hub, "o-1").await;

        hub.set_discount(
            "o-1",
            Some(Discount::flat(Money::from_major(10))),
        )
        .await
        .unwrap();

        let err = hub
            .mutate(MutationRequest::new("o-1", Mutation::Cancel).at_version(order.version))
            .await
            .unwrap_err();
        match err {
            SyncError::Conflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, order.version);
                assert_eq!(actual, order.version + 1);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(hub.order("o-1").unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_lost_race_is_retried() {
        let (store, hub) = start_hub().await;
        place(&hub, "o-1").await;

        store.inject_conflicts(2);
        let outcome = hub.cancel_order("o-1").await.unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (store, hub) = start_hub().await;
        place(&hub, "o-1").await;

        store.inject_conflicts(10);
        let err = hub.cancel_order("o-1").await.unwrap_err();
        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 3, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_keyed_append_is_idempotent() {
        let (_store, hub) = start_hub().await;
        place(&hub, "o-1").await;

        let first = hub.append_batch("o-1", chai(1), Some("k-1")).await.unwrap();
        let retry = hub.append_batch("o-1", chai(1), Some("k-1")).await.unwrap();

        assert!(first.applied);
        assert!(!retry.applied);
        assert_eq!(first.batch_id, retry.batch_id);
        assert_eq!(hub.order("o-1").unwrap().batches.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_advances_on_sibling_batches() {
        let (store, hub) = start_hub().await;
        place(&hub, "o-1").await;
        hub.append_batch("o-1", chai(1), None).await.unwrap();
        let order = hub.order("o-1").unwrap();
        let (first, second) = (&order.batches[0].batch_id, &order.batches[1].batch_id);
        let mut events = hub.status_changes();

        let (kitchen, counter) = (hub.clone(), hub.clone());
        let (a, b) = tokio::join!(
            kitchen.advance_batch("o-1", first, BatchStatus::Preparing),
            counter.advance_batch("o-1", second, BatchStatus::Preparing),
        );
        a.unwrap();
        b.unwrap();

        let stored = store.load_order("o-1").await.unwrap().unwrap();
        assert_eq!(stored.version, order.version + 2);
        assert!(stored.batches.iter().all(|batch| batch.status == BatchStatus::Preparing));
        assert_eq!(stored.status, OrderStatus::Preparing);
        assert_eq!(hub.order("o-1").unwrap(), stored);

        // Only the second commit moves the aggregate.
        let change = events.try_recv().unwrap();
        assert_eq!(change.previous_status, OrderStatus::Pending);
        assert_eq!(change.new_status, OrderStatus::Preparing);
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_status_event_follows_published_snapshot() {
        let (_store, hub) = start_hub().await;
        let ids = ["o-1", "o-2", "o-3", "o-4"];
        for id in ids {
            place(&hub, id).await;
        }
        let mut events = hub.status_changes();

        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let hub = hub.clone();
                let id = id.to_string();
                tokio::spawn(async move { hub.cancel_order(&id).await })
            })
            .collect();

        let mut seen = Vec::new();
        for _ in ids {
            let change = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            // The snapshot already shows what the event announces.
            let cached = hub.order(&change.order_id).unwrap();
            assert_eq!(cached.status, change.new_status);
            seen.push(change.order_id);
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().applied);
        }

        seen.sort();
        assert_eq!(seen, ids);
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_outage_degrades_then_resync_restores() {
        let (store, hub) = start_hub().await;
        place(&hub, "o-1").await;
        let mut sub = hub.subscribe(OrderFilter::Order("o-1".into()));
        sub.next_snapshot().await.unwrap();

        store.set_available(false);
        let err = hub.cancel_order("o-1").await.unwrap_err();
        assert!(err.is_sync_failure());
        assert_eq!(err.code(), "SYNC_FAILURE");
        assert_eq!(hub.link_state(), LinkState::Degraded);
        // Last-known state is still served.
        assert_eq!(sub.current().orders.len(), 1);

        store.set_available(true);
        let mut link = hub.watch_link();
        tokio::time::timeout(Duration::from_secs(5), link.wait_for(|s| *s == LinkState::Connected))
            .await
            .unwrap()
            .unwrap();

        let fresh = sub.next_snapshot().await.unwrap();
        assert_eq!(fresh.orders[0].status, OrderStatus::Pending);
        assert!(hub.cancel_order("o-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_long_outage_still_recovers() {
        let mut config = test_config();
        config.sync.resync_max_elapsed_secs = 1;
        let store = Arc::new(MemoryStore::new());
        let hub = OrderHub::new(store.clone(), config).start().await.unwrap();
        place(&hub, "o-1").await;

        store.set_available(false);
        assert!(hub.cancel_order("o-1").await.is_err());
        assert_eq!(hub.link_state(), LinkState::Degraded);

        // Outlast the elapsed limit before the store comes back.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(hub.link_state(), LinkState::Degraded);
        store.set_available(true);

        let mut link = hub.watch_link();
        tokio::time::timeout(Duration::from_secs(5), link.wait_for(|s| *s == LinkState::Connected))
            .await
            .unwrap()
            .unwrap();
        assert!(hub.cancel_order("o-1").await.unwrap().applied);
    }

    #[tokio::test]
    async fn test_start_degraded_when_store_down() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let hub = OrderHub::new(store.clone(), test_config())
            .start()
            .await
            .unwrap();
        assert_eq!(hub.link_state(), LinkState::Degraded);

        store.set_available(true);
        hub.resync().await.unwrap();
        assert_eq!(hub.link_state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_bill_uses_current_taxes() {
        let (_store, hub) = start_hub().await;
        place(&hub, "o-1").await;
        let gst = hub.add_tax("GST", Rate::whole(5)).await.unwrap();

        let bill = hub.bill("o-1").unwrap();
        assert_eq!(bill.subtotal, Money::from_major(200));
        assert_eq!(bill.grand_total, Money::from_major(210));

        hub.update_tax(&gst.id, Rate::whole(10)).await.unwrap();
        assert_eq!(hub.bill("o-1").unwrap().grand_total, Money::from_major(220));

        hub.remove_tax(&gst.id).await.unwrap();
        assert_eq!(hub.bill("o-1").unwrap().grand_total, Money::from_major(200));
        assert!(hub.taxes_snapshot().rules.is_empty());
    }

    #[tokio::test]
    async fn test_tax_stream_is_independent() {
        let (_store, hub) = start_hub().await;
        let mut taxes = hub.subscribe_taxes();
        let first = taxes.next_snapshot().await.unwrap();

        hub.add_tax("CGST", Rate::from_percentage(Decimal::new(25, 1)))
            .await
            .unwrap();
        let next = taxes.next_snapshot().await.unwrap();
        assert_eq!(next.revision, first.revision + 1);
        assert_eq!(next.rules[0].name, "CGST");

        assert!(hub.add_tax("  ", Rate::whole(1)).await.unwrap_err().is_rejection());
    }

    #[tokio::test]
    async fn test_purge_keeps_open_orders() {
        let (_store, hub) = start_hub().await;
        place(&hub, "open").await;
        place(&hub, "gone").await;
        hub.cancel_order("gone").await.unwrap();

        let removed = hub
            .purge_closed_before(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let ids: Vec<String> = hub.orders_snapshot().orders.iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids, vec!["open".to_string()]);
        // Placed today, so still inside the retention window.
        assert_eq!(hub.purge_prior_days().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_feedback_first_submission_wins() {
        let (_store, hub) = start_hub().await;
        place(&hub, "o-1").await;
        advance_all(&hub, "o-1", BatchStatus::Done).await;
        hub.mark_paid("o-1", "Cash").await.unwrap();

        assert!(hub.attach_feedback("o-1", 5, "Lovely").await.unwrap().applied);
        assert!(!hub.attach_feedback("o-1", 1, "Changed my mind").await.unwrap().applied);

        let digest = hub.feedback_digest();
        assert_eq!(digest.entries.len(), 1);
        assert_eq!(digest.entries[0].rating, 5);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_writes() {
        let (_store, hub) = start_hub().await;
        place(&hub, "o-1").await;
        hub.shutdown().await.unwrap();

        assert!(matches!(
            hub.cancel_order("o-1").await.unwrap_err(),
            SyncError::ShuttingDown
        ));
        assert!(hub.order("o-1").is_some());
    }
}
