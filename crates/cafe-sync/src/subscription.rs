//! # Snapshot Subscriptions
//!
//! Live streams of full snapshots. A subscription never sees a diff: each
//! item is the whole collection (narrowed by its filter) as of one commit.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Subscription Lifecycle                              │
//! │                                                                         │
//! │   subscribe(filter) ──► first item: current snapshot                    │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   every commit ──────► next item: new snapshot (latest wins if the     │
//! │          │              subscriber falls behind)                        │
//! │          ▼                                                              │
//! │   reconnect() ───────► next item: current snapshot again               │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   drop ──────────────► nothing else happens; store is untouched        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use cafe_core::StatusChange;
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::warn;

use crate::protocol::{OrderFilter, OrdersSnapshot, TaxSnapshot};

/// A stream of [`OrdersSnapshot`]s narrowed to one [`OrderFilter`].
pub struct OrderSubscription {
    source: watch::Receiver<Arc<OrdersSnapshot>>,
    stream: WatchStream<Arc<OrdersSnapshot>>,
    filter: OrderFilter,
}

impl OrderSubscription {
    pub(crate) fn new(source: watch::Receiver<Arc<OrdersSnapshot>>, filter: OrderFilter) -> Self {
        OrderSubscription {
            stream: WatchStream::new(source.clone()),
            source,
            filter,
        }
    }

    pub fn filter(&self) -> &OrderFilter {
        &self.filter
    }

    /// The latest snapshot, without waiting.
    pub fn current(&self) -> OrdersSnapshot {
        self.source.borrow().filtered(&self.filter)
    }

    /// Starts over: the next item is the full current snapshot, whether or
    /// not anything changed since the last one.
    pub fn reconnect(&mut self) {
        self.stream = WatchStream::new(self.source.clone());
    }

    /// Waits for the next snapshot. `None` once the hub is gone.
    pub async fn next_snapshot(&mut self) -> Option<OrdersSnapshot> {
        self.next().await
    }
}

impl Stream for OrderSubscription {
    type Item = OrdersSnapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.stream.poll_next_unpin(cx) {
            Poll::Ready(Some(snapshot)) => Poll::Ready(Some(snapshot.filtered(&this.filter))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A stream of [`TaxSnapshot`]s, independent of the order stream.
pub struct TaxSubscription {
    source: watch::Receiver<Arc<TaxSnapshot>>,
    stream: WatchStream<Arc<TaxSnapshot>>,
}

impl TaxSubscription {
    pub(crate) fn new(source: watch::Receiver<Arc<TaxSnapshot>>) -> Self {
        TaxSubscription {
            stream: WatchStream::new(source.clone()),
            source,
        }
    }

    pub fn current(&self) -> TaxSnapshot {
        self.source.borrow().as_ref().clone()
    }

    pub fn reconnect(&mut self) {
        self.stream = WatchStream::new(self.source.clone());
    }

    pub async fn next_snapshot(&mut self) -> Option<TaxSnapshot> {
        self.next().await
    }
}

impl Stream for TaxSubscription {
    type Item = TaxSnapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .stream
            .poll_next_unpin(cx)
            .map(|item| item.map(|snapshot| snapshot.as_ref().clone()))
    }
}

/// Status-change events for one listener.
///
/// A listener that falls more than the channel capacity behind loses the
/// oldest events; the gap is logged and delivery resumes.
pub struct StatusFeed {
    rx: broadcast::Receiver<StatusChange>,
}

impl StatusFeed {
    pub(crate) fn new(rx: broadcast::Receiver<StatusChange>) -> Self {
        StatusFeed { rx }
    }

    /// Waits for the next change. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<StatusChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status listener lagged - events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// The next change if one is already queued.
    pub fn try_recv(&mut self) -> Option<StatusChange> {
        loop {
            match self.rx.try_recv() {
                Ok(change) => return Some(change),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status listener lagged - events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafe_core::{Money, Order, OrderLine};
    use chrono::Utc;

    fn snapshot(revision: u64, ids: &[&str]) -> Arc<OrdersSnapshot> {
        let orders = ids
            .iter()
            .map(|id| {
                let lines = vec![OrderLine::new("tea", "Tea", Money::from_major(60), 1)];
                Order::place(*id, "Ann", None, lines, None, Utc::now()).unwrap()
            })
            .collect();
        Arc::new(OrdersSnapshot {
            revision,
            orders,
            taken_at: None,
        })
    }

    #[tokio::test]
    async fn test_first_item_is_current_snapshot() {
        let (tx, rx) = watch::channel(snapshot(1, &["o-1", "o-2"]));
        let mut sub = OrderSubscription::new(rx, OrderFilter::Order("o-2".into()));

        let first = sub.next_snapshot().await.unwrap();
        assert_eq!(first.revision, 1);
        assert_eq!(first.orders.len(), 1);
        assert_eq!(first.orders[0].id, "o-2");

        tx.send_replace(snapshot(2, &["o-1", "o-2", "o-3"]));
        assert_eq!(sub.next_snapshot().await.unwrap().revision, 2);
    }

    #[tokio::test]
    async fn test_reconnect_replays_full_snapshot() {
        let (_tx, rx) = watch::channel(snapshot(7, &["o-1"]));
        let mut sub = OrderSubscription::new(rx, OrderFilter::All);
        assert_eq!(sub.next_snapshot().await.unwrap().revision, 7);

        sub.reconnect();
        let again = sub.next_snapshot().await.unwrap();
        assert_eq!(again.revision, 7);
        assert_eq!(again.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_ends_when_hub_drops() {
        let (tx, rx) = watch::channel(Arc::new(TaxSnapshot::default()));
        let mut sub = TaxSubscription::new(rx);
        assert!(sub.next_snapshot().await.is_some());

        drop(tx);
        assert!(sub.next_snapshot().await.is_none());
        assert_eq!(sub.current().revision, 0);
    }

    #[tokio::test]
    async fn test_lagging_status_feed_skips_ahead() {
        let (tx, rx) = broadcast::channel(2);
        let mut feed = StatusFeed::new(rx);
        let order = snapshot(1, &["o-1"]).orders[0].clone();
        let mut cancelled = order.clone();
        cancelled.cancel(Utc::now()).unwrap();

        for _ in 0..3 {
            tx.send(StatusChange::between(&order, &cancelled).unwrap()).unwrap();
        }
        // Oldest event was overwritten; the two newest remain.
        assert!(feed.try_recv().is_some());
        assert!(feed.try_recv().is_some());
        assert!(feed.try_recv().is_none());

        drop(tx);
        assert!(feed.recv().await.is_none());
    }
}
