//! # Dashboard and Reporting Views
//!
//! Read-only projections over a set of orders. Nothing here mutates an
//! order or deletes one: purging is a separate, explicit operation that
//! only *uses* [`purge_candidates`] to pick what to delete.
//!
//! ## Cashier Dashboard
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬──────────────┬──────────────┐
//! │   Pending    │  Preparing   │    Ready     │ Done, unpaid │  Paid today  │
//! │  (batches)   │  (batches)   │  (batches)   │   (orders)   │   (orders)   │
//! │  oldest ↑    │  oldest ↑    │  oldest ↑    │              │              │
//! └──────────────┴──────────────┴──────────────┴──────────────┴──────────────┘
//! ```
//!
//! Business days are local to the café, given as a fixed UTC offset.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{BatchStatus, Order, OrderLine, OrderStatus, TaxRule};

// =============================================================================
// Business Day Helpers
// =============================================================================

/// The café-local calendar date of an instant.
pub fn business_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// The UTC instant at which the business day containing `at` began.
pub fn business_day_start(at: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local_midnight = business_date(at, offset).and_time(NaiveTime::MIN);
    offset
        .from_local_datetime(&local_midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(at)
}

/// Orders created before this instant are old enough to purge.
///
/// `retention_days = 0` keeps only today; `1` keeps today and yesterday.
pub fn purge_cutoff(now: DateTime<Utc>, offset: FixedOffset, retention_days: u32) -> DateTime<Utc> {
    business_day_start(now, offset) - Duration::days(i64::from(retention_days))
}

// =============================================================================
// Kitchen Board
// =============================================================================

/// One batch in a kitchen lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BatchRow {
    pub order_id: String,
    pub batch_id: String,
    pub customer: String,
    pub table: Option<String>,
    pub items: Vec<OrderLine>,
    pub subtotal: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// One order in the payment columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderRow {
    pub order_id: String,
    pub customer: String,
    pub table: Option<String>,
    pub total: Money,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
}

impl From<&Order> for OrderRow {
    fn from(order: &Order) -> Self {
        OrderRow {
            order_id: order.id.clone(),
            customer: order.customer.clone(),
            table: order.table.clone(),
            total: order.total,
            status: order.status,
            payment_method: order.payment_method.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct KitchenBoard {
    pub pending: Vec<BatchRow>,
    pub preparing: Vec<BatchRow>,
    pub ready: Vec<BatchRow>,
    pub done_unpaid: Vec<OrderRow>,
    pub paid_today: Vec<OrderRow>,
}

impl KitchenBoard {
    /// Builds the dashboard. Cancelled orders appear nowhere.
    pub fn build(orders: &[Order], now: DateTime<Utc>, offset: FixedOffset) -> CoreResult<KitchenBoard> {
        let today = business_date(now, offset);
        let mut board = KitchenBoard::default();

        for order in orders {
            match order.status {
                OrderStatus::Cancelled => continue,
                OrderStatus::PaymentDone => {
                    let paid_at = order.paid_at.unwrap_or(order.updated_at);
                    if business_date(paid_at, offset) == today {
                        board.paid_today.push(OrderRow::from(order));
                    }
                    continue;
                }
                OrderStatus::Done if !order.is_paid() => {
                    board.done_unpaid.push(OrderRow::from(order));
                }
                _ => {}
            }

            for batch in &order.batches {
                let lane = match batch.status {
                    BatchStatus::Pending => &mut board.pending,
                    BatchStatus::Preparing => &mut board.preparing,
                    BatchStatus::Ready => &mut board.ready,
                    BatchStatus::Done => continue,
                };
                lane.push(BatchRow {
                    order_id: order.id.clone(),
                    batch_id: batch.batch_id.clone(),
                    customer: order.customer.clone(),
                    table: order.table.clone(),
                    items: batch.items.clone(),
                    subtotal: batch.subtotal()?,
                    created_at: batch.created_at,
                });
            }
        }

        for lane in [&mut board.pending, &mut board.preparing, &mut board.ready] {
            lane.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        Ok(board)
    }
}

// =============================================================================
// Daily Summaries
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub orders: u32,
    /// Sum of grand totals, unrounded.
    pub income: Money,
}

/// Settled orders grouped by the business day they were placed, newest
/// day first. Each order's income is its full bill against `taxes`.
pub fn daily_summaries(
    orders: &[Order],
    taxes: &[TaxRule],
    offset: FixedOffset,
) -> CoreResult<Vec<DailySummary>> {
    let mut days: BTreeMap<NaiveDate, (u32, Money)> = BTreeMap::new();

    for order in orders.iter().filter(|o| o.status == OrderStatus::PaymentDone) {
        let bill = order.bill(taxes)?;
        let entry = days
            .entry(business_date(order.created_at, offset))
            .or_insert((0, Money::zero()));
        entry.0 += 1;
        entry.1 = entry
            .1
            .checked_add(bill.grand_total)
            .ok_or_else(|| CoreError::overflow("daily income"))?;
    }

    Ok(days
        .into_iter()
        .rev()
        .map(|(date, (orders, income))| DailySummary {
            date,
            orders,
            income,
        })
        .collect())
}

// =============================================================================
// Feedback Digest
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub order_id: String,
    pub customer: String,
    pub rating: u8,
    pub comment: String,
    #[ts(as = "String")]
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDigest {
    /// Newest first.
    pub entries: Vec<FeedbackEntry>,
    /// Mean rating to one decimal place; `None` without any feedback.
    #[ts(type = "number | null")]
    pub average_rating: Option<Decimal>,
}

impl FeedbackDigest {
    pub fn collect(orders: &[Order]) -> FeedbackDigest {
        let mut entries: Vec<FeedbackEntry> = orders
            .iter()
            .filter_map(|order| {
                order.feedback.as_ref().map(|f| FeedbackEntry {
                    order_id: order.id.clone(),
                    customer: order.customer.clone(),
                    rating: f.rating,
                    comment: f.comment.clone(),
                    submitted_at: f.submitted_at,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

        let average_rating = (!entries.is_empty()).then(|| {
            let sum: u32 = entries.iter().map(|e| u32::from(e.rating)).sum();
            (Decimal::from(sum) / Decimal::from(entries.len() as u64))
                .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
        });

        FeedbackDigest {
            entries,
            average_rating,
        }
    }
}

// =============================================================================
// Purge Selection
// =============================================================================

/// Ids of settled or cancelled orders created before `cutoff`.
/// Open orders are never selected, however old.
pub fn purge_candidates(orders: &[Order], cutoff: DateTime<Utc>) -> Vec<String> {
    orders
        .iter()
        .filter(|o| o.is_closed() && o.created_at < cutoff)
        .map(|o| o.id.clone())
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Rate, TaxRule};

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn order(id: &str, placed: DateTime<Utc>, price: i64) -> Order {
        let line = OrderLine::new("item", "Item", Money::from_major(price), 1);
        Order::place(id, "Guest", None, vec![line], None, placed).unwrap()
    }

    fn settle(order: &mut Order, at: DateTime<Utc>) {
        let id = order.batches[0].batch_id.clone();
        order.advance_batch(&id, BatchStatus::Done, at).unwrap();
        order.mark_paid("Cash", at).unwrap();
    }

    #[test]
    fn test_business_date_uses_offset() {
        // 20:00 UTC is already the next day in India
        let at = utc(2024, 3, 1, 20, 0);
        assert_eq!(business_date(at, ist()), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(business_day_start(at, ist()), utc(2024, 3, 1, 18, 30));
    }

    #[test]
    fn test_purge_cutoff() {
        let now = utc(2024, 3, 5, 6, 0);
        let offset = FixedOffset::east_opt(0).unwrap();
        assert_eq!(purge_cutoff(now, offset, 0), utc(2024, 3, 5, 0, 0));
        assert_eq!(purge_cutoff(now, offset, 2), utc(2024, 3, 3, 0, 0));
    }

    #[test]
    fn test_board_lanes() {
        let now = utc(2024, 3, 1, 8, 0);
        let mut a = order("a", utc(2024, 3, 1, 7, 0), 100);
        let mut b = order("b", utc(2024, 3, 1, 6, 0), 50);
        let mut c = order("c", utc(2024, 3, 1, 5, 0), 70);
        let mut d = order("d", utc(2024, 3, 1, 4, 0), 80);

        let a_batch = a.batches[0].batch_id.clone();
        a.advance_batch(&a_batch, BatchStatus::Ready, now).unwrap();
        a.append_batch(vec![OrderLine::new("x", "X", Money::from_major(10), 1)], None, now)
            .unwrap();

        let c_batch = c.batches[0].batch_id.clone();
        c.advance_batch(&c_batch, BatchStatus::Done, now).unwrap();
        settle(&mut d, now);
        b.cancel(now).unwrap();

        let board = KitchenBoard::build(&[a, b, c, d], now, ist()).unwrap();
        assert_eq!(board.ready.len(), 1);
        assert_eq!(board.pending.len(), 1);
        assert_eq!(board.pending[0].order_id, "a");
        assert_eq!(board.pending[0].subtotal, Money::from_major(10));
        assert!(board.preparing.is_empty());
        assert_eq!(board.done_unpaid.len(), 1);
        assert_eq!(board.done_unpaid[0].order_id, "c");
        assert_eq!(board.paid_today.len(), 1);
        assert_eq!(board.paid_today[0].order_id, "d");
    }

    #[test]
    fn test_board_lane_is_oldest_first() {
        let now = utc(2024, 3, 1, 8, 0);
        let late = order("late", utc(2024, 3, 1, 7, 30), 10);
        let early = order("early", utc(2024, 3, 1, 7, 0), 10);
        let board = KitchenBoard::build(&[late, early], now, ist()).unwrap();
        let ids: Vec<_> = board.pending.iter().map(|r| r.order_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_daily_summaries_newest_first_with_taxes() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let taxes = vec![TaxRule {
            id: "gst".into(),
            name: "GST".into(),
            percentage: Rate::whole(5),
        }];

        let mut day1_a = order("1a", utc(2024, 3, 1, 9, 0), 100);
        let mut day1_b = order("1b", utc(2024, 3, 1, 10, 0), 200);
        let mut day2 = order("2", utc(2024, 3, 2, 9, 0), 40);
        let open = order("open", utc(2024, 3, 2, 9, 30), 999);
        settle(&mut day1_a, utc(2024, 3, 1, 9, 30));
        settle(&mut day1_b, utc(2024, 3, 1, 10, 30));
        settle(&mut day2, utc(2024, 3, 2, 9, 30));

        let summaries = daily_summaries(&[day1_a, day2, open, day1_b], &taxes, offset).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(summaries[0].orders, 1);
        assert_eq!(summaries[0].income, Money::from_major(42));
        assert_eq!(summaries[1].orders, 2);
        assert_eq!(summaries[1].income, Money::from_major(315));
    }

    #[test]
    fn test_feedback_digest() {
        let at = utc(2024, 3, 1, 9, 0);
        let mut first = order("f1", at, 10);
        let mut second = order("f2", at, 10);
        let mut third = order("f3", at, 10);
        for (o, rating, when) in [(&mut first, 5, 1), (&mut second, 4, 2), (&mut third, 4, 3)] {
            settle(o, at);
            o.attach_feedback(rating, "", at + Duration::minutes(when)).unwrap();
        }

        let digest = FeedbackDigest::collect(&[first, second, third, order("none", at, 1)]);
        assert_eq!(digest.entries.len(), 3);
        assert_eq!(digest.entries[0].order_id, "f3");
        assert_eq!(digest.average_rating, Some(Decimal::new(43, 1)));

        assert_eq!(FeedbackDigest::collect(&[]).average_rating, None);
    }

    #[test]
    fn test_purge_candidates_only_closed_and_old() {
        let cutoff = utc(2024, 3, 2, 0, 0);
        let mut old_paid = order("old-paid", utc(2024, 3, 1, 9, 0), 10);
        settle(&mut old_paid, utc(2024, 3, 1, 9, 30));
        let mut old_cancelled = order("old-cancelled", utc(2024, 3, 1, 9, 0), 10);
        old_cancelled.cancel(utc(2024, 3, 1, 9, 5)).unwrap();
        let old_open = order("old-open", utc(2024, 3, 1, 9, 0), 10);
        let mut new_paid = order("new-paid", utc(2024, 3, 2, 9, 0), 10);
        settle(&mut new_paid, utc(2024, 3, 2, 9, 30));

        let ids = purge_candidates(&[old_paid, old_cancelled, old_open, new_paid], cutoff);
        assert_eq!(ids, vec!["old-paid".to_string(), "old-cancelled".to_string()]);
    }
}
