//! # Order Lifecycle State Machine
//!
//! Every legal change to an [`Order`] goes through this module.
//!
//! ## Batch Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Pending ──► Preparing ──► Ready ──► Done                              │
//! │      │            │           ▲         ▲                               │
//! │      └────────────┼───────────┘         │    forward skips are fine     │
//! │                   └─────────────────────┘    backward never is          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Order Status
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  derived:   Done            if every batch is Done                     │
//! │             least-advanced  otherwise  ([Done, Ready] → Ready)         │
//! │                                                                         │
//! │  explicit:  Done ──mark_paid──► PaymentDone  (terminal)                │
//! │             any batch ≤ Preparing, unpaid ──cancel──► Cancelled (terminal)
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both tables are single exhaustive `match`es: [`batch_transition`] and
//! [`order_gate`]. Operations check, then mutate. A rejected operation
//! leaves the order byte-for-byte unchanged.
//!
//! Every effective change bumps `version` and `updated_at`. Operations that
//! turn out to be no-ops (repeat payment, repeat feedback, replayed append)
//! touch nothing, so a store never sees a write for them.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::types::{
    Batch, BatchStatus, Discount, Feedback, Order, OrderLine, OrderStatus, PaymentStatus,
};
use crate::validation::{
    validate_comment, validate_customer_name, validate_discount, validate_idempotency_key,
    validate_lines, validate_payment_method, validate_rating, validate_table,
};

// =============================================================================
// Transition Tables
// =============================================================================

/// The batch transition table. Only strictly forward moves are legal.
pub fn batch_transition(batch_id: &str, from: BatchStatus, to: BatchStatus) -> CoreResult<()> {
    use BatchStatus::*;

    match (from, to) {
        (Pending, Preparing | Ready | Done) | (Preparing, Ready | Done) | (Ready, Done) => Ok(()),
        (Pending, Pending)
        | (Preparing, Pending | Preparing)
        | (Ready, Pending | Preparing | Ready)
        | (Done, _) => Err(CoreError::InvalidTransition {
            batch_id: batch_id.to_string(),
            from,
            to,
        }),
    }
}

/// Operations that can be requested against an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOp {
    AdvanceBatch,
    AppendBatch,
    SetDiscount,
    Cancel,
    MarkPaid,
    AttachFeedback,
}

/// The order-level gate: may `op` run while the order is in its current
/// status?
///
/// Batch-level conditions (cancellation needs every batch ≤ Preparing) are
/// checked by the operation itself after the gate passes.
pub fn order_gate(order: &Order, op: OrderOp) -> CoreResult<()> {
    use OrderOp::*;
    use OrderStatus::*;

    let closed = || CoreError::OrderClosed {
        order_id: order.id.clone(),
        status: order.status,
    };

    match (order.status, op) {
        (Pending | Preparing | Ready | Done, AdvanceBatch | AppendBatch | SetDiscount | Cancel) => {
            Ok(())
        }
        (PaymentDone | Cancelled, AdvanceBatch | AppendBatch | SetDiscount) => Err(closed()),

        (Cancelled, Cancel) => Err(closed()),
        (PaymentDone, Cancel) => Err(CoreError::NotCancellable {
            order_id: order.id.clone(),
            reason: "payment already completed".to_string(),
        }),

        // Repeat payment is answered as a no-op by mark_paid.
        (Done | PaymentDone, MarkPaid) => Ok(()),
        (Pending | Preparing | Ready, MarkPaid) => Err(CoreError::NotReadyForPayment {
            order_id: order.id.clone(),
            status: order.status,
        }),
        (Cancelled, MarkPaid) => Err(closed()),

        (PaymentDone, AttachFeedback) => Ok(()),
        (Pending | Preparing | Ready | Done | Cancelled, AttachFeedback) => {
            Err(CoreError::FeedbackNotAllowed {
                order_id: order.id.clone(),
                status: order.status,
            })
        }
    }
}

/// Aggregate status of a set of batches.
///
/// `Done` iff every batch is `Done`, otherwise the least-advanced batch's
/// status. Since `Done` ranks highest this is simply the minimum.
pub fn derive_status(batches: &[Batch]) -> OrderStatus {
    batches
        .iter()
        .map(|b| b.status)
        .min()
        .unwrap_or(BatchStatus::Pending)
        .into()
}

// =============================================================================
// Operations
// =============================================================================

/// What `append_batch` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new batch was added.
    Appended { batch_id: String },
    /// The idempotency key matched an existing batch; nothing changed.
    Replayed { batch_id: String },
}

impl AppendOutcome {
    pub fn batch_id(&self) -> &str {
        match self {
            AppendOutcome::Appended { batch_id } | AppendOutcome::Replayed { batch_id } => batch_id,
        }
    }
}

impl Order {
    /// Places a new order with its first batch.
    ///
    /// ## Example
    /// ```rust
    /// use cafe_core::money::Money;
    /// use cafe_core::types::{OrderLine, OrderStatus};
    /// use cafe_core::Order;
    ///
    /// let lines = vec![OrderLine::new("latte", "Latte", Money::from_major(140), 2)];
    /// let order = Order::place("o-1", " Meera ", Some("T3"), lines, None, chrono::Utc::now()).unwrap();
    ///
    /// assert_eq!(order.customer, "Meera");
    /// assert_eq!(order.status, OrderStatus::Pending);
    /// assert_eq!(order.total, Money::from_major(280));
    /// assert_eq!(order.version, 1);
    /// ```
    pub fn place(
        id: impl Into<String>,
        customer: &str,
        table: Option<&str>,
        lines: Vec<OrderLine>,
        idempotency_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<Order> {
        let customer = validate_customer_name(customer)?;
        let table = validate_table(table)?;
        validate_lines(&lines)?;
        let idempotency_key = idempotency_key.map(validate_idempotency_key).transpose()?;

        let mut order = Order {
            id: id.into(),
            customer,
            table,
            batches: Vec::new(),
            total: Default::default(),
            status: OrderStatus::Pending,
            discount: None,
            payment_status: None,
            payment_method: None,
            paid_at: None,
            feedback: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        order.push_batch(lines, idempotency_key, now)?;
        order.touch(now);
        Ok(order)
    }

    /// Moves one batch strictly forward and re-derives the order status.
    pub fn advance_batch(
        &mut self,
        batch_id: &str,
        target: BatchStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        order_gate(self, OrderOp::AdvanceBatch)?;

        let index = self
            .batches
            .iter()
            .position(|b| b.batch_id == batch_id)
            .ok_or_else(|| CoreError::BatchNotFound {
                order_id: self.id.clone(),
                batch_id: batch_id.to_string(),
            })?;
        batch_transition(batch_id, self.batches[index].status, target)?;

        self.batches[index].status = target;
        self.status = derive_status(&self.batches);
        self.touch(now);
        Ok(())
    }

    /// Cancels the order.
    ///
    /// ## Rules
    /// - Not already closed
    /// - Not paid
    /// - No batch has moved past `Preparing`
    pub fn cancel(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        order_gate(self, OrderOp::Cancel)?;

        if self.is_paid() {
            return Err(CoreError::NotCancellable {
                order_id: self.id.clone(),
                reason: "payment already completed".to_string(),
            });
        }
        if let Some(batch) = self.batches.iter().find(|b| b.status > BatchStatus::Preparing) {
            return Err(CoreError::NotCancellable {
                order_id: self.id.clone(),
                reason: format!("batch {} is already {}", batch.batch_id, batch.status),
            });
        }

        self.status = OrderStatus::Cancelled;
        self.touch(now);
        Ok(())
    }

    /// Adds a batch of lines to an open order.
    ///
    /// With an idempotency key that already created a batch on this order,
    /// nothing changes and that batch's id is returned.
    pub fn append_batch(
        &mut self,
        lines: Vec<OrderLine>,
        idempotency_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<AppendOutcome> {
        order_gate(self, OrderOp::AppendBatch)?;

        let key = idempotency_key.map(validate_idempotency_key).transpose()?;
        if let Some(existing) = key.as_deref().and_then(|k| self.batch_by_key(k)) {
            return Ok(AppendOutcome::Replayed {
                batch_id: existing.batch_id.clone(),
            });
        }
        validate_lines(&lines)?;

        let batch_id = self.push_batch(lines, key, now)?;
        self.status = derive_status(&self.batches);
        self.touch(now);
        Ok(AppendOutcome::Appended { batch_id })
    }

    /// Settles the order. Returns `false` when it was already settled.
    pub fn mark_paid(&mut self, method: &str, now: DateTime<Utc>) -> CoreResult<bool> {
        order_gate(self, OrderOp::MarkPaid)?;
        if self.status == OrderStatus::PaymentDone {
            return Ok(false);
        }
        let method = validate_payment_method(method)?;

        self.payment_status = Some(PaymentStatus::Paid);
        self.payment_method = Some(method);
        self.paid_at = Some(now);
        self.status = OrderStatus::PaymentDone;
        self.touch(now);
        Ok(true)
    }

    /// Records customer feedback. The first submission is final; later
    /// ones return `false` and change nothing.
    pub fn attach_feedback(
        &mut self,
        rating: u8,
        comment: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        order_gate(self, OrderOp::AttachFeedback)?;
        validate_rating(rating)?;
        let comment = validate_comment(comment)?;

        if self.feedback.is_some() {
            return Ok(false);
        }

        self.feedback = Some(Feedback {
            rating,
            comment,
            submitted_at: now,
        });
        self.touch(now);
        Ok(true)
    }

    /// Sets or clears the discount. Returns `false` if it was already that.
    pub fn set_discount(&mut self, discount: Option<Discount>, now: DateTime<Utc>) -> CoreResult<bool> {
        order_gate(self, OrderOp::SetDiscount)?;
        if let Some(d) = &discount {
            validate_discount(d)?;
        }
        if self.discount == discount {
            return Ok(false);
        }

        self.discount = discount;
        self.touch(now);
        Ok(true)
    }

    /// Sum of every line extension, recomputed from the batches.
    pub fn recomputed_total(&self) -> CoreResult<crate::Money> {
        self.batches.iter().try_fold(crate::Money::zero(), |acc, batch| {
            acc.checked_add(batch.subtotal()?)
                .ok_or_else(|| CoreError::overflow("order total"))
        })
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn batch_by_key(&self, key: &str) -> Option<&Batch> {
        self.batches
            .iter()
            .find(|b| b.idempotency_key.as_deref() == Some(key))
    }

    /// Fails without touching the order if the new total would overflow.
    fn push_batch(
        &mut self,
        lines: Vec<OrderLine>,
        key: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<String> {
        let batch = Batch {
            batch_id: self.next_batch_id(now),
            items: lines,
            status: BatchStatus::Pending,
            created_at: now,
            idempotency_key: key,
        };
        let total = self
            .total
            .checked_add(batch.subtotal()?)
            .ok_or_else(|| CoreError::overflow("order total"))?;

        self.total = total;
        let id = batch.batch_id.clone();
        self.batches.push(batch);
        Ok(id)
    }

    /// Nanosecond timestamp, bumped past every numeric id already on the
    /// order so ids stay unique and increasing even within one tick.
    fn next_batch_id(&self, now: DateTime<Utc>) -> String {
        let stamp = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000));
        let floor = self
            .batches
            .iter()
            .filter_map(|b| b.batch_id.parse::<i64>().ok())
            .max()
            .map(|max| max.saturating_add(1))
            .unwrap_or(i64::MIN);
        stamp.max(floor).to_string()
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn latte(qty: u32) -> OrderLine {
        OrderLine::new("latte", "Latte", Money::from_major(140), qty)
    }

    fn muffin(qty: u32) -> OrderLine {
        OrderLine::new("muffin", "Muffin", Money::from_cents(8550), qty)
    }

    fn placed() -> Order {
        Order::place("o-1", "Meera", Some("T2"), vec![latte(2)], None, at(0)).unwrap()
    }

    fn first_batch(order: &Order) -> String {
        order.batches[0].batch_id.clone()
    }

    fn all_done(order: &mut Order) {
        let ids: Vec<String> = order
            .batches
            .iter()
            .filter(|b| b.status != BatchStatus::Done)
            .map(|b| b.batch_id.clone())
            .collect();
        for id in ids {
            order.advance_batch(&id, BatchStatus::Done, at(60)).unwrap();
        }
    }

    #[test]
    fn test_place_order() {
        let order = placed();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.batches.len(), 1);
        assert_eq!(order.total, Money::from_major(280));
        assert_eq!(order.table.as_deref(), Some("T2"));
        assert_eq!(order.version, 1);
    }

    #[test]
    fn test_place_requires_customer_and_items() {
        assert!(Order::place("o", "  ", None, vec![latte(1)], None, at(0)).is_err());
        assert!(Order::place("o", "Meera", None, vec![], None, at(0)).is_err());
        assert!(Order::place("o", "Meera", None, vec![latte(0)], None, at(0)).is_err());
    }

    #[test]
    fn test_transition_table_is_strictly_forward() {
        for from in BatchStatus::ALL {
            for to in BatchStatus::ALL {
                let result = batch_transition("b", from, to);
                assert_eq!(result.is_ok(), to > from, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_advance_batch_updates_status() {
        let mut order = placed();
        let id = first_batch(&order);

        order.advance_batch(&id, BatchStatus::Preparing, at(10)).unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);
        assert_eq!(order.updated_at, at(10));
        assert_eq!(order.version, 2);

        order.advance_batch(&id, BatchStatus::Done, at(20)).unwrap();
        assert_eq!(order.status, OrderStatus::Done);
    }

    #[test]
    fn test_backward_move_rejected_and_unchanged() {
        let mut order = placed();
        let id = first_batch(&order);
        order.advance_batch(&id, BatchStatus::Done, at(10)).unwrap();
        let before = order.clone();

        let err = order.advance_batch(&id, BatchStatus::Preparing, at(20)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(order, before);
    }

    #[test]
    fn test_unknown_batch() {
        let mut order = placed();
        let err = order.advance_batch("nope", BatchStatus::Ready, at(1)).unwrap_err();
        assert_eq!(err.code(), "BATCH_NOT_FOUND");
    }

    #[test]
    fn test_aggregate_is_least_advanced() {
        let mut order = placed();
        let first = first_batch(&order);
        order.append_batch(vec![muffin(1)], None, at(5)).unwrap();
        let second = order.batches[1].batch_id.clone();

        order.advance_batch(&first, BatchStatus::Done, at(10)).unwrap();
        order.advance_batch(&second, BatchStatus::Ready, at(11)).unwrap();
        assert_eq!(order.status, OrderStatus::Ready);

        order.advance_batch(&second, BatchStatus::Done, at(12)).unwrap();
        assert_eq!(order.status, OrderStatus::Done);
    }

    #[test]
    fn test_derive_status_over_all_combinations() {
        for a in BatchStatus::ALL {
            for b in BatchStatus::ALL {
                for c in BatchStatus::ALL {
                    let batches: Vec<Batch> = [a, b, c]
                        .iter()
                        .enumerate()
                        .map(|(i, status)| Batch {
                            batch_id: i.to_string(),
                            items: vec![latte(1)],
                            status: *status,
                            created_at: at(0),
                            idempotency_key: None,
                        })
                        .collect();
                    let derived = derive_status(&batches);
                    let every_done = [a, b, c].iter().all(|s| *s == BatchStatus::Done);
                    assert_eq!(derived == OrderStatus::Done, every_done);
                    assert_eq!(derived, OrderStatus::from(a.min(b).min(c)));
                }
            }
        }
    }

    #[test]
    fn test_append_batch_extends_total_and_reopens() {
        let mut order = placed();
        all_done(&mut order);
        assert_eq!(order.status, OrderStatus::Done);

        let outcome = order.append_batch(vec![muffin(2)], None, at(90)).unwrap();
        assert!(matches!(outcome, AppendOutcome::Appended { .. }));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, Money::from_major(280) + Money::from_cents(17100));
        assert_eq!(order.total, order.recomputed_total().unwrap());
    }

    #[test]
    fn test_overflowing_amounts_rejected_without_change() {
        let huge = OrderLine::new("gold", "Gold Leaf", Money::new(Decimal::MAX), 2);
        let err = Order::place("o-9", "Meera", None, vec![huge], None, at(0)).unwrap_err();
        assert_eq!(err.code(), "INVALID_BILLING_INPUT");

        let single = OrderLine::new("gold", "Gold Leaf", Money::new(Decimal::MAX), 1);
        let mut order = Order::place("o-9", "Meera", None, vec![single.clone()], None, at(0)).unwrap();
        let before = order.clone();
        assert!(order.append_batch(vec![single], None, at(5)).is_err());
        assert_eq!(order, before);
    }

    #[test]
    fn test_batch_ids_unique_within_same_instant() {
        let mut order = placed();
        order.append_batch(vec![muffin(1)], None, at(0)).unwrap();
        order.append_batch(vec![muffin(1)], None, at(0)).unwrap();

        let ids: Vec<i64> = order
            .batches
            .iter()
            .map(|b| b.batch_id.parse().unwrap())
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_append_with_replayed_key_is_noop() {
        let mut order = placed();
        let first = order.append_batch(vec![muffin(1)], Some("k-1"), at(5)).unwrap();
        let snapshot = order.clone();

        let again = order.append_batch(vec![muffin(1)], Some("k-1"), at(6)).unwrap();
        assert!(matches!(again, AppendOutcome::Replayed { .. }));
        assert_eq!(again.batch_id(), first.batch_id());
        assert_eq!(order, snapshot);
    }

    #[test]
    fn test_append_rejected_on_closed_order() {
        let mut order = placed();
        all_done(&mut order);
        order.mark_paid("Cash", at(100)).unwrap();
        let before = order.clone();

        let err = order.append_batch(vec![muffin(1)], None, at(101)).unwrap_err();
        assert!(matches!(err, CoreError::OrderClosed { .. }));
        assert_eq!(order, before);

        let mut cancelled = placed();
        cancelled.cancel(at(1)).unwrap();
        let err = cancelled.append_batch(vec![muffin(1)], None, at(2)).unwrap_err();
        assert_eq!(err.code(), "ORDER_CLOSED");
    }

    #[test]
    fn test_mark_paid_requires_done() {
        let mut order = placed();
        let id = first_batch(&order);
        order.advance_batch(&id, BatchStatus::Ready, at(10)).unwrap();

        let err = order.mark_paid("Cash", at(11)).unwrap_err();
        assert!(matches!(err, CoreError::NotReadyForPayment { .. }));
        assert!(order.payment_status.is_none());

        order.advance_batch(&id, BatchStatus::Done, at(12)).unwrap();
        assert!(order.mark_paid("Online", at(13)).unwrap());
        assert_eq!(order.status, OrderStatus::PaymentDone);
        assert_eq!(order.payment_method.as_deref(), Some("Online"));
        assert_eq!(order.paid_at, Some(at(13)));
    }

    #[test]
    fn test_mark_paid_twice_is_noop() {
        let mut order = placed();
        all_done(&mut order);
        order.mark_paid("Cash", at(100)).unwrap();
        let before = order.clone();

        assert!(!order.mark_paid("Card", at(200)).unwrap());
        assert_eq!(order, before);
    }

    #[test]
    fn test_advance_after_payment_is_closed() {
        let mut order = placed();
        all_done(&mut order);
        order.mark_paid("Cash", at(100)).unwrap();
        let id = first_batch(&order);
        let err = order.advance_batch(&id, BatchStatus::Done, at(101)).unwrap_err();
        assert_eq!(err.code(), "ORDER_CLOSED");
    }

    #[test]
    fn test_cancel_rules() {
        let mut order = placed();
        let id = first_batch(&order);
        order.advance_batch(&id, BatchStatus::Preparing, at(1)).unwrap();
        order.cancel(at(2)).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);

        let err = order.cancel(at(3)).unwrap_err();
        assert_eq!(err.code(), "ORDER_CLOSED");

        let mut ready = placed();
        let id = first_batch(&ready);
        ready.advance_batch(&id, BatchStatus::Ready, at(1)).unwrap();
        let before = ready.clone();
        let err = ready.cancel(at(2)).unwrap_err();
        assert!(matches!(err, CoreError::NotCancellable { .. }));
        assert_eq!(ready, before);
    }

    #[test]
    fn test_cancel_after_payment() {
        let mut order = placed();
        all_done(&mut order);
        order.mark_paid("Cash", at(100)).unwrap();
        let err = order.cancel(at(101)).unwrap_err();
        assert_eq!(err.code(), "NOT_CANCELLABLE");
    }

    #[test]
    fn test_feedback_first_submission_is_final() {
        let mut order = placed();
        let err = order.attach_feedback(5, "lovely", at(1)).unwrap_err();
        assert_eq!(err.code(), "FEEDBACK_NOT_ALLOWED");

        all_done(&mut order);
        order.mark_paid("Cash", at(100)).unwrap();
        assert!(order.attach_feedback(4, " great coffee ", at(110)).unwrap());
        let before = order.clone();

        assert!(!order.attach_feedback(1, "changed my mind", at(120)).unwrap());
        assert_eq!(order, before);
        let feedback = order.feedback.as_ref().unwrap();
        assert_eq!(feedback.rating, 4);
        assert_eq!(feedback.comment, "great coffee");
    }

    #[test]
    fn test_feedback_rating_range() {
        let mut order = placed();
        all_done(&mut order);
        order.mark_paid("Cash", at(100)).unwrap();
        assert!(order.attach_feedback(0, "", at(101)).is_err());
        assert!(order.attach_feedback(6, "", at(101)).is_err());
        assert!(order.feedback.is_none());
    }

    #[test]
    fn test_set_discount() {
        let mut order = placed();
        let ten = Discount::percentage(Decimal::from(10));
        assert!(order.set_discount(Some(ten), at(1)).unwrap());
        assert!(!order.set_discount(Some(ten), at(2)).unwrap());
        assert_eq!(order.updated_at, at(1));

        assert!(order.set_discount(None, at(3)).unwrap());
        assert!(order.discount.is_none());

        let negative = Discount::flat(Money::from_major(-5));
        assert!(order.set_discount(Some(negative), at(4)).is_err());
    }
}
