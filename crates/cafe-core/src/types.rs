//! # Domain Types
//!
//! The order document and everything it is made of.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Order Document                                 │
//! │                                                                         │
//! │  Order ─┬─ customer, table                                              │
//! │         ├─ batches: [Batch] ─┬─ batch_id (unique, increasing)           │
//! │         │   (append-only)    ├─ status: BatchStatus                     │
//! │         │                    └─ items: [OrderLine] (prices frozen)      │
//! │         ├─ total   = Σ qty × unit_price over every line                 │
//! │         ├─ status  = derived from batches, or PaymentDone / Cancelled   │
//! │         ├─ discount?  payment_status?  feedback?                        │
//! │         └─ version (bumped by every committed change)                   │
//! │                                                                         │
//! │  TaxRule  { id, name, percentage }   - independent of any order        │
//! │  MenuItem { id, name, price, ... }   - read-only catalog entry         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Field names are camelCase, statuses are PascalCase strings
//! (`"PaymentDone"`), discounts are `{ "type": "percentage", "value": 10 }`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::validation::ValidationResult;

// =============================================================================
// Rate
// =============================================================================

/// A percentage such as `5` for 5%.
///
/// Kept as an exact decimal so `2.5%` stays `2.5`. Negative values are
/// representable on purpose: billing rejects them with a typed error
/// instead of failing to deserialize a stored rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(#[ts(type = "number")] Decimal);

impl Rate {
    #[inline]
    pub const fn from_percentage(pct: Decimal) -> Self {
        Rate(pct)
    }

    /// Convenience for whole percentages.
    #[inline]
    pub fn whole(pct: i64) -> Self {
        Rate(Decimal::from(pct))
    }

    #[inline]
    pub const fn percentage(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// `amount × rate / 100`, unrounded. `None` on overflow.
    #[inline]
    pub fn of(&self, amount: Money) -> Option<Money> {
        amount.checked_percent(self.0)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

// =============================================================================
// Batch Status
// =============================================================================

/// Fulfillment status of one batch.
///
/// The derive order IS the rank: `Pending < Preparing < Ready < Done`.
/// Batches only ever move up.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub enum BatchStatus {
    /// Submitted, not yet picked up by the kitchen.
    #[default]
    Pending,
    /// Being made.
    Preparing,
    /// Waiting at the counter.
    Ready,
    /// Handed over.
    Done,
}

impl BatchStatus {
    /// Every status, lowest rank first.
    pub const ALL: [BatchStatus; 4] = [
        BatchStatus::Pending,
        BatchStatus::Preparing,
        BatchStatus::Ready,
        BatchStatus::Done,
    ];

    /// Position in `Pending < Preparing < Ready < Done`.
    #[inline]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Pending => "Pending",
            BatchStatus::Preparing => "Preparing",
            BatchStatus::Ready => "Ready",
            BatchStatus::Done => "Done",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Aggregate status of an order.
///
/// The first four mirror [`BatchStatus`] and are derived from the batches.
/// `PaymentDone` and `Cancelled` are terminal and set explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Done,
    PaymentDone,
    Cancelled,
}

impl OrderStatus {
    /// `PaymentDone` and `Cancelled` accept no further mutations.
    #[inline]
    pub const fn is_closed(self) -> bool {
        matches!(self, OrderStatus::PaymentDone | OrderStatus::Cancelled)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Ready => "Ready",
            OrderStatus::Done => "Done",
            OrderStatus::PaymentDone => "PaymentDone",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl From<BatchStatus> for OrderStatus {
    fn from(status: BatchStatus) -> Self {
        match status {
            BatchStatus::Pending => OrderStatus::Pending,
            BatchStatus::Preparing => OrderStatus::Preparing,
            BatchStatus::Ready => OrderStatus::Ready,
            BatchStatus::Done => OrderStatus::Done,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Preparing" => Ok(OrderStatus::Preparing),
            "Ready" => Ok(OrderStatus::Ready),
            "Done" => Ok(OrderStatus::Done),
            "PaymentDone" => Ok(OrderStatus::PaymentDone),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown order status '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Discount
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    /// `value` is a percentage of the subtotal. Older documents spell it
    /// `"percent"`; both read the same and are written back canonically.
    #[serde(alias = "percent")]
    Percentage,
    /// `value` is an absolute amount.
    Flat,
}

/// A discount as the cashier entered it.
///
/// The effective amount is only known against a subtotal; see
/// [`crate::billing::discount_amount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Discount {
    #[serde(rename = "type")]
    pub kind: DiscountKind,
    #[ts(type = "number")]
    pub value: Decimal,
}

impl Discount {
    pub fn percentage(pct: Decimal) -> Self {
        Discount {
            kind: DiscountKind::Percentage,
            value: pct,
        }
    }

    pub fn flat(amount: Money) -> Self {
        Discount {
            kind: DiscountKind::Flat,
            value: amount.amount(),
        }
    }

    /// Parses the cashier's discount box.
    ///
    /// | Input   | Result                  |
    /// |---------|-------------------------|
    /// | `""`    | `None` (clear discount) |
    /// | `"10%"` | 10 percent              |
    /// | `"50"`  | flat 50                 |
    ///
    /// ## Example
    /// ```rust
    /// use cafe_core::types::{Discount, DiscountKind};
    ///
    /// let d = Discount::parse_input(" 10% ").unwrap().unwrap();
    /// assert_eq!(d.kind, DiscountKind::Percentage);
    /// assert!(Discount::parse_input("").unwrap().is_none());
    /// ```
    pub fn parse_input(input: &str) -> ValidationResult<Option<Discount>> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let (number, kind) = match trimmed.strip_suffix('%') {
            Some(pct) => (pct.trim(), DiscountKind::Percentage),
            None => (trimmed, DiscountKind::Flat),
        };

        let value = Decimal::from_str(number).map_err(|e| ValidationError::InvalidFormat {
            field: "discount".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Some(Discount { kind, value }))
    }
}

impl FromStr for Discount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Discount::parse_input(s)?.ok_or_else(|| ValidationError::Required {
            field: "discount".to_string(),
        })
    }
}

impl fmt::Display for Discount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiscountKind::Percentage => write!(f, "{}%", self.value.normalize()),
            DiscountKind::Flat => write!(f, "{}", Money::new(self.value)),
        }
    }
}

// =============================================================================
// Payment / Feedback
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum PaymentStatus {
    Paid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    /// 1..=5
    pub rating: u8,
    pub comment: String,
    #[ts(as = "String")]
    pub submitted_at: DateTime<Utc>,
}

// =============================================================================
// Menu Item
// =============================================================================

/// A catalog entry. Read-only to this crate; prices are copied out of it
/// when a line is ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}

fn default_in_stock() -> bool {
    true
}

// =============================================================================
// Order Line / Batch
// =============================================================================

/// One ordered item. Uses the snapshot pattern: name and price are frozen
/// at order time and never re-read from the menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(alias = "id")]
    pub item_id: String,
    pub name: String,
    #[serde(alias = "price")]
    pub unit_price: Money,
    pub qty: u32,
}

impl OrderLine {
    pub fn new(item_id: impl Into<String>, name: impl Into<String>, unit_price: Money, qty: u32) -> Self {
        OrderLine {
            item_id: item_id.into(),
            name: name.into(),
            unit_price,
            qty,
        }
    }

    /// Freezes a menu item into a line.
    ///
    /// ## Example
    /// ```rust
    /// use cafe_core::money::Money;
    /// use cafe_core::types::{MenuItem, OrderLine};
    ///
    /// let latte = MenuItem {
    ///     id: "latte".into(),
    ///     name: "Latte".into(),
    ///     price: Money::from_major(140),
    ///     category: "Coffee".into(),
    ///     in_stock: true,
    /// };
    /// let line = OrderLine::from_menu_item(&latte, 2).unwrap();
    /// assert_eq!(line.extension().unwrap(), Money::from_major(280));
    /// ```
    pub fn from_menu_item(item: &MenuItem, qty: u32) -> CoreResult<Self> {
        if !item.in_stock {
            return Err(CoreError::ItemOutOfStock {
                item_id: item.id.clone(),
                name: item.name.clone(),
            });
        }
        Ok(OrderLine::new(item.id.clone(), item.name.clone(), item.price, qty))
    }

    /// `qty × unit_price`.
    pub fn extension(&self) -> CoreResult<Money> {
        self.unit_price
            .checked_multiply_quantity(self.qty)
            .ok_or_else(|| CoreError::overflow("line amount"))
    }
}

/// A group of lines submitted together. Only `status` ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// Nanosecond creation timestamp, strictly increasing within an order.
    pub batch_id: String,
    pub items: Vec<OrderLine>,
    pub status: BatchStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// Client token that created this batch; replays with the same token
    /// resolve to this batch instead of appending another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl Batch {
    pub fn subtotal(&self) -> CoreResult<Money> {
        self.items.iter().try_fold(Money::zero(), |acc, line| {
            acc.checked_add(line.extension()?)
                .ok_or_else(|| CoreError::overflow("batch subtotal"))
        })
    }
}

// =============================================================================
// Order
// =============================================================================

/// The order aggregate. See [`crate::lifecycle`] for the operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub customer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub batches: Vec<Batch>,
    /// Sum of every line extension across every batch.
    pub total: Money,
    pub status: OrderStatus,
    #[serde(default)]
    pub discount: Option<Discount>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub feedback: Option<Feedback>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Monotonic; every committed change bumps it by one.
    #[serde(default)]
    #[ts(type = "number")]
    pub version: u64,
}

impl Order {
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    #[inline]
    pub fn is_paid(&self) -> bool {
        self.payment_status == Some(PaymentStatus::Paid)
    }

    pub fn batch(&self, batch_id: &str) -> Option<&Batch> {
        self.batches.iter().find(|b| b.batch_id == batch_id)
    }

    /// The subtotal the bill starts from.
    #[inline]
    pub fn subtotal(&self) -> Money {
        self.total
    }
}

// =============================================================================
// Tax Rule
// =============================================================================

/// A named percentage applied to every order's taxable amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRule {
    pub id: String,
    pub name: String,
    pub percentage: Rate,
}

impl TaxRule {
    pub fn new(name: impl Into<String>, percentage: Rate) -> Self {
        TaxRule {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            percentage,
        }
    }
}

// =============================================================================
// Status Change Event
// =============================================================================

/// Emitted whenever a committed change moves an order's aggregate status.
/// Rendering a human message from it is someone else's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub order_id: String,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    #[ts(as = "String")]
    pub at: DateTime<Utc>,
}

impl StatusChange {
    /// `Some` when `after` has a different aggregate status than `before`.
    pub fn between(before: &Order, after: &Order) -> Option<StatusChange> {
        (before.status != after.status).then(|| StatusChange {
            order_id: after.id.clone(),
            previous_status: before.status,
            new_status: after.status,
            at: after.updated_at,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_status_rank_order() {
        assert!(BatchStatus::Pending < BatchStatus::Preparing);
        assert!(BatchStatus::Preparing < BatchStatus::Ready);
        assert!(BatchStatus::Ready < BatchStatus::Done);
        let ranks: Vec<u8> = BatchStatus::ALL.iter().map(|s| s.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_status_wire_strings() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::PaymentDone).unwrap(),
            "\"PaymentDone\""
        );
        assert_eq!(serde_json::to_string(&BatchStatus::Ready).unwrap(), "\"Ready\"");
        assert_eq!("Cancelled".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
        assert!("cancelled".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_closed_statuses() {
        assert!(OrderStatus::PaymentDone.is_closed());
        assert!(OrderStatus::Cancelled.is_closed());
        assert!(!OrderStatus::Done.is_closed());
    }

    #[test]
    fn test_discount_wire_shape_and_percent_alias() {
        let d = Discount::percentage(Decimal::from(10));
        assert_eq!(
            serde_json::to_value(d).unwrap(),
            serde_json::json!({ "type": "percentage", "value": 10.0 })
        );

        let legacy: Discount = serde_json::from_str(r#"{"type":"percent","value":15}"#).unwrap();
        assert_eq!(legacy.kind, DiscountKind::Percentage);
        assert_eq!(legacy.value, Decimal::from(15));

        let flat: Discount = serde_json::from_str(r#"{"type":"flat","value":50}"#).unwrap();
        assert_eq!(flat, Discount::flat(Money::from_major(50)));
    }

    #[test]
    fn test_discount_parse_input() {
        assert_eq!(
            Discount::parse_input("10%").unwrap(),
            Some(Discount::percentage(Decimal::from(10)))
        );
        assert_eq!(
            Discount::parse_input("50").unwrap(),
            Some(Discount::flat(Money::from_major(50)))
        );
        assert_eq!(Discount::parse_input("   ").unwrap(), None);
        assert!(Discount::parse_input("ten%").is_err());
        assert!("".parse::<Discount>().is_err());
    }

    #[test]
    fn test_empty_discount_input_clears() {
        let now = Utc::now();
        let lines = vec![OrderLine::new("tea", "Tea", Money::from_major(60), 2)];
        let mut order = Order::place("o-1", "Ann", None, lines, None, now).unwrap();

        let ten = Discount::parse_input("10%").unwrap();
        assert!(order.set_discount(ten, now).unwrap());
        assert!(order.discount.is_some());

        let cleared = Discount::parse_input("").unwrap();
        assert!(order.set_discount(cleared, now).unwrap());
        assert_eq!(order.discount, None);

        assert!(matches!(
            "  ".parse::<Discount>(),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_order_line_accepts_legacy_field_names() {
        let line: OrderLine =
            serde_json::from_str(r#"{"id":"latte","name":"Latte","price":140,"qty":2}"#).unwrap();
        assert_eq!(line.item_id, "latte");
        assert_eq!(line.extension().unwrap(), Money::from_major(280));

        let json = serde_json::to_value(&line).unwrap();
        assert!(json.get("itemId").is_some());
        assert!(json.get("unitPrice").is_some());
    }

    #[test]
    fn test_out_of_stock_menu_item_rejected() {
        let item = MenuItem {
            id: "m1".into(),
            name: "Cold Brew".into(),
            price: Money::from_major(180),
            category: "Coffee".into(),
            in_stock: false,
        };
        let err = OrderLine::from_menu_item(&item, 1).unwrap_err();
        assert_eq!(err.code(), "ITEM_OUT_OF_STOCK");
    }

    #[test]
    fn test_rate_display() {
        assert_eq!(Rate::whole(5).to_string(), "5%");
        assert_eq!(Rate::from_percentage(Decimal::new(250, 2)).to_string(), "2.5%");
    }
}
