//! # Billing Calculator
//!
//! The one place a bill is computed. Cashier screens, the customer tracker
//! and daily summaries all call [`compute_bill`].
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  subtotal ──► discount_amount ──► taxable ──┬──► tax line A (A% × taxable)
//! │              clamp [0, subtotal]            ├──► tax line B (B% × taxable)
//! │                                             └──► ...                    │
//! │                                                                         │
//! │  tax_total   = Σ tax lines          (additive, never compounded)       │
//! │  grand_total = taxable + tax_total                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is carried at full precision. Call [`Bill::rounded`] to get
//! the two-place figures for display.
//!
//! ## Example
//! ```rust
//! use cafe_core::billing::compute_bill;
//! use cafe_core::money::Money;
//! use cafe_core::types::{Discount, Rate, TaxRule};
//!
//! let gst = TaxRule::new("GST", Rate::whole(5));
//! let discount = Discount::flat(Money::from_major(50));
//! let bill = compute_bill(Money::from_major(200), Some(&discount), &[gst]).unwrap();
//!
//! assert_eq!(bill.taxable, Money::from_major(150));
//! assert_eq!(bill.grand_total, Money::from_cents(15750));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Discount, DiscountKind, Order, Rate, TaxRule};

/// Percentage discounts above this take the whole subtotal.
const HUNDRED_PERCENT: Decimal = Decimal::ONE_HUNDRED;

// =============================================================================
// Bill
// =============================================================================

/// One computed tax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TaxLine {
    pub rule_id: String,
    pub name: String,
    pub percentage: Rate,
    pub amount: Money,
}

/// An itemized bill. Produced only by [`compute_bill`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub subtotal: Money,
    pub discount: Option<Discount>,
    /// Always within `[0, subtotal]`.
    pub discount_amount: Money,
    /// `subtotal - discount_amount`, never negative.
    pub taxable: Money,
    /// Same order as the tax rules passed in.
    pub tax_lines: Vec<TaxLine>,
    pub tax_total: Money,
    pub grand_total: Money,
}

impl Bill {
    /// A copy with every amount rounded to two places for display.
    ///
    /// Each figure is rounded on its own from the exact value, so the
    /// rounded lines may not add up to the rounded total to the paisa.
    pub fn rounded(&self) -> Bill {
        Bill {
            subtotal: self.subtotal.rounded(),
            discount: self.discount,
            discount_amount: self.discount_amount.rounded(),
            taxable: self.taxable.rounded(),
            tax_lines: self
                .tax_lines
                .iter()
                .map(|line| TaxLine {
                    amount: line.amount.rounded(),
                    ..line.clone()
                })
                .collect(),
            tax_total: self.tax_total.rounded(),
            grand_total: self.grand_total.rounded(),
        }
    }
}

// =============================================================================
// Computation
// =============================================================================

/// Effective discount against `subtotal`, clamped to `[0, subtotal]`.
///
/// A percentage above 100 or a flat amount above the subtotal gives the
/// whole subtotal; anything negative gives zero.
pub fn discount_amount(subtotal: Money, discount: Option<&Discount>) -> CoreResult<Money> {
    let raw = match discount {
        None => Money::zero(),
        Some(d) => match d.kind {
            DiscountKind::Percentage => subtotal
                .checked_percent(d.value.min(HUNDRED_PERCENT))
                .ok_or_else(|| CoreError::overflow("discount"))?,
            DiscountKind::Flat => Money::new(d.value),
        },
    };
    Ok(raw.clamp_to(Money::zero(), subtotal))
}

/// Computes an itemized bill.
///
/// Pure: identical inputs always give an identical bill.
///
/// ## Errors
/// [`CoreError::InvalidBillingInput`] when `subtotal` or any rule's
/// percentage is negative, or when an amount is too large to represent.
/// Nothing partial is returned.
pub fn compute_bill(
    subtotal: Money,
    discount: Option<&Discount>,
    taxes: &[TaxRule],
) -> CoreResult<Bill> {
    if subtotal.is_negative() {
        return Err(CoreError::InvalidBillingInput {
            reason: format!("subtotal {} is negative", subtotal.amount()),
        });
    }
    if let Some(rule) = taxes.iter().find(|r| r.percentage.is_negative()) {
        return Err(CoreError::InvalidBillingInput {
            reason: format!("tax '{}' has negative percentage {}", rule.name, rule.percentage),
        });
    }

    let discount_amount = discount_amount(subtotal, discount)?;
    let taxable = subtotal
        .checked_sub(discount_amount)
        .ok_or_else(|| CoreError::overflow("taxable amount"))?;

    // Every rule applies to the same taxable base.
    let tax_lines = taxes
        .iter()
        .map(|rule| {
            let amount = rule
                .percentage
                .of(taxable)
                .ok_or_else(|| CoreError::overflow(&format!("tax '{}'", rule.name)))?;
            Ok(TaxLine {
                rule_id: rule.id.clone(),
                name: rule.name.clone(),
                percentage: rule.percentage,
                amount,
            })
        })
        .collect::<CoreResult<Vec<TaxLine>>>()?;
    let tax_total = Money::checked_sum(tax_lines.iter().map(|line| line.amount))
        .ok_or_else(|| CoreError::overflow("tax total"))?;
    let grand_total = taxable
        .checked_add(tax_total)
        .ok_or_else(|| CoreError::overflow("grand total"))?;

    Ok(Bill {
        subtotal,
        discount: discount.copied(),
        discount_amount,
        taxable,
        tax_lines,
        tax_total,
        grand_total,
    })
}

impl Order {
    /// The bill for this order against a tax snapshot.
    pub fn bill(&self, taxes: &[TaxRule]) -> CoreResult<Bill> {
        compute_bill(self.subtotal(), self.discount.as_ref(), taxes)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
