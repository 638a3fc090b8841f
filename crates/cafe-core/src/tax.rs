//! # Tax Registry
//!
//! The café-wide list of tax rules. Every rule applies to every order's
//! taxable amount; presentation order is insertion order.
//!
//! Billing never holds a reference into the registry. It takes a
//! [`TaxRegistry::snapshot`], so editing a rule changes future bills only.
//!
//! ## Example
//! ```rust
//! use cafe_core::tax::TaxRegistry;
//! use cafe_core::types::Rate;
//!
//! let mut registry = TaxRegistry::new();
//! let gst = registry.add("GST", Rate::whole(5)).unwrap();
//! registry.add("Service", Rate::whole(3)).unwrap();
//!
//! let before = registry.snapshot();
//! registry.update(&gst.id, Rate::whole(12)).unwrap();
//!
//! assert_eq!(before[0].percentage, Rate::whole(5));
//! assert_eq!(registry.rules()[0].percentage, Rate::whole(12));
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::{Rate, TaxRule};
use crate::validation::{validate_percentage, validate_tax_name};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxRegistry {
    rules: Vec<TaxRule>,
}

impl TaxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from stored rules, keeping their order.
    pub fn from_rules(rules: Vec<TaxRule>) -> Self {
        TaxRegistry { rules }
    }

    /// Adds a rule with a fresh id.
    pub fn add(&mut self, name: &str, percentage: Rate) -> CoreResult<TaxRule> {
        let name = validate_tax_name(name)?;
        validate_percentage("tax percentage", percentage.percentage())?;

        let rule = TaxRule::new(name, percentage);
        self.rules.push(rule.clone());
        Ok(rule)
    }

    /// Changes a rule's percentage in place, keeping its position.
    pub fn update(&mut self, id: &str, percentage: Rate) -> CoreResult<TaxRule> {
        validate_percentage("tax percentage", percentage.percentage())?;
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| CoreError::TaxRuleNotFound(id.to_string()))?;
        rule.percentage = percentage;
        Ok(rule.clone())
    }

    pub fn remove(&mut self, id: &str) -> CoreResult<TaxRule> {
        let index = self
            .rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| CoreError::TaxRuleNotFound(id.to_string()))?;
        Ok(self.rules.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&TaxRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn rules(&self) -> &[TaxRule] {
        &self.rules
    }

    /// An owned copy for billing.
    pub fn snapshot(&self) -> Vec<TaxRule> {
        self.rules.clone()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::compute_bill;
    use crate::money::Money;

    #[test]
    fn test_insertion_order() {
        let mut registry = TaxRegistry::new();
        registry.add("Service", Rate::whole(10)).unwrap();
        registry.add("GST", Rate::whole(5)).unwrap();
        registry.add("Cess", Rate::whole(1)).unwrap();

        let names: Vec<_> = registry.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Service", "GST", "Cess"]);
    }

    #[test]
    fn test_update_keeps_position() {
        let mut registry = TaxRegistry::new();
        let a = registry.add("A", Rate::whole(5)).unwrap();
        registry.add("B", Rate::whole(3)).unwrap();

        registry.update(&a.id, Rate::whole(7)).unwrap();
        assert_eq!(registry.rules()[0].name, "A");
        assert_eq!(registry.rules()[0].percentage, Rate::whole(7));
    }

    #[test]
    fn test_remove_and_missing() {
        let mut registry = TaxRegistry::new();
        let a = registry.add("A", Rate::whole(5)).unwrap();
        assert_eq!(registry.remove(&a.id).unwrap().name, "A");
        assert!(registry.is_empty());

        assert!(matches!(
            registry.remove(&a.id),
            Err(CoreError::TaxRuleNotFound(_))
        ));
        assert!(registry.update(&a.id, Rate::whole(1)).is_err());
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut registry = TaxRegistry::new();
        assert!(registry.add("  ", Rate::whole(5)).is_err());
        assert!(registry.add("Bad", Rate::whole(-1)).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_isolates_emitted_bill() {
        let mut registry = TaxRegistry::new();
        let gst = registry.add("GST", Rate::whole(5)).unwrap();

        let bill = compute_bill(Money::from_major(100), None, &registry.snapshot()).unwrap();
        registry.update(&gst.id, Rate::whole(18)).unwrap();

        assert_eq!(bill.tax_total, Money::from_major(5));
        let later = compute_bill(Money::from_major(100), None, &registry.snapshot()).unwrap();
        assert_eq!(later.tax_total, Money::from_major(18));
    }
}
