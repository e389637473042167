//! Stock availability guarding.
//!
//! The guard is a pure read: it compares requested quantities against the
//! catalog's current stock and reports violations without touching
//! anything. The matching atomic decrement happens at order commit, inside
//! the store's all-or-nothing batch.

use serde::{Deserialize, Serialize};

use crate::order::CartLine;
use crate::types::{Amount, ProductId};

/// A catalog product as seen by the engine.
///
/// `stock: None` means inventory is untracked for this product (a legacy
/// default, not an error): availability is unlimited and the guard never
/// reports a violation for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    /// Product identifier.
    pub id: ProductId,
    /// Current unit price.
    pub price: Amount,
    /// Tracked stock, or `None` for untracked inventory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
}

/// One line whose requested quantity exceeds tracked availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockViolation {
    /// The product that is short.
    pub product_id: ProductId,
    /// How many units the cart asked for.
    pub requested: u32,
    /// How many units are actually available.
    pub available: u32,
}

impl std::fmt::Display for StockViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: requested {}, available {}",
            self.product_id, self.requested, self.available
        )
    }
}

/// The outcome of a stock check over a set of cart lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StockReport {
    /// Every line that cannot be fulfilled, with remaining stock.
    pub violations: Vec<StockViolation>,
}

impl StockReport {
    /// Whether every line can be fulfilled.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

impl std::fmt::Display for StockReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.violations.is_empty() {
            return f.write_str("all items available");
        }
        let mut first = true;
        for violation in &self.violations {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            violation.fmt(f)?;
        }
        Ok(())
    }
}

/// Checks requested quantities against current availability.
///
/// Lines for the same product are summed first, so a cart that splits one
/// product across several lines is checked against its aggregate demand.
/// `lookup` resolves a product id to its catalog record; returning `None`
/// means the product does not exist, which is reported as an error by the
/// caller (a missing product is not a stock violation). No side effects.
pub fn check<'a, F>(lines: &[CartLine], mut lookup: F) -> Result<StockReport, ProductId>
where
    F: FnMut(&ProductId) -> Option<&'a ProductRecord>,
{
    let mut violations = Vec::new();
    for (product_id, requested) in aggregate_demand(lines) {
        let Some(product) = lookup(&product_id) else {
            return Err(product_id);
        };
        if let Some(available) = product.stock {
            if requested > available {
                violations.push(StockViolation {
                    product_id,
                    requested,
                    available,
                });
            }
        }
    }
    Ok(StockReport { violations })
}

/// Sums line quantities per product id, preserving first-seen order.
pub(crate) fn aggregate_demand(lines: &[CartLine]) -> Vec<(ProductId, u32)> {
    let mut demand: Vec<(ProductId, u32)> = Vec::new();
    for line in lines {
        let quantity = u32::from(line.quantity);
        match demand.iter_mut().find(|(id, _)| *id == line.product_id) {
            Some((_, total)) => *total = total.saturating_add(quantity),
            None => demand.push((line.product_id.clone(), quantity)),
        }
    }
    demand
}
