//! Final price aggregation.
//!
//! This is the single point where an oversized discount is neutralized:
//! the discount is floored against the subtotal *before* shipping is
//! added, so a promo can zero out the goods but never the delivery fee.

use serde::{Deserialize, Serialize};

use crate::order::OrderItem;
use crate::types::Amount;

/// The priced components of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    /// Sum of line totals.
    pub subtotal: Amount,
    /// Discount granted by the promo code, taken at face value.
    pub discount: Amount,
    /// Delivery fee.
    pub shipping_cost: Amount,
    /// `max(0, subtotal - discount) + shipping_cost`.
    pub total: Amount,
}

impl PriceBreakdown {
    /// Combines already-computed components into a final total.
    ///
    /// The aggregator does not re-validate promo or shipping rules; inputs
    /// are non-negative by type and the only policy applied here is the
    /// floor at zero.
    pub fn compute(subtotal: Amount, discount: Amount, shipping_cost: Amount) -> Self {
        Self {
            subtotal,
            discount,
            shipping_cost,
            total: compute_total(subtotal, discount, shipping_cost),
        }
    }
}

/// `max(0, subtotal - discount) + shipping_cost`.
pub fn compute_total(subtotal: Amount, discount: Amount, shipping_cost: Amount) -> Amount {
    subtotal.saturating_sub(discount).saturating_add(shipping_cost)
}

/// Sums line totals into an order subtotal.
pub fn subtotal(items: &[OrderItem]) -> Amount {
    items
        .iter()
        .fold(Amount::ZERO, |acc, item| acc.saturating_add(item.line_total()))
}
