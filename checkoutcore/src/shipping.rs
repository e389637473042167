//! Shipping zones, methods, and delivery fee computation.

use serde::{Deserialize, Serialize};

use crate::types::{Amount, Percent, ShippingMethodId, ShippingZoneId};

/// A geographic grouping with its own set of available shipping methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingZone {
    /// Zone identifier.
    pub id: ShippingZoneId,
    /// Display name ("Inner city", "Nationwide", ...).
    pub name: String,
    /// Whether the zone currently accepts deliveries.
    pub is_active: bool,
}

/// The cost formula of a shipping method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShippingRate {
    /// A flat fee per order.
    #[serde(rename_all = "camelCase")]
    Fixed {
        /// The flat fee.
        base_cost: Amount,
    },
    /// A base fee plus a per-kilogram surcharge.
    ///
    /// The engine has no real weight measurement: the total item quantity
    /// stands in for weight, one unit approximating one kilogram. Callers
    /// can detect this via [`ShippingRate::quantity_as_weight`] and flag
    /// the estimate in the UI.
    #[serde(rename_all = "camelCase")]
    Weight {
        /// The flat part of the fee.
        base_cost: Amount,
        /// Surcharge per kilogram (per item unit, see above).
        cost_per_kg: Amount,
    },
    /// A percentage of the order amount, optionally capped.
    #[serde(rename_all = "camelCase")]
    Price {
        /// Percentage of the order amount charged as delivery fee.
        cost_percentage: Percent,
        /// Upper bound on the fee, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        max_cost: Option<Amount>,
    },
}

impl ShippingRate {
    /// Whether this rate uses item quantity as a stand-in for weight.
    ///
    /// True only for [`ShippingRate::Weight`]; the resulting fee is an
    /// approximation, not a measured weight charge.
    pub const fn quantity_as_weight(&self) -> bool {
        matches!(self, Self::Weight { .. })
    }
}

/// A named delivery option with a cost formula and optional free-shipping
/// threshold.
///
/// Created and edited by store administrators out-of-band; read-only input
/// to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMethod {
    /// Method identifier.
    pub id: ShippingMethodId,
    /// The zone this method belongs to.
    pub zone_id: ShippingZoneId,
    /// The cost formula.
    #[serde(flatten)]
    pub rate: ShippingRate,
    /// Order amount at which delivery becomes free, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_shipping_threshold: Option<Amount>,
    /// Whether the method is currently offered.
    pub is_active: bool,
}

impl ShippingMethod {
    /// Computes the delivery fee for an order.
    ///
    /// A free-shipping threshold short-circuits every rate type to zero.
    /// Otherwise the rate formula applies, floored to whole currency
    /// units; percentage-of-price fees are clamped to `max_cost` when set.
    /// The computed fee is never negative.
    pub fn quote(&self, order_amount: Amount, total_quantity: u32) -> Amount {
        if let Some(threshold) = self.free_shipping_threshold {
            if order_amount >= threshold {
                return Amount::ZERO;
            }
        }
        match &self.rate {
            ShippingRate::Fixed { base_cost } => *base_cost,
            ShippingRate::Weight {
                base_cost,
                cost_per_kg,
            } => base_cost.saturating_add(cost_per_kg.saturating_mul(u64::from(total_quantity))),
            ShippingRate::Price {
                cost_percentage,
                max_cost,
            } => {
                let raw = order_amount.percent_floored(*cost_percentage);
                max_cost.map_or(raw, |cap| raw.min(cap))
            }
        }
    }
}
