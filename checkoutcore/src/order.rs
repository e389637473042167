//! The order entity, its status lifecycle, and the cancellation workflow.
//!
//! Status transitions form a small state machine:
//! `pending -> processing -> shipped -> delivered`, with `cancelled`
//! reachable only from `pending` or `processing`. `delivered` and
//! `cancelled` are terminal. Any transition outside this graph is a
//! [`TransitionError`], never a silent no-op.

use serde::{Deserialize, Serialize};

use crate::errors::TransitionError;
use crate::pricing::PriceBreakdown;
use crate::types::{
    Amount, CancellationRequestId, OrderId, PaymentMethod, ProductId, PromoCodeKey, Quantity,
    Timestamp, UserId,
};

/// A line item as submitted by the cart collaborator.
///
/// The cart supplies only product id and quantity; prices and stock come
/// live from the catalog at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// The catalog product.
    pub product_id: ProductId,
    /// How many units the customer wants.
    pub quantity: Quantity,
}

/// A priced line item as recorded on a committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// The catalog product.
    pub product_id: ProductId,
    /// Unit price at commit time.
    pub unit_price: Amount,
    /// How many units were ordered.
    pub quantity: Quantity,
}

impl OrderItem {
    /// The line total, `unit_price * quantity`.
    pub fn line_total(&self) -> Amount {
        self.unit_price.saturating_mul(u64::from(u32::from(self.quantity)))
    }
}

/// Where an order is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Committed, waiting for the vendor to start fulfilment.
    Pending,
    /// Being prepared for shipment.
    Processing,
    /// Handed to the carrier.
    Shipped,
    /// Received by the customer. Terminal.
    Delivered,
    /// Voided through the cancellation workflow. Terminal.
    Cancelled,
}

impl OrderStatus {
    /// Whether the lifecycle defines a transition from `self` to `next`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Shipped)
                | (Self::Shipped, Self::Delivered)
                | (Self::Pending | Self::Processing, Self::Cancelled)
        )
    }

    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether the cancellation path is still open.
    ///
    /// Orders that have shipped cannot be cancelled through this engine.
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Why a customer asked to cancel an order.
///
/// `Other` carries required free text; the enumerated reasons do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// The customer changed their mind.
    ChangedMind,
    /// The customer found the item cheaper elsewhere.
    FoundBetterPrice,
    /// The order was placed by mistake.
    OrderedByMistake,
    /// Estimated delivery was too slow.
    ShippingTooSlow,
    /// The product is no longer needed.
    ProductNotNeeded,
    /// Anything else, explained in free text.
    Other {
        /// The customer's explanation. Required, non-empty.
        detail: String,
    },
}

impl CancellationReason {
    /// Builds the free-text variant, rejecting empty explanations.
    pub fn other(detail: impl Into<String>) -> Option<Self> {
        let detail = detail.into();
        let trimmed = detail.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self::Other {
                detail: trimmed.to_owned(),
            })
        }
    }
}

/// Where a cancellation request is in its resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted, awaiting resolution.
    Pending,
    /// Approved; the order was cancelled.
    Approved,
    /// Rejected; the order continues its lifecycle.
    Rejected,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

/// A customer-submitted, reason-coded petition to void an order.
///
/// Submitting a request never cancels the order by itself; only resolving
/// it with approval flips the order status. This holds for the self-service
/// path exactly as for operator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationRequest {
    /// Request identifier.
    pub id: CancellationRequestId,
    /// The order the customer wants voided.
    pub order_id: OrderId,
    /// The requesting customer.
    pub user_id: UserId,
    /// Why the customer wants out.
    pub reason: CancellationReason,
    /// When the request was submitted.
    pub requested_at: Timestamp,
    /// Resolution state.
    pub status: RequestStatus,
}

impl CancellationRequest {
    /// Creates a pending request for an order.
    pub fn submit(order_id: OrderId, user_id: UserId, reason: CancellationReason) -> Self {
        Self {
            id: CancellationRequestId::new(),
            order_id,
            user_id,
            reason,
            requested_at: Timestamp::now(),
            status: RequestStatus::Pending,
        }
    }

    /// Marks the request approved or rejected.
    ///
    /// A request that is already resolved cannot be resolved again; a
    /// racing second resolution must fail, not overwrite.
    pub fn resolve(&mut self, approve: bool) -> Result<(), TransitionError> {
        if self.status != RequestStatus::Pending {
            return Err(TransitionError::RequestAlreadyResolved {
                request_id: self.id,
                status: self.status,
            });
        }
        self.status = if approve {
            RequestStatus::Approved
        } else {
            RequestStatus::Rejected
        };
        Ok(())
    }
}

/// A committed order.
///
/// Created once at checkout commit; mutated only through defined status
/// transitions or the cancellation workflow; never deleted, only
/// terminally marked `cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order identifier.
    pub id: OrderId,
    /// The purchasing customer.
    pub user_id: UserId,
    /// The priced line items.
    pub items: Vec<OrderItem>,
    /// Sum of line totals before discount and shipping.
    pub subtotal: Amount,
    /// Discount granted by the applied promo code, if any.
    pub discount: Amount,
    /// Delivery fee.
    pub shipping_cost: Amount,
    /// `max(0, subtotal - discount) + shipping_cost`.
    pub total: Amount,
    /// The promo code applied at checkout, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<PromoCodeKey>,
    /// The payment method selector recorded at checkout.
    pub payment_method: PaymentMethod,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// The open or resolved cancellation request, if one was submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_request: Option<CancellationRequestId>,
    /// When the order was committed.
    pub created_at: Timestamp,
    /// When the order last changed.
    pub updated_at: Timestamp,
}

impl Order {
    /// Builds a freshly committed order in `pending` status from the
    /// priced breakdown.
    pub fn place(
        id: OrderId,
        user_id: UserId,
        items: Vec<OrderItem>,
        breakdown: PriceBreakdown,
        promo_code: Option<PromoCodeKey>,
        payment_method: PaymentMethod,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            items,
            subtotal: breakdown.subtotal,
            discount: breakdown.discount,
            shipping_cost: breakdown.shipping_cost,
            total: breakdown.total,
            promo_code,
            payment_method,
            status: OrderStatus::Pending,
            cancellation_request: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The total number of units across all line items.
    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .map(|item| u32::from(item.quantity))
            .sum()
    }

    /// Moves the order to `next`, enforcing the lifecycle graph.
    pub fn transition(&mut self, next: OrderStatus, now: Timestamp) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Status {
                order_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
