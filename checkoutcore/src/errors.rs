//! Error types for the checkout engine.
//!
//! The taxonomy mirrors how callers must react:
//!
//! - [`PromoRejection`](crate::promo::PromoRejection) — user-correctable;
//!   surfaced verbatim, checkout retryable without the code.
//! - Insufficient stock — blocking; the message identifies every short
//!   product and its remaining stock.
//! - [`CheckoutError::ConcurrencyConflict`] — transient; the engine
//!   retries the whole checkout attempt automatically once, and a
//!   recurring conflict is surfaced as the underlying stock or promo
//!   failure.
//! - [`TransitionError`] — a logic fault; always surfaced and logged,
//!   never silently ignored.
//! - [`StoreError`] — persistence layer failures, converted upward at
//!   the engine boundary.

use thiserror::Error;

use crate::order::{OrderStatus, RequestStatus};
use crate::promo::PromoRejection;
use crate::stock::StockReport;
use crate::types::{
    CancellationRequestId, OrderId, ProductId, PromoCodeId, RecordVersion, ShippingMethodId,
};

/// Which redemption limit an atomic promo increment ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RedemptionLimit {
    /// The global `usage_limit` across all users.
    #[error("usage limit reached")]
    Global,
    /// The per-user `user_limit`.
    #[error("per-user limit reached")]
    PerUser,
}

/// Errors from the backing record store.
///
/// The three conflict variants mean a guarded write lost a race against a
/// concurrent checkout or resolution; they convert into
/// [`CheckoutError::ConcurrencyConflict`] at the engine boundary.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A record that must exist was not found.
    #[error("record '{key}' not found")]
    RecordNotFound {
        /// The missing record's key.
        key: String,
    },

    /// An order with this id is already committed.
    #[error("order {0} already exists")]
    DuplicateOrder(OrderId),

    /// A version-guarded update found a different current version.
    #[error("version conflict on '{key}': expected {expected}, current {current}")]
    VersionConflict {
        /// The record that moved underneath the writer.
        key: String,
        /// The version the writer expected.
        expected: RecordVersion,
        /// The version actually found.
        current: RecordVersion,
    },

    /// A guarded stock decrement found less stock than the prior check saw.
    #[error("stock conflict on {product_id}: requested {requested}, available {available}")]
    StockConflict {
        /// The product that ran short.
        product_id: ProductId,
        /// Units the decrement asked for.
        requested: u32,
        /// Units actually remaining.
        available: u32,
    },

    /// A guarded promo redemption found the code exhausted.
    #[error("redemption conflict on promo {promo_id}: {limit}")]
    RedemptionConflict {
        /// The code that ran out.
        promo_id: PromoCodeId,
        /// Which limit was hit.
        limit: RedemptionLimit,
    },

    /// The connection to the store failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A record could not be serialized or deserialized.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// The store is temporarily unavailable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// An order status or cancellation-request transition outside the defined
/// lifecycle. A programming or operator fault, never ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The lifecycle graph defines no edge `from -> to` for this order.
    #[error("order {order_id}: no transition from {from} to {to}")]
    Status {
        /// The order that refused the move.
        order_id: OrderId,
        /// Current status.
        from: OrderStatus,
        /// Attempted status.
        to: OrderStatus,
    },

    /// Cancellation was requested for an order past the cancellable window.
    #[error("order {order_id} in status {status} cannot be cancelled")]
    NotCancellable {
        /// The order in question.
        order_id: OrderId,
        /// Its current status.
        status: OrderStatus,
    },

    /// A cancellation request was resolved a second time.
    #[error("cancellation request {request_id} already resolved as {status}")]
    RequestAlreadyResolved {
        /// The request in question.
        request_id: CancellationRequestId,
        /// Its resolution.
        status: RequestStatus,
    },
}

/// The detail behind a lost race, kept so a recurring conflict can be
/// surfaced as the matching user-facing failure.
#[derive(Debug, Clone, Error)]
pub enum ConflictKind {
    /// Stock moved between check and commit.
    #[error("stock for {product_id}: requested {requested}, available {available}")]
    Stock {
        /// The product that ran short.
        product_id: ProductId,
        /// Units requested.
        requested: u32,
        /// Units remaining.
        available: u32,
    },

    /// A promo code was exhausted between validation and commit.
    #[error("promo {promo_id}: {limit}")]
    Redemption {
        /// The exhausted code.
        promo_id: PromoCodeId,
        /// Which limit was hit.
        limit: RedemptionLimit,
    },

    /// A versioned record moved underneath the writer.
    #[error("record '{key}': expected version {expected}, current {current}")]
    Version {
        /// The record that moved.
        key: String,
        /// Expected version.
        expected: RecordVersion,
        /// Actual version.
        current: RecordVersion,
    },
}

/// Errors surfaced by the engine's checkout and lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    /// The promo code was refused; the message is user-facing.
    #[error("promo code rejected: {0}")]
    PromoRejected(#[from] PromoRejection),

    /// A checkout was attempted with no cart lines.
    #[error("cart is empty")]
    EmptyCart,

    /// One or more items cannot be fulfilled from current stock.
    #[error("insufficient stock: {0}")]
    InsufficientStock(StockReport),

    /// A cart line referenced a product the catalog does not know.
    #[error("unknown product: {0}")]
    UnknownProduct(ProductId),

    /// The selected shipping method does not exist, is inactive, or its
    /// zone is inactive.
    #[error("shipping method {0} is not available")]
    ShippingUnavailable(ShippingMethodId),

    /// The referenced order does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// The referenced cancellation request does not exist.
    #[error("cancellation request {0} not found")]
    RequestNotFound(CancellationRequestId),

    /// The order already has a cancellation request attached.
    #[error("order {0} already has a cancellation request")]
    CancellationAlreadyRequested(OrderId),

    /// An atomic check-and-write lost a race; safe to retry the attempt.
    #[error("lost a concurrent update race: {0}")]
    ConcurrencyConflict(ConflictKind),

    /// A transition outside the defined lifecycle was attempted.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// A non-conflict store failure.
    #[error("store error: {0}")]
    Store(StoreError),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Type alias for engine operation results.
pub type CheckoutResult<T> = Result<T, CheckoutError>;

/// Type alias for store operation results.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StockConflict {
                product_id,
                requested,
                available,
            } => Self::ConcurrencyConflict(ConflictKind::Stock {
                product_id,
                requested,
                available,
            }),
            StoreError::RedemptionConflict { promo_id, limit } => {
                Self::ConcurrencyConflict(ConflictKind::Redemption { promo_id, limit })
            }
            StoreError::VersionConflict {
                key,
                expected,
                current,
            } => Self::ConcurrencyConflict(ConflictKind::Version {
                key,
                expected,
                current,
            }),
            other => Self::Store(other),
        }
    }
}

impl CheckoutError {
    /// Whether retrying the whole attempt may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::StockViolation;
    use crate::types::ProductId;

    #[test]
    fn stock_error_messages_identify_products_and_remaining_stock() {
        let err = CheckoutError::InsufficientStock(StockReport {
            violations: vec![StockViolation {
                product_id: ProductId::try_new("p-1").unwrap(),
                requested: 5,
                available: 2,
            }],
        });
        assert_eq!(
            err.to_string(),
            "insufficient stock: p-1: requested 5, available 2"
        );
    }

    #[test]
    fn store_conflicts_convert_to_concurrency_conflicts() {
        let err: CheckoutError = StoreError::StockConflict {
            product_id: ProductId::try_new("p-1").unwrap(),
            requested: 3,
            available: 1,
        }
        .into();
        assert!(err.is_transient());

        let err: CheckoutError = StoreError::RedemptionConflict {
            promo_id: PromoCodeId::try_new("promo-1").unwrap(),
            limit: RedemptionLimit::Global,
        }
        .into();
        assert!(matches!(
            err,
            CheckoutError::ConcurrencyConflict(ConflictKind::Redemption { .. })
        ));
    }

    #[test]
    fn non_conflict_store_errors_stay_store_errors() {
        let err: CheckoutError = StoreError::Unavailable("maintenance".to_owned()).into();
        assert!(matches!(err, CheckoutError::Store(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn transition_error_messages_are_descriptive() {
        let order_id = OrderId::new();
        let err = TransitionError::Status {
            order_id,
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled,
        };
        assert!(err.to_string().contains("no transition from shipped to cancelled"));

        let err = TransitionError::NotCancellable {
            order_id,
            status: OrderStatus::Delivered,
        };
        assert!(err.to_string().contains("cannot be cancelled"));
    }

    #[test]
    fn promo_rejection_messages_pass_through_verbatim() {
        let err: CheckoutError = PromoRejection::UsageLimitReached.into();
        assert_eq!(
            err.to_string(),
            "promo code rejected: promo code usage limit reached"
        );
    }
}
