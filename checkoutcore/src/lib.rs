//! `CheckoutCore` - Checkout pricing and order lifecycle engine
//!
//! This library prices a cart (promo discount, shipping fee, floored
//! total), guards stock availability, and commits the resulting order
//! atomically together with its stock decrements and promo redemption.
//! Committed orders then move through a fixed status lifecycle, with
//! cancellation handled as an explicit request/resolve workflow.
//!
//! The engine is storage-agnostic: it drives any
//! [`CommerceStore`](store::CommerceStore) implementation, such as the
//! in-memory one in the companion `checkoutcore-memory` crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod errors;
pub mod events;
pub mod order;
pub mod pricing;
pub mod promo;
pub mod shipping;
pub mod stock;
pub mod store;
pub mod types;

pub use engine::{CheckoutEngine, CheckoutRequest, RetryConfig};
pub use errors::{CheckoutError, CheckoutResult, StoreError, StoreResult, TransitionError};
pub use events::{EventBus, StorefrontEvent};
pub use order::{
    CancellationReason, CancellationRequest, CartLine, Order, OrderItem, OrderStatus,
    RequestStatus,
};
pub use pricing::PriceBreakdown;
pub use promo::{PromoBenefit, PromoCode, PromoCodeUsage, PromoGrant, PromoRejection};
pub use shipping::{ShippingMethod, ShippingRate, ShippingZone};
pub use stock::{ProductRecord, StockReport, StockViolation};
pub use store::{
    CheckoutCommit, CommerceStore, CommitReceipt, PromoRedemption, StockDecrement, Versioned,
};
