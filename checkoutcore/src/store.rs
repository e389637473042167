//! Storage abstraction for the checkout engine.
//!
//! [`CommerceStore`] is the port the engine drives. Reads return plain
//! records (or versioned records where the engine later writes them back
//! under an optimistic guard); the three commit operations are atomic:
//! every check-and-write inside a commit either applies in full or leaves
//! the store untouched, and a failed guard reports which check lost.

use async_trait::async_trait;

use crate::errors::StoreResult;
use crate::order::{CancellationRequest, Order};
use crate::promo::{PromoCode, PromoCodeUsage};
use crate::shipping::{ShippingMethod, ShippingZone};
use crate::stock::ProductRecord;
use crate::types::{
    CancellationRequestId, OrderId, ProductId, PromoCodeId, PromoCodeKey, RecordVersion,
    ShippingMethodId, ShippingZoneId, UserId,
};

/// A record paired with the version it was read at.
///
/// Writers hand the version back as the optimistic guard; the store
/// rejects the write if the record has moved in the meantime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// The record itself.
    pub record: T,
    /// The version the record was read at.
    pub version: RecordVersion,
}

impl<T> Versioned<T> {
    /// Pairs a record with its version.
    pub const fn new(record: T, version: RecordVersion) -> Self {
        Self { record, version }
    }
}

/// One guarded stock decrement inside a checkout commit.
///
/// Products with untracked stock are skipped by the engine and never
/// appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDecrement {
    /// The product whose stock shrinks.
    pub product_id: ProductId,
    /// Units to remove; the store re-checks availability under its own
    /// synchronization and fails the commit if stock ran short.
    pub quantity: u32,
}

/// One guarded promo redemption inside a checkout commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoRedemption {
    /// The code being redeemed.
    pub promo_id: PromoCodeId,
    /// The redeeming user, for the per-user ledger entry.
    pub user_id: UserId,
    /// The order the redemption belongs to. Redemption is idempotent per
    /// order id: replaying a commit for an order that already redeemed
    /// this code must not move any counter a second time.
    pub order_id: OrderId,
}

/// The atomic write set of a successful checkout.
#[derive(Debug, Clone)]
pub struct CheckoutCommit {
    /// The order to insert, in `Pending` status.
    pub order: Order,
    /// Guarded decrements for every tracked product in the cart.
    pub decrements: Vec<StockDecrement>,
    /// The promo redemption, when a code was applied.
    pub redemption: Option<PromoRedemption>,
}

/// What a commit actually did, for logging and event emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// The committed order's id.
    pub order_id: OrderId,
    /// Whether a promo counter moved (false when no code was applied or
    /// the redemption was an idempotent replay).
    pub promo_redeemed: bool,
}

/// The storage port the checkout engine drives.
///
/// Implementations must serialize the three commit operations against
/// each other so that concurrent checkouts cannot both pass the same
/// guard. Readers need no guard; stale reads are caught at commit time.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// Looks up a promo code by its normalized key.
    ///
    /// Returns `None` for unknown keys; the engine turns that into a
    /// rejection rather than an error.
    async fn find_promo_code(&self, key: &PromoCodeKey) -> StoreResult<Option<PromoCode>>;

    /// Looks up one user's usage record for one promo code.
    async fn find_promo_usage(
        &self,
        promo_id: &PromoCodeId,
        user_id: &UserId,
    ) -> StoreResult<Option<PromoCodeUsage>>;

    /// Reads the catalog records for a set of products.
    ///
    /// Missing products are simply absent from the result; the engine
    /// decides whether that is an error.
    async fn find_products(&self, ids: &[ProductId]) -> StoreResult<Vec<ProductRecord>>;

    /// Reads a shipping zone.
    async fn find_shipping_zone(&self, id: &ShippingZoneId) -> StoreResult<Option<ShippingZone>>;

    /// Reads a shipping method.
    async fn find_shipping_method(
        &self,
        id: &ShippingMethodId,
    ) -> StoreResult<Option<ShippingMethod>>;

    /// Reads an order with its current version.
    async fn find_order(&self, id: &OrderId) -> StoreResult<Option<Versioned<Order>>>;

    /// Reads a cancellation request with its current version.
    async fn find_cancellation_request(
        &self,
        id: &CancellationRequestId,
    ) -> StoreResult<Option<Versioned<CancellationRequest>>>;

    /// Reads the cancellation request attached to an order, if any.
    async fn find_request_for_order(
        &self,
        order_id: &OrderId,
    ) -> StoreResult<Option<Versioned<CancellationRequest>>>;

    /// Atomically applies a checkout: inserts the order, applies every
    /// stock decrement, and redeems the promo code.
    ///
    /// All guards are re-checked under the store's own synchronization.
    /// Any failed guard aborts the whole commit with a conflict error
    /// naming what lost; no partial state is left behind.
    async fn commit_checkout(&self, commit: CheckoutCommit) -> StoreResult<CommitReceipt>;

    /// Atomically inserts a cancellation request and stamps the order as
    /// having one, guarded by the order's version.
    async fn commit_cancellation_request(
        &self,
        request: CancellationRequest,
        order_version: RecordVersion,
    ) -> StoreResult<()>;

    /// Atomically writes back a resolved request and, when the resolution
    /// changed the order, the order alongside it. Each record is guarded
    /// by the version it was read at.
    async fn commit_resolution(
        &self,
        request: Versioned<CancellationRequest>,
        order: Option<Versioned<Order>>,
    ) -> StoreResult<()>;

    /// Writes back an order after a status transition, guarded by the
    /// version it was read at.
    async fn update_order(&self, order: Versioned<Order>) -> StoreResult<()>;
}
