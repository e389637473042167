//! In-memory store adapter for the `CheckoutCore` engine
//!
//! This crate provides an in-memory implementation of the `CommerceStore`
//! trait from the checkoutcore crate, useful for testing and development
//! scenarios where persistence is not required.
//!
//! All state lives behind one lock, so the three commit operations are
//! serialized against each other exactly as the trait contract requires:
//! every guard is re-checked under the lock, and a commit either applies
//! in full or leaves nothing behind.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use checkoutcore::errors::{RedemptionLimit, StoreError, StoreResult};
use checkoutcore::order::{CancellationRequest, Order};
use checkoutcore::promo::{PromoCode, PromoCodeUsage};
use checkoutcore::shipping::{ShippingMethod, ShippingZone};
use checkoutcore::stock::ProductRecord;
use checkoutcore::store::{CheckoutCommit, CommerceStore, CommitReceipt, Versioned};
use checkoutcore::types::{
    CancellationRequestId, OrderId, ProductId, PromoCodeId, PromoCodeKey, RecordVersion,
    ShippingMethodId, ShippingZoneId, Timestamp, UserId,
};

#[derive(Default)]
struct Inner {
    promo_codes: HashMap<PromoCodeId, PromoCode>,
    // Normalized code text to record id
    promo_index: HashMap<PromoCodeKey, PromoCodeId>,
    // Per-promo, per-user redemption bookkeeping
    promo_usages: HashMap<PromoCodeId, HashMap<UserId, PromoCodeUsage>>,
    // Orders that already redeemed a promo, for idempotent replay
    redeemed_orders: HashMap<PromoCodeId, HashSet<OrderId>>,
    products: HashMap<ProductId, ProductRecord>,
    zones: HashMap<ShippingZoneId, ShippingZone>,
    methods: HashMap<ShippingMethodId, ShippingMethod>,
    orders: HashMap<OrderId, Versioned<Order>>,
    requests: HashMap<CancellationRequestId, Versioned<CancellationRequest>>,
    requests_by_order: HashMap<OrderId, CancellationRequestId>,
}

/// Thread-safe in-memory commerce store for testing.
#[derive(Clone, Default)]
pub struct InMemoryCommerceStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryCommerceStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or replaces a catalog product.
    pub fn put_product(&self, product: ProductRecord) {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        inner.products.insert(product.id.clone(), product);
    }

    /// Seeds or replaces a promo code.
    pub fn put_promo_code(&self, promo: PromoCode) {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        inner.promo_index.insert(promo.code.clone(), promo.id.clone());
        inner.promo_codes.insert(promo.id.clone(), promo);
    }

    /// Seeds or replaces a shipping zone.
    pub fn put_shipping_zone(&self, zone: ShippingZone) {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        inner.zones.insert(zone.id.clone(), zone);
    }

    /// Seeds or replaces a shipping method.
    pub fn put_shipping_method(&self, method: ShippingMethod) {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        inner.methods.insert(method.id.clone(), method);
    }

    /// Reads a product's current stock, for test assertions.
    pub fn product_stock(&self, id: &ProductId) -> Option<Option<u32>> {
        let inner = self.inner.read().expect("RwLock poisoned");
        inner.products.get(id).map(|p| p.stock)
    }

    /// Reads a promo code's current redemption count, for test assertions.
    pub fn promo_used_count(&self, id: &PromoCodeId) -> Option<u32> {
        let inner = self.inner.read().expect("RwLock poisoned");
        inner.promo_codes.get(id).map(|p| p.used_count)
    }

    /// The number of committed orders.
    pub fn order_count(&self) -> usize {
        let inner = self.inner.read().expect("RwLock poisoned");
        inner.orders.len()
    }
}

/// Validates the promo guards for one redemption without mutating.
///
/// Returns whether a counter should move; `false` means the order already
/// redeemed this code and the redemption is an idempotent replay.
fn validate_redemption(
    inner: &Inner,
    promo_id: &PromoCodeId,
    user_id: &UserId,
    order_id: OrderId,
) -> StoreResult<bool> {
    let promo = inner
        .promo_codes
        .get(promo_id)
        .ok_or_else(|| StoreError::RecordNotFound {
            key: promo_id.to_string(),
        })?;
    let already = inner
        .redeemed_orders
        .get(promo_id)
        .is_some_and(|orders| orders.contains(&order_id));
    if already {
        return Ok(false);
    }
    if promo.used_count >= promo.usage_limit {
        return Err(StoreError::RedemptionConflict {
            promo_id: promo_id.clone(),
            limit: RedemptionLimit::Global,
        });
    }
    let user_used = inner
        .promo_usages
        .get(promo_id)
        .and_then(|per_user| per_user.get(user_id))
        .map_or(0, |usage| usage.used_count);
    if user_used >= promo.user_limit {
        return Err(StoreError::RedemptionConflict {
            promo_id: promo_id.clone(),
            limit: RedemptionLimit::PerUser,
        });
    }
    Ok(true)
}

#[async_trait]
impl CommerceStore for InMemoryCommerceStore {
    async fn find_promo_code(&self, key: &PromoCodeKey) -> StoreResult<Option<PromoCode>> {
        let inner = self.inner.read().expect("RwLock poisoned");
        Ok(inner
            .promo_index
            .get(key)
            .and_then(|id| inner.promo_codes.get(id))
            .cloned())
    }

    async fn find_promo_usage(
        &self,
        promo_id: &PromoCodeId,
        user_id: &UserId,
    ) -> StoreResult<Option<PromoCodeUsage>> {
        let inner = self.inner.read().expect("RwLock poisoned");
        Ok(inner
            .promo_usages
            .get(promo_id)
            .and_then(|per_user| per_user.get(user_id))
            .cloned())
    }

    async fn find_products(&self, ids: &[ProductId]) -> StoreResult<Vec<ProductRecord>> {
        let inner = self.inner.read().expect("RwLock poisoned");
        Ok(ids
            .iter()
            .filter_map(|id| inner.products.get(id))
            .cloned()
            .collect())
    }

    async fn find_shipping_zone(&self, id: &ShippingZoneId) -> StoreResult<Option<ShippingZone>> {
        let inner = self.inner.read().expect("RwLock poisoned");
        Ok(inner.zones.get(id).cloned())
    }

    async fn find_shipping_method(
        &self,
        id: &ShippingMethodId,
    ) -> StoreResult<Option<ShippingMethod>> {
        let inner = self.inner.read().expect("RwLock poisoned");
        Ok(inner.methods.get(id).cloned())
    }

    async fn find_order(&self, id: &OrderId) -> StoreResult<Option<Versioned<Order>>> {
        let inner = self.inner.read().expect("RwLock poisoned");
        Ok(inner.orders.get(id).cloned())
    }

    async fn find_cancellation_request(
        &self,
        id: &CancellationRequestId,
    ) -> StoreResult<Option<Versioned<CancellationRequest>>> {
        let inner = self.inner.read().expect("RwLock poisoned");
        Ok(inner.requests.get(id).cloned())
    }

    async fn find_request_for_order(
        &self,
        order_id: &OrderId,
    ) -> StoreResult<Option<Versioned<CancellationRequest>>> {
        let inner = self.inner.read().expect("RwLock poisoned");
        Ok(inner
            .requests_by_order
            .get(order_id)
            .and_then(|id| inner.requests.get(id))
            .cloned())
    }

    async fn commit_checkout(&self, commit: CheckoutCommit) -> StoreResult<CommitReceipt> {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        let order_id = commit.order.id;

        // Validate every guard before touching anything.
        if inner.orders.contains_key(&order_id) {
            return Err(StoreError::DuplicateOrder(order_id));
        }
        // Sum decrements per product so repeated entries for one id are
        // guarded against their aggregate, not each in isolation.
        let mut demand: HashMap<ProductId, u32> = HashMap::new();
        for decrement in &commit.decrements {
            let total = demand.entry(decrement.product_id.clone()).or_insert(0);
            *total = total.saturating_add(decrement.quantity);
        }
        for (product_id, requested) in &demand {
            let product = inner
                .products
                .get(product_id)
                .ok_or_else(|| StoreError::RecordNotFound {
                    key: product_id.to_string(),
                })?;
            if let Some(available) = product.stock {
                if available < *requested {
                    return Err(StoreError::StockConflict {
                        product_id: product_id.clone(),
                        requested: *requested,
                        available,
                    });
                }
            }
        }
        let redeem = match &commit.redemption {
            Some(redemption) => validate_redemption(
                &inner,
                &redemption.promo_id,
                &redemption.user_id,
                redemption.order_id,
            )?,
            None => false,
        };

        // All guards passed; apply the whole write set.
        for (product_id, requested) in &demand {
            if let Some(product) = inner.products.get_mut(product_id) {
                if let Some(available) = product.stock {
                    product.stock = Some(available.saturating_sub(*requested));
                }
            }
        }
        if redeem {
            let redemption = commit
                .redemption
                .as_ref()
                .ok_or_else(|| StoreError::Internal("redemption vanished mid-commit".into()))?;
            if let Some(promo) = inner.promo_codes.get_mut(&redemption.promo_id) {
                promo.used_count += 1;
            }
            let now = Timestamp::now();
            inner
                .promo_usages
                .entry(redemption.promo_id.clone())
                .or_default()
                .entry(redemption.user_id.clone())
                .and_modify(|usage| {
                    usage.used_count += 1;
                    usage.last_used = now;
                })
                .or_insert_with(|| PromoCodeUsage {
                    user_id: redemption.user_id.clone(),
                    promo_code_id: redemption.promo_id.clone(),
                    used_count: 1,
                    last_used: now,
                });
            inner
                .redeemed_orders
                .entry(redemption.promo_id.clone())
                .or_default()
                .insert(redemption.order_id);
        }
        inner
            .orders
            .insert(order_id, Versioned::new(commit.order, RecordVersion::initial()));

        Ok(CommitReceipt {
            order_id,
            promo_redeemed: redeem,
        })
    }

    async fn commit_cancellation_request(
        &self,
        request: CancellationRequest,
        order_version: RecordVersion,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        let order_id = request.order_id;

        let current = inner
            .orders
            .get(&order_id)
            .ok_or_else(|| StoreError::RecordNotFound {
                key: order_id.to_string(),
            })?;
        if current.version != order_version {
            return Err(StoreError::VersionConflict {
                key: order_id.to_string(),
                expected: order_version,
                current: current.version,
            });
        }

        let request_id = request.id;
        inner
            .requests
            .insert(request_id, Versioned::new(request, RecordVersion::initial()));
        inner.requests_by_order.insert(order_id, request_id);
        if let Some(entry) = inner.orders.get_mut(&order_id) {
            entry.record.cancellation_request = Some(request_id);
            entry.version = entry.version.next();
        }
        Ok(())
    }

    async fn commit_resolution(
        &self,
        request: Versioned<CancellationRequest>,
        order: Option<Versioned<Order>>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("RwLock poisoned");

        // Both guards first, then both writes.
        let current = inner
            .requests
            .get(&request.record.id)
            .ok_or_else(|| StoreError::RecordNotFound {
                key: request.record.id.to_string(),
            })?;
        if current.version != request.version {
            return Err(StoreError::VersionConflict {
                key: request.record.id.to_string(),
                expected: request.version,
                current: current.version,
            });
        }
        if let Some(order) = &order {
            let current = inner
                .orders
                .get(&order.record.id)
                .ok_or_else(|| StoreError::RecordNotFound {
                    key: order.record.id.to_string(),
                })?;
            if current.version != order.version {
                return Err(StoreError::VersionConflict {
                    key: order.record.id.to_string(),
                    expected: order.version,
                    current: current.version,
                });
            }
        }

        inner.requests.insert(
            request.record.id,
            Versioned::new(request.record, request.version.next()),
        );
        if let Some(order) = order {
            inner.orders.insert(
                order.record.id,
                Versioned::new(order.record, order.version.next()),
            );
        }
        Ok(())
    }

    async fn update_order(&self, order: Versioned<Order>) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        let current = inner
            .orders
            .get(&order.record.id)
            .ok_or_else(|| StoreError::RecordNotFound {
                key: order.record.id.to_string(),
            })?;
        if current.version != order.version {
            return Err(StoreError::VersionConflict {
                key: order.record.id.to_string(),
                expected: order.version,
                current: current.version,
            });
        }
        inner.orders.insert(
            order.record.id,
            Versioned::new(order.record, order.version.next()),
        );
        Ok(())
    }
}
