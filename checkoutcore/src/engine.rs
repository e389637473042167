//! The checkout engine: pricing, guarding, committing, and order
//! lifecycle.
//!
//! [`CheckoutEngine`] drives a [`CommerceStore`] through the full
//! checkout pipeline: resolve the shipping method, guard stock, validate
//! the promo code, price the cart, and commit the result atomically.
//! Commits that lose a concurrency race are retried automatically with
//! exponential backoff; a conflict that survives the retries is surfaced
//! as the matching user-facing stock or promo failure rather than a raw
//! conflict.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::errors::{
    CheckoutError, CheckoutResult, ConflictKind, RedemptionLimit, TransitionError,
};
use crate::events::{EventBus, StorefrontEvent};
use crate::order::{
    CancellationReason, CancellationRequest, CartLine, Order, OrderItem, OrderStatus,
};
use crate::pricing::{self, PriceBreakdown};
use crate::promo::{self, PromoGrant, PromoRejection};
use crate::stock::{self, StockReport, StockViolation};
use crate::store::{CheckoutCommit, CommerceStore, PromoRedemption, StockDecrement};
use crate::types::{
    Amount, CancellationRequestId, OrderId, PaymentMethod, ProductId, PromoCodeKey,
    ShippingMethodId, Timestamp, UserId,
};

/// Configuration for automatic retry of conflicted commits.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per operation, the first included.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based), with jitter to
    /// spread out competing retriers.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn delay_for(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay = base_ms * self.backoff_multiplier.powi(attempt as i32 - 1);
        let delay = delay.min(max_ms);

        // +/- 25% jitter
        let mut rng = rand::rng();
        let jitter = delay * 0.25 * (rng.random::<f64>() - 0.5) * 2.0;
        let final_ms = (delay + jitter).max(0.0).min(max_ms) as u64;

        Duration::from_millis(final_ms)
    }
}

/// A customer's checkout submission.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// The purchasing customer.
    pub user_id: UserId,
    /// The cart lines to buy.
    pub lines: Vec<CartLine>,
    /// The chosen delivery option.
    pub shipping_method_id: ShippingMethodId,
    /// Promo code text as entered, if any. Matched case-insensitively.
    pub promo_code: Option<String>,
    /// The payment method selector to record on the order.
    pub payment_method: PaymentMethod,
}

/// The checkout and order-lifecycle engine over a [`CommerceStore`].
#[derive(Debug)]
pub struct CheckoutEngine<S> {
    store: S,
    events: EventBus,
    retry: RetryConfig,
}

impl<S> CheckoutEngine<S>
where
    S: CommerceStore,
{
    /// Creates an engine with the default retry configuration.
    pub fn new(store: S) -> Self {
        Self::with_retry_config(store, RetryConfig::default())
    }

    /// Creates an engine with an explicit retry configuration.
    pub fn with_retry_config(store: S, retry: RetryConfig) -> Self {
        Self {
            store,
            events: EventBus::new(),
            retry,
        }
    }

    /// The event bus this engine publishes to.
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Runs a full checkout and commits the resulting order atomically.
    ///
    /// The pipeline resolves the shipping method, checks stock, validates
    /// the promo code, prices the cart, and hands the store one atomic
    /// commit: order insert, stock decrements, promo redemption. A commit
    /// that loses a race is retried from the read step; a conflict that
    /// outlives the retries comes back as the matching stock or promo
    /// error. The order id is fixed before the first attempt, so a retry
    /// can never commit the same checkout twice.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> CheckoutResult<Order> {
        if request.lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let promo_key = match request.promo_code.as_deref() {
            Some(text) => Some(parse_promo_key(text)?),
            None => None,
        };
        let order_id = OrderId::new();

        let mut attempt = 1;
        loop {
            match self.checkout_attempt(&request, promo_key.as_ref(), order_id).await {
                Ok(outcome) => {
                    info!(
                        order_id = %outcome.order.id,
                        total = %outcome.order.total,
                        "checkout committed"
                    );
                    self.events.publish(StorefrontEvent::OrderCreated {
                        order_id: outcome.order.id,
                        user_id: outcome.order.user_id.clone(),
                        total: outcome.order.total,
                    });
                    if let Some(promo_id) = outcome.redeemed_promo {
                        self.events.publish(StorefrontEvent::PromoCodeUsageChanged {
                            promo_id,
                            user_id: outcome.order.user_id.clone(),
                        });
                    }
                    return Ok(outcome.order);
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(%err, attempt, ?delay, "checkout commit conflicted, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(CheckoutError::ConcurrencyConflict(kind)) => {
                    warn!(conflict = %kind, "checkout conflict persisted after retry");
                    return Err(surface_conflict(kind));
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Validates a promo code against an order amount without committing
    /// anything, for pre-checkout preview.
    #[instrument(skip(self))]
    pub async fn preview_promo_code(
        &self,
        code: &str,
        user_id: &UserId,
        order_amount: Amount,
    ) -> CheckoutResult<PromoGrant> {
        let key = parse_promo_key(code)?;
        let found = self.store.find_promo_code(&key).await?;
        let usage = match &found {
            Some(p) => self.store.find_promo_usage(&p.id, user_id).await?,
            None => None,
        };
        Ok(promo::validate(
            found.as_ref(),
            usage.as_ref(),
            order_amount,
            Timestamp::now(),
        )?)
    }

    /// Checks cart lines against current stock without committing.
    pub async fn check_stock(&self, lines: &[CartLine]) -> CheckoutResult<StockReport> {
        let products = self.lookup_products(lines).await?;
        stock::check(lines, |id| products.get(id)).map_err(CheckoutError::UnknownProduct)
    }

    /// Quotes the delivery fee for a method, order amount, and quantity.
    pub async fn quote_shipping(
        &self,
        method_id: &ShippingMethodId,
        order_amount: Amount,
        total_quantity: u32,
    ) -> CheckoutResult<Amount> {
        let method = self.active_shipping_method(method_id).await?;
        Ok(method.quote(order_amount, total_quantity))
    }

    /// Opens a cancellation request for an order.
    ///
    /// The order must still be in a cancellable status and carry no prior
    /// request. The order itself does not change status here; only an
    /// approved resolution cancels it.
    #[instrument(skip(self), fields(order_id = %order_id, user_id = %user_id))]
    pub async fn request_cancellation(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: CancellationReason,
    ) -> CheckoutResult<CancellationRequest> {
        let mut attempt = 1;
        loop {
            let versioned = self
                .store
                .find_order(&order_id)
                .await?
                .ok_or(CheckoutError::OrderNotFound(order_id))?;
            let order = &versioned.record;
            if !order.status.is_cancellable() {
                return Err(TransitionError::NotCancellable {
                    order_id,
                    status: order.status,
                }
                .into());
            }
            if self.store.find_request_for_order(&order_id).await?.is_some() {
                return Err(CheckoutError::CancellationAlreadyRequested(order_id));
            }

            let request = CancellationRequest::submit(order_id, user_id.clone(), reason.clone());
            match self
                .store
                .commit_cancellation_request(request.clone(), versioned.version)
                .await
            {
                Ok(()) => {
                    debug!(request_id = %request.id, "cancellation request opened");
                    return Ok(request);
                }
                Err(err) => self.backoff_or_fail(err.into(), &mut attempt).await?,
            }
        }
    }

    /// Resolves a pending cancellation request.
    ///
    /// Approval cancels the order in the same atomic write; rejection
    /// leaves the order untouched. Either way the request becomes
    /// terminal, and a second resolution fails.
    #[instrument(skip(self), fields(request_id = %request_id))]
    pub async fn resolve_cancellation(
        &self,
        request_id: CancellationRequestId,
        approve: bool,
    ) -> CheckoutResult<Order> {
        let mut attempt = 1;
        loop {
            let mut vrequest = self
                .store
                .find_cancellation_request(&request_id)
                .await?
                .ok_or(CheckoutError::RequestNotFound(request_id))?;
            vrequest.record.resolve(approve)?;

            let order_id = vrequest.record.order_id;
            let mut vorder = self
                .store
                .find_order(&order_id)
                .await?
                .ok_or(CheckoutError::OrderNotFound(order_id))?;

            let mut cancelled_from: Option<OrderStatus> = None;
            let order_write = if approve {
                let from = vorder.record.status;
                vorder
                    .record
                    .transition(OrderStatus::Cancelled, Timestamp::now())?;
                cancelled_from = Some(from);
                Some(vorder.clone())
            } else {
                None
            };

            match self
                .store
                .commit_resolution(vrequest.clone(), order_write)
                .await
            {
                Ok(()) => {
                    info!(approved = approve, "cancellation request resolved");
                    if let Some(from) = cancelled_from {
                        self.events.publish(StorefrontEvent::OrderStatusChanged {
                            order_id,
                            from,
                            to: OrderStatus::Cancelled,
                        });
                    }
                    return Ok(vorder.record);
                }
                Err(err) => self.backoff_or_fail(err.into(), &mut attempt).await?,
            }
        }
    }

    /// Moves an order one step along the fulfilment lifecycle.
    ///
    /// Transitions outside the defined graph fail; terminal orders refuse
    /// any further move.
    #[instrument(skip(self), fields(order_id = %order_id, to = %next))]
    pub async fn advance_order(
        &self,
        order_id: OrderId,
        next: OrderStatus,
    ) -> CheckoutResult<Order> {
        let mut attempt = 1;
        loop {
            let mut versioned = self
                .store
                .find_order(&order_id)
                .await?
                .ok_or(CheckoutError::OrderNotFound(order_id))?;
            let from = versioned.record.status;
            versioned.record.transition(next, Timestamp::now())?;

            match self.store.update_order(versioned.clone()).await {
                Ok(()) => {
                    info!(%from, "order status advanced");
                    self.events.publish(StorefrontEvent::OrderStatusChanged {
                        order_id,
                        from,
                        to: next,
                    });
                    return Ok(versioned.record);
                }
                Err(err) => self.backoff_or_fail(err.into(), &mut attempt).await?,
            }
        }
    }

    /// One priced-and-committed checkout attempt.
    async fn checkout_attempt(
        &self,
        request: &CheckoutRequest,
        promo_key: Option<&PromoCodeKey>,
        order_id: OrderId,
    ) -> CheckoutResult<CheckoutOutcome> {
        let method = self.active_shipping_method(&request.shipping_method_id).await?;

        let products = self.lookup_products(&request.lines).await?;
        let report = stock::check(&request.lines, |id| products.get(id))
            .map_err(CheckoutError::UnknownProduct)?;
        if !report.is_valid() {
            return Err(CheckoutError::InsufficientStock(report));
        }

        let items: Vec<OrderItem> = request
            .lines
            .iter()
            .map(|line| {
                let record = products
                    .get(&line.product_id)
                    .ok_or_else(|| CheckoutError::UnknownProduct(line.product_id.clone()))?;
                Ok(OrderItem {
                    product_id: line.product_id.clone(),
                    unit_price: record.price,
                    quantity: line.quantity,
                })
            })
            .collect::<CheckoutResult<_>>()?;
        let subtotal = pricing::subtotal(&items);

        let grant = match promo_key {
            Some(key) => {
                let found = self.store.find_promo_code(key).await?;
                let usage = match &found {
                    Some(p) => self.store.find_promo_usage(&p.id, &request.user_id).await?,
                    None => None,
                };
                Some(promo::validate(
                    found.as_ref(),
                    usage.as_ref(),
                    subtotal,
                    Timestamp::now(),
                )?)
            }
            None => None,
        };
        let discount = grant.as_ref().map_or(Amount::ZERO, |g| g.discount);

        let total_quantity: u32 = request
            .lines
            .iter()
            .map(|line| u32::from(line.quantity))
            .sum();
        let shipping_cost = method.quote(subtotal, total_quantity);

        let breakdown = PriceBreakdown::compute(subtotal, discount, shipping_cost);
        let order = Order::place(
            order_id,
            request.user_id.clone(),
            items,
            breakdown,
            promo_key.cloned(),
            request.payment_method.clone(),
            Timestamp::now(),
        );

        // One decrement per product, lines summed; untracked stock is
        // unlimited and needs no decrement.
        let decrements: Vec<StockDecrement> = stock::aggregate_demand(&request.lines)
            .into_iter()
            .filter(|(product_id, _)| {
                products.get(product_id).is_some_and(|p| p.stock.is_some())
            })
            .map(|(product_id, quantity)| StockDecrement {
                product_id,
                quantity,
            })
            .collect();
        let redemption = grant.as_ref().map(|g| PromoRedemption {
            promo_id: g.promo.id.clone(),
            user_id: request.user_id.clone(),
            order_id,
        });
        let promo_id = grant.map(|g| g.promo.id);

        let commit = CheckoutCommit {
            order: order.clone(),
            decrements,
            redemption,
        };
        let receipt = self.store.commit_checkout(commit).await?;

        Ok(CheckoutOutcome {
            order,
            redeemed_promo: receipt.promo_redeemed.then_some(promo_id).flatten(),
        })
    }

    /// Resolves a shipping method that is active and whose zone is active.
    async fn active_shipping_method(
        &self,
        method_id: &ShippingMethodId,
    ) -> CheckoutResult<crate::shipping::ShippingMethod> {
        let method = self
            .store
            .find_shipping_method(method_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| CheckoutError::ShippingUnavailable(method_id.clone()))?;
        let zone = self
            .store
            .find_shipping_zone(&method.zone_id)
            .await?
            .filter(|z| z.is_active)
            .ok_or_else(|| CheckoutError::ShippingUnavailable(method_id.clone()))?;
        debug!(zone = %zone.id, "resolved shipping method");
        Ok(method)
    }

    /// Reads the catalog records for a cart, keyed by product id.
    async fn lookup_products(
        &self,
        lines: &[CartLine],
    ) -> CheckoutResult<HashMap<ProductId, crate::stock::ProductRecord>> {
        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id.clone()).collect();
        let products = self.store.find_products(&ids).await?;
        Ok(products.into_iter().map(|p| (p.id.clone(), p)).collect())
    }

    /// Sleeps and bumps the attempt counter for a transient error, or
    /// returns the error for a permanent one or an exhausted budget.
    async fn backoff_or_fail(
        &self,
        err: CheckoutError,
        attempt: &mut u32,
    ) -> CheckoutResult<()> {
        if err.is_transient() && *attempt < self.retry.max_attempts {
            let delay = self.retry.delay_for(*attempt);
            warn!(%err, attempt, ?delay, "commit conflicted, retrying");
            tokio::time::sleep(delay).await;
            *attempt += 1;
            Ok(())
        } else {
            Err(err)
        }
    }
}

struct CheckoutOutcome {
    order: Order,
    redeemed_promo: Option<crate::types::PromoCodeId>,
}

/// Normalizes entered promo text; unparseable text reads as an unknown
/// code rather than an internal error.
fn parse_promo_key(text: &str) -> CheckoutResult<PromoCodeKey> {
    PromoCodeKey::try_new(text).map_err(|_| PromoRejection::UnknownCode.into())
}

/// Re-expresses a conflict that survived the retries as the user-facing
/// failure it stands for.
fn surface_conflict(kind: ConflictKind) -> CheckoutError {
    match kind {
        ConflictKind::Stock {
            product_id,
            requested,
            available,
        } => CheckoutError::InsufficientStock(StockReport {
            violations: vec![StockViolation {
                product_id,
                requested,
                available,
            }],
        }),
        ConflictKind::Redemption { limit, .. } => match limit {
            RedemptionLimit::Global => PromoRejection::UsageLimitReached.into(),
            RedemptionLimit::PerUser => PromoRejection::UserLimitReached.into(),
        },
        kind @ ConflictKind::Version { .. } => CheckoutError::ConcurrencyConflict(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_stay_within_max_with_jitter() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            backoff_multiplier: 2.0,
        };
        for attempt in 1..10 {
            assert!(config.delay_for(attempt) <= config.max_delay);
        }
    }

    #[test]
    fn stock_conflict_surfaces_as_insufficient_stock() {
        let err = surface_conflict(ConflictKind::Stock {
            product_id: ProductId::try_new("p-1").unwrap(),
            requested: 2,
            available: 0,
        });
        assert!(matches!(err, CheckoutError::InsufficientStock(_)));
    }

    #[test]
    fn redemption_conflict_surfaces_as_promo_rejection() {
        let err = surface_conflict(ConflictKind::Redemption {
            promo_id: crate::types::PromoCodeId::try_new("promo-1").unwrap(),
            limit: RedemptionLimit::PerUser,
        });
        assert!(matches!(
            err,
            CheckoutError::PromoRejected(PromoRejection::UserLimitReached)
        ));
    }

    #[test]
    fn blank_promo_text_reads_as_unknown_code() {
        assert!(matches!(
            parse_promo_key("   "),
            Err(CheckoutError::PromoRejected(PromoRejection::UnknownCode))
        ));
    }
}
