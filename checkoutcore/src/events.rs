//! Fire-and-forget storefront notifications.
//!
//! The engine publishes an event after each successful state change.
//! Delivery is best-effort: publishing never blocks and never fails the
//! operation that triggered it. A bus with no subscribers simply drops
//! the event, and a slow subscriber misses events rather than applying
//! backpressure to checkout.

use tokio::sync::broadcast;

use crate::order::OrderStatus;
use crate::types::{Amount, OrderId, PromoCodeId, UserId};

/// Buffered events per subscriber before the oldest are dropped.
const CHANNEL_CAPACITY: usize = 256;

/// A notification emitted after a committed state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorefrontEvent {
    /// An order was committed.
    OrderCreated {
        /// The new order's id.
        order_id: OrderId,
        /// The ordering user.
        user_id: UserId,
        /// The charged total.
        total: Amount,
    },
    /// An order moved to a new status.
    OrderStatusChanged {
        /// The order that moved.
        order_id: OrderId,
        /// Status before the transition.
        from: OrderStatus,
        /// Status after the transition.
        to: OrderStatus,
    },
    /// A promo code's redemption count moved.
    PromoCodeUsageChanged {
        /// The redeemed code.
        promo_id: PromoCodeId,
        /// The user whose redemption moved the count.
        user_id: UserId,
    },
}

/// A broadcast bus for [`StorefrontEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StorefrontEvent>,
}

impl EventBus {
    /// Creates a bus with the default per-subscriber buffer.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribes to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StorefrontEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event to current subscribers.
    ///
    /// A send with no subscribers is not a failure; the event is
    /// dropped silently.
    pub fn publish(&self, event: StorefrontEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
