//! Core identifier and value types for the checkout engine.
//!
//! All types use smart constructors so validity is established at
//! construction time, following the "parse, don't validate" principle.
//! Once a value exists it needs no further checking anywhere in the engine.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a catalog product.
///
/// Product ids come from the catalog collaborator; the engine only requires
/// them to be non-empty and bounded.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ProductId(String);

/// Identifier of a storefront customer.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct UserId(String);

/// Identifier of a promo code record (distinct from the redeemable code text).
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct PromoCodeId(String);

/// The redeemable code text a customer types in, in normalized form.
///
/// Matching is case-insensitive: keys are trimmed and uppercased at
/// construction, so two keys compare equal exactly when the codes match.
#[nutype(
    sanitize(trim, uppercase),
    validate(not_empty, len_char_max = 32),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct PromoCodeKey(String);

/// Identifier of a shipping zone.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ShippingZoneId(String);

/// Identifier of a shipping method within a zone.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ShippingMethodId(String);

/// The payment method selector recorded on an order.
///
/// The engine does not integrate with a payment gateway; this is an opaque
/// label chosen by the checkout UI ("cod", "bank_transfer", ...).
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct PaymentMethod(String);

/// A globally unique order identifier using UUIDv7 format.
///
/// UUIDv7 gives time-based sort order, so order ids created in sequence
/// sort chronologically.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Creates a fresh `OrderId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

/// A globally unique cancellation request identifier (UUIDv7).
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CancellationRequestId(Uuid);

impl CancellationRequestId {
    /// Creates a fresh `CancellationRequestId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for CancellationRequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// A line-item quantity.
///
/// Quantities are at least 1; a zero-quantity line cannot be constructed.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct Quantity(u32);

/// A percentage in `0..=100`, used by promo benefits and price-based
/// shipping rates.
#[nutype(
    validate(less_or_equal = 100),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct Percent(u8);

/// A monetary amount in whole currency units.
///
/// The storefront currency has no fractional subunit in practice, so all
/// amounts are non-negative integers and every computed cost is floored to
/// a whole unit. Arithmetic saturates rather than wraps; a checkout total
/// can never go negative or overflow into nonsense.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from whole currency units.
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// Returns the amount in whole currency units.
    pub const fn units(self) -> u64 {
        self.0
    }

    /// Adds two amounts, saturating at the numeric bound.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtracts `other`, flooring at zero.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Multiplies by a unit count, saturating at the numeric bound.
    #[must_use]
    pub const fn saturating_mul(self, factor: u64) -> Self {
        Self(self.0.saturating_mul(factor))
    }

    /// Computes `self * percent / 100` rounded half-up.
    ///
    /// Used for percentage discounts, where the business rounds to the
    /// nearest whole unit.
    #[must_use]
    pub fn percent_rounded(self, percent: Percent) -> Self {
        let pct = u128::from(u8::from(percent));
        let scaled = u128::from(self.0) * pct + 50;
        Self(u64::try_from(scaled / 100).unwrap_or(u64::MAX))
    }

    /// Computes `self * percent / 100` floored.
    ///
    /// Used for price-based shipping, where costs are floored to the
    /// smallest currency unit.
    #[must_use]
    pub fn percent_floored(self, percent: Percent) -> Self {
        let pct = u128::from(u8::from(percent));
        let scaled = u128::from(self.0) * pct;
        Self(u64::try_from(scaled / 100).unwrap_or(u64::MAX))
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self::new(units)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.units()
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The version of a persisted record, used for optimistic concurrency
/// control on orders and cancellation requests.
///
/// Versions start at 0 for a freshly inserted record and increment with
/// each guarded update.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    From,
    Into,
    Serialize,
    Deserialize
))]
pub struct RecordVersion(u64);

impl RecordVersion {
    /// The version of a record that has just been inserted.
    pub fn initial() -> Self {
        Self::new(0)
    }

    /// Returns the version after one guarded update.
    #[must_use]
    pub fn next(self) -> Self {
        let current: u64 = self.into();
        Self::new(current.saturating_add(1))
    }
}

/// A UTC timestamp as recorded on orders, requests, and promo usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// The current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
