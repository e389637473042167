//! Promo code records and the validation/discount rules.
//!
//! Validation runs a fixed sequence of checks and short-circuits on the
//! first failure, so the customer always sees the most specific reason a
//! code was refused. Discount computation is deliberately a pure
//! "what would this code give you" function: a fixed benefit is **not**
//! clamped to the order amount here. The single floor-at-zero point lives
//! in [`crate::pricing`], so display code relying on the raw discount must
//! floor against the subtotal itself.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Amount, Percent, PromoCodeId, PromoCodeKey, Timestamp, UserId};

/// The benefit a promo code grants.
///
/// `max_discount` only exists for percentage benefits; a fixed benefit has
/// no cap by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PromoBenefit {
    /// A percentage of the order amount, optionally capped.
    #[serde(rename_all = "camelCase")]
    Percentage {
        /// Percentage of the order amount granted as discount.
        value: Percent,
        /// Upper bound on the granted discount, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        max_discount: Option<Amount>,
    },
    /// A fixed discount amount, taken at face value.
    Fixed {
        /// The discount amount granted regardless of order size.
        value: Amount,
    },
}

impl PromoBenefit {
    /// Computes the discount this benefit grants on `order_amount`.
    ///
    /// Percentage benefits round half-up to the nearest whole unit, then
    /// clamp to `max_discount` when set. Fixed benefits return their face
    /// value even when it exceeds the order amount.
    pub fn discount_for(&self, order_amount: Amount) -> Amount {
        match self {
            Self::Percentage {
                value,
                max_discount,
            } => {
                let raw = order_amount.percent_rounded(*value);
                max_discount.map_or(raw, |cap| raw.min(cap))
            }
            Self::Fixed { value } => *value,
        }
    }
}

/// A promo code record as persisted by the store administrators.
///
/// Read-only input to the engine; only `used_count` ever changes, and only
/// through the atomic redemption primitives of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
    /// Record identifier.
    pub id: PromoCodeId,
    /// The normalized redeemable code text.
    pub code: PromoCodeKey,
    /// The discount this code grants.
    #[serde(flatten)]
    pub benefit: PromoBenefit,
    /// Minimum order amount required to redeem the code.
    pub min_order_amount: Amount,
    /// How many redemptions the code allows in total, across all users.
    pub usage_limit: u32,
    /// How many redemptions have happened so far.
    pub used_count: u32,
    /// How many redemptions a single user may make.
    pub user_limit: u32,
    /// Start of the validity window (inclusive).
    pub valid_from: Timestamp,
    /// End of the validity window (inclusive).
    pub valid_until: Timestamp,
    /// Whether the code is currently enabled.
    pub is_active: bool,
}

/// Why a [`PromoCode`] could not be constructed from raw record data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPromoCode {
    /// `valid_from` was after `valid_until`.
    #[error("validity window is inverted: {valid_from} > {valid_until}")]
    InvertedWindow {
        /// Claimed start of the window.
        valid_from: Timestamp,
        /// Claimed end of the window.
        valid_until: Timestamp,
    },
    /// `used_count` exceeded `usage_limit`.
    #[error("used count {used_count} exceeds usage limit {usage_limit}")]
    OverdrawnUsage {
        /// Claimed redemption count.
        used_count: u32,
        /// Claimed global limit.
        usage_limit: u32,
    },
}

impl PromoCode {
    /// Builds a promo code, enforcing the record invariants
    /// `valid_from <= valid_until` and `used_count <= usage_limit`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PromoCodeId,
        code: PromoCodeKey,
        benefit: PromoBenefit,
        min_order_amount: Amount,
        usage_limit: u32,
        used_count: u32,
        user_limit: u32,
        valid_from: Timestamp,
        valid_until: Timestamp,
        is_active: bool,
    ) -> Result<Self, InvalidPromoCode> {
        if valid_from > valid_until {
            return Err(InvalidPromoCode::InvertedWindow {
                valid_from,
                valid_until,
            });
        }
        if used_count > usage_limit {
            return Err(InvalidPromoCode::OverdrawnUsage {
                used_count,
                usage_limit,
            });
        }
        Ok(Self {
            id,
            code,
            benefit,
            min_order_amount,
            usage_limit,
            used_count,
            user_limit,
            valid_from,
            valid_until,
            is_active,
        })
    }
}

/// Per-user redemption bookkeeping for one promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCodeUsage {
    /// The redeeming user.
    pub user_id: UserId,
    /// The redeemed code.
    pub promo_code_id: PromoCodeId,
    /// How many times this user has redeemed the code.
    pub used_count: u32,
    /// When the user last redeemed it.
    pub last_used: Timestamp,
}

/// Why a promo code was refused.
///
/// Messages are user-facing and surfaced verbatim by the checkout UI; the
/// checkout itself stays retryable without the code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromoRejection {
    /// No promo code exists for the entered text.
    #[error("promo code not found")]
    UnknownCode,
    /// The code exists but is disabled.
    #[error("promo code is not active")]
    Inactive,
    /// The validity window has not opened yet.
    #[error("promo code is not valid until {valid_from}")]
    NotYetValid {
        /// When the code becomes redeemable.
        valid_from: Timestamp,
    },
    /// The validity window has closed.
    #[error("promo code expired on {valid_until}")]
    Expired {
        /// When the code stopped being redeemable.
        valid_until: Timestamp,
    },
    /// The order is too small for this code.
    #[error("order amount is below the minimum of {min_order_amount}")]
    BelowMinimum {
        /// The minimum order amount the code requires.
        min_order_amount: Amount,
    },
    /// The code has been redeemed as many times as it allows.
    #[error("promo code usage limit reached")]
    UsageLimitReached,
    /// This user has redeemed the code as often as allowed.
    #[error("you have already used this promo code the maximum number of times")]
    UserLimitReached,
}

/// A successful validation: the code and the discount it grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoGrant {
    /// The validated promo code record.
    pub promo: PromoCode,
    /// The discount the code grants on the checked order amount.
    ///
    /// For a fixed benefit this can exceed the order amount; the pricing
    /// aggregator floors the total at zero.
    pub discount: Amount,
}

/// Runs the ordered rule checks for a promo code lookup result.
///
/// `promo` is the record found for the entered code (or `None`), `usage`
/// the per-user bookkeeping for that record (or `None` when the user never
/// redeemed it). Checks run in a fixed order and short-circuit on the
/// first failure; the order matters because each failure message is more
/// specific than the next, and cheaper checks run first.
pub fn validate(
    promo: Option<&PromoCode>,
    usage: Option<&PromoCodeUsage>,
    order_amount: Amount,
    now: Timestamp,
) -> Result<PromoGrant, PromoRejection> {
    let promo = promo.ok_or(PromoRejection::UnknownCode)?;
    if !promo.is_active {
        return Err(PromoRejection::Inactive);
    }
    if now < promo.valid_from {
        return Err(PromoRejection::NotYetValid {
            valid_from: promo.valid_from,
        });
    }
    if now > promo.valid_until {
        return Err(PromoRejection::Expired {
            valid_until: promo.valid_until,
        });
    }
    if order_amount < promo.min_order_amount {
        return Err(PromoRejection::BelowMinimum {
            min_order_amount: promo.min_order_amount,
        });
    }
    if promo.used_count >= promo.usage_limit {
        return Err(PromoRejection::UsageLimitReached);
    }
    let user_used = usage.map_or(0, |u| u.used_count);
    if user_used >= promo.user_limit {
        return Err(PromoRejection::UserLimitReached);
    }

    Ok(PromoGrant {
        discount: promo.benefit.discount_for(order_amount),
        promo: promo.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    fn window() -> (Timestamp, Timestamp) {
        let now = Utc::now();
        (
            Timestamp::new(now - Duration::days(1)),
            Timestamp::new(now + Duration::days(1)),
        )
    }

    fn percentage_code(value: u8, max_discount: Option<u64>) -> PromoCode {
        let (from, until) = window();
        PromoCode::new(
            PromoCodeId::try_new("promo-1").unwrap(),
            PromoCodeKey::try_new("SAVE20").unwrap(),
            PromoBenefit::Percentage {
                value: Percent::try_new(value).unwrap(),
                max_discount: max_discount.map(Amount::new),
            },
            Amount::ZERO,
            10,
            0,
            1,
            from,
            until,
            true,
        )
        .unwrap()
    }

    fn fixed_code(value: u64) -> PromoCode {
        let (from, until) = window();
        PromoCode::new(
            PromoCodeId::try_new("promo-2").unwrap(),
            PromoCodeKey::try_new("TAKE100K").unwrap(),
            PromoBenefit::Fixed {
                value: Amount::new(value),
            },
            Amount::ZERO,
            10,
            0,
            1,
            from,
            until,
            true,
        )
        .unwrap()
    }

    #[test]
    fn unknown_code_is_the_first_rejection() {
        let result = validate(None, None, Amount::new(1000), Timestamp::now());
        assert_eq!(result.unwrap_err(), PromoRejection::UnknownCode);
    }

    #[test]
    fn inactive_code_is_rejected_before_window_checks() {
        let mut promo = percentage_code(20, None);
        promo.is_active = false;
        // Also outside its window, but inactivity must win.
        promo.valid_until = promo.valid_from;
        let result = validate(Some(&promo), None, Amount::new(1000), Timestamp::now());
        assert_eq!(result.unwrap_err(), PromoRejection::Inactive);
    }

    #[test]
    fn not_yet_valid_and_expired_windows_are_distinguished() {
        let now = Utc::now();
        let mut promo = percentage_code(20, None);

        promo.valid_from = Timestamp::new(now + Duration::days(1));
        promo.valid_until = Timestamp::new(now + Duration::days(2));
        assert!(matches!(
            validate(Some(&promo), None, Amount::new(1000), Timestamp::new(now)),
            Err(PromoRejection::NotYetValid { .. })
        ));

        promo.valid_from = Timestamp::new(now - Duration::days(2));
        promo.valid_until = Timestamp::new(now - Duration::days(1));
        assert!(matches!(
            validate(Some(&promo), None, Amount::new(1000), Timestamp::new(now)),
            Err(PromoRejection::Expired { .. })
        ));
    }

    #[test]
    fn below_minimum_order_amount_is_rejected() {
        let mut promo = percentage_code(20, None);
        promo.min_order_amount = Amount::new(50_000);
        let result = validate(Some(&promo), None, Amount::new(49_999), Timestamp::now());
        assert_eq!(
            result.unwrap_err(),
            PromoRejection::BelowMinimum {
                min_order_amount: Amount::new(50_000)
            }
        );
        // Exactly at the minimum is accepted.
        assert!(validate(Some(&promo), None, Amount::new(50_000), Timestamp::now()).is_ok());
    }

    #[test]
    fn exhausted_global_limit_is_rejected_regardless_of_user() {
        let mut promo = percentage_code(20, None);
        promo.usage_limit = 3;
        promo.used_count = 3;
        let result = validate(Some(&promo), None, Amount::new(1000), Timestamp::now());
        assert_eq!(result.unwrap_err(), PromoRejection::UsageLimitReached);
    }

    #[test]
    fn user_limit_is_checked_last() {
        let promo = percentage_code(20, None);
        let usage = PromoCodeUsage {
            user_id: UserId::try_new("alice").unwrap(),
            promo_code_id: promo.id.clone(),
            used_count: 1,
            last_used: Timestamp::now(),
        };
        let result = validate(Some(&promo), Some(&usage), Amount::new(1000), Timestamp::now());
        assert_eq!(result.unwrap_err(), PromoRejection::UserLimitReached);
    }

    #[test]
    fn percentage_discount_is_clamped_to_max_discount() {
        let promo = percentage_code(20, Some(50_000));
        let grant = validate(Some(&promo), None, Amount::new(1_000_000), Timestamp::now()).unwrap();
        assert_eq!(grant.discount, Amount::new(50_000));
    }

    #[test]
    fn percentage_discount_below_cap_is_untouched() {
        let promo = percentage_code(20, Some(50_000));
        let grant = validate(Some(&promo), None, Amount::new(100_000), Timestamp::now()).unwrap();
        assert_eq!(grant.discount, Amount::new(20_000));
    }

    #[test]
    fn fixed_discount_is_not_clamped_to_order_amount() {
        let promo = fixed_code(100_000);
        let grant = validate(Some(&promo), None, Amount::new(50_000), Timestamp::now()).unwrap();
        assert_eq!(grant.discount, Amount::new(100_000));
    }

    #[test]
    fn constructor_rejects_inverted_window_and_overdrawn_usage() {
        let (from, until) = window();
        let err = PromoCode::new(
            PromoCodeId::try_new("p").unwrap(),
            PromoCodeKey::try_new("X").unwrap(),
            PromoBenefit::Fixed {
                value: Amount::new(1),
            },
            Amount::ZERO,
            5,
            0,
            1,
            until,
            from,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, InvalidPromoCode::InvertedWindow { .. }));

        let err = PromoCode::new(
            PromoCodeId::try_new("p").unwrap(),
            PromoCodeKey::try_new("X").unwrap(),
            PromoBenefit::Fixed {
                value: Amount::new(1),
            },
            Amount::ZERO,
            5,
            6,
            1,
            from,
            until,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, InvalidPromoCode::OverdrawnUsage { .. }));
    }

    #[test]
    fn promo_code_serializes_with_camel_case_field_names() {
        let promo = percentage_code(20, Some(50_000));
        let json = serde_json::to_value(&promo).unwrap();
        assert!(json.get("minOrderAmount").is_some());
        assert!(json.get("usageLimit").is_some());
        assert!(json.get("usedCount").is_some());
        assert!(json.get("maxDiscount").is_some());
        assert_eq!(json.get("type").unwrap(), "percentage");
    }

    proptest! {
        #[test]
        fn percentage_discount_never_exceeds_cap_or_amount(
            units in 0u64..=1_000_000_000u64,
            pct in 0u8..=100u8,
            cap in proptest::option::of(0u64..=10_000_000u64),
        ) {
            let benefit = PromoBenefit::Percentage {
                value: Percent::try_new(pct).unwrap(),
                max_discount: cap.map(Amount::new),
            };
            let discount = benefit.discount_for(Amount::new(units));
            prop_assert!(discount <= Amount::new(units));
            if let Some(cap) = cap {
                prop_assert!(discount <= Amount::new(cap));
            }
        }

        #[test]
        fn fixed_discount_is_always_face_value(face in 0u64..=u64::MAX, units in 0u64..=u64::MAX) {
            let benefit = PromoBenefit::Fixed { value: Amount::new(face) };
            prop_assert_eq!(benefit.discount_for(Amount::new(units)), Amount::new(face));
        }
    }
}
