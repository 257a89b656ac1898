//! Bidding and money rules that do not touch the database or the processor.

use chrono::{DateTime, Duration, Utc};
use common::{
    error::{AppError, Res},
    misc::{RegistrationStatus, SaleStatus, format_cents, hash_str},
};
use db::models::{lot::Lot, registration::Registration, sale::Sale};
use uuid::Uuid;

/// Card authorizations are only good for about a week.
pub const HOLD_VALIDITY_DAYS: i64 = 7;

/// Bid step for a lot without its own `min_increment`, by current price in cents.
pub fn tier_increment(current_price: i64) -> i64 {
    match current_price {
        p if p < 10_000 => 500,
        p if p < 100_000 => 2_500,
        p if p < 1_000_000 => 10_000,
        _ => 25_000,
    }
}

pub fn increment_for(lot: &Lot) -> i64 {
    lot.min_increment
        .filter(|step| *step > 0)
        .unwrap_or_else(|| tier_increment(lot.current_price))
}

/// Lowest amount the next bid may have. The first bid may match the
/// starting price.
pub fn minimum_next_bid(lot: &Lot) -> i64 {
    if lot.bid_count == 0 {
        lot.starting_price
    } else {
        lot.current_price.saturating_add(increment_for(lot))
    }
}

pub fn validate_bid_amount(lot: &Lot, amount: i64) -> Res<()> {
    let minimum = minimum_next_bid(lot);
    if amount < minimum {
        return Err(AppError::BadRequest(format!(
            "Bid must be at least {}",
            format_cents(minimum)
        )));
    }
    Ok(())
}

pub fn hold_expired(authorized_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match authorized_at {
        Some(at) => now - at >= Duration::days(HOLD_VALIDITY_DAYS),
        None => true,
    }
}

/// An authorized registration whose deposit hold (if any) is still good.
pub fn registration_usable(registration: &Registration, now: DateTime<Utc>) -> bool {
    registration.status == RegistrationStatus::Authorized.as_str()
        && (registration.deposit_amount == 0 || !hold_expired(registration.authorized_at, now))
}

/// End time after a bid placed at `now`. A bid inside the soft-close
/// window pushes the end to `now + soft_close_seconds`; the end never
/// moves earlier.
pub fn soft_close_end(
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
    soft_close_seconds: i32,
) -> DateTime<Utc> {
    let window = Duration::seconds(i64::from(soft_close_seconds.max(0)));
    if ends_at - now < window {
        (now + window).max(ends_at)
    } else {
        ends_at
    }
}

/// Stable per-lot pseudonym so bid history does not expose who is bidding.
pub fn bidder_alias(lot_id: Uuid, bidder_id: Uuid) -> String {
    let digest = hash_str(&format!("{}:{}", lot_id, bidder_id));
    format!("Bidder {}", digest[..6].to_uppercase())
}

/// Amount to refund for a request: the remaining refundable amount when
/// none is given.
pub fn resolve_refund_amount(sale: &Sale, requested: Option<i64>) -> Res<i64> {
    if sale.status != SaleStatus::Paid.as_str() {
        return Err(AppError::Conflict(format!(
            "Only paid sales can be refunded, this one is {}",
            sale.status
        )));
    }

    let remaining = sale.refundable_amount();
    let amount = requested.unwrap_or(remaining);
    if amount <= 0 {
        return Err(AppError::BadRequest("Refund amount must be positive".to_string()));
    }
    if amount > remaining {
        return Err(AppError::BadRequest(format!(
            "Refund exceeds the refundable amount of {}",
            format_cents(remaining)
        )));
    }
    Ok(amount)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use common::misc::{BidStatus, HoldStatus, LotStatus, SaleStatus};
    use db::models::{bid::Bid, lot::Lot, sale::Sale};
    use uuid::Uuid;

    pub fn lot(starting_price: i64, current_price: i64, bid_count: i32) -> Lot {
        let now = Utc::now();
        Lot {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            lot_number: 1,
            title: "CNC Lathe".to_string(),
            description: None,
            starting_price,
            current_price,
            min_increment: None,
            reserve_price: None,
            bid_count,
            high_bidder_id: None,
            winner_id: None,
            status: LotStatus::Live.as_str().to_string(),
            ends_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn bid(lot: &Lot, amount: i64, status: BidStatus, hold: HoldStatus) -> Bid {
        let id = Uuid::new_v4();
        Bid {
            id,
            auction_id: lot.id,
            bidder_id: Uuid::new_v4(),
            amount,
            status: status.as_str().to_string(),
            stripe_payment_intent_id: Some(format!("pi_{}", id.simple())),
            hold_status: hold.as_str().to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn sale(amount: i64, refunded_amount: i64, status: SaleStatus) -> Sale {
        let now = Utc::now();
        Sale {
            id: Uuid::new_v4(),
            auction_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            amount,
            refunded_amount,
            status: status.as_str().to_string(),
            stripe_payment_intent_id: Some("pi_sale".to_string()),
            failure_reason: None,
            pickup_slot_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{lot, sale};
    use super::*;

    #[test]
    fn increment_tiers() {
        assert_eq!(tier_increment(0), 500);
        assert_eq!(tier_increment(9_999), 500);
        assert_eq!(tier_increment(10_000), 2_500);
        assert_eq!(tier_increment(99_999), 2_500);
        assert_eq!(tier_increment(100_000), 10_000);
        assert_eq!(tier_increment(999_999), 10_000);
        assert_eq!(tier_increment(1_000_000), 25_000);
        assert_eq!(tier_increment(50_000_000), 25_000);
    }

    #[test]
    fn lot_increment_overrides_tiers() {
        let mut lot = lot(10_000, 20_000, 3);
        assert_eq!(increment_for(&lot), 2_500);
        lot.min_increment = Some(1_000);
        assert_eq!(increment_for(&lot), 1_000);
        lot.min_increment = Some(0);
        assert_eq!(increment_for(&lot), 2_500);
    }

    #[test]
    fn first_bid_may_match_starting_price() {
        let lot = lot(25_000, 25_000, 0);
        assert_eq!(minimum_next_bid(&lot), 25_000);
        assert!(validate_bid_amount(&lot, 25_000).is_ok());
        assert!(validate_bid_amount(&lot, 24_999).is_err());
    }

    #[test]
    fn later_bids_need_an_increment() {
        let lot = lot(25_000, 30_000, 2);
        assert_eq!(minimum_next_bid(&lot), 32_500);
        assert!(validate_bid_amount(&lot, 30_000).is_err());
        assert!(validate_bid_amount(&lot, 32_500).is_ok());
    }

    #[test]
    fn minimum_next_bid_saturates_at_the_top() {
        let mut lot = lot(25_000, i64::MAX - 10, 4);
        assert_eq!(minimum_next_bid(&lot), i64::MAX);
        lot.min_increment = Some(i64::MAX);
        assert_eq!(minimum_next_bid(&lot), i64::MAX);
        assert!(validate_bid_amount(&lot, i64::MAX).is_ok());
    }

    #[test]
    fn hold_expires_after_seven_days() {
        let now = Utc::now();
        assert!(hold_expired(None, now));
        assert!(!hold_expired(Some(now - Duration::days(6)), now));
        assert!(hold_expired(Some(now - Duration::days(7)), now));
    }

    #[test]
    fn soft_close_extends_late_bids_only() {
        let now = Utc::now();

        let far = now + Duration::minutes(30);
        assert_eq!(soft_close_end(far, now, 120), far);

        let close = now + Duration::seconds(30);
        assert_eq!(soft_close_end(close, now, 120), now + Duration::seconds(120));

        assert_eq!(soft_close_end(close, now, 0), close);
    }

    #[test]
    fn alias_is_stable_per_lot() {
        let lot_a = Uuid::new_v4();
        let lot_b = Uuid::new_v4();
        let bidder = Uuid::new_v4();

        let alias = bidder_alias(lot_a, bidder);
        assert!(alias.starts_with("Bidder "));
        assert_eq!(alias.len(), "Bidder ".len() + 6);
        assert_eq!(alias, bidder_alias(lot_a, bidder));
        assert_ne!(alias, bidder_alias(lot_b, bidder));
        assert!(!alias.contains(&bidder.to_string()));
    }

    #[test]
    fn refund_defaults_to_remaining_amount() {
        let sale = sale(50_000, 10_000, SaleStatus::Paid);
        assert_eq!(resolve_refund_amount(&sale, None).unwrap(), 40_000);
        assert_eq!(resolve_refund_amount(&sale, Some(5_000)).unwrap(), 5_000);
    }

    #[test]
    fn refund_amount_is_bounded() {
        let sale = sale(50_000, 10_000, SaleStatus::Paid);
        assert!(matches!(
            resolve_refund_amount(&sale, Some(40_001)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            resolve_refund_amount(&sale, Some(0)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn only_paid_sales_are_refundable() {
        for status in [SaleStatus::Pending, SaleStatus::Cancelled, SaleStatus::Refunded] {
            let sale = sale(50_000, 0, status);
            assert!(matches!(
                resolve_refund_amount(&sale, None),
                Err(AppError::Conflict(_))
            ));
        }
    }
}
