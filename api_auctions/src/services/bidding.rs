use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{
    error::{AppError, Res},
    misc::LotStatus,
    payments::{Hold, HoldGateway, HoldRequest},
};
use db::{
    dtos::{bid::BidCreateRequest, lot::ApplyBid},
    models::{
        bid::{Bid, BidWithLot},
        lot::Lot,
    },
};
use notifier::{Notifier, templates};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    dtos::auction::BidPlaced,
    services::{holds, maintenance, registration, rules},
};

fn ensure_biddable(lot: &Lot, now: DateTime<Utc>) -> Res<()> {
    if lot.status != LotStatus::Live.as_str() || lot.ends_at <= now {
        return Err(AppError::Conflict("Bidding is closed for this lot".to_string()));
    }
    Ok(())
}

/// The key also carries the bid count the bidder saw, so a retry after a
/// lost race places a fresh hold instead of replaying the cancelled one.
fn bid_hold_key(lot: &Lot, user_id: Uuid, amount: i64) -> String {
    format!("bid:{}:{}:{}:{}", lot.id, user_id, amount, lot.bid_count)
}

fn bid_hold_request(
    lot: &Lot,
    user_id: Uuid,
    amount: i64,
    customer_id: String,
    payment_method_id: String,
) -> HoldRequest {
    HoldRequest {
        customer_id,
        payment_method_id,
        amount,
        description: format!("Bid on lot {}: {}", lot.lot_number, lot.title),
        idempotency_key: bid_hold_key(lot, user_id, amount),
        metadata: HashMap::from([
            ("purpose".to_string(), "bid".to_string()),
            ("auction_id".to_string(), lot.id.to_string()),
            ("user_id".to_string(), user_id.to_string()),
        ]),
    }
}

/// Writes the bid if the lot still looks the way it did when the bid was
/// validated. Returns the updated lot, the new bid and the bids it outbid.
async fn record_bid(
    pool: &PgPool,
    lot: &Lot,
    user_id: Uuid,
    hold: &Hold,
    extend_to: DateTime<Utc>,
) -> Res<(Lot, Bid, Vec<Bid>)> {
    let mut tx = pool.begin().await?;

    let updated = db::lot::apply_bid(
        &mut *tx,
        ApplyBid {
            lot_id: lot.id,
            bidder_id: user_id,
            amount: hold.amount,
            observed_price: lot.current_price,
            observed_bid_count: lot.bid_count,
            extend_to,
        },
    )
    .await?
    .ok_or_else(|| {
        AppError::Conflict(
            "The price changed while your bid was being placed. Please review and bid again."
                .to_string(),
        )
    })?;

    let outbid = db::bid::outbid_active_bids(&mut *tx, lot.id).await?;
    let bid = db::bid::insert_bid(
        &mut *tx,
        BidCreateRequest {
            auction_id: lot.id,
            bidder_id: user_id,
            amount: hold.amount,
            stripe_payment_intent_id: hold.payment_intent_id.clone(),
        },
    )
    .await?;

    tx.commit().await?;
    Ok((updated, bid, outbid))
}

/// Cancels the hold of a bid that did not make it into the database.
///
/// A repeated submission carries the same key and gets the same intent back
/// from the processor. When the twin request recorded its bid, that intent
/// is the high bid's hold and stays on the card.
async fn release_unrecorded_hold(pool: &PgPool, gateway: &dyn HoldGateway, lot_id: Uuid, hold: &Hold) {
    match db::bid::intent_has_bid(pool, &hold.payment_intent_id).await {
        Ok(false) => {}
        Ok(true) => {
            log::info!(
                "Hold {} on lot {} backs a recorded bid, keeping it",
                hold.payment_intent_id,
                lot_id
            );
            return;
        }
        Err(e) => {
            log::error!(
                "Could not check hold {} of a failed bid on {}, leaving it to lapse: {}",
                hold.payment_intent_id,
                lot_id,
                e
            );
            return;
        }
    }

    let key = holds::release_key(&hold.payment_intent_id);
    if let Err(e) = gateway.release_hold(&hold.payment_intent_id, &key).await {
        log::error!(
            "Bid on {} failed and its hold {} could not be released: {}",
            lot_id,
            hold.payment_intent_id,
            e
        );
    }
}

/// Places a bid backed by a hold for the full amount.
///
/// The hold is placed before any row is touched. If the lot moved on in the
/// meantime the hold is cancelled and the caller gets a 409.
pub async fn place_bid(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    notifier: &Notifier,
    user_id: Uuid,
    lot_id: Uuid,
    amount: i64,
) -> Res<BidPlaced> {
    let settings = maintenance::ensure_open(pool).await?;

    let lot = db::lot::get_lot_by_id(pool, lot_id).await?;
    let now = Utc::now();
    ensure_biddable(&lot, now)?;
    rules::validate_bid_amount(&lot, amount)?;

    let profile = db::profile::get_profile_by_id(pool, user_id).await?;
    if !profile.verified {
        return Err(AppError::Forbidden(
            "Verify a card on your account before bidding".to_string(),
        ));
    }
    let registered = db::registration::get_registration(pool, lot.event_id, user_id)
        .await?
        .is_some_and(|r| rules::registration_usable(&r, now));
    if !registered {
        return Err(AppError::Forbidden(
            "Register for this event before bidding".to_string(),
        ));
    }

    let (customer_id, payment_method_id) = registration::billing_details(gateway, &profile).await?;
    let hold = gateway
        .place_hold(bid_hold_request(
            &lot,
            user_id,
            amount,
            customer_id,
            payment_method_id,
        ))
        .await?;

    let extend_to = rules::soft_close_end(lot.ends_at, now, settings.soft_close_seconds);
    let (updated, bid, outbid) = match record_bid(pool, &lot, user_id, &hold, extend_to).await {
        Ok(recorded) => recorded,
        Err(e) => {
            release_unrecorded_hold(pool, gateway, lot_id, &hold).await;
            return Err(e);
        }
    };

    log::info!(
        "Bid {} by {} on lot {} at {} ({} outbid)",
        bid.id,
        user_id,
        lot_id,
        amount,
        outbid.len()
    );

    holds::release_and_record(pool, gateway, &outbid).await;
    notify_outbid(pool, notifier, &updated, user_id, &outbid).await;

    Ok(BidPlaced {
        minimum_next_bid: rules::minimum_next_bid(&updated),
        current_price: updated.current_price,
        bid_count: updated.bid_count,
        ends_at: updated.ends_at,
        bid,
    })
}

/// Highest outbid amount per bidder, leaving out the one who just bid.
fn outbid_recipients(outbid: &[Bid], bidder_id: Uuid) -> HashMap<Uuid, i64> {
    let mut recipients: HashMap<Uuid, i64> = HashMap::new();
    for bid in outbid.iter().filter(|b| b.bidder_id != bidder_id) {
        let amount = recipients.entry(bid.bidder_id).or_insert(bid.amount);
        *amount = (*amount).max(bid.amount);
    }
    recipients
}

async fn notify_outbid(
    pool: &PgPool,
    notifier: &Notifier,
    lot: &Lot,
    bidder_id: Uuid,
    outbid: &[Bid],
) {
    let recipients = outbid_recipients(outbid, bidder_id);
    if recipients.is_empty() {
        return;
    }

    let ids: Vec<Uuid> = recipients.keys().copied().collect();
    let profiles = match db::profile::get_profiles_by_ids(pool, &ids).await {
        Ok(profiles) => profiles,
        Err(e) => {
            log::error!("Failed to load outbid bidders for lot {}: {}", lot.id, e);
            return;
        }
    };

    let lot_url = notifier.url(&format!("lots/{}", lot.id));
    for profile in profiles {
        let Some(amount) = recipients.get(&profile.id) else {
            continue;
        };
        notifier
            .send(
                &profile.email,
                templates::outbid(
                    &profile.first_name,
                    &lot.title,
                    *amount,
                    lot.current_price,
                    &lot_url,
                ),
            )
            .await;
    }
}

pub async fn my_bids(pool: &PgPool, user_id: Uuid) -> Res<Vec<BidWithLot>> {
    db::bid::bids_by_bidder(pool, user_id).await
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::{
        misc::{BidStatus, HoldStatus},
        payments::testing::FakeGateway,
    };

    use super::*;
    use crate::{services::rules::fixtures, testing};

    #[test]
    fn closed_or_ended_lots_refuse_bids() {
        let now = Utc::now();
        let mut lot = fixtures::lot(10_000, 10_000, 0);
        lot.ends_at = now + Duration::minutes(5);
        assert!(ensure_biddable(&lot, now).is_ok());

        lot.ends_at = now - Duration::seconds(1);
        assert!(matches!(ensure_biddable(&lot, now), Err(AppError::Conflict(_))));

        lot.ends_at = now + Duration::minutes(5);
        lot.status = LotStatus::Upcoming.as_str().to_string();
        assert!(ensure_biddable(&lot, now).is_err());
    }

    #[test]
    fn hold_key_tracks_observed_state() {
        let mut lot = fixtures::lot(10_000, 12_500, 2);
        let user = Uuid::new_v4();
        let first = bid_hold_key(&lot, user, 15_000);
        assert_eq!(first, bid_hold_key(&lot, user, 15_000));

        lot.bid_count = 3;
        assert_ne!(first, bid_hold_key(&lot, user, 15_000));
        assert!(first.starts_with(&format!("bid:{}:{}:15000", lot.id, user)));
    }

    #[test]
    fn hold_request_is_for_the_bid_amount() {
        let lot = fixtures::lot(10_000, 12_500, 2);
        let req = bid_hold_request(
            &lot,
            Uuid::new_v4(),
            15_000,
            "cus_1".to_string(),
            "pm_1".to_string(),
        );
        assert_eq!(req.amount, 15_000);
        assert_eq!(req.metadata["purpose"], "bid");
        assert_eq!(req.metadata["auction_id"], lot.id.to_string());
    }

    #[test]
    fn outbid_notice_skips_the_new_bidder() {
        let lot = fixtures::lot(10_000, 15_000, 3);
        let mine = fixtures::bid(&lot, 12_500, BidStatus::Active, HoldStatus::Held);
        let theirs = fixtures::bid(&lot, 15_000, BidStatus::Active, HoldStatus::Held);

        let recipients = outbid_recipients(&[mine.clone(), theirs.clone()], mine.bidder_id);
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[&theirs.bidder_id], 15_000);
    }

    /// A live lot ending in an hour, open to bidders without a deposit.
    async fn open_lot(pool: &PgPool) -> Lot {
        let event = testing::live_event(pool, 0).await;
        testing::lot(
            pool,
            event.id,
            LotStatus::Live,
            10_000,
            Utc::now() + Duration::hours(1),
        )
        .await
    }

    async fn registered_bidder(pool: &PgPool, lot: &Lot) -> Uuid {
        let profile = testing::bidder(pool).await;
        testing::registration(pool, lot.event_id, profile.id, None, 0).await;
        profile.id
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn stale_bid_is_refused_and_its_hold_released(pool: PgPool) {
        let lot = open_lot(&pool).await;
        let first = testing::bidder(&pool).await;
        let second = testing::bidder(&pool).await;
        let gateway = FakeGateway::default();

        let request = |user_id| {
            bid_hold_request(&lot, user_id, 10_000, "cus_test".to_string(), "pm_1".to_string())
        };
        let first_hold = gateway.place_hold(request(first.id)).await.unwrap();
        let second_hold = gateway.place_hold(request(second.id)).await.unwrap();

        record_bid(&pool, &lot, first.id, &first_hold, lot.ends_at)
            .await
            .unwrap();
        let late = record_bid(&pool, &lot, second.id, &second_hold, lot.ends_at).await;
        assert!(matches!(late, Err(AppError::Conflict(_))));

        release_unrecorded_hold(&pool, &gateway, lot.id, &second_hold).await;
        assert_eq!(
            *gateway.released.lock().unwrap(),
            vec![second_hold.payment_intent_id.clone()]
        );

        let bids = db::bid::bids_for_lot(&pool, lot.id).await.unwrap();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].bidder_id, first.id);
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn double_submit_keeps_the_winning_hold(pool: PgPool) {
        let lot = open_lot(&pool).await;
        let user_id = registered_bidder(&pool, &lot).await;
        let gateway = FakeGateway::default();
        let (notifier, _) = testing::notifier();

        let (a, b) = tokio::join!(
            place_bid(&pool, &gateway, &notifier, user_id, lot.id, 10_000),
            place_bid(&pool, &gateway, &notifier, user_id, lot.id, 10_000),
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

        let bids = db::bid::bids_for_lot(&pool, lot.id).await.unwrap();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].hold_status, HoldStatus::Held.as_str());
        let intent = bids[0].stripe_payment_intent_id.clone().unwrap();
        assert!(!gateway.released.lock().unwrap().contains(&intent));
        assert!(gateway.capture_hold(&intent, "capture:test").await.is_ok());
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn higher_bid_releases_the_previous_hold(pool: PgPool) {
        let lot = open_lot(&pool).await;
        let first = registered_bidder(&pool, &lot).await;
        let second = registered_bidder(&pool, &lot).await;
        let gateway = FakeGateway::default();
        let (notifier, mailer) = testing::notifier();

        let opening = place_bid(&pool, &gateway, &notifier, first, lot.id, 10_000)
            .await
            .unwrap();
        assert_eq!(opening.minimum_next_bid, 12_500);

        let too_low = place_bid(&pool, &gateway, &notifier, second, lot.id, 12_000).await;
        assert!(matches!(too_low, Err(AppError::BadRequest(_))));

        let placed = place_bid(&pool, &gateway, &notifier, second, lot.id, 12_500)
            .await
            .unwrap();
        assert_eq!(placed.bid_count, 2);
        assert_eq!(placed.current_price, 12_500);

        let outbid = testing::reload_bid(&pool, opening.bid.id).await;
        assert_eq!(outbid.status, BidStatus::Outbid.as_str());
        assert_eq!(outbid.hold_status, HoldStatus::Released.as_str());
        assert_eq!(mailer.subjects().len(), 1);
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn unregistered_bidder_is_refused_before_any_hold(pool: PgPool) {
        let lot = open_lot(&pool).await;
        let profile = testing::bidder(&pool).await;
        let gateway = FakeGateway::default();
        let (notifier, _) = testing::notifier();

        let result = place_bid(&pool, &gateway, &notifier, profile.id, lot.id, 10_000).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(gateway.placed.lock().unwrap().is_empty());
    }
}
