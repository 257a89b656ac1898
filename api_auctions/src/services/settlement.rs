//! Closing lots once their time is up and wrapping up finished events.
//!
//! A lot is claimed by moving it to `closing`, so concurrent settlers never
//! both work on it. Every processor call carries a key derived from the bid
//! or registration it belongs to, which makes a rerun after a crash safe.

use common::{
    error::Res,
    misc::{BidStatus, HoldStatus, LotStatus, RegistrationStatus, SaleStatus},
    payments::HoldGateway,
};
use db::{
    dtos::sale::SaleCreateRequest,
    models::{bid::Bid, event::AuctionEvent, lot::Lot, registration::Registration},
};
use notifier::{Notifier, templates};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::services::holds;

/// Lots left in `closing` this long are considered abandoned and claimed again.
pub const STALE_CLAIM_MINUTES: i64 = 10;

const FAILED_RELEASE_BATCH: i64 = 100;

/// What to do with the bids of a lot that has ended.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementPlan {
    pub winner: Option<Bid>,
    /// Every other bid whose hold is still on the card.
    pub releases: Vec<Bid>,
    /// Bids to mark `lost`.
    pub losers: Vec<Uuid>,
}

/// Picks the winner (highest active bid, earliest on a tie) unless the
/// reserve is not met.
pub fn plan_settlement(lot: &Lot, bids: &[Bid]) -> SettlementPlan {
    let winner = bids
        .iter()
        .filter(|b| b.status == BidStatus::Active.as_str())
        .max_by(|a, b| {
            a.amount
                .cmp(&b.amount)
                .then_with(|| b.created_at.cmp(&a.created_at))
        })
        .filter(|b| lot.reserve_price.is_none_or(|reserve| b.amount >= reserve))
        .cloned();

    let winner_id = winner.as_ref().map(|w| w.id);
    let others = bids.iter().filter(|b| Some(b.id) != winner_id);

    let releases = others
        .clone()
        .filter(|b| holds::holds_funds(b))
        .cloned()
        .collect();
    let losers = others
        .filter(|b| {
            b.status == BidStatus::Active.as_str() || b.status == BidStatus::Outbid.as_str()
        })
        .map(|b| b.id)
        .collect();

    SettlementPlan {
        winner,
        releases,
        losers,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    Captured,
    Failed(String),
}

pub async fn capture_winner(gateway: &dyn HoldGateway, winner: &Bid) -> Capture {
    let intent = match (&winner.stripe_payment_intent_id, winner.hold_status.as_str()) {
        (Some(intent), status) if status == HoldStatus::Held.as_str() => intent,
        (Some(_), status) if status == HoldStatus::Captured.as_str() => return Capture::Captured,
        _ => return Capture::Failed("No card hold on the winning bid".to_string()),
    };

    let key = format!("capture:{}", winner.id);
    match gateway.capture_hold(intent, &key).await {
        Ok(()) => Capture::Captured,
        Err(e) => {
            log::warn!("Capture of winning bid {} failed: {}", winner.id, e);
            Capture::Failed(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LotOutcome {
    pub lot_id: Uuid,
    pub sold: bool,
    pub paid: bool,
    pub released: usize,
    pub release_failed: usize,
}

/// Settles one lot. `None` when another settler already has it.
///
/// Losing holds are released while the lot is still `closing`. If anything
/// after that fails the lot stays claimable, and the rerun repeats the same
/// keyed calls.
pub async fn settle_lot(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    notifier: &Notifier,
    lot_id: Uuid,
) -> Res<Option<LotOutcome>> {
    let Some(lot) = db::lot::claim_for_settlement(pool, lot_id, STALE_CLAIM_MINUTES).await? else {
        return Ok(None);
    };

    let bids = db::bid::bids_for_lot(pool, lot.id).await?;
    let plan = plan_settlement(&lot, &bids);
    let mut outcome = LotOutcome {
        lot_id: lot.id,
        ..Default::default()
    };

    let releases = holds::release_bid_holds(gateway, &plan.releases).await;
    holds::record_releases(pool, &releases).await?;
    outcome.released = releases.released.len();
    outcome.release_failed = releases.failed.len();

    match &plan.winner {
        Some(winner) => {
            let capture = capture_winner(gateway, winner).await;
            outcome.sold = true;
            outcome.paid = capture == Capture::Captured;
            record_sale(pool, &lot, winner, &capture, &plan.losers).await?;
            notify_winner(pool, notifier, &lot, winner, &capture).await;
        }
        None => close_unsold(pool, &lot, &plan.losers).await?,
    }

    log::info!(
        "Settled lot {}: sold={} paid={} released={} release_failed={}",
        lot.id,
        outcome.sold,
        outcome.paid,
        outcome.released,
        outcome.release_failed
    );
    Ok(Some(outcome))
}

async fn record_sale(
    pool: &PgPool,
    lot: &Lot,
    winner: &Bid,
    capture: &Capture,
    losers: &[Uuid],
) -> Res<()> {
    let (sale_status, hold_status, failure_reason) = match capture {
        Capture::Captured => (SaleStatus::Paid, HoldStatus::Captured, None),
        Capture::Failed(reason) => (SaleStatus::Pending, HoldStatus::Held, Some(reason.clone())),
    };

    let mut tx = pool.begin().await?;
    db::bid::set_bid_status(&mut *tx, losers, BidStatus::Lost).await?;
    db::bid::set_bid_status(&mut *tx, &[winner.id], BidStatus::Won).await?;
    db::bid::set_hold_status(&mut *tx, &[winner.id], hold_status).await?;
    let sale = db::sale::insert_sale(
        &mut *tx,
        SaleCreateRequest {
            auction_id: lot.id,
            event_id: lot.event_id,
            buyer_id: winner.bidder_id,
            amount: winner.amount,
            status: sale_status,
            stripe_payment_intent_id: winner.stripe_payment_intent_id.clone(),
            failure_reason,
        },
    )
    .await?;
    if sale.is_none() {
        log::warn!("Sale for lot {} already existed, keeping it", lot.id);
    }
    db::lot::finish_settlement(&mut *tx, lot.id, LotStatus::Sold, Some(winner.bidder_id)).await?;
    tx.commit().await?;
    Ok(())
}

async fn close_unsold(pool: &PgPool, lot: &Lot, losers: &[Uuid]) -> Res<()> {
    let mut tx = pool.begin().await?;
    db::bid::set_bid_status(&mut *tx, losers, BidStatus::Lost).await?;
    db::lot::finish_settlement(&mut *tx, lot.id, LotStatus::Unsold, None).await?;
    tx.commit().await?;
    Ok(())
}

async fn notify_winner(
    pool: &PgPool,
    notifier: &Notifier,
    lot: &Lot,
    winner: &Bid,
    capture: &Capture,
) {
    let profile = match db::profile::get_profile_by_id(pool, winner.bidder_id).await {
        Ok(profile) => profile,
        Err(e) => {
            log::error!("Failed to load winner of lot {}: {}", lot.id, e);
            return;
        }
    };

    let purchases_url = notifier.url("account/purchases");
    let email = match capture {
        Capture::Captured => templates::auction_won(
            &profile.first_name,
            &lot.title,
            winner.amount,
            true,
            &purchases_url,
        ),
        Capture::Failed(reason) => templates::payment_failed(
            &profile.first_name,
            &lot.title,
            winner.amount,
            reason,
            &purchases_url,
        ),
    };
    notifier.send(&profile.email, email).await;
}

/// Retries releases that failed earlier, on any lot, along with outbid or
/// lost bids still recorded as holding funds.
pub async fn retry_failed_releases(pool: &PgPool, gateway: &dyn HoldGateway) -> Res<holds::BidReleases> {
    let bids = db::bid::failed_releases(pool, FAILED_RELEASE_BATCH).await?;
    if bids.is_empty() {
        return Ok(holds::BidReleases::default());
    }
    let releases = holds::release_bid_holds(gateway, &bids).await;
    holds::record_releases(pool, &releases).await?;
    Ok(releases)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventOutcome {
    pub event_id: Uuid,
    pub deposits_released: usize,
    pub deposits_failed: usize,
    pub completed: bool,
}

/// Gives deposits back for every ended event whose lots are all settled and
/// marks it completed. Buyers with an unpaid sale keep their deposit on
/// hold for review. An event with a failed release stays live and is
/// retried on the next run.
pub async fn finalize_events(pool: &PgPool, gateway: &dyn HoldGateway) -> Res<Vec<EventOutcome>> {
    let events = db::event::finalizable_events(pool).await?;
    let mut outcomes = Vec::with_capacity(events.len());
    for event in events {
        match finalize_event(pool, gateway, &event).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => log::error!("Failed to finalize event {}: {}", event.id, e),
        }
    }
    Ok(outcomes)
}

async fn finalize_event(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    event: &AuctionEvent,
) -> Res<EventOutcome> {
    let mut outcome = EventOutcome {
        event_id: event.id,
        ..Default::default()
    };

    for registration in db::registration::releasable_for_event(pool, event.id).await? {
        if give_back_deposit(pool, gateway, &registration, RegistrationStatus::Released).await? {
            outcome.deposits_released += 1;
        } else {
            outcome.deposits_failed += 1;
        }
    }

    if outcome.deposits_failed == 0 {
        outcome.completed = db::event::complete_event(pool, event.id).await?.is_some();
    }

    log::info!(
        "Finalized event {}: released={} failed={} completed={}",
        event.id,
        outcome.deposits_released,
        outcome.deposits_failed,
        outcome.completed
    );
    Ok(outcome)
}

/// Cancels the deposit hold of an authorized registration and moves it to
/// `to`. `false` when the processor refused; the registration is left
/// authorized for a later run.
async fn give_back_deposit(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    registration: &Registration,
    to: RegistrationStatus,
) -> Res<bool> {
    if let Some(intent) = registration.stripe_payment_intent_id.as_deref() {
        let key = holds::release_key(intent);
        if let Err(e) = gateway.release_hold(intent, &key).await {
            log::error!(
                "Failed to release deposit {} of registration {}: {}",
                intent,
                registration.id,
                e
            );
            return Ok(false);
        }
    }
    db::registration::transition_registration(
        pool,
        registration.id,
        RegistrationStatus::Authorized,
        to,
    )
    .await?;
    Ok(true)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DepositReleases {
    pub released: usize,
    pub failed: usize,
}

async fn cancel_deposits(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    registrations: Vec<Registration>,
) -> Res<DepositReleases> {
    let mut result = DepositReleases::default();
    for registration in registrations
        .iter()
        .filter(|r| r.status == RegistrationStatus::Authorized.as_str())
    {
        if give_back_deposit(pool, gateway, registration, RegistrationStatus::Cancelled).await? {
            result.released += 1;
        } else {
            result.failed += 1;
        }
    }
    Ok(result)
}

/// Gives back every authorized deposit of a cancelled event. Deposits the
/// processor refused stay authorized and are picked up by
/// [`retry_cancelled_deposits`].
pub async fn cancel_event_deposits(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    event_id: Uuid,
) -> Res<DepositReleases> {
    let registrations = db::registration::list_registrations_by_event(pool, event_id).await?;
    cancel_deposits(pool, gateway, registrations).await
}

/// Deposits still authorized on cancelled events, across all events.
pub async fn retry_cancelled_deposits(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
) -> Res<DepositReleases> {
    let registrations =
        db::registration::authorized_on_cancelled_events(pool, FAILED_RELEASE_BATCH).await?;
    if registrations.is_empty() {
        return Ok(DepositReleases::default());
    }
    let result = cancel_deposits(pool, gateway, registrations).await?;
    log::info!(
        "Retried deposits of cancelled events: released={} failed={}",
        result.released,
        result.failed
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use common::{misc::EventStatus, payments::testing::FakeGateway};

    use super::*;
    use crate::{services::rules::fixtures, testing};

    #[test]
    fn highest_active_bid_wins() {
        let lot = fixtures::lot(10_000, 15_000, 3);
        let low = fixtures::bid(&lot, 10_000, BidStatus::Outbid, HoldStatus::Released);
        let mid = fixtures::bid(&lot, 12_500, BidStatus::Outbid, HoldStatus::ReleaseFailed);
        let high = fixtures::bid(&lot, 15_000, BidStatus::Active, HoldStatus::Held);

        let plan = plan_settlement(&lot, &[high.clone(), mid.clone(), low.clone()]);

        assert_eq!(plan.winner.map(|w| w.id), Some(high.id));
        assert_eq!(plan.releases.iter().map(|b| b.id).collect::<Vec<_>>(), vec![mid.id]);
        assert_eq!(plan.losers, vec![mid.id, low.id]);
    }

    #[test]
    fn earliest_bid_wins_a_tie() {
        let lot = fixtures::lot(10_000, 15_000, 2);
        let mut first = fixtures::bid(&lot, 15_000, BidStatus::Active, HoldStatus::Held);
        let second = fixtures::bid(&lot, 15_000, BidStatus::Active, HoldStatus::Held);
        first.created_at = second.created_at - Duration::seconds(5);

        let plan = plan_settlement(&lot, &[second.clone(), first.clone()]);
        assert_eq!(plan.winner.map(|w| w.id), Some(first.id));
        assert_eq!(plan.releases.len(), 1);
        assert_eq!(plan.losers, vec![second.id]);
    }

    #[test]
    fn unmet_reserve_means_no_winner() {
        let mut lot = fixtures::lot(10_000, 15_000, 2);
        lot.reserve_price = Some(20_000);
        let high = fixtures::bid(&lot, 15_000, BidStatus::Active, HoldStatus::Held);
        let low = fixtures::bid(&lot, 10_000, BidStatus::Outbid, HoldStatus::Released);

        let plan = plan_settlement(&lot, &[high.clone(), low.clone()]);
        assert!(plan.winner.is_none());
        assert_eq!(plan.releases.iter().map(|b| b.id).collect::<Vec<_>>(), vec![high.id]);
        assert_eq!(plan.losers, vec![high.id, low.id]);
    }

    #[test]
    fn met_reserve_keeps_the_winner() {
        let mut lot = fixtures::lot(10_000, 20_000, 1);
        lot.reserve_price = Some(20_000);
        let high = fixtures::bid(&lot, 20_000, BidStatus::Active, HoldStatus::Held);
        let plan = plan_settlement(&lot, &[high.clone()]);
        assert_eq!(plan.winner.map(|w| w.id), Some(high.id));
        assert!(plan.releases.is_empty());
        assert!(plan.losers.is_empty());
    }

    #[test]
    fn no_bids_no_work() {
        let lot = fixtures::lot(10_000, 10_000, 0);
        let plan = plan_settlement(&lot, &[]);
        assert_eq!(
            plan,
            SettlementPlan {
                winner: None,
                releases: Vec::new(),
                losers: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn capture_uses_bid_keyed_hold() {
        let lot = fixtures::lot(10_000, 15_000, 1);
        let winner = fixtures::bid(&lot, 15_000, BidStatus::Active, HoldStatus::Held);
        let gateway = FakeGateway::default();

        assert_eq!(capture_winner(&gateway, &winner).await, Capture::Captured);
        assert_eq!(
            *gateway.captured.lock().unwrap(),
            vec![winner.stripe_payment_intent_id.clone().unwrap()]
        );
    }

    #[tokio::test]
    async fn declined_capture_is_reported() {
        let lot = fixtures::lot(10_000, 15_000, 1);
        let winner = fixtures::bid(&lot, 15_000, BidStatus::Active, HoldStatus::Held);
        let gateway = FakeGateway {
            failing: vec![winner.stripe_payment_intent_id.clone().unwrap()],
            ..Default::default()
        };

        assert!(matches!(
            capture_winner(&gateway, &winner).await,
            Capture::Failed(_)
        ));
    }

    #[tokio::test]
    async fn winner_without_hold_cannot_be_captured() {
        let lot = fixtures::lot(10_000, 15_000, 1);
        let mut winner = fixtures::bid(&lot, 15_000, BidStatus::Active, HoldStatus::Released);
        let gateway = FakeGateway::default();
        assert!(matches!(
            capture_winner(&gateway, &winner).await,
            Capture::Failed(_)
        ));

        winner.hold_status = HoldStatus::Captured.as_str().to_string();
        assert_eq!(capture_winner(&gateway, &winner).await, Capture::Captured);
        assert!(gateway.captured.lock().unwrap().is_empty());
    }

    async fn ended_lot(pool: &PgPool) -> Lot {
        let event = testing::live_event(pool, 0).await;
        testing::lot(
            pool,
            event.id,
            LotStatus::Live,
            10_000,
            Utc::now() - Duration::minutes(1),
        )
        .await
    }

    /// An outbid bid at 10,000 (`pi_lost`) under an active one at 12,500 (`pi_won`).
    async fn contested(pool: &PgPool, lot: &Lot) -> (Bid, Bid) {
        let loser = testing::bidder(pool).await;
        let winner = testing::bidder(pool).await;
        let lost = testing::bid(
            pool,
            lot.id,
            loser.id,
            10_000,
            BidStatus::Outbid,
            HoldStatus::Held,
            "pi_lost",
        )
        .await;
        let won = testing::bid(
            pool,
            lot.id,
            winner.id,
            12_500,
            BidStatus::Active,
            HoldStatus::Held,
            "pi_won",
        )
        .await;
        (lost, won)
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn settling_captures_the_winner_and_frees_the_rest(pool: PgPool) {
        let lot = ended_lot(&pool).await;
        let (lost, won) = contested(&pool, &lot).await;
        let gateway = FakeGateway::default();
        let (notifier, mailer) = testing::notifier();

        let outcome = settle_lot(&pool, &gateway, &notifier, lot.id)
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.sold && outcome.paid);
        assert_eq!(outcome.released, 1);
        assert_eq!(*gateway.released.lock().unwrap(), vec!["pi_lost"]);
        assert_eq!(*gateway.captured.lock().unwrap(), vec!["pi_won"]);

        let lost = testing::reload_bid(&pool, lost.id).await;
        assert_eq!(lost.status, BidStatus::Lost.as_str());
        assert_eq!(lost.hold_status, HoldStatus::Released.as_str());
        let won = testing::reload_bid(&pool, won.id).await;
        assert_eq!(won.status, BidStatus::Won.as_str());
        assert_eq!(won.hold_status, HoldStatus::Captured.as_str());

        let settled = db::lot::get_lot_by_id(&pool, lot.id).await.unwrap();
        assert_eq!(settled.status, LotStatus::Sold.as_str());
        assert_eq!(settled.winner_id, Some(won.bidder_id));
        let sales = db::sale::sales_by_buyer(&pool, won.bidder_id).await.unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].sale.status, SaleStatus::Paid.as_str());
        assert_eq!(mailer.subjects().len(), 1);

        let again = settle_lot(&pool, &gateway, &notifier, lot.id).await.unwrap();
        assert!(again.is_none());
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn refused_release_is_retried_after_the_sale(pool: PgPool) {
        let lot = ended_lot(&pool).await;
        let (lost, _) = contested(&pool, &lot).await;
        let flaky = FakeGateway {
            failing: vec!["pi_lost".to_string()],
            ..Default::default()
        };
        let (notifier, _) = testing::notifier();

        let outcome = settle_lot(&pool, &flaky, &notifier, lot.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.release_failed, 1);
        assert!(outcome.sold);
        assert_eq!(
            testing::reload_bid(&pool, lost.id).await.hold_status,
            HoldStatus::ReleaseFailed.as_str()
        );

        let gateway = FakeGateway::default();
        let retried = retry_failed_releases(&pool, &gateway).await.unwrap();
        assert_eq!(retried.released, vec![lost.id]);
        assert_eq!(
            testing::reload_bid(&pool, lost.id).await.hold_status,
            HoldStatus::Released.as_str()
        );
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn lost_bid_still_marked_held_is_swept(pool: PgPool) {
        let lot = ended_lot(&pool).await;
        let bidder = testing::bidder(&pool).await;
        let stray = testing::bid(
            &pool,
            lot.id,
            bidder.id,
            10_000,
            BidStatus::Lost,
            HoldStatus::Held,
            "pi_stray",
        )
        .await;
        testing::bid(
            &pool,
            lot.id,
            bidder.id,
            12_500,
            BidStatus::Won,
            HoldStatus::Captured,
            "pi_paid",
        )
        .await;
        let gateway = FakeGateway::default();

        let retried = retry_failed_releases(&pool, &gateway).await.unwrap();
        assert_eq!(retried.released, vec![stray.id]);
        assert_eq!(*gateway.released.lock().unwrap(), vec!["pi_stray"]);
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn unmet_reserve_leaves_the_lot_unsold(pool: PgPool) {
        let lot = ended_lot(&pool).await;
        sqlx::query("UPDATE auctions SET reserve_price = 50000 WHERE id = $1")
            .bind(lot.id)
            .execute(&pool)
            .await
            .unwrap();
        let (lost, high) = contested(&pool, &lot).await;
        let gateway = FakeGateway::default();
        let (notifier, mailer) = testing::notifier();

        let outcome = settle_lot(&pool, &gateway, &notifier, lot.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!outcome.sold);
        assert_eq!(outcome.released, 2);
        assert!(gateway.captured.lock().unwrap().is_empty());
        assert!(mailer.subjects().is_empty());

        for bid in [lost, high] {
            let bid = testing::reload_bid(&pool, bid.id).await;
            assert_eq!(bid.status, BidStatus::Lost.as_str());
            assert_eq!(bid.hold_status, HoldStatus::Released.as_str());
        }
        let settled = db::lot::get_lot_by_id(&pool, lot.id).await.unwrap();
        assert_eq!(settled.status, LotStatus::Unsold.as_str());
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn finished_event_keeps_deposits_of_unpaid_buyers(pool: PgPool) {
        let now = Utc::now();
        let event = testing::event(
            &pool,
            EventStatus::Live,
            50_000,
            now - Duration::days(2),
            now - Duration::hours(1),
        )
        .await;
        let lot = testing::lot(
            &pool,
            event.id,
            LotStatus::Sold,
            10_000,
            now - Duration::hours(1),
        )
        .await;
        let paid_up = testing::bidder(&pool).await;
        let unpaid = testing::bidder(&pool).await;
        let released =
            testing::registration(&pool, event.id, paid_up.id, Some("pi_dep_a"), 50_000).await;
        let kept = testing::registration(&pool, event.id, unpaid.id, Some("pi_dep_b"), 50_000).await;
        testing::sale(&pool, &lot, unpaid.id, SaleStatus::Pending).await;
        let gateway = FakeGateway::default();

        let outcomes = finalize_events(&pool, &gateway).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].deposits_released, 1);
        assert!(outcomes[0].completed);
        assert_eq!(*gateway.released.lock().unwrap(), vec!["pi_dep_a"]);

        let released = db::registration::get_registration_by_id(&pool, released.id)
            .await
            .unwrap();
        assert_eq!(released.status, RegistrationStatus::Released.as_str());
        let kept = db::registration::get_registration_by_id(&pool, kept.id)
            .await
            .unwrap();
        assert_eq!(kept.status, RegistrationStatus::Authorized.as_str());
        let event = db::event::get_event_by_id(&pool, event.id).await.unwrap();
        assert_eq!(event.status, EventStatus::Completed.as_str());
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn refused_deposit_of_cancelled_event_is_retried(pool: PgPool) {
        let now = Utc::now();
        let event = testing::event(
            &pool,
            EventStatus::Cancelled,
            50_000,
            now + Duration::days(1),
            now + Duration::days(2),
        )
        .await;
        let bidder = testing::bidder(&pool).await;
        let registration =
            testing::registration(&pool, event.id, bidder.id, Some("pi_dep"), 50_000).await;
        let flaky = FakeGateway {
            failing: vec!["pi_dep".to_string()],
            ..Default::default()
        };

        let first = cancel_event_deposits(&pool, &flaky, event.id).await.unwrap();
        assert_eq!(first, DepositReleases { released: 0, failed: 1 });
        let stored = db::registration::get_registration_by_id(&pool, registration.id)
            .await
            .unwrap();
        assert_eq!(stored.status, RegistrationStatus::Authorized.as_str());

        let gateway = FakeGateway::default();
        let retried = retry_cancelled_deposits(&pool, &gateway).await.unwrap();
        assert_eq!(retried, DepositReleases { released: 1, failed: 0 });
        assert_eq!(*gateway.released.lock().unwrap(), vec!["pi_dep"]);
        let stored = db::registration::get_registration_by_id(&pool, registration.id)
            .await
            .unwrap();
        assert_eq!(stored.status, RegistrationStatus::Cancelled.as_str());
    }
}
