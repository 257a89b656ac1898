//! Releasing the card holds behind bids and recording how it went.

use common::{
    error::Res,
    misc::HoldStatus,
    payments::{HoldGateway, PendingRelease, release_holds},
};
use db::models::bid::Bid;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Default, PartialEq)]
pub struct BidReleases {
    pub released: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

/// A bid whose hold is still on the card.
pub fn holds_funds(bid: &Bid) -> bool {
    bid.stripe_payment_intent_id.is_some()
        && (bid.hold_status == HoldStatus::Held.as_str()
            || bid.hold_status == HoldStatus::ReleaseFailed.as_str())
}

pub fn release_key(payment_intent_id: &str) -> String {
    format!("release:{}", payment_intent_id)
}

/// Cancels the hold of every bid that still has one. Never fails; holds
/// that could not be released are reported back.
pub async fn release_bid_holds(gateway: &dyn HoldGateway, bids: &[Bid]) -> BidReleases {
    let targets: Vec<(Uuid, String)> = bids
        .iter()
        .filter(|bid| holds_funds(bid))
        .filter_map(|bid| {
            bid.stripe_payment_intent_id
                .clone()
                .map(|intent| (bid.id, intent))
        })
        .collect();

    let pending = targets
        .iter()
        .map(|(_, intent)| PendingRelease {
            payment_intent_id: intent.clone(),
            idempotency_key: release_key(intent),
        })
        .collect();
    let report = release_holds(gateway, pending).await;

    let mut result = BidReleases::default();
    for (bid_id, intent) in targets {
        if report.released.contains(&intent) {
            result.released.push(bid_id);
        } else {
            result.failed.push(bid_id);
        }
    }
    result
}

pub async fn record_releases(pool: &PgPool, releases: &BidReleases) -> Res<()> {
    db::bid::set_hold_status(pool, &releases.released, HoldStatus::Released).await?;
    db::bid::set_hold_status(pool, &releases.failed, HoldStatus::ReleaseFailed).await?;
    if !releases.failed.is_empty() {
        log::warn!(
            "{} bid holds could not be released and are queued for retry",
            releases.failed.len()
        );
    }
    Ok(())
}

/// Releases and records in one go. Recording errors are logged: the
/// processor side has already happened and the sweep will reconcile.
pub async fn release_and_record(pool: &PgPool, gateway: &dyn HoldGateway, bids: &[Bid]) -> BidReleases {
    let releases = release_bid_holds(gateway, bids).await;
    if let Err(e) = record_releases(pool, &releases).await {
        log::error!("Failed to record released bid holds: {}", e);
    }
    releases
}

#[cfg(test)]
mod tests {
    use common::{misc::BidStatus, payments::testing::FakeGateway};

    use super::*;
    use crate::services::rules::fixtures;

    #[tokio::test]
    async fn only_live_holds_are_released() {
        let lot = fixtures::lot(10_000, 15_000, 3);
        let held = fixtures::bid(&lot, 15_000, BidStatus::Outbid, HoldStatus::Held);
        let retry = fixtures::bid(&lot, 12_000, BidStatus::Outbid, HoldStatus::ReleaseFailed);
        let done = fixtures::bid(&lot, 10_000, BidStatus::Outbid, HoldStatus::Released);
        let mut no_intent = fixtures::bid(&lot, 9_000, BidStatus::Outbid, HoldStatus::Held);
        no_intent.stripe_payment_intent_id = None;

        let gateway = FakeGateway::default();
        let releases =
            release_bid_holds(&gateway, &[held.clone(), retry.clone(), done, no_intent]).await;

        assert_eq!(releases.released, vec![held.id, retry.id]);
        assert!(releases.failed.is_empty());
        assert_eq!(gateway.released.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_releases_are_reported_by_bid() {
        let lot = fixtures::lot(10_000, 15_000, 2);
        let ok = fixtures::bid(&lot, 10_000, BidStatus::Outbid, HoldStatus::Held);
        let bad = fixtures::bid(&lot, 12_500, BidStatus::Outbid, HoldStatus::Held);

        let gateway = FakeGateway {
            failing: vec![bad.stripe_payment_intent_id.clone().unwrap()],
            ..Default::default()
        };
        let releases = release_bid_holds(&gateway, &[ok.clone(), bad.clone()]).await;

        assert_eq!(
            releases,
            BidReleases {
                released: vec![ok.id],
                failed: vec![bad.id],
            }
        );
    }
}
