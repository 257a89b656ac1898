use common::{
    error::{AppError, Res},
    misc::{BidStatus, HoldStatus},
};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    dtos::bid::BidCreateRequest,
    models::bid::{Bid, BidHistoryEntry, BidWithLot},
};

/// Demotes the current high bid of a lot. Must run before a new active
/// bid is inserted; returns the demoted bids so their holds can be released.
pub async fn outbid_active_bids<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lot_id: Uuid,
) -> Res<Vec<Bid>> {
    sqlx::query_as::<_, Bid>(
        r#"
        UPDATE bids SET status = 'outbid'
        WHERE auction_id = $1 AND status = 'active'
        RETURNING *
        "#,
    )
    .bind(lot_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn insert_bid<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: BidCreateRequest,
) -> Res<Bid> {
    sqlx::query_as::<_, Bid>(
        r#"
        INSERT INTO bids (auction_id, bidder_id, amount, status, stripe_payment_intent_id, hold_status)
        VALUES ($1, $2, $3, 'active', $4, 'held')
        RETURNING *
        "#,
    )
    .bind(data.auction_id)
    .bind(data.bidder_id)
    .bind(data.amount)
    .bind(data.stripe_payment_intent_id)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

/// Whether a recorded bid is backed by this payment intent.
pub async fn intent_has_bid<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    payment_intent_id: &str,
) -> Res<bool> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM bids WHERE stripe_payment_intent_id = $1)",
    )
    .bind(payment_intent_id)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn set_hold_status<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    bid_ids: &[Uuid],
    hold_status: HoldStatus,
) -> Res<u64> {
    if bid_ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("UPDATE bids SET hold_status = $2 WHERE id = ANY($1)")
        .bind(bid_ids)
        .bind(hold_status.as_str())
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Records the outcome of holds released by payment intent id.
pub async fn set_hold_status_by_intents<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    payment_intent_ids: &[String],
    hold_status: HoldStatus,
) -> Res<u64> {
    if payment_intent_ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query(
        r#"
        UPDATE bids SET hold_status = $2
        WHERE stripe_payment_intent_id = ANY($1) AND hold_status IN ('held', 'release_failed')
        "#,
    )
    .bind(payment_intent_ids)
    .bind(hold_status.as_str())
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn set_bid_status<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    bid_ids: &[Uuid],
    status: BidStatus,
) -> Res<u64> {
    if bid_ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("UPDATE bids SET status = $2 WHERE id = ANY($1)")
        .bind(bid_ids)
        .bind(status.as_str())
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Every bid on a lot, highest first.
pub async fn bids_for_lot<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lot_id: Uuid,
) -> Res<Vec<Bid>> {
    sqlx::query_as::<_, Bid>(
        "SELECT * FROM bids WHERE auction_id = $1 ORDER BY amount DESC, created_at ASC",
    )
    .bind(lot_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn bid_history<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lot_id: Uuid,
    limit: i64,
) -> Res<Vec<BidHistoryEntry>> {
    sqlx::query_as::<_, BidHistoryEntry>(
        r#"
        SELECT id, bidder_id, amount, created_at FROM bids
        WHERE auction_id = $1
        ORDER BY amount DESC, created_at ASC
        LIMIT $2
        "#,
    )
    .bind(lot_id)
    .bind(limit)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn bids_by_bidder<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    bidder_id: Uuid,
) -> Res<Vec<BidWithLot>> {
    sqlx::query_as::<_, BidWithLot>(
        r#"
        SELECT b.id, b.auction_id, b.amount, b.status, b.created_at,
               a.title AS lot_title, a.status AS lot_status, a.current_price, a.ends_at
        FROM bids b
        JOIN auctions a ON a.id = b.auction_id
        WHERE b.bidder_id = $1
        ORDER BY b.created_at DESC
        "#,
    )
    .bind(bidder_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Holds that should have been released but were not, across all lots:
/// failed releases, and outbid or lost bids still marked `held`.
pub async fn failed_releases<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    limit: i64,
) -> Res<Vec<Bid>> {
    sqlx::query_as::<_, Bid>(
        r#"
        SELECT * FROM bids
        WHERE stripe_payment_intent_id IS NOT NULL
          AND (
              hold_status = 'release_failed'
              OR (hold_status = 'held' AND status IN ('outbid', 'lost'))
          )
        ORDER BY created_at
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}
