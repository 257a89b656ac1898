use common::{
    error::{AppError, Res},
    misc::LotStatus,
};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    dtos::lot::{ApplyBid, LotCreateRequest, LotUpdateRequest},
    models::lot::{Lot, LotImage},
};

pub async fn list_lots_by_event<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    event_id: Uuid,
    include_drafts: bool,
) -> Res<Vec<Lot>> {
    sqlx::query_as::<_, Lot>(
        r#"
        SELECT * FROM auctions
        WHERE event_id = $1 AND ($2 OR status <> 'draft')
        ORDER BY lot_number
        "#,
    )
    .bind(event_id)
    .bind(include_drafts)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_lot_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lot_id: Uuid,
) -> Res<Lot> {
    sqlx::query_as::<_, Lot>("SELECT * FROM auctions WHERE id = $1")
        .bind(lot_id)
        .fetch_one(executor)
        .await
        .map_err(|e| AppError::not_found_or(e.into(), "Lot"))
}

pub async fn insert_lot<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: LotCreateRequest,
) -> Res<Lot> {
    sqlx::query_as::<_, Lot>(
        r#"
        INSERT INTO auctions (
            event_id, lot_number, title, description, starting_price,
            current_price, min_increment, reserve_price, ends_at
        )
        VALUES ($1, $2, $3, $4, $5, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(data.event_id)
    .bind(data.lot_number)
    .bind(data.title)
    .bind(data.description)
    .bind(data.starting_price)
    .bind(data.min_increment)
    .bind(data.reserve_price)
    .bind(data.ends_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

/// Pricing fields only change while no bid has been placed.
pub async fn update_lot<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lot_id: Uuid,
    data: LotUpdateRequest,
) -> Res<Option<Lot>> {
    sqlx::query_as::<_, Lot>(
        r#"
        UPDATE auctions SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            starting_price = CASE WHEN bid_count = 0 THEN COALESCE($4, starting_price) ELSE starting_price END,
            current_price = CASE WHEN bid_count = 0 THEN COALESCE($4, current_price) ELSE current_price END,
            min_increment = COALESCE($5, min_increment),
            reserve_price = COALESCE($6, reserve_price),
            ends_at = COALESCE($7, ends_at),
            updated_at = now()
        WHERE id = $1 AND status IN ('draft', 'upcoming', 'live')
        RETURNING *
        "#,
    )
    .bind(lot_id)
    .bind(data.title)
    .bind(data.description)
    .bind(data.starting_price)
    .bind(data.min_increment)
    .bind(data.reserve_price)
    .bind(data.ends_at)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn set_lot_status<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lot_id: Uuid,
    from: &[LotStatus],
    to: LotStatus,
) -> Res<Option<Lot>> {
    let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
    sqlx::query_as::<_, Lot>(
        r#"
        UPDATE auctions SET status = $3, updated_at = now()
        WHERE id = $1 AND status = ANY($2)
        RETURNING *
        "#,
    )
    .bind(lot_id)
    .bind(from)
    .bind(to.as_str())
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Opens every upcoming lot of an event for bidding.
pub async fn start_lots_for_event<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    event_id: Uuid,
) -> Res<u64> {
    let result = sqlx::query(
        r#"
        UPDATE auctions SET status = 'live', updated_at = now()
        WHERE event_id = $1 AND status = 'upcoming'
        "#,
    )
    .bind(event_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Raises the lot price if nobody else got there first. Returns `None`
/// when the lot moved on (another bid, closed or ended) since it was read.
pub async fn apply_bid<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: ApplyBid,
) -> Res<Option<Lot>> {
    sqlx::query_as::<_, Lot>(
        r#"
        UPDATE auctions SET
            current_price = $3,
            bid_count = bid_count + 1,
            high_bidder_id = $2,
            ends_at = GREATEST(ends_at, $6),
            updated_at = now()
        WHERE id = $1
          AND status = 'live'
          AND ends_at > now()
          AND current_price = $4
          AND bid_count = $5
          AND $3 >= current_price
        RETURNING *
        "#,
    )
    .bind(data.lot_id)
    .bind(data.bidder_id)
    .bind(data.amount)
    .bind(data.observed_price)
    .bind(data.observed_bid_count)
    .bind(data.extend_to)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Live lots whose end time has passed, plus lots left in `closing` by a
/// settler that stopped more than `stale_minutes` ago.
pub async fn due_lots<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    stale_minutes: i64,
) -> Res<Vec<Lot>> {
    sqlx::query_as::<_, Lot>(
        r#"
        SELECT * FROM auctions
        WHERE (status = 'live' AND ends_at <= now())
           OR (status = 'closing' AND updated_at < now() - make_interval(mins => $1::int))
        ORDER BY ends_at
        LIMIT 100
        "#,
    )
    .bind(stale_minutes)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Moves a due lot to `closing`. Only one settler gets the row back.
pub async fn claim_for_settlement<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lot_id: Uuid,
    stale_minutes: i64,
) -> Res<Option<Lot>> {
    sqlx::query_as::<_, Lot>(
        r#"
        UPDATE auctions SET status = 'closing', updated_at = now()
        WHERE id = $1
          AND (
              (status = 'live' AND ends_at <= now())
              OR (status = 'closing' AND updated_at < now() - make_interval(mins => $2::int))
          )
        RETURNING *
        "#,
    )
    .bind(lot_id)
    .bind(stale_minutes)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn finish_settlement<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lot_id: Uuid,
    status: LotStatus,
    winner_id: Option<Uuid>,
) -> Res<Lot> {
    sqlx::query_as::<_, Lot>(
        r#"
        UPDATE auctions SET status = $2, winner_id = $3, updated_at = now()
        WHERE id = $1 AND status = 'closing'
        RETURNING *
        "#,
    )
    .bind(lot_id)
    .bind(status.as_str())
    .bind(winner_id)
    .fetch_one(executor)
    .await
    .map_err(|e| AppError::not_found_or(e.into(), "Closing lot"))
}

/// Ends a live lot immediately so the next settlement run picks it up.
pub async fn close_now<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lot_id: Uuid,
) -> Res<Option<Lot>> {
    sqlx::query_as::<_, Lot>(
        r#"
        UPDATE auctions SET ends_at = now(), updated_at = now()
        WHERE id = $1 AND status = 'live'
        RETURNING *
        "#,
    )
    .bind(lot_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn insert_image<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lot_id: Uuid,
    url: &str,
    position: i32,
) -> Res<LotImage> {
    sqlx::query_as::<_, LotImage>(
        r#"
        INSERT INTO auction_images (auction_id, url, position)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(lot_id)
    .bind(url)
    .bind(position)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn list_images<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lot_id: Uuid,
) -> Res<Vec<LotImage>> {
    sqlx::query_as::<_, LotImage>(
        "SELECT * FROM auction_images WHERE auction_id = $1 ORDER BY position, id",
    )
    .bind(lot_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}
