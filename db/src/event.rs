use common::{
    error::{AppError, Res},
    misc::EventStatus,
};
use sqlx::{Executor, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    dtos::event::{EventCreateRequest, EventFilter, EventUpdateRequest},
    models::event::AuctionEvent,
};

pub async fn list_events<'e, E>(executor: E, filter: EventFilter) -> Res<Vec<AuctionEvent>>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM auction_events WHERE 1 = 1");

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }

    if !filter.include_drafts {
        qb.push(" AND status <> ").push_bind(EventStatus::Draft.as_str());
    }

    qb.push(" ORDER BY starts_at ASC");

    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    qb.build_query_as::<AuctionEvent>()
        .fetch_all(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_event_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    event_id: Uuid,
) -> Res<AuctionEvent> {
    sqlx::query_as::<_, AuctionEvent>("SELECT * FROM auction_events WHERE id = $1")
        .bind(event_id)
        .fetch_one(executor)
        .await
        .map_err(|e| AppError::not_found_or(e.into(), "Event"))
}

pub async fn insert_event<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: EventCreateRequest,
) -> Res<AuctionEvent> {
    sqlx::query_as::<_, AuctionEvent>(
        r#"
        INSERT INTO auction_events (title, description, location, starts_at, ends_at, deposit_amount)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(data.title)
    .bind(data.description)
    .bind(data.location)
    .bind(data.starts_at)
    .bind(data.ends_at)
    .bind(data.deposit_amount)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn update_event<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    event_id: Uuid,
    data: EventUpdateRequest,
) -> Res<AuctionEvent> {
    sqlx::query_as::<_, AuctionEvent>(
        r#"
        UPDATE auction_events SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            location = COALESCE($4, location),
            starts_at = COALESCE($5, starts_at),
            ends_at = COALESCE($6, ends_at),
            deposit_amount = COALESCE($7, deposit_amount),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(event_id)
    .bind(data.title)
    .bind(data.description)
    .bind(data.location)
    .bind(data.starts_at)
    .bind(data.ends_at)
    .bind(data.deposit_amount)
    .fetch_one(executor)
    .await
    .map_err(|e| AppError::not_found_or(e.into(), "Event"))
}

pub async fn update_event_status<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    event_id: Uuid,
    status: EventStatus,
) -> Res<AuctionEvent> {
    sqlx::query_as::<_, AuctionEvent>(
        "UPDATE auction_events SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(event_id)
    .bind(status.as_str())
    .fetch_one(executor)
    .await
    .map_err(|e| AppError::not_found_or(e.into(), "Event"))
}

/// Scheduled events whose start time has passed.
pub async fn due_to_start<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
) -> Res<Vec<AuctionEvent>> {
    sqlx::query_as::<_, AuctionEvent>(
        r#"
        SELECT * FROM auction_events
        WHERE status = 'scheduled' AND starts_at <= now()
        ORDER BY starts_at
        "#,
    )
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Moves a scheduled event to live. `None` if it was no longer scheduled.
pub async fn start_event<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    event_id: Uuid,
) -> Res<Option<AuctionEvent>> {
    sqlx::query_as::<_, AuctionEvent>(
        r#"
        UPDATE auction_events SET status = 'live', updated_at = now()
        WHERE id = $1 AND status = 'scheduled'
        RETURNING *
        "#,
    )
    .bind(event_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Live events past their end whose lots have all been settled.
pub async fn finalizable_events<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
) -> Res<Vec<AuctionEvent>> {
    sqlx::query_as::<_, AuctionEvent>(
        r#"
        SELECT e.* FROM auction_events e
        WHERE e.status = 'live'
          AND e.ends_at <= now()
          AND NOT EXISTS (
              SELECT 1 FROM auctions a
              WHERE a.event_id = e.id AND a.status IN ('upcoming', 'live', 'closing')
          )
        ORDER BY e.ends_at
        "#,
    )
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Moves a live event to completed. Returns `None` if another worker got there first.
pub async fn complete_event<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    event_id: Uuid,
) -> Res<Option<AuctionEvent>> {
    sqlx::query_as::<_, AuctionEvent>(
        r#"
        UPDATE auction_events SET status = 'completed', updated_at = now()
        WHERE id = $1 AND status = 'live'
        RETURNING *
        "#,
    )
    .bind(event_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}
