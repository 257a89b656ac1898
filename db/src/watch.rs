use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::watch::{Reminder, ReminderDue, WatchlistDue, WatchlistItem};

pub async fn add_watch<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    lot_id: Uuid,
) -> Res<()> {
    sqlx::query(
        r#"
        INSERT INTO watchlist (user_id, auction_id) VALUES ($1, $2)
        ON CONFLICT (user_id, auction_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(lot_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn remove_watch<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    lot_id: Uuid,
) -> Res<bool> {
    let result = sqlx::query("DELETE FROM watchlist WHERE user_id = $1 AND auction_id = $2")
        .bind(user_id)
        .bind(lot_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_watchlist<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Vec<WatchlistItem>> {
    sqlx::query_as::<_, WatchlistItem>(
        r#"
        SELECT w.auction_id, a.event_id, a.title, a.current_price, a.status, a.ends_at, w.created_at
        FROM watchlist w
        JOIN auctions a ON a.id = w.auction_id
        WHERE w.user_id = $1
        ORDER BY a.ends_at
        "#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn add_reminder<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    event_id: Uuid,
) -> Res<Reminder> {
    sqlx::query_as::<_, Reminder>(
        r#"
        INSERT INTO event_reminders (user_id, event_id) VALUES ($1, $2)
        ON CONFLICT (user_id, event_id) DO UPDATE SET user_id = EXCLUDED.user_id
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(event_id)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn remove_reminder<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    event_id: Uuid,
) -> Res<bool> {
    let result = sqlx::query("DELETE FROM event_reminders WHERE user_id = $1 AND event_id = $2")
        .bind(user_id)
        .bind(event_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_reminders<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Vec<Reminder>> {
    sqlx::query_as::<_, Reminder>(
        "SELECT * FROM event_reminders WHERE user_id = $1 ORDER BY created_at",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Marks watchers of lots closing within `lead_minutes` as notified and
/// returns them. A watcher is claimed at most once per lot.
pub async fn claim_watchlist_closing<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lead_minutes: i64,
) -> Res<Vec<WatchlistDue>> {
    sqlx::query_as::<_, WatchlistDue>(
        r#"
        WITH claimed AS (
            UPDATE watchlist w SET notified_at = now()
            FROM auctions a
            WHERE a.id = w.auction_id
              AND w.notified_at IS NULL
              AND a.status = 'live'
              AND a.ends_at > now()
              AND a.ends_at <= now() + make_interval(mins => $1::int)
            RETURNING w.user_id, w.auction_id
        )
        SELECT c.user_id, p.email, p.first_name, c.auction_id,
               a.title AS lot_title, a.current_price, a.ends_at
        FROM claimed c
        JOIN profiles p ON p.id = c.user_id
        JOIN auctions a ON a.id = c.auction_id
        "#,
    )
    .bind(lead_minutes)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Claims unsent reminders for events starting within `lead_minutes`.
pub async fn claim_due_reminders<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    lead_minutes: i64,
) -> Res<Vec<ReminderDue>> {
    sqlx::query_as::<_, ReminderDue>(
        r#"
        WITH claimed AS (
            UPDATE event_reminders r SET sent_at = now()
            FROM auction_events e
            WHERE e.id = r.event_id
              AND r.sent_at IS NULL
              AND e.status IN ('scheduled', 'live')
              AND e.starts_at <= now() + make_interval(mins => $1::int)
              AND e.ends_at > now()
            RETURNING r.user_id, r.event_id
        )
        SELECT c.user_id, p.email, p.first_name, c.event_id,
               e.title AS event_title, e.starts_at
        FROM claimed c
        JOIN profiles p ON p.id = c.user_id
        JOIN auction_events e ON e.id = c.event_id
        "#,
    )
    .bind(lead_minutes)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}
