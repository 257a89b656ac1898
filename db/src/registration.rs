use common::{
    error::{AppError, Res},
    misc::RegistrationStatus,
};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{dtos::registration::RegistrationUpsert, models::registration::Registration};

pub async fn get_registration<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    event_id: Uuid,
    user_id: Uuid,
) -> Res<Option<Registration>> {
    sqlx::query_as::<_, Registration>(
        "SELECT * FROM event_registrations WHERE event_id = $1 AND user_id = $2",
    )
    .bind(event_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_registration_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    registration_id: Uuid,
) -> Res<Registration> {
    sqlx::query_as::<_, Registration>("SELECT * FROM event_registrations WHERE id = $1")
        .bind(registration_id)
        .fetch_one(executor)
        .await
        .map_err(|e| AppError::not_found_or(e.into(), "Registration"))
}

/// Creates the registration or re-authorizes an existing one with a new hold.
pub async fn upsert_authorized<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: RegistrationUpsert,
) -> Res<Registration> {
    sqlx::query_as::<_, Registration>(
        r#"
        INSERT INTO event_registrations
            (event_id, user_id, status, stripe_payment_intent_id, deposit_amount, authorized_at)
        VALUES ($1, $2, 'authorized', $3, $4, now())
        ON CONFLICT (event_id, user_id) DO UPDATE SET
            status = 'authorized',
            stripe_payment_intent_id = EXCLUDED.stripe_payment_intent_id,
            deposit_amount = EXCLUDED.deposit_amount,
            authorized_at = now(),
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(data.event_id)
    .bind(data.user_id)
    .bind(data.stripe_payment_intent_id)
    .bind(data.deposit_amount)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn list_registrations_by_event<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    event_id: Uuid,
) -> Res<Vec<Registration>> {
    sqlx::query_as::<_, Registration>(
        "SELECT * FROM event_registrations WHERE event_id = $1 ORDER BY created_at",
    )
    .bind(event_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Moves a registration between statuses. `None` if it was not in `from`.
pub async fn transition_registration<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    registration_id: Uuid,
    from: RegistrationStatus,
    to: RegistrationStatus,
) -> Res<Option<Registration>> {
    sqlx::query_as::<_, Registration>(
        r#"
        UPDATE event_registrations SET status = $3, updated_at = now()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(registration_id)
    .bind(from.as_str())
    .bind(to.as_str())
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Authorized deposits of an event that can be given back: every bidder
/// except those with a sale still awaiting payment.
pub async fn releasable_for_event<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    event_id: Uuid,
) -> Res<Vec<Registration>> {
    sqlx::query_as::<_, Registration>(
        r#"
        SELECT r.* FROM event_registrations r
        WHERE r.event_id = $1
          AND r.status = 'authorized'
          AND NOT EXISTS (
              SELECT 1 FROM sales s
              WHERE s.event_id = r.event_id AND s.buyer_id = r.user_id AND s.status = 'pending'
          )
        "#,
    )
    .bind(event_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Deposits left authorized on cancelled events, oldest first.
pub async fn authorized_on_cancelled_events<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    limit: i64,
) -> Res<Vec<Registration>> {
    sqlx::query_as::<_, Registration>(
        r#"
        SELECT r.* FROM event_registrations r
        JOIN auction_events e ON e.id = r.event_id
        WHERE e.status = 'cancelled' AND r.status = 'authorized'
        ORDER BY r.updated_at
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn release_by_intent<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    payment_intent_id: &str,
) -> Res<u64> {
    let result = sqlx::query(
        r#"
        UPDATE event_registrations SET status = 'released', updated_at = now()
        WHERE stripe_payment_intent_id = $1 AND status = 'authorized'
        "#,
    )
    .bind(payment_intent_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
