use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{dtos::pickup::PickupSlotCreateRequest, models::pickup::PickupSlot};

pub async fn list_slots_by_event<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    event_id: Uuid,
) -> Res<Vec<PickupSlot>> {
    sqlx::query_as::<_, PickupSlot>(
        "SELECT * FROM pickup_slots WHERE event_id = $1 ORDER BY starts_at",
    )
    .bind(event_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn insert_slot<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: PickupSlotCreateRequest,
) -> Res<PickupSlot> {
    sqlx::query_as::<_, PickupSlot>(
        r#"
        INSERT INTO pickup_slots (event_id, starts_at, ends_at, capacity)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(data.event_id)
    .bind(data.starts_at)
    .bind(data.ends_at)
    .bind(data.capacity)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

/// Takes one place in a slot of the given event. `None` when the slot is full
/// or belongs to another event.
pub async fn reserve_slot<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    slot_id: Uuid,
    event_id: Uuid,
) -> Res<Option<PickupSlot>> {
    sqlx::query_as::<_, PickupSlot>(
        r#"
        UPDATE pickup_slots SET booked_count = booked_count + 1
        WHERE id = $1 AND event_id = $2 AND booked_count < capacity
        RETURNING *
        "#,
    )
    .bind(slot_id)
    .bind(event_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn release_slot<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    slot_id: Uuid,
) -> Res<()> {
    sqlx::query(
        "UPDATE pickup_slots SET booked_count = booked_count - 1 WHERE id = $1 AND booked_count > 0",
    )
    .bind(slot_id)
    .execute(executor)
    .await?;
    Ok(())
}
