use common::{
    error::{AppError, Res},
    misc::{EventStatus, LotStatus},
};
use db::models::watch::{Reminder, WatchlistItem};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn add_to_watchlist(pool: &PgPool, user_id: Uuid, lot_id: Uuid) -> Res<()> {
    let lot = db::lot::get_lot_by_id(pool, lot_id).await?;
    if lot.status == LotStatus::Draft.as_str() {
        return Err(AppError::NotFound("Lot not found".to_string()));
    }
    db::watch::add_watch(pool, user_id, lot_id).await
}

pub async fn remove_from_watchlist(pool: &PgPool, user_id: Uuid, lot_id: Uuid) -> Res<()> {
    if !db::watch::remove_watch(pool, user_id, lot_id).await? {
        return Err(AppError::NotFound("Lot is not on your watchlist".to_string()));
    }
    Ok(())
}

pub async fn get_watchlist(pool: &PgPool, user_id: Uuid) -> Res<Vec<WatchlistItem>> {
    db::watch::list_watchlist(pool, user_id).await
}

/// Reminders only make sense before an event starts.
pub async fn add_event_reminder(pool: &PgPool, user_id: Uuid, event_id: Uuid) -> Res<Reminder> {
    let event = db::event::get_event_by_id(pool, event_id).await?;
    match EventStatus::from_str(&event.status)? {
        EventStatus::Scheduled => db::watch::add_reminder(pool, user_id, event_id).await,
        EventStatus::Draft => Err(AppError::NotFound("Event not found".to_string())),
        _ => Err(AppError::BadRequest(
            "Reminders can only be set for upcoming events".to_string(),
        )),
    }
}

pub async fn remove_event_reminder(pool: &PgPool, user_id: Uuid, event_id: Uuid) -> Res<()> {
    if !db::watch::remove_reminder(pool, user_id, event_id).await? {
        return Err(AppError::NotFound("Reminder not found".to_string()));
    }
    Ok(())
}

pub async fn get_reminders(pool: &PgPool, user_id: Uuid) -> Res<Vec<Reminder>> {
    db::watch::list_reminders(pool, user_id).await
}
