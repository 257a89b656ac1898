use api_auctions::services::settlement;
use common::{
    error::{AppError, Res},
    misc::{EventStatus, LotStatus},
    payments::HoldGateway,
};
use db::{
    dtos::event::{EventCreateRequest, EventFilter, EventUpdateRequest},
    models::event::AuctionEvent,
};
use sqlx::PgPool;
use uuid::Uuid;

pub fn validate_event_transition(from: EventStatus, to: EventStatus) -> Res<()> {
    use EventStatus::*;
    match (from, to) {
        (Draft, Scheduled) | (Scheduled, Draft) | (Scheduled, Live) => Ok(()),
        (Draft | Scheduled, Cancelled) => Ok(()),
        _ => Err(AppError::Conflict(format!(
            "An event cannot go from {} to {}",
            from, to
        ))),
    }
}

fn validate_schedule(
    starts_at: chrono::DateTime<chrono::Utc>,
    ends_at: chrono::DateTime<chrono::Utc>,
) -> Res<()> {
    if ends_at <= starts_at {
        return Err(AppError::BadRequest("Event must end after it starts".to_string()));
    }
    Ok(())
}

pub fn validate_new_event(data: &EventCreateRequest) -> Res<()> {
    if data.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }
    if data.deposit_amount < 0 {
        return Err(AppError::BadRequest("Deposit cannot be negative".to_string()));
    }
    validate_schedule(data.starts_at, data.ends_at)
}

pub async fn list_events(
    pool: &PgPool,
    status: Option<String>,
    limit: Option<i64>,
) -> Res<Vec<AuctionEvent>> {
    if let Some(status) = status.as_deref() {
        EventStatus::from_str(status)?;
    }
    db::event::list_events(
        pool,
        EventFilter {
            status,
            include_drafts: true,
            limit,
        },
    )
    .await
}

pub async fn create_event(pool: &PgPool, data: EventCreateRequest) -> Res<AuctionEvent> {
    validate_new_event(&data)?;
    let event = db::event::insert_event(pool, data).await?;
    log::info!("Created event {} ({})", event.id, event.title);
    Ok(event)
}

pub async fn update_event(
    pool: &PgPool,
    event_id: Uuid,
    data: EventUpdateRequest,
) -> Res<AuctionEvent> {
    let current = db::event::get_event_by_id(pool, event_id).await?;
    if matches!(
        EventStatus::from_str(&current.status)?,
        EventStatus::Completed | EventStatus::Cancelled
    ) {
        return Err(AppError::Conflict(format!(
            "A {} event can no longer be edited",
            current.status
        )));
    }
    if data.deposit_amount.is_some_and(|d| d < 0) {
        return Err(AppError::BadRequest("Deposit cannot be negative".to_string()));
    }
    validate_schedule(
        data.starts_at.unwrap_or(current.starts_at),
        data.ends_at.unwrap_or(current.ends_at),
    )?;
    db::event::update_event(pool, event_id, data).await
}

/// Publishes, unpublishes, starts or cancels an event.
///
/// Starting opens every upcoming lot. Cancelling withdraws the lots and
/// gives every deposit back.
pub async fn set_event_status(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    event_id: Uuid,
    status: &str,
) -> Res<AuctionEvent> {
    let to = EventStatus::from_str(status)?;
    let event = db::event::get_event_by_id(pool, event_id).await?;
    validate_event_transition(EventStatus::from_str(&event.status)?, to)?;

    let mut tx = pool.begin().await?;
    let updated = db::event::update_event_status(&mut *tx, event_id, to).await?;
    match to {
        EventStatus::Live => {
            let lots = db::lot::start_lots_for_event(&mut *tx, event_id).await?;
            log::info!("Started event {} early with {} lots", event_id, lots);
        }
        EventStatus::Cancelled => {
            for lot in db::lot::list_lots_by_event(&mut *tx, event_id, true).await? {
                db::lot::set_lot_status(
                    &mut *tx,
                    lot.id,
                    &[LotStatus::Draft, LotStatus::Upcoming],
                    LotStatus::Cancelled,
                )
                .await?;
            }
        }
        _ => {}
    }
    tx.commit().await?;

    if to == EventStatus::Cancelled {
        let deposits = settlement::cancel_event_deposits(pool, gateway, event_id).await?;
        if deposits.failed > 0 {
            log::warn!(
                "{} deposits of cancelled event {} were not released, close-auction retries them",
                deposits.failed,
                event_id
            );
        }
    }

    log::info!("Event {} is now {}", event_id, to);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    #[test]
    fn allowed_event_transitions() {
        use EventStatus::*;
        for (from, to) in [
            (Draft, Scheduled),
            (Scheduled, Draft),
            (Scheduled, Live),
            (Draft, Cancelled),
            (Scheduled, Cancelled),
        ] {
            assert!(validate_event_transition(from, to).is_ok(), "{} -> {}", from, to);
        }
    }

    #[test]
    fn refused_event_transitions() {
        use EventStatus::*;
        for (from, to) in [
            (Live, Cancelled),
            (Live, Draft),
            (Live, Completed),
            (Completed, Live),
            (Cancelled, Scheduled),
            (Draft, Live),
        ] {
            assert!(
                matches!(validate_event_transition(from, to), Err(AppError::Conflict(_))),
                "{} -> {}",
                from,
                to
            );
        }
    }

    #[test]
    fn new_event_needs_a_sane_schedule() {
        let now = Utc::now();
        let mut event = EventCreateRequest {
            title: "Bakery equipment".to_string(),
            description: None,
            location: Some("Columbus, OH".to_string()),
            starts_at: now,
            ends_at: now + Duration::days(3),
            deposit_amount: 25_000,
        };
        assert!(validate_new_event(&event).is_ok());

        event.ends_at = now;
        assert!(validate_new_event(&event).is_err());

        event.ends_at = now + Duration::days(3);
        event.deposit_amount = -1;
        assert!(validate_new_event(&event).is_err());

        event.deposit_amount = 0;
        event.title = "  ".to_string();
        assert!(validate_new_event(&event).is_err());
    }
}
