use api_auctions::services::holds;
use common::{
    error::{AppError, Res},
    misc::{BidStatus, EventStatus, LotStatus},
    payments::HoldGateway,
};
use db::{
    dtos::lot::{LotCreateRequest, LotUpdateRequest},
    models::lot::{Lot, LotImage},
};
use sqlx::PgPool;
use uuid::Uuid;

pub fn validate_lot_transition(from: LotStatus, to: LotStatus) -> Res<()> {
    use LotStatus::*;
    match (from, to) {
        (Draft, Upcoming) | (Upcoming, Draft) => Ok(()),
        (Draft | Upcoming | Live, Cancelled) => Ok(()),
        _ => Err(AppError::Conflict(format!(
            "A lot cannot go from {} to {}",
            from, to
        ))),
    }
}

fn validate_prices(starting_price: Option<i64>, min_increment: Option<i64>, reserve: Option<i64>) -> Res<()> {
    if starting_price.is_some_and(|p| p <= 0) {
        return Err(AppError::BadRequest("Starting price must be positive".to_string()));
    }
    if min_increment.is_some_and(|step| step <= 0) {
        return Err(AppError::BadRequest("Increment must be positive".to_string()));
    }
    if reserve.is_some_and(|r| r < 0) {
        return Err(AppError::BadRequest("Reserve cannot be negative".to_string()));
    }
    Ok(())
}

pub async fn list_lots(pool: &PgPool, event_id: Uuid) -> Res<Vec<Lot>> {
    db::lot::list_lots_by_event(pool, event_id, true).await
}

pub async fn create_lot(pool: &PgPool, data: LotCreateRequest) -> Res<Lot> {
    if data.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }
    validate_prices(Some(data.starting_price), data.min_increment, data.reserve_price)?;

    let event = db::event::get_event_by_id(pool, data.event_id).await?;
    if matches!(
        EventStatus::from_str(&event.status)?,
        EventStatus::Completed | EventStatus::Cancelled
    ) {
        return Err(AppError::Conflict(format!(
            "Lots cannot be added to a {} event",
            event.status
        )));
    }

    let lot = db::lot::insert_lot(pool, data).await?;
    log::info!("Created lot {} in event {}", lot.id, lot.event_id);
    Ok(lot)
}

/// Prices only change while the lot has no bids.
pub async fn update_lot(pool: &PgPool, lot_id: Uuid, data: LotUpdateRequest) -> Res<Lot> {
    validate_prices(data.starting_price, data.min_increment, data.reserve_price)?;
    db::lot::update_lot(pool, lot_id, data)
        .await?
        .ok_or_else(|| AppError::Conflict("Lot not found or already closed".to_string()))
}

pub async fn add_image(pool: &PgPool, lot_id: Uuid, url: &str, position: i32) -> Res<LotImage> {
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(AppError::BadRequest("Image URL must be http(s)".to_string()));
    }
    db::lot::get_lot_by_id(pool, lot_id).await?;
    db::lot::insert_image(pool, lot_id, url, position).await
}

/// Publishes, unpublishes or withdraws a lot. Publishing into an event that
/// is already live opens the lot right away. Withdrawing a live lot gives
/// every bid hold back.
pub async fn set_lot_status(
    pool: &PgPool,
    gateway: &dyn HoldGateway,
    lot_id: Uuid,
    status: &str,
) -> Res<Lot> {
    let requested = LotStatus::from_str(status)?;
    let lot = db::lot::get_lot_by_id(pool, lot_id).await?;
    let from = LotStatus::from_str(&lot.status)?;
    validate_lot_transition(from, requested)?;

    let to = if requested == LotStatus::Upcoming {
        let event = db::event::get_event_by_id(pool, lot.event_id).await?;
        if event.status == EventStatus::Live.as_str() {
            LotStatus::Live
        } else {
            LotStatus::Upcoming
        }
    } else {
        requested
    };

    let updated = db::lot::set_lot_status(pool, lot_id, &[from], to)
        .await?
        .ok_or_else(|| AppError::Conflict("Lot changed, please reload".to_string()))?;

    if from == LotStatus::Live && to == LotStatus::Cancelled {
        let bids = db::bid::bids_for_lot(pool, lot_id).await?;
        let releases = holds::release_and_record(pool, gateway, &bids).await;
        let open: Vec<Uuid> = bids
            .iter()
            .filter(|b| {
                b.status == BidStatus::Active.as_str() || b.status == BidStatus::Outbid.as_str()
            })
            .map(|b| b.id)
            .collect();
        db::bid::set_bid_status(pool, &open, BidStatus::Lost).await?;
        log::info!(
            "Withdrew live lot {}: released={} release_failed={}",
            lot_id,
            releases.released.len(),
            releases.failed.len()
        );
    }

    Ok(updated)
}

/// Ends a live lot now; the next close-auction run settles it.
pub async fn close_lot_now(pool: &PgPool, lot_id: Uuid) -> Res<Lot> {
    db::lot::close_now(pool, lot_id)
        .await?
        .ok_or_else(|| AppError::Conflict("Only live lots can be closed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lot_transitions() {
        use LotStatus::*;
        assert!(validate_lot_transition(Draft, Upcoming).is_ok());
        assert!(validate_lot_transition(Upcoming, Draft).is_ok());
        assert!(validate_lot_transition(Live, Cancelled).is_ok());
        assert!(validate_lot_transition(Live, Draft).is_err());
        assert!(validate_lot_transition(Sold, Cancelled).is_err());
        assert!(validate_lot_transition(Closing, Cancelled).is_err());
        assert!(validate_lot_transition(Upcoming, Live).is_err());
    }

    #[test]
    fn price_checks() {
        assert!(validate_prices(Some(10_000), Some(500), Some(50_000)).is_ok());
        assert!(validate_prices(None, None, None).is_ok());
        assert!(validate_prices(Some(0), None, None).is_err());
        assert!(validate_prices(None, Some(0), None).is_err());
        assert!(validate_prices(None, None, Some(-5)).is_err());
    }
}
