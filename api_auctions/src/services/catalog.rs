use common::{
    error::{AppError, Res},
    misc::{EventStatus, LotStatus},
};
use db::{
    dtos::event::EventFilter,
    models::{bid::BidHistoryEntry, event::AuctionEvent, lot::Lot},
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    dtos::auction::{BidHistoryItem, EventDetail, LotDetail, PublicSettings},
    services::rules,
};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 200;

fn is_public_event(event: &AuctionEvent) -> bool {
    event.status != EventStatus::Draft.as_str()
}

fn is_public_lot(lot: &Lot) -> bool {
    lot.status != LotStatus::Draft.as_str()
}

pub async fn list_events(
    pool: &PgPool,
    status: Option<String>,
    limit: Option<i64>,
) -> Res<Vec<AuctionEvent>> {
    if let Some(status) = status.as_deref() {
        if EventStatus::from_str(status)? == EventStatus::Draft {
            return Err(AppError::BadRequest("Invalid EventStatus: draft".to_string()));
        }
    }

    db::event::list_events(
        pool,
        EventFilter {
            status,
            include_drafts: false,
            limit,
        },
    )
    .await
}

pub async fn get_event_detail(pool: &PgPool, event_id: Uuid) -> Res<EventDetail> {
    let event = db::event::get_event_by_id(pool, event_id).await?;
    if !is_public_event(&event) {
        return Err(AppError::NotFound("Event not found".to_string()));
    }
    let lots = db::lot::list_lots_by_event(pool, event_id, false).await?;
    Ok(EventDetail { event, lots })
}

pub async fn get_lot_detail(pool: &PgPool, lot_id: Uuid) -> Res<LotDetail> {
    let lot = db::lot::get_lot_by_id(pool, lot_id).await?;
    if !is_public_lot(&lot) {
        return Err(AppError::NotFound("Lot not found".to_string()));
    }
    let images = db::lot::list_images(pool, lot_id).await?;

    Ok(LotDetail {
        minimum_next_bid: rules::minimum_next_bid(&lot),
        reserve_met: lot
            .reserve_price
            .map(|reserve| lot.bid_count > 0 && lot.current_price >= reserve),
        images,
        lot,
    })
}

pub async fn get_bid_history(
    pool: &PgPool,
    lot_id: Uuid,
    limit: Option<i64>,
) -> Res<Vec<BidHistoryItem>> {
    let lot = db::lot::get_lot_by_id(pool, lot_id).await?;
    if !is_public_lot(&lot) {
        return Err(AppError::NotFound("Lot not found".to_string()));
    }

    let limit = limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let entries = db::bid::bid_history(pool, lot_id, limit).await?;
    Ok(anonymize(lot_id, entries))
}

fn anonymize(lot_id: Uuid, entries: Vec<BidHistoryEntry>) -> Vec<BidHistoryItem> {
    entries
        .into_iter()
        .map(|entry| BidHistoryItem {
            id: entry.id,
            bidder: rules::bidder_alias(lot_id, entry.bidder_id),
            amount: entry.amount,
            created_at: entry.created_at,
        })
        .collect()
}

pub async fn get_public_settings(pool: &PgPool) -> Res<PublicSettings> {
    let settings = db::settings::get_settings(pool).await?;
    Ok(settings.into())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn history_hides_bidder_ids() {
        let lot_id = Uuid::new_v4();
        let bidder = Uuid::new_v4();
        let entries = vec![
            BidHistoryEntry {
                id: Uuid::new_v4(),
                bidder_id: bidder,
                amount: 12_000,
                created_at: Utc::now(),
            },
            BidHistoryEntry {
                id: Uuid::new_v4(),
                bidder_id: bidder,
                amount: 10_000,
                created_at: Utc::now(),
            },
        ];

        let items = anonymize(lot_id, entries);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].bidder, items[1].bidder);

        let json = serde_json::to_string(&items).unwrap();
        assert!(!json.contains(&bidder.to_string()));
    }
}
