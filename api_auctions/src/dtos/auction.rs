use chrono::{DateTime, Utc};
use db::models::{
    bid::Bid,
    event::AuctionEvent,
    lot::{Lot, LotImage},
    pickup::PickupSlot,
    settings::SiteSettings,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: AuctionEvent,
    pub lots: Vec<Lot>,
}

#[derive(Debug, Serialize)]
pub struct LotDetail {
    #[serde(flatten)]
    pub lot: Lot,
    pub images: Vec<LotImage>,
    pub minimum_next_bid: i64,
    /// `None` when the lot has no reserve. The reserve itself stays hidden.
    pub reserve_met: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BidHistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BidHistoryItem {
    pub id: Uuid,
    pub bidder: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PublicSettings {
    pub maintenance_mode: bool,
    pub maintenance_message: Option<String>,
    pub soft_close_seconds: i32,
}

impl From<SiteSettings> for PublicSettings {
    fn from(settings: SiteSettings) -> Self {
        Self {
            maintenance_mode: settings.maintenance_mode,
            maintenance_message: settings.maintenance_message,
            soft_close_seconds: settings.soft_close_seconds,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    /// Amount in cents.
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct BidPlaced {
    pub bid: Bid,
    pub current_price: i64,
    pub bid_count: i32,
    pub ends_at: DateTime<Utc>,
    pub minimum_next_bid: i64,
}

#[derive(Debug, Serialize)]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: PickupSlot,
    pub remaining: i32,
}

impl From<PickupSlot> for SlotView {
    fn from(slot: PickupSlot) -> Self {
        Self {
            remaining: slot.remaining(),
            slot,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BookPickupRequest {
    pub slot_id: Uuid,
}
