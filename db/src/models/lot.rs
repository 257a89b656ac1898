use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A lot, stored in the `auctions` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Lot {
    pub id: Uuid,
    pub event_id: Uuid,
    pub lot_number: i32,
    pub title: String,
    pub description: Option<String>,
    pub starting_price: i64,
    pub current_price: i64,
    pub min_increment: Option<i64>,
    #[serde(skip_serializing)]
    pub reserve_price: Option<i64>,
    pub bid_count: i32,
    #[serde(skip_serializing)]
    pub high_bidder_id: Option<Uuid>,
    #[serde(skip_serializing)]
    pub winner_id: Option<Uuid>,
    pub status: String,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LotImage {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub url: String,
    pub position: i32,
}
