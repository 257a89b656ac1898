use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct LotCreateRequest {
    pub event_id: Uuid,
    pub lot_number: i32,
    pub title: String,
    pub description: Option<String>,
    pub starting_price: i64,
    pub min_increment: Option<i64>,
    pub reserve_price: Option<i64>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct LotUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starting_price: Option<i64>,
    pub min_increment: Option<i64>,
    pub reserve_price: Option<i64>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Conditional price update for an incoming bid. Matches only while the
/// lot still shows the price and bid count the bidder was validated against.
pub struct ApplyBid {
    pub lot_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: i64,
    pub observed_price: i64,
    pub observed_bid_count: i32,
    /// End time after the soft-close rule. Never moves the end earlier.
    pub extend_to: DateTime<Utc>,
}
