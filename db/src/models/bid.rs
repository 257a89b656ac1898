use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Bid {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: i64,
    pub status: String,
    #[serde(skip_serializing)]
    pub stripe_payment_intent_id: Option<String>,
    pub hold_status: String,
    pub created_at: DateTime<Utc>,
}

/// Public bid history row. The bidder is only exposed as an id the
/// service turns into an alias.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BidHistoryEntry {
    pub id: Uuid,
    pub bidder_id: Uuid,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BidWithLot {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub amount: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub lot_title: String,
    pub lot_status: String,
    pub current_price: i64,
    pub ends_at: DateTime<Utc>,
}
