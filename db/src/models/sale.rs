use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Sale {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub event_id: Uuid,
    pub buyer_id: Uuid,
    pub amount: i64,
    pub refunded_amount: i64,
    pub status: String,
    pub stripe_payment_intent_id: Option<String>,
    pub failure_reason: Option<String>,
    pub pickup_slot_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    pub fn refundable_amount(&self) -> i64 {
        self.amount - self.refunded_amount
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SaleWithLot {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub sale: Sale,
    pub lot_title: String,
    pub lot_number: i32,
}
