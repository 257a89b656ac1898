use common::misc::SaleStatus;
use uuid::Uuid;

pub struct SaleCreateRequest {
    pub auction_id: Uuid,
    pub event_id: Uuid,
    pub buyer_id: Uuid,
    pub amount: i64,
    pub status: SaleStatus,
    pub stripe_payment_intent_id: Option<String>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Default)]
pub struct SaleFilter {
    pub status: Option<String>,
    pub event_id: Option<Uuid>,
    pub buyer_id: Option<Uuid>,
    pub limit: Option<i64>,
}
