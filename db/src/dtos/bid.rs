use uuid::Uuid;

pub struct BidCreateRequest {
    pub auction_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: i64,
    pub stripe_payment_intent_id: String,
}
