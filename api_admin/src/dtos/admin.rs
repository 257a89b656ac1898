use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SaleListQuery {
    pub status: Option<String>,
    pub event_id: Option<Uuid>,
    pub buyer_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// Cents. Omit to refund everything still refundable.
    pub amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LotImageRequest {
    pub url: String,
    #[serde(default)]
    pub position: i32,
}
