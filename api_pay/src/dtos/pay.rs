use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct SetupIntentResponse {
    pub client_secret: Option<String>,
    pub customer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachCardRequest {
    pub payment_method_id: String,
}

#[derive(Debug, Serialize)]
pub struct AttachCardResponse {
    pub payment_method_id: String,
    pub verified: bool,
}
