use chrono::{DateTime, Utc};
use common::misc::TokenPurpose;
use uuid::Uuid;

pub struct TokenCreateRequest {
    pub user_id: Uuid,
    pub purpose: TokenPurpose,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}
