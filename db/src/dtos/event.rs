use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Default)]
pub struct EventFilter {
    pub status: Option<String>,
    pub include_drafts: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EventCreateRequest {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub deposit_amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct EventUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub deposit_amount: Option<i64>,
}
