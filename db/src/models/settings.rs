use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SiteSettings {
    pub maintenance_mode: bool,
    pub maintenance_message: Option<String>,
    /// Late bids push the lot's end time to at least this many seconds out.
    pub soft_close_seconds: i32,
    pub updated_at: DateTime<Utc>,
}
