use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WatchlistItem {
    pub auction_id: Uuid,
    pub event_id: Uuid,
    pub title: String,
    pub current_price: i64,
    pub status: String,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Reminder {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A watcher to notify about a lot that is about to close.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WatchlistDue {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub auction_id: Uuid,
    pub lot_title: String,
    pub current_price: i64,
    pub ends_at: DateTime<Utc>,
}

/// A user to remind about an event that is about to start.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReminderDue {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub event_id: Uuid,
    pub event_title: String,
    pub starts_at: DateTime<Utc>,
}
