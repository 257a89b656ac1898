use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Query of the admin request log report.
#[derive(Debug, Default, Deserialize)]
pub struct ReportFilter {
    pub user_id: Option<Uuid>,
    pub method: Option<String>,
    pub status_code: Option<i32>,
    /// Only requests answered with at least this status, e.g. 400 for errors.
    pub min_status: Option<i32>,
    /// Substring of the request path.
    pub path: Option<String>,
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}
