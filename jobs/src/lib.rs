//! Poll-and-act background jobs. Each job is a plain async function that
//! can run from the cron scheduler or on demand from the admin API.

use std::{fmt, sync::Arc};

use common::{
    env_config::Config,
    error::{AppError, Res},
    payments::HoldGateway,
};
use notifier::Notifier;
use sqlx::PgPool;

pub mod close_auction;
pub mod event_start;
pub mod scheduler;
pub mod watchlist;

pub use scheduler::start_scheduler;

/// Everything a job needs. Cheap to clone into each scheduled run.
#[derive(Clone)]
pub struct JobContext {
    pub pool: Arc<PgPool>,
    pub gateway: Arc<dyn HoldGateway>,
    pub notifier: Notifier,
    pub config: Arc<Config>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobName {
    CloseAuction,
    NotifyEventStart,
    NotifyWatchlistClosing,
}

impl JobName {
    pub const ALL: [JobName; 3] = [
        JobName::CloseAuction,
        JobName::NotifyEventStart,
        JobName::NotifyWatchlistClosing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::CloseAuction => "close-auction",
            JobName::NotifyEventStart => "notify-event-start",
            JobName::NotifyWatchlistClosing => "notify-watchlist-closing",
        }
    }

    pub fn from_str(s: &str) -> Res<Self> {
        JobName::ALL
            .into_iter()
            .find(|job| job.as_str() == s)
            .ok_or_else(|| AppError::NotFound(format!("Unknown job: {}", s)))
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runs one job now and returns its report as JSON.
pub async fn run_job(ctx: &JobContext, job: JobName) -> Res<serde_json::Value> {
    log::debug!("Running job {}", job);
    let report = match job {
        JobName::CloseAuction => serde_json::to_value(close_auction::run(ctx).await?),
        JobName::NotifyEventStart => serde_json::to_value(event_start::run(ctx).await?),
        JobName::NotifyWatchlistClosing => serde_json::to_value(watchlist::run(ctx).await?),
    };
    report.map_err(|e| AppError::Internal(format!("Failed to serialize {} report: {}", job, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_names_round_trip() {
        for job in JobName::ALL {
            assert_eq!(JobName::from_str(job.as_str()).unwrap(), job);
        }
        assert!(matches!(
            JobName::from_str("reindex"),
            Err(AppError::NotFound(_))
        ));
    }
}
