use api_auctions::services::settlement::{self, EventOutcome, LotOutcome, STALE_CLAIM_MINUTES};
use common::error::Res;
use serde::Serialize;

use crate::JobContext;

#[derive(Debug, Default, Serialize)]
pub struct CloseAuctionReport {
    pub lots: Vec<LotOutcome>,
    /// Lots another settler claimed first.
    pub skipped: usize,
    pub failed: usize,
    pub releases_retried: usize,
    pub releases_still_failing: usize,
    /// Deposits of cancelled events given back on this run.
    pub cancelled_deposits_released: usize,
    pub cancelled_deposits_failing: usize,
    pub events: Vec<EventOutcome>,
}

/// Settles every due lot, retries holds and deposits that failed to release
/// earlier and completes events with nothing left to settle.
pub async fn run(ctx: &JobContext) -> Res<CloseAuctionReport> {
    let pool = ctx.pool.as_ref();
    let gateway = ctx.gateway.as_ref();
    let mut report = CloseAuctionReport::default();

    for lot in db::lot::due_lots(pool, STALE_CLAIM_MINUTES).await? {
        match settlement::settle_lot(pool, gateway, &ctx.notifier, lot.id).await {
            Ok(Some(outcome)) => report.lots.push(outcome),
            Ok(None) => report.skipped += 1,
            Err(e) => {
                log::error!("Failed to settle lot {}: {}", lot.id, e);
                report.failed += 1;
            }
        }
    }

    match settlement::retry_failed_releases(pool, gateway).await {
        Ok(retried) => {
            report.releases_retried = retried.released.len();
            report.releases_still_failing = retried.failed.len();
        }
        Err(e) => log::error!("Failed to retry hold releases: {}", e),
    }

    match settlement::retry_cancelled_deposits(pool, gateway).await {
        Ok(deposits) => {
            report.cancelled_deposits_released = deposits.released;
            report.cancelled_deposits_failing = deposits.failed;
        }
        Err(e) => log::error!("Failed to retry deposits of cancelled events: {}", e),
    }

    report.events = settlement::finalize_events(pool, gateway).await?;

    if !report.lots.is_empty() || !report.events.is_empty() || report.failed > 0 {
        log::info!(
            "close-auction: settled={} skipped={} failed={} events={}",
            report.lots.len(),
            report.skipped,
            report.failed,
            report.events.len()
        );
    }
    Ok(report)
}
