use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::{JobContext, JobName, run_job};

fn cron_for(ctx: &JobContext, job: JobName) -> String {
    let jobs = &ctx.config.jobs;
    match job {
        JobName::CloseAuction => jobs.close_auction_cron.clone(),
        JobName::NotifyEventStart => jobs.event_start_cron.clone(),
        JobName::NotifyWatchlistClosing => jobs.watchlist_cron.clone(),
    }
}

/// Registers the three jobs on their cron schedules and starts them on
/// the current tokio runtime.
pub async fn start_scheduler(ctx: JobContext) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    for job in JobName::ALL {
        let schedule = cron_for(&ctx, job);
        let job_ctx = ctx.clone();
        let cron_job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let ctx = job_ctx.clone();
            Box::pin(async move {
                if let Err(e) = run_job(&ctx, job).await {
                    log::error!("Job {} failed: {}", job, e);
                }
            })
        })?;
        scheduler.add(cron_job).await?;
        log::info!("Scheduled {} at \"{}\"", job, schedule);
    }

    scheduler.start().await?;
    Ok(scheduler)
}
