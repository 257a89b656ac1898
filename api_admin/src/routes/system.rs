use std::sync::Arc;

use actix_web::{Responder, get, patch, post, web};
use common::{env_config::Config, error::Res, http::Success, payments::HoldGateway};
use db::dtos::{log::ReportFilter, settings::SettingsUpdateRequest};
use jobs::{JobContext, JobName};
use notifier::Notifier;
use sqlx::PgPool;

use crate::services;

#[get("/settings")]
pub async fn get_settings(pool: web::Data<Arc<PgPool>>) -> Res<impl Responder> {
    let settings = db::settings::get_settings(&***pool).await?;
    Success::ok(settings)
}

/// Toggles maintenance mode or changes the soft-close window.
///
/// # Input
/// - `maintenance_mode` (optional): `true` rejects new bids and registrations
/// - `maintenance_message` (optional): shown to bidders while in maintenance
/// - `soft_close_seconds` (optional): 0 to 3600
#[patch("/settings")]
pub async fn patch_settings(
    req: web::Json<SettingsUpdateRequest>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let settings = services::system::update_settings(&pool, req.into_inner()).await?;
    Success::ok(settings)
}

/// Runs a background job now and returns its report.
///
/// Jobs: `close-auction`, `notify-event-start`, `notify-watchlist-closing`.
///
/// # Frontend Example
/// ```javascript
/// const res = await fetch('/api/admin/jobs/close-auction/run', {
///   method: 'POST',
///   headers: { 'Authorization': `Bearer ${token}` }
/// });
/// const { data } = await res.json();
/// console.log(data.lots.length);
/// ```
#[post("/jobs/{name}/run")]
pub async fn post_run_job(
    path: web::Path<String>,
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<Arc<dyn HoldGateway>>,
    notifier: web::Data<Notifier>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let job = JobName::from_str(&path.into_inner())?;
    let ctx = JobContext {
        pool: pool.get_ref().clone(),
        gateway: gateway.get_ref().clone(),
        notifier: notifier.get_ref().clone(),
        config: config.get_ref().clone(),
    };
    log::info!("Running {} on demand", job);
    let report = jobs::run_job(&ctx, job).await?;
    Success::ok(report)
}

/// Request log, newest first. `?min_status=500&path=/bids` narrows it to
/// failed bid requests.
#[get("/logs")]
pub async fn get_logs(
    query: web::Query<ReportFilter>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let logs = db::log::get_report(&***pool, query.into_inner()).await?;
    Success::ok(logs)
}
