use std::sync::Arc;

use actix_web::{Responder, get, web};
use common::{error::Res, http::Success};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    dtos::auction::{BidHistoryQuery, EventListQuery},
    services,
};

/// Lists published events, soonest first.
///
/// # Input
/// - `status` (query, optional): `scheduled`, `live`, `completed` or `cancelled`
/// - `limit` (query, optional)
///
/// # Frontend Example
/// ```javascript
/// const events = await (await fetch('/api/catalog/events?status=live')).json();
/// ```
#[get("/events")]
pub async fn get_events(
    query: web::Query<EventListQuery>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let query = query.into_inner();
    let events = services::catalog::list_events(&pool, query.status, query.limit).await?;
    Success::ok(events)
}

#[get("/events/{event_id}")]
pub async fn get_event(path: web::Path<Uuid>, pool: web::Data<Arc<PgPool>>) -> Res<impl Responder> {
    let detail = services::catalog::get_event_detail(&pool, path.into_inner()).await?;
    Success::ok(detail)
}

#[get("/events/{event_id}/pickup-slots")]
pub async fn get_pickup_slots(
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let slots = services::pickup::list_slots(&pool, path.into_inner()).await?;
    Success::ok(slots)
}

/// Lot with images and the lowest acceptable next bid.
///
/// # Output
/// - Success: the lot plus `images`, `minimum_next_bid` and `reserve_met`
///   (`null` when the lot has no reserve)
/// - Error: 404 for unknown or unpublished lots
#[get("/lots/{lot_id}")]
pub async fn get_lot(path: web::Path<Uuid>, pool: web::Data<Arc<PgPool>>) -> Res<impl Responder> {
    let detail = services::catalog::get_lot_detail(&pool, path.into_inner()).await?;
    Success::ok(detail)
}

/// Bid history, highest first. Bidders appear as per-lot aliases.
#[get("/lots/{lot_id}/bids")]
pub async fn get_lot_bids(
    path: web::Path<Uuid>,
    query: web::Query<BidHistoryQuery>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let history =
        services::catalog::get_bid_history(&pool, path.into_inner(), query.limit).await?;
    Success::ok(history)
}

/// Maintenance banner and soft-close window for the web app.
#[get("/settings")]
pub async fn get_settings(pool: web::Data<Arc<PgPool>>) -> Res<impl Responder> {
    let settings = services::catalog::get_public_settings(&pool).await?;
    Success::ok(settings)
}
