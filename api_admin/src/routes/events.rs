use std::sync::Arc;

use actix_web::{Responder, get, patch, post, web};
use common::{error::Res, http::Success, payments::HoldGateway};
use db::dtos::{
    event::{EventCreateRequest, EventUpdateRequest},
    lot::{LotCreateRequest, LotUpdateRequest},
    pickup::PickupSlotCreateRequest,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    dtos::admin::{EventListQuery, LotImageRequest, StatusRequest},
    services,
};

/// Every event, drafts included.
#[get("/events")]
pub async fn get_events(
    query: web::Query<EventListQuery>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let query = query.into_inner();
    let events = services::events::list_events(&pool, query.status, query.limit).await?;
    Success::ok(events)
}

/// Creates an event in `draft`.
///
/// # Input
/// - `title`, `starts_at`, `ends_at` (RFC 3339), `deposit_amount` in cents
/// - `description`, `location` (optional)
#[post("/events")]
pub async fn post_event(
    req: web::Json<EventCreateRequest>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let event = services::events::create_event(&pool, req.into_inner()).await?;
    Success::created(event)
}

#[patch("/events/{event_id}")]
pub async fn patch_event(
    path: web::Path<Uuid>,
    req: web::Json<EventUpdateRequest>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let event = services::events::update_event(&pool, path.into_inner(), req.into_inner()).await?;
    Success::ok(event)
}

/// Moves an event to `scheduled`, `draft`, `live` or `cancelled`.
///
/// # Frontend Example
/// ```javascript
/// await fetch(`/api/admin/events/${eventId}/status`, {
///   method: 'POST',
///   headers: { 'Content-Type': 'application/json', 'Authorization': `Bearer ${token}` },
///   body: JSON.stringify({ status: 'scheduled' })
/// });
/// ```
#[post("/events/{event_id}/status")]
pub async fn post_event_status(
    path: web::Path<Uuid>,
    req: web::Json<StatusRequest>,
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<Arc<dyn HoldGateway>>,
) -> Res<impl Responder> {
    let event = services::events::set_event_status(
        &pool,
        gateway.get_ref().as_ref(),
        path.into_inner(),
        &req.status,
    )
    .await?;
    Success::ok(event)
}

#[get("/events/{event_id}/lots")]
pub async fn get_event_lots(
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let lots = services::lots::list_lots(&pool, path.into_inner()).await?;
    Success::ok(lots)
}

#[post("/lots")]
pub async fn post_lot(
    req: web::Json<LotCreateRequest>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let lot = services::lots::create_lot(&pool, req.into_inner()).await?;
    Success::created(lot)
}

#[patch("/lots/{lot_id}")]
pub async fn patch_lot(
    path: web::Path<Uuid>,
    req: web::Json<LotUpdateRequest>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let lot = services::lots::update_lot(&pool, path.into_inner(), req.into_inner()).await?;
    Success::ok(lot)
}

#[post("/lots/{lot_id}/images")]
pub async fn post_lot_image(
    path: web::Path<Uuid>,
    req: web::Json<LotImageRequest>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let image =
        services::lots::add_image(&pool, path.into_inner(), &req.url, req.position).await?;
    Success::created(image)
}

#[post("/lots/{lot_id}/status")]
pub async fn post_lot_status(
    path: web::Path<Uuid>,
    req: web::Json<StatusRequest>,
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<Arc<dyn HoldGateway>>,
) -> Res<impl Responder> {
    let lot = services::lots::set_lot_status(
        &pool,
        gateway.get_ref().as_ref(),
        path.into_inner(),
        &req.status,
    )
    .await?;
    Success::ok(lot)
}

#[post("/lots/{lot_id}/close")]
pub async fn post_lot_close(
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let lot = services::lots::close_lot_now(&pool, path.into_inner()).await?;
    Success::ok(lot)
}

#[get("/events/{event_id}/pickup-slots")]
pub async fn get_pickup_slots(
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let slots = api_auctions::services::pickup::list_slots(&pool, path.into_inner()).await?;
    Success::ok(slots)
}

#[post("/pickup-slots")]
pub async fn post_pickup_slot(
    req: web::Json<PickupSlotCreateRequest>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let slot = services::system::create_pickup_slot(&pool, req.into_inner()).await?;
    Success::created(slot)
}
