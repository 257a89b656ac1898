use std::sync::Arc;

use actix_web::{Responder, delete, get, post, web};
use common::{error::Res, http::Success, jwt::JwtClaims, payments::HoldGateway};
use notifier::Notifier;
use sqlx::PgPool;
use uuid::Uuid;

use crate::services;

/// Registers the caller to bid in an event. When the event asks for a
/// deposit, a refundable hold for that amount is placed on the default card.
///
/// Calling it again while the registration is valid returns it unchanged.
///
/// # Output
/// - Success: 200 with the registration (`status`, `deposit_amount`, `authorized_at`)
/// - Error: 400 without a saved card or for a closed event, 402 if the card
///   declines the deposit, 503 during maintenance
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch(`/api/secured/auctions/events/${eventId}/register`, {
///   method: 'POST',
///   headers: { 'Authorization': `Bearer ${token}` }
/// });
/// if (response.status === 402) showCardDeclined();
/// ```
#[post("/events/{event_id}/register")]
pub async fn post_register(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<Arc<dyn HoldGateway>>,
    notifier: web::Data<Notifier>,
) -> Res<impl Responder> {
    let registration = services::registration::register_for_event(
        &pool,
        gateway.get_ref().as_ref(),
        &notifier,
        claims.user_id,
        path.into_inner(),
    )
    .await?;
    Success::ok(registration)
}

#[get("/events/{event_id}/registration")]
pub async fn get_registration(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let registration =
        services::registration::get_my_registration(&pool, claims.user_id, path.into_inner())
            .await?;
    Success::ok(registration)
}

#[post("/events/{event_id}/reminder")]
pub async fn post_reminder(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let reminder =
        services::watch::add_event_reminder(&pool, claims.user_id, path.into_inner()).await?;
    Success::created(reminder)
}

#[delete("/events/{event_id}/reminder")]
pub async fn delete_reminder(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    services::watch::remove_event_reminder(&pool, claims.user_id, path.into_inner()).await?;
    Success::no_content()
}

#[get("/reminders")]
pub async fn get_reminders(
    claims: web::ReqData<JwtClaims>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let reminders = services::watch::get_reminders(&pool, claims.user_id).await?;
    Success::ok(reminders)
}
