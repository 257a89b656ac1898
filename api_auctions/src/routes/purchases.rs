use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use common::{error::Res, http::Success, jwt::JwtClaims};
use notifier::Notifier;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{dtos::auction::BookPickupRequest, services};

/// Lots the caller won, with payment status and pickup slot.
#[get("/purchases")]
pub async fn get_purchases(
    claims: web::ReqData<JwtClaims>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let purchases = services::pickup::my_purchases(&pool, claims.user_id).await?;
    Success::ok(purchases)
}

/// Books (or moves) the pickup of a paid purchase.
///
/// # Input
/// - `slot_id`: one of `GET /api/catalog/events/{event_id}/pickup-slots`
///
/// # Output
/// - Success: the updated purchase
/// - Error: 404 for someone else's purchase, 409 if unpaid or the slot is full
///
/// # Frontend Example
/// ```javascript
/// await fetch(`/api/secured/auctions/purchases/${saleId}/pickup`, {
///   method: 'POST',
///   headers: { 'Content-Type': 'application/json', 'Authorization': `Bearer ${token}` },
///   body: JSON.stringify({ slot_id: slotId })
/// });
/// ```
#[post("/purchases/{sale_id}/pickup")]
pub async fn post_pickup(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<Uuid>,
    req: web::Json<BookPickupRequest>,
    pool: web::Data<Arc<PgPool>>,
    notifier: web::Data<Notifier>,
) -> Res<impl Responder> {
    let sale = services::pickup::book_pickup_slot(
        &pool,
        &notifier,
        claims.user_id,
        path.into_inner(),
        req.slot_id,
    )
    .await?;
    Success::ok(sale)
}
