use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use common::{error::Res, http::Success, jwt::JwtClaims, payments::HoldGateway};
use notifier::Notifier;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{dtos::auction::PlaceBidRequest, services};

/// Places a bid on a live lot. The full amount is held on the bidder's
/// default card until they are outbid or the lot closes.
///
/// # Input
/// - `amount`: bid in cents, at least the lot's `minimum_next_bid`
///
/// # Output
/// - Success: 201 with the bid, the new price, bid count, end time and next minimum
/// - Error:
///   - 400 if the amount is too low
///   - 402 if the card declines the hold
///   - 403 without a verified card or an event registration
///   - 409 if the lot is closed or someone else bid first
///   - 503 during maintenance
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch(`/api/secured/auctions/lots/${lotId}/bids`, {
///   method: 'POST',
///   headers: { 'Content-Type': 'application/json', 'Authorization': `Bearer ${token}` },
///   body: JSON.stringify({ amount: 125000 })
/// });
/// if (response.status === 409) await refreshLot(lotId);
/// ```
#[post("/lots/{lot_id}/bids")]
pub async fn post_bid(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<Uuid>,
    req: web::Json<PlaceBidRequest>,
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<Arc<dyn HoldGateway>>,
    notifier: web::Data<Notifier>,
) -> Res<impl Responder> {
    let placed = services::bidding::place_bid(
        &pool,
        gateway.get_ref().as_ref(),
        &notifier,
        claims.user_id,
        path.into_inner(),
        req.amount,
    )
    .await?;
    Success::created(placed)
}

#[get("/bids")]
pub async fn get_my_bids(
    claims: web::ReqData<JwtClaims>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let bids = services::bidding::my_bids(&pool, claims.user_id).await?;
    Success::ok(bids)
}
