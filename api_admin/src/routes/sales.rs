use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use api_auctions::services::refunds;
use common::{error::Res, http::Success, misc::SaleStatus, payments::HoldGateway};
use db::dtos::sale::SaleFilter;
use notifier::Notifier;
use sqlx::PgPool;
use uuid::Uuid;

use crate::dtos::admin::{RefundRequest, SaleListQuery};

#[get("/sales")]
pub async fn get_sales(
    query: web::Query<SaleListQuery>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let query = query.into_inner();
    if let Some(status) = query.status.as_deref() {
        SaleStatus::from_str(status)?;
    }
    let sales = db::sale::list_sales(
        &***pool,
        SaleFilter {
            status: query.status,
            event_id: query.event_id,
            buyer_id: query.buyer_id,
            limit: query.limit,
        },
    )
    .await?;
    Success::ok(sales)
}

/// Refunds a paid sale, in full or in part.
///
/// # Input
/// - `amount` (optional): cents to refund; defaults to everything not yet refunded
///
/// # Output
/// - Success: the sale with its new `refunded_amount` (and `status: "refunded"` once
///   nothing is left)
/// - Error: 400 for an amount above what is refundable, 409 unless the sale is paid
///
/// # Frontend Example
/// ```javascript
/// await fetch(`/api/admin/sales/${saleId}/refund`, {
///   method: 'POST',
///   headers: { 'Content-Type': 'application/json', 'Authorization': `Bearer ${token}` },
///   body: JSON.stringify({ amount: 5000 })
/// });
/// ```
#[post("/sales/{sale_id}/refund")]
pub async fn post_refund(
    path: web::Path<Uuid>,
    req: web::Json<RefundRequest>,
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<Arc<dyn HoldGateway>>,
    notifier: web::Data<Notifier>,
) -> Res<impl Responder> {
    let sale = refunds::refund_sale(
        &pool,
        gateway.get_ref().as_ref(),
        &notifier,
        path.into_inner(),
        req.amount,
    )
    .await?;
    Success::ok(sale)
}

#[post("/sales/{sale_id}/cancel")]
pub async fn post_cancel_sale(
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<Arc<dyn HoldGateway>>,
) -> Res<impl Responder> {
    let sale = refunds::cancel_sale(&pool, gateway.get_ref().as_ref(), path.into_inner()).await?;
    Success::ok(sale)
}

/// For payments collected by wire or check.
#[post("/sales/{sale_id}/mark-paid")]
pub async fn post_mark_paid(
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let sale = refunds::mark_sale_paid(&pool, path.into_inner()).await?;
    Success::ok(sale)
}

#[get("/events/{event_id}/registrations")]
pub async fn get_registrations(
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let registrations =
        db::registration::list_registrations_by_event(&***pool, path.into_inner()).await?;
    Success::ok(registrations)
}

/// Keeps the deposit of a bidder who did not pay for a won lot.
#[post("/registrations/{registration_id}/capture")]
pub async fn post_capture_deposit(
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<Arc<dyn HoldGateway>>,
) -> Res<impl Responder> {
    let registration =
        refunds::capture_deposit(&pool, gateway.get_ref().as_ref(), path.into_inner()).await?;
    Success::ok(registration)
}

#[post("/registrations/{registration_id}/release")]
pub async fn post_release_deposit(
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<Arc<dyn HoldGateway>>,
) -> Res<impl Responder> {
    let registration =
        refunds::release_deposit(&pool, gateway.get_ref().as_ref(), path.into_inner()).await?;
    Success::ok(registration)
}
