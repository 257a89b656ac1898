use std::sync::Arc;

use actix_web::{Responder, delete, get, post, web};
use common::{error::Res, http::Success, jwt::JwtClaims};
use sqlx::PgPool;
use uuid::Uuid;

use crate::services;

#[get("/watchlist")]
pub async fn get_watchlist(
    claims: web::ReqData<JwtClaims>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let items = services::watch::get_watchlist(&pool, claims.user_id).await?;
    Success::ok(items)
}

/// Watching a lot sends one email when it is about to close.
#[post("/watchlist/{lot_id}")]
pub async fn post_watch(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    services::watch::add_to_watchlist(&pool, claims.user_id, path.into_inner()).await?;
    Success::no_content()
}

#[delete("/watchlist/{lot_id}")]
pub async fn delete_watch(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<Uuid>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    services::watch::remove_from_watchlist(&pool, claims.user_id, path.into_inner()).await?;
    Success::no_content()
}
