use std::sync::Arc;

use actix_web::{Responder, get, patch, web};
use common::{error::Res, http::Success, jwt::JwtClaims};
use sqlx::PgPool;

use crate::{dtos::auth::ProfileUpdate, services};

/// Endpoint to retrieve the current authenticated user's profile.
///
/// # Output
/// - Success: the profile, including `verified` (a card has been validated)
/// - Error: 401 without a valid token, 404 if the profile no longer exists
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch('/api/secured/me', {
///   headers: { 'Authorization': `Bearer ${localStorage.getItem('authToken')}` }
/// });
/// const profile = await response.json();
/// ```
#[get("")]
pub async fn get_me(
    claims: web::ReqData<JwtClaims>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let pg_pool: &PgPool = &pool;
    let profile = services::user::get_profile_by_id(pg_pool, claims.user_id).await?;
    Success::ok(profile)
}

/// Updates names, company and phone. Omitted fields are left unchanged.
#[patch("")]
pub async fn patch_me(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<ProfileUpdate>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let profile = services::user::update_profile(&pool, claims.user_id, req.into_inner()).await?;
    Success::ok(profile)
}
