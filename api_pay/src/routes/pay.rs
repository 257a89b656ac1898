use std::sync::Arc;

use actix_web::{Responder, delete, get, post, web};
use common::{
    env_config::Config, error::Res, http::Success, jwt::JwtClaims, payments::HoldGateway, stripe,
};
use sqlx::PgPool;

use crate::{
    dtos::pay::{AttachCardRequest, AttachCardResponse, SetupIntentResponse},
    services,
};

/// Creates a setup intent so the web app can collect a card with Stripe
/// Elements. The card is then saved with `POST /api/secured/pay/cards`.
///
/// # Frontend Example
/// ```javascript
/// const { client_secret } = await (await fetch('/api/secured/pay/setup-intent', {
///   method: 'POST',
///   headers: { 'Authorization': `Bearer ${token}` }
/// })).json();
/// const { setupIntent } = await stripe.confirmCardSetup(client_secret, {
///   payment_method: { card: cardElement }
/// });
/// await fetch('/api/secured/pay/cards', {
///   method: 'POST',
///   headers: { 'Content-Type': 'application/json', 'Authorization': `Bearer ${token}` },
///   body: JSON.stringify({ payment_method_id: setupIntent.payment_method })
/// });
/// ```
#[post("/setup-intent")]
pub async fn post_setup_intent(
    claims: web::ReqData<JwtClaims>,
    config: web::Data<Arc<Config>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let client = stripe::create_client(&config.stripe.secret_key);
    let customer_id = services::pay::ensure_customer(&pool, &client, claims.user_id).await?;
    let intent = services::pay::create_setup_intent(&client, &customer_id).await?;
    Success::ok(SetupIntentResponse {
        client_secret: intent.client_secret,
        customer_id,
    })
}

#[get("/cards")]
pub async fn get_cards(
    claims: web::ReqData<JwtClaims>,
    config: web::Data<Arc<Config>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let client = stripe::create_client(&config.stripe.secret_key);
    let cards = services::pay::list_cards(&pool, &client, claims.user_id).await?;
    Success::ok(cards)
}

/// Saves a card, makes it the default and validates it with a small hold
/// that is released immediately. A successful validation marks the account
/// as verified, which bidding requires.
///
/// # Output
/// - Success: 201 with the card id
/// - Error: 400 when the card is declined during validation
#[post("/cards")]
pub async fn post_card(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<AttachCardRequest>,
    config: web::Data<Arc<Config>>,
    pool: web::Data<Arc<PgPool>>,
    gateway: web::Data<Arc<dyn HoldGateway>>,
) -> Res<impl Responder> {
    let client = stripe::create_client(&config.stripe.secret_key);
    services::pay::attach_card(
        &pool,
        &client,
        gateway.get_ref().as_ref(),
        claims.user_id,
        &req.payment_method_id,
        config.stripe.card_verification_amount,
    )
    .await?;
    Success::created(AttachCardResponse {
        payment_method_id: req.into_inner().payment_method_id,
        verified: true,
    })
}

#[post("/cards/{payment_method_id}/default")]
pub async fn post_default_card(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<String>,
    config: web::Data<Arc<Config>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let client = stripe::create_client(&config.stripe.secret_key);
    services::pay::set_default_card(&pool, &client, claims.user_id, &path).await?;
    Success::no_content()
}

#[delete("/cards/{payment_method_id}")]
pub async fn delete_card(
    claims: web::ReqData<JwtClaims>,
    path: web::Path<String>,
    config: web::Data<Arc<Config>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let client = stripe::create_client(&config.stripe.secret_key);
    services::pay::detach_card(&pool, &client, claims.user_id, &path).await?;
    Success::no_content()
}
