use std::sync::Arc;

use actix_web::{HttpRequest, Responder, post, web};
use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
};
use sqlx::PgPool;

use crate::services;

/// Handles Stripe webhook events for holds and sale payments.
///
/// # Note
/// This endpoint is called by Stripe, not by the web app. Configure
/// `https://yourapp.com/api/pay/webhook` in the Stripe Dashboard and put the
/// signing secret in `STRIPE_WEBHOOK_SECRET`.
///
/// # Event Types Handled
/// - payment_intent.succeeded: a pending sale paid out of band becomes paid
/// - payment_intent.canceled: bid and deposit holds are marked released
/// - payment_intent.payment_failed: the failure is recorded on the sale
#[post("/webhook")]
pub async fn post_webhook(
    payload: String,
    req: HttpRequest,
    config: web::Data<Arc<Config>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let signature = match req.headers().get("stripe-signature") {
        Some(signature) => signature.to_str().unwrap_or(""),
        None => return Err(AppError::BadRequest("Stripe signature missing".to_string())),
    };

    let event =
        services::webhook::construct_event(&payload, signature, &config.stripe.webhook_secret)?;
    services::webhook::process_webhook_event(&pool, event).await?;

    Success::ok("Webhook processed successfully")
}
